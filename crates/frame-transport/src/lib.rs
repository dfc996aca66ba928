//! frame-transport: message types and publish/subscribe seams for camera streams
//!
//! This crate provides the wire-level shapes exchanged with the transport layer (images,
//! calibration, disparity images, point clouds) and the traits a backend implements to
//! deliver them. The default build enables a `mock` in-process backend so that nodes can be
//! exercised on any host without a middleware installed.

mod types;
pub use types::{
    encodings, CameraInfo, DisparityImage, Header, Image, PointCloud2, PointField,
    PointFieldType, TopicInfo,
};

mod error;
pub use error::{Result, TransportError};

mod traits;
pub use traits::{Publisher, Stamped, Subscriber};

mod names;
pub use names::{camera_info_topic, TopicResolver};

#[cfg(feature = "mock")]
mod mock;

#[cfg(feature = "mock")]
pub use mock::{MockPublisher, MockSubscriber, SubscriberStats};
