//! depth-image-proc: depth images to disparity images and XYZI point clouds

mod error;
pub use error::{Error, Result};

mod encoding;
pub use encoding::{DepthEncoding, IntensityEncoding, RawDepth};

mod camera;
pub use camera::{CameraIntrinsics, PinholeCameraModel};

pub mod reconcile;
pub use reconcile::{reconcile, ImageResampler, Reconciled, Resampler};

/// Exact and approximate timestamp synchronizers
pub mod sync;
pub use sync::{ApproximateTimeSync, ExactTimeSync};

mod subscription;
pub use subscription::{ChannelSpec, SubscriptionManager, SubscriptionState, TopicName, Transition};

mod disparity;
pub use disparity::{disparity_at, DisparityConverter, DisparityParams};

mod point_cloud;
pub use point_cloud::{xyzi_fields, xyzi_points, PointCloudConverter, XYZI_POINT_STEP};

pub mod config;
pub use config::{load_config_file, NodeConfig};

mod metrics;
pub use metrics::{MetricsHub, NodeMetrics};

mod node;
pub use node::{DisparityInputs, DisparityNode, PointCloudInputs, PointCloudXyziNode};

mod traits;
pub use traits::{FrameSet, FrameSource};

#[cfg(feature = "mock")]
mod mock;
#[cfg(feature = "mock")]
pub use mock::MockDepthCamera;

pub mod io;
