use crate::{CameraInfo, DisparityImage, Image, PointCloud2, Result, TopicInfo};
use time::OffsetDateTime;

/// Messages that carry an acquisition timestamp.
pub trait Stamped {
    fn stamp(&self) -> OffsetDateTime;
}

impl Stamped for Image {
    fn stamp(&self) -> OffsetDateTime {
        self.header.stamp
    }
}

impl Stamped for CameraInfo {
    fn stamp(&self) -> OffsetDateTime {
        self.header.stamp
    }
}

impl Stamped for DisparityImage {
    fn stamp(&self) -> OffsetDateTime {
        self.header.stamp
    }
}

impl Stamped for PointCloud2 {
    fn stamp(&self) -> OffsetDateTime {
        self.header.stamp
    }
}

/// One upstream channel. Delivery of messages happens out of band; this trait only
/// controls whether the channel is currently requested from the transport.
pub trait Subscriber: Send {
    /// Start receiving `topic` (already resolved) over the named transport.
    fn subscribe(&mut self, topic: &str, transport: &str) -> Result<()>;

    /// Stop receiving. Idempotent.
    fn unsubscribe(&mut self);

    /// Topic currently subscribed, if any.
    fn topic(&self) -> Option<&TopicInfo>;

    fn is_subscribed(&self) -> bool {
        self.topic().is_some()
    }
}

/// A downstream output.
pub trait Publisher<M>: Send + Sync {
    /// Hand a message to the transport; ownership ends here.
    fn publish(&self, msg: M) -> Result<()>;

    /// Number of consumers currently matched to this output.
    fn subscription_count(&self) -> usize;

    fn topic(&self) -> &str;
}
