//! Processing nodes: synchronizer, subscription manager, converter and publisher wired
//! together behind `handle_*` entry points fed by the transport.

use crate::config::NodeConfig;
use crate::disparity::DisparityConverter;
use crate::metrics::NodeMetrics;
use crate::point_cloud::PointCloudConverter;
use crate::reconcile::{reconcile, ImageResampler};
use crate::subscription::{ChannelSpec, SubscriptionManager, TopicName, Transition};
use crate::sync::{ApproximateTimeSync, ExactTimeSync};
use crate::{Error, Result};
use frame_transport::{CameraInfo, DisparityImage, Image, PointCloud2, Publisher, Subscriber};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

const FRAME_ID_WARN_PERIOD: Duration = Duration::from_secs(10);

/// Lets an event through at most once per `period`.
struct Throttle {
    period: Duration,
    last: Mutex<Option<Instant>>,
}

impl Throttle {
    fn new(period: Duration) -> Self {
        Self {
            period,
            last: Mutex::new(None),
        }
    }

    fn ready(&self) -> bool {
        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        match *last {
            Some(prev) if now.duration_since(prev) < self.period => false,
            _ => {
                *last = Some(now);
                true
            }
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct DisparityInputs {
    pub depth: Box<dyn Subscriber>,
    pub camera_info: Box<dyn Subscriber>,
}

pub struct PointCloudInputs {
    pub depth: Box<dyn Subscriber>,
    pub intensity: Box<dyn Subscriber>,
    /// Subscribed to the `camera_info` sibling of the intensity topic.
    pub camera_info: Box<dyn Subscriber>,
}

struct DisparityWorker {
    converter: DisparityConverter,
    publisher: Arc<dyn Publisher<DisparityImage>>,
    metrics: NodeMetrics,
}

impl DisparityWorker {
    fn process(&self, depth: Image, info: CameraInfo) {
        self.metrics.tuples_synced.inc();
        let out = match self.converter.convert(&depth, &info) {
            Ok(out) => out,
            Err(e) => {
                error!("disparity conversion failed: {e}");
                self.metrics.conversion_errors.inc();
                return;
            }
        };
        match self.publisher.publish(out) {
            Ok(()) => self.metrics.disparity_published.inc(),
            Err(e) => error!("publishing to {} failed: {e}", self.publisher.topic()),
        }
    }
}

/// Depth image + calibration in, disparity image out.
pub struct DisparityNode {
    subscriptions: SubscriptionManager,
    sync: Mutex<ExactTimeSync<Image, CameraInfo>>,
    publisher: Arc<dyn Publisher<DisparityImage>>,
    metrics: NodeMetrics,
}

impl DisparityNode {
    pub fn new(
        config: &NodeConfig,
        publisher: Arc<dyn Publisher<DisparityImage>>,
        inputs: DisparityInputs,
        metrics: NodeMetrics,
    ) -> Result<Self> {
        let cfg = &config.disparity;
        cfg.validate()?;
        let mut subscriptions = SubscriptionManager::new(config.resolver()?);
        subscriptions.add_channel(
            ChannelSpec::new(
                "depth",
                TopicName::Plain(cfg.topics.depth.clone()),
                &cfg.image_transport,
            ),
            inputs.depth,
        );
        subscriptions.add_channel(
            ChannelSpec::new(
                "camera_info",
                TopicName::Plain(cfg.topics.camera_info.clone()),
                "raw",
            ),
            inputs.camera_info,
        );

        let worker = Arc::new(DisparityWorker {
            converter: DisparityConverter::new(cfg.params()),
            publisher: Arc::clone(&publisher),
            metrics: metrics.clone(),
        });
        let mut sync = ExactTimeSync::new(cfg.queue_size);
        sync.register_callback(move |depth, info| worker.process(depth, info));

        Ok(Self {
            subscriptions,
            sync: Mutex::new(sync),
            publisher,
            metrics,
        })
    }

    /// Re-read the output's consumer count and (un)subscribe upstream to match.
    pub fn on_consumers_changed(&self) -> Result<Transition> {
        let transition = self
            .subscriptions
            .on_consumer_count(self.publisher.subscription_count())?;
        match transition {
            Transition::Subscribed => self.metrics.active_nodes.inc(),
            Transition::Unsubscribed => {
                self.metrics.active_nodes.dec();
                lock(&self.sync).clear();
            }
            Transition::Unchanged => {}
        }
        Ok(transition)
    }

    pub fn is_active(&self) -> bool {
        self.subscriptions.is_active()
    }

    pub fn handle_depth(&self, depth: Image) {
        if !self.accepting("depth") {
            return;
        }
        let mut sync = lock(&self.sync);
        let before = sync.dropped();
        sync.add_first(depth);
        self.metrics.frames_dropped.inc_by(sync.dropped() - before);
    }

    pub fn handle_camera_info(&self, info: CameraInfo) {
        if !self.accepting("camera_info") {
            return;
        }
        let mut sync = lock(&self.sync);
        let before = sync.dropped();
        sync.add_second(info);
        self.metrics.frames_dropped.inc_by(sync.dropped() - before);
    }

    fn accepting(&self, channel: &str) -> bool {
        let active = self.subscriptions.is_active();
        if !active {
            debug!("ignoring {channel} message, disparity node has no consumers");
        }
        active
    }
}

struct PointCloudWorker {
    converter: PointCloudConverter,
    publisher: Arc<dyn Publisher<PointCloud2>>,
    metrics: NodeMetrics,
    frame_id_warning: Throttle,
}

impl PointCloudWorker {
    fn process(&self, depth: Image, intensity: Image, info: CameraInfo) {
        self.metrics.tuples_synced.inc();
        if depth.header.frame_id != intensity.header.frame_id && self.frame_id_warning.ready() {
            let mismatch = Error::FrameIdMismatch {
                depth: depth.header.frame_id.clone(),
                companion: intensity.header.frame_id.clone(),
            };
            warn!("{mismatch}");
        }

        let cloud = reconcile(&depth, &intensity, &info, &ImageResampler).and_then(|r| {
            self.converter
                .convert(&depth, r.companion.as_ref(), &r.intrinsics)
        });
        let cloud = match cloud {
            Ok(cloud) => cloud,
            Err(e) => {
                error!("point cloud conversion failed: {e}");
                self.metrics.conversion_errors.inc();
                return;
            }
        };
        match self.publisher.publish(cloud) {
            Ok(()) => self.metrics.clouds_published.inc(),
            Err(e) => error!("publishing to {} failed: {e}", self.publisher.topic()),
        }
    }
}

/// Depth + intensity + calibration in, organized XYZI point cloud out.
pub struct PointCloudXyziNode {
    subscriptions: SubscriptionManager,
    sync: Mutex<ApproximateTimeSync<Image, Image, CameraInfo>>,
    publisher: Arc<dyn Publisher<PointCloud2>>,
    metrics: NodeMetrics,
}

impl PointCloudXyziNode {
    pub fn new(
        config: &NodeConfig,
        publisher: Arc<dyn Publisher<PointCloud2>>,
        inputs: PointCloudInputs,
        metrics: NodeMetrics,
    ) -> Result<Self> {
        let cfg = &config.point_cloud;
        cfg.validate()?;
        let mut subscriptions = SubscriptionManager::new(config.resolver()?);
        subscriptions.add_channel(
            ChannelSpec::new(
                "depth",
                TopicName::Plain(cfg.topics.depth.clone()),
                &cfg.depth_image_transport,
            ),
            inputs.depth,
        );
        subscriptions.add_channel(
            ChannelSpec::new(
                "intensity",
                TopicName::Plain(cfg.topics.intensity.clone()),
                &cfg.image_transport,
            ),
            inputs.intensity,
        );
        subscriptions.add_channel(
            ChannelSpec::new(
                "camera_info",
                TopicName::CameraInfoOf(cfg.topics.intensity.clone()),
                "raw",
            ),
            inputs.camera_info,
        );

        let worker = Arc::new(PointCloudWorker {
            converter: PointCloudConverter::new(cfg.invalid_depth),
            publisher: Arc::clone(&publisher),
            metrics: metrics.clone(),
            frame_id_warning: Throttle::new(FRAME_ID_WARN_PERIOD),
        });
        let mut sync = ApproximateTimeSync::new(cfg.queue_size, cfg.sync_window());
        sync.register_callback(move |depth, intensity, info| {
            worker.process(depth, intensity, info)
        });

        Ok(Self {
            subscriptions,
            sync: Mutex::new(sync),
            publisher,
            metrics,
        })
    }

    /// Re-read the output's consumer count and (un)subscribe upstream to match.
    pub fn on_consumers_changed(&self) -> Result<Transition> {
        let transition = self
            .subscriptions
            .on_consumer_count(self.publisher.subscription_count())?;
        match transition {
            Transition::Subscribed => self.metrics.active_nodes.inc(),
            Transition::Unsubscribed => {
                self.metrics.active_nodes.dec();
                lock(&self.sync).clear();
            }
            Transition::Unchanged => {}
        }
        Ok(transition)
    }

    pub fn is_active(&self) -> bool {
        self.subscriptions.is_active()
    }

    pub fn handle_depth(&self, depth: Image) {
        self.feed("depth", |sync| sync.add_first(depth));
    }

    pub fn handle_intensity(&self, intensity: Image) {
        self.feed("intensity", |sync| sync.add_second(intensity));
    }

    pub fn handle_camera_info(&self, info: CameraInfo) {
        self.feed("camera_info", |sync| sync.add_third(info));
    }

    fn feed<F>(&self, channel: &str, add: F)
    where
        F: FnOnce(&mut ApproximateTimeSync<Image, Image, CameraInfo>) -> usize,
    {
        if !self.subscriptions.is_active() {
            debug!("ignoring {channel} message, point cloud node has no consumers");
            return;
        }
        let mut sync = lock(&self.sync);
        let before = sync.dropped();
        let fired = add(&mut *sync);
        self.metrics.frames_dropped.inc_by(sync.dropped() - before);
        if fired > 1 {
            debug!("{channel} message released {fired} tuples");
        }
    }
}
