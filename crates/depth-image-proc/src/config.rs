use crate::disparity::DisparityParams;
use crate::{Error, Result};
use anyhow::Context;
use frame_transport::TopicResolver;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisparityTopics {
    pub depth: String,
    pub camera_info: String,
    pub output: String,
}

impl Default for DisparityTopics {
    fn default() -> Self {
        Self {
            depth: "left/image_rect".into(),
            camera_info: "right/camera_info".into(),
            output: "left/disparity".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisparityConfig {
    /// Pending timestamps held by the exact-time synchronizer.
    pub queue_size: usize,
    pub min_range: f64,
    pub max_range: f64,
    pub delta_d: f64,
    pub image_transport: String,
    pub topics: DisparityTopics,
}

impl Default for DisparityConfig {
    fn default() -> Self {
        Self {
            queue_size: 5,
            min_range: 0.0,
            max_range: f64::INFINITY,
            delta_d: 0.125,
            image_transport: "raw".into(),
            topics: DisparityTopics::default(),
        }
    }
}

impl DisparityConfig {
    pub fn params(&self) -> DisparityParams {
        DisparityParams {
            min_range: self.min_range,
            max_range: self.max_range,
            delta_d: self.delta_d,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.queue_size == 0 {
            return Err(Error::Config("disparity.queue_size must be at least 1".into()));
        }
        if !(self.min_range >= 0.0) {
            return Err(Error::Config("disparity.min_range must be >= 0".into()));
        }
        if !(self.max_range > self.min_range) {
            return Err(Error::Config(
                "disparity.max_range must exceed min_range".into(),
            ));
        }
        if !(self.delta_d > 0.0) {
            return Err(Error::Config("disparity.delta_d must be positive".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PointCloudTopics {
    pub depth: String,
    /// Calibration is taken from this topic's `camera_info` sibling.
    pub intensity: String,
    pub output: String,
}

impl Default for PointCloudTopics {
    fn default() -> Self {
        Self {
            depth: "depth/image_rect".into(),
            intensity: "intensity/image_rect".into(),
            output: "points".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PointCloudConfig {
    /// Per-channel queue depth of the approximate-time synchronizer.
    pub queue_size: usize,
    /// Depth (meters) written for samples that fail validation.
    pub invalid_depth: f64,
    pub sync_window_ms: u64,
    pub image_transport: String,
    pub depth_image_transport: String,
    pub topics: PointCloudTopics,
}

impl Default for PointCloudConfig {
    fn default() -> Self {
        Self {
            queue_size: 5,
            invalid_depth: 0.0,
            sync_window_ms: 100,
            image_transport: "raw".into(),
            depth_image_transport: "raw".into(),
            topics: PointCloudTopics::default(),
        }
    }
}

impl PointCloudConfig {
    pub fn sync_window(&self) -> time::Duration {
        time::Duration::milliseconds(self.sync_window_ms.min(i64::MAX as u64) as i64)
    }

    pub fn validate(&self) -> Result<()> {
        if self.queue_size == 0 {
            return Err(Error::Config("point_cloud.queue_size must be at least 1".into()));
        }
        if self.sync_window_ms == 0 {
            return Err(Error::Config("point_cloud.sync_window_ms must be positive".into()));
        }
        if !self.invalid_depth.is_finite() {
            return Err(Error::Config("point_cloud.invalid_depth must be finite".into()));
        }
        Ok(())
    }
}

/// Everything a process hosting the nodes needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub namespace: String,
    /// `from: to` topic remap rules.
    pub remaps: BTreeMap<String, String>,
    pub disparity: DisparityConfig,
    pub point_cloud: PointCloudConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            namespace: "/".into(),
            remaps: BTreeMap::new(),
            disparity: DisparityConfig::default(),
            point_cloud: PointCloudConfig::default(),
        }
    }
}

impl NodeConfig {
    pub fn resolver(&self) -> Result<TopicResolver> {
        let mut resolver = TopicResolver::new(&self.namespace)?;
        for (from, to) in &self.remaps {
            resolver = resolver.with_remap(from, to)?;
        }
        Ok(resolver)
    }

    pub fn validate(&self) -> Result<()> {
        self.disparity.validate()?;
        self.point_cloud.validate()?;
        self.resolver().map(|_| ())
    }

    /// YAML rendering; unbounded ranges come out as `.inf` and load back unchanged.
    pub fn to_yaml(&self) -> anyhow::Result<String> {
        serde_yaml::to_string(self).context("serializing config")
    }
}

pub fn load_config_file(path: impl AsRef<Path>) -> anyhow::Result<NodeConfig> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path)
        .with_context(|| format!("reading config: {}", path.display()))?;
    let cfg: NodeConfig =
        serde_yaml::from_str(&raw).with_context(|| format!("parsing yaml: {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validating config: {}", path.display()))?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = NodeConfig::default();
        assert_eq!(cfg.disparity.queue_size, 5);
        assert_eq!(cfg.disparity.min_range, 0.0);
        assert!(cfg.disparity.max_range.is_infinite());
        assert_eq!(cfg.disparity.delta_d, 0.125);
        assert_eq!(cfg.point_cloud.invalid_depth, 0.0);
        assert_eq!(cfg.point_cloud.queue_size, 5);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn partial_yaml_keeps_defaults() {
        let yaml = "namespace: camera\nremaps:\n  depth/image_rect: /sensor/depth\ndisparity:\n  max_range: 10.0\npoint_cloud:\n  invalid_depth: 8.0\n";
        let cfg: NodeConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.disparity.max_range, 10.0);
        assert_eq!(cfg.disparity.delta_d, 0.125);
        assert_eq!(cfg.point_cloud.invalid_depth, 8.0);
        assert_eq!(cfg.point_cloud.topics.output, "points");
        let resolver = cfg.resolver().unwrap();
        assert_eq!(resolver.resolve("depth/image_rect").unwrap(), "/sensor/depth");
    }

    #[test]
    fn infinite_range_from_yaml() {
        let cfg: NodeConfig = serde_yaml::from_str("disparity:\n  max_range: .inf\n").unwrap();
        assert!(cfg.disparity.max_range.is_infinite());
    }

    #[test]
    fn yaml_output_keeps_infinite_range() {
        let cfg = NodeConfig::default();
        let yaml = cfg.to_yaml().unwrap();
        assert!(yaml.contains(".inf"));
        assert!(!yaml.contains("null"));
        let back: NodeConfig = serde_yaml::from_str(&yaml).unwrap();
        assert!(back.disparity.max_range.is_infinite());
        assert_eq!(back, cfg);
    }

    #[test]
    fn rejects_bad_values() {
        let mut cfg = NodeConfig::default();
        cfg.disparity.min_range = 5.0;
        cfg.disparity.max_range = 1.0;
        assert!(matches!(cfg.validate(), Err(Error::Config(_))));

        let mut cfg = NodeConfig::default();
        cfg.point_cloud.queue_size = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = NodeConfig::default();
        cfg.namespace = "bad//ns".into();
        assert!(cfg.validate().is_err());
    }
}
