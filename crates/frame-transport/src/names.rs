use crate::{Result, TransportError};
use std::collections::HashMap;
use tracing::debug;

/// Expands relative names into the node namespace and applies remap rules.
#[derive(Clone, Debug, Default)]
pub struct TopicResolver {
    namespace: String,
    remaps: HashMap<String, String>,
}

impl TopicResolver {
    pub fn new(namespace: &str) -> Result<Self> {
        Ok(Self {
            namespace: normalize_namespace(namespace)?,
            remaps: HashMap::new(),
        })
    }

    /// Add a `from:=to` rule. Both sides are expanded against the namespace.
    pub fn with_remap(mut self, from: &str, to: &str) -> Result<Self> {
        let from = self.expand(from)?;
        let to = self.expand(to)?;
        debug!("remap {from} -> {to}");
        self.remaps.insert(from, to);
        Ok(self)
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Fully expanded, remapped topic name.
    pub fn resolve(&self, name: &str) -> Result<String> {
        let expanded = self.expand(name)?;
        Ok(self.remaps.get(&expanded).cloned().unwrap_or(expanded))
    }

    fn expand(&self, name: &str) -> Result<String> {
        let name = name.trim();
        if name.is_empty() || name.ends_with('/') || name.contains("//") {
            return Err(TransportError::InvalidName(name.to_string()));
        }
        if !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '/' || c == '~')
        {
            return Err(TransportError::InvalidName(name.to_string()));
        }
        if name.starts_with('/') {
            return Ok(name.to_string());
        }
        if self.namespace == "/" {
            Ok(format!("/{name}"))
        } else {
            Ok(format!("{}/{name}", self.namespace))
        }
    }
}

fn normalize_namespace(ns: &str) -> Result<String> {
    let trimmed = ns.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Ok("/".to_string());
    }
    if trimmed.contains("//") {
        return Err(TransportError::InvalidName(ns.to_string()));
    }
    if trimmed.starts_with('/') {
        Ok(trimmed.to_string())
    } else {
        Ok(format!("/{trimmed}"))
    }
}

/// Calibration topic living next to an image topic:
/// `/cam/intensity/image_rect` -> `/cam/intensity/camera_info`.
pub fn camera_info_topic(image_topic: &str) -> String {
    match image_topic.rfind('/') {
        Some(idx) => format!("{}/camera_info", &image_topic[..idx]),
        None => "camera_info".to_string(),
    }
}
