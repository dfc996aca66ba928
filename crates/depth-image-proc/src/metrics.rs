use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};

/// Counters shared by every node registered against one hub.
#[derive(Clone)]
pub struct NodeMetrics {
    pub tuples_synced: IntCounter,
    pub frames_dropped: IntCounter,
    pub conversion_errors: IntCounter,
    pub disparity_published: IntCounter,
    pub clouds_published: IntCounter,
    pub active_nodes: IntGauge,
}

#[derive(Clone)]
pub struct MetricsHub {
    pub registry: Registry,
    pub node: NodeMetrics,
}

fn counter(name: &str, help: &str) -> Result<IntCounter, String> {
    IntCounter::new(name, help).map_err(|e| format!("metrics init error: {e}"))
}

impl MetricsHub {
    pub fn new() -> Result<Self, String> {
        let registry = Registry::new();
        let node = NodeMetrics {
            tuples_synced: counter(
                "dip_tuples_synced",
                "Matched input tuples handed to a converter",
            )?,
            frames_dropped: counter(
                "dip_frames_dropped",
                "Input frames discarded by a synchronizer",
            )?,
            conversion_errors: counter("dip_conversion_errors", "Tuples that failed conversion")?,
            disparity_published: counter("dip_disparity_published", "Disparity images published")?,
            clouds_published: counter("dip_clouds_published", "XYZI point clouds published")?,
            active_nodes: IntGauge::new(
                "dip_active_nodes",
                "Nodes with live upstream subscriptions",
            )
            .map_err(|e| format!("metrics init error: {e}"))?,
        };
        let _ = registry.register(Box::new(node.tuples_synced.clone()));
        let _ = registry.register(Box::new(node.frames_dropped.clone()));
        let _ = registry.register(Box::new(node.conversion_errors.clone()));
        let _ = registry.register(Box::new(node.disparity_published.clone()));
        let _ = registry.register(Box::new(node.clouds_published.clone()));
        let _ = registry.register(Box::new(node.active_nodes.clone()));
        Ok(Self { registry, node })
    }

    pub fn encode_text(&self) -> String {
        let mut buf = Vec::new();
        let encoder = TextEncoder::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buf) {
            return format!("error encoding metrics: {e}");
        }
        String::from_utf8(buf).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_registered_counters() {
        let hub = MetricsHub::new().unwrap();
        hub.node.tuples_synced.inc();
        hub.node.active_nodes.set(2);
        let text = hub.encode_text();
        assert!(text.contains("dip_tuples_synced 1"));
        assert!(text.contains("dip_active_nodes 2"));
        assert!(text.contains("dip_clouds_published 0"));
    }
}
