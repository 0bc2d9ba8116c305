use prometheus_client::{
    encoding::{text::encode, EncodeLabelSet},
    metrics::{counter::Counter, family::Family, gauge::Gauge},
    registry::Registry,
};

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum RoundOutcomeLabel {
    Committed,
    Discarded,
    NoTargets,
}

impl RoundOutcomeLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoundOutcomeLabel::Committed => "committed",
            RoundOutcomeLabel::Discarded => "discarded",
            RoundOutcomeLabel::NoTargets => "no_targets",
        }
    }
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct RoundLabels {
    pub outcome: String,
}

/// Counters and gauges describing the poller itself.
pub struct PollerMetrics {
    registry: Registry,
    pub rounds: Family<RoundLabels, Counter>,
    pub fetch_failures: Counter,
    pub nodes: Gauge,
    pub rows: Gauge,
}

impl PollerMetrics {
    pub fn new() -> Self {
        let mut registry = Registry::with_prefix("zk_metrics_poller");
        let rounds = Family::<RoundLabels, Counter>::default();
        let fetch_failures = Counter::default();
        let nodes = Gauge::default();
        let rows = Gauge::default();

        registry.register("rounds", "Polling rounds by outcome", rounds.clone());
        registry.register(
            "fetch_failures",
            "Node fetches that failed or returned an unusable document",
            fetch_failures.clone(),
        );
        registry.register("nodes", "Nodes in the current ensemble", nodes.clone());
        registry.register("rows", "Rows in the last committed stats table", rows.clone());

        Self {
            registry,
            rounds,
            fetch_failures,
            nodes,
            rows,
        }
    }

    pub fn round(&self, outcome: RoundOutcomeLabel) {
        let _ = self
            .rounds
            .get_or_create(&RoundLabels {
                outcome: outcome.as_str().to_owned(),
            })
            .inc();
    }

    /// OpenMetrics text of every registered metric.
    pub fn encode(&self) -> String {
        let mut body = String::new();
        if let Err(err) = encode(&mut body, &self.registry) {
            tracing::warn!("encode poller metrics failed: {:?}", err);
        }
        body
    }
}

impl Default for PollerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_contains_registered_metrics() {
        let metrics = PollerMetrics::new();
        metrics.round(RoundOutcomeLabel::Committed);
        metrics.round(RoundOutcomeLabel::Committed);
        let _ = metrics.fetch_failures.inc();
        let _ = metrics.nodes.set(3);

        let body = metrics.encode();
        assert!(body.contains("zk_metrics_poller_rounds_total{outcome=\"committed\"} 2"));
        assert!(body.contains("zk_metrics_poller_fetch_failures_total 1"));
        assert!(body.contains("zk_metrics_poller_nodes 3"));
        assert!(body.ends_with("# EOF\n"));
    }
}
