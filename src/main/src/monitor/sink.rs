use std::{collections::BTreeMap, sync::Arc};

use parking_lot::RwLock;
use serde::Serialize;

use crate::general::{
    ensemble::{NodeSet, NodeTarget},
    metrics::{ChartPoint, ExtractedRow, Extraction, MetricSchema, SchemaVersion},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PollState {
    #[default]
    Idle,
    Fetching,
}

/// Receives whatever a committed round produces.
///
/// Calls arrive in commit order from one round at a time.
pub trait RoundSink: Send + Sync + 'static {
    fn ensemble_changed(&self, _node_set: &NodeSet) {}

    fn schema_resolved(&self, _schema: &MetricSchema) {}

    fn stats_table(&self, node_set: &NodeSet, extraction: &Extraction);

    fn chart_update(&self, _node_set: &NodeSet, _target: &NodeTarget, _point: &ChartPoint) {}

    fn chart_disabled(&self, _metric_name: &str) {}

    fn status(&self, _state: PollState) {}
}

pub struct LogSink;

impl RoundSink for LogSink {
    fn ensemble_changed(&self, node_set: &NodeSet) {
        tracing::info!("polling {} nodes: {:?}", node_set.len(), node_set.hosts());
    }

    fn schema_resolved(&self, schema: &MetricSchema) {
        tracing::info!(
            "using metric schema {} with {} metrics",
            schema.version,
            schema.metrics.len()
        );
    }

    fn stats_table(&self, node_set: &NodeSet, extraction: &Extraction) {
        tracing::debug!(
            generation = node_set.generation(),
            rows = extraction.rows.len(),
            unclassified = extraction.unclassified_keys.len(),
            "stats table committed"
        );
        if !extraction.unclassified_keys.is_empty() {
            tracing::trace!("unclassified keys: {:?}", extraction.unclassified_keys);
        }
    }

    fn chart_disabled(&self, metric_name: &str) {
        tracing::debug!("chart {} disabled", metric_name);
    }
}

/// Everything the last committed round produced, ready to serve.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LatestRound {
    pub generation: u64,
    pub hosts: Vec<String>,
    pub state: PollState,
    pub schema_version: Option<SchemaVersion>,
    pub rows: Vec<ExtractedRow>,
    pub unclassified_keys: Vec<String>,
    /// Last chart vector per metric, one slot per node.
    pub charts: BTreeMap<String, Vec<Option<Vec<Option<f64>>>>>,
}

/// Keeps only the latest round; older rounds are overwritten. Results of a
/// node set older than the one held are ignored.
#[derive(Default)]
pub struct LatestRoundStore {
    inner: RwLock<LatestRound>,
}

impl LatestRoundStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn latest(&self) -> LatestRound {
        self.inner.read().clone()
    }

    pub fn state(&self) -> PollState {
        self.inner.read().state
    }
}

impl RoundSink for LatestRoundStore {
    fn ensemble_changed(&self, node_set: &NodeSet) {
        let mut inner = self.inner.write();
        let state = inner.state;
        let schema_version = inner.schema_version.take();
        *inner = LatestRound {
            generation: node_set.generation(),
            hosts: node_set.hosts(),
            state,
            schema_version,
            ..Default::default()
        };
    }

    fn schema_resolved(&self, schema: &MetricSchema) {
        self.inner.write().schema_version = Some(schema.version.clone());
    }

    fn stats_table(&self, node_set: &NodeSet, extraction: &Extraction) {
        let mut inner = self.inner.write();
        if node_set.generation() < inner.generation {
            tracing::debug!(
                "ignoring stats of generation {}, holding {}",
                node_set.generation(),
                inner.generation
            );
            return;
        }
        if node_set.generation() > inner.generation {
            inner.charts.clear();
        }
        inner.generation = node_set.generation();
        inner.hosts = node_set.hosts();
        inner.rows = extraction.rows.clone();
        inner.unclassified_keys = extraction.unclassified_keys.clone();
    }

    fn chart_update(&self, node_set: &NodeSet, target: &NodeTarget, point: &ChartPoint) {
        let mut inner = self.inner.write();
        let nodes = inner.hosts.len();
        if node_set.generation() != inner.generation || target.index >= nodes {
            return;
        }
        let slots = inner
            .charts
            .entry(point.metric_name.clone())
            .or_insert_with(|| vec![None; nodes]);
        slots[target.index] = Some(point.values.clone());
    }

    fn chart_disabled(&self, metric_name: &str) {
        let _ = self.inner.write().charts.remove(metric_name);
    }

    fn status(&self, state: PollState) {
        self.inner.write().state = state;
    }
}

/// Forwards every call to each inner sink in order.
pub struct FanoutSink {
    sinks: Vec<Arc<dyn RoundSink>>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<Arc<dyn RoundSink>>) -> Self {
        Self { sinks }
    }
}

impl RoundSink for FanoutSink {
    fn ensemble_changed(&self, node_set: &NodeSet) {
        self.sinks.iter().for_each(|s| s.ensemble_changed(node_set));
    }

    fn schema_resolved(&self, schema: &MetricSchema) {
        self.sinks.iter().for_each(|s| s.schema_resolved(schema));
    }

    fn stats_table(&self, node_set: &NodeSet, extraction: &Extraction) {
        self.sinks
            .iter()
            .for_each(|s| s.stats_table(node_set, extraction));
    }

    fn chart_update(&self, node_set: &NodeSet, target: &NodeTarget, point: &ChartPoint) {
        self.sinks
            .iter()
            .for_each(|s| s.chart_update(node_set, target, point));
    }

    fn chart_disabled(&self, metric_name: &str) {
        self.sinks.iter().for_each(|s| s.chart_disabled(metric_name));
    }

    fn status(&self, state: PollState) {
        self.sinks.iter().for_each(|s| s.status(state));
    }
}
