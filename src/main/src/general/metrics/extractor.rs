use serde::Serialize;
use std::collections::HashSet;

use super::{
    collector::{self, CollectedKey},
    schema::{MetricDefinition, MetricKind},
    types::{ExtractedRow, RoundReports, Stat},
};

/// Result of running a schema over one round of reports.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Extraction {
    pub rows: Vec<ExtractedRow>,
    /// Observed keys no collector asked for, in first-seen order.
    pub unclassified_keys: Vec<String>,
}

/// Union of all keys across the round, node order first, then report order.
pub fn observed_keys(reports: &RoundReports) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut keys = Vec::new();
    for report in reports.iter().flatten() {
        for key in report.keys() {
            if seen.insert(key.as_str()) {
                keys.push(key.clone());
            }
        }
    }
    keys
}

pub fn extract(metrics: &[MetricDefinition], reports: &RoundReports) -> Extraction {
    let observed = observed_keys(reports);
    let mut consumed: HashSet<String> = HashSet::new();
    let mut rows = Vec::new();

    for metric in metrics.iter().filter(|m| m.in_stats) {
        let mut sink = |c: CollectedKey| {
            let _ = consumed.insert(c.key.clone());
            if c.present_count == 0 {
                return;
            }
            rows.push(ExtractedRow {
                metric_name: metric.name.clone(),
                key: c.key,
                qualifiers: c.qualifiers,
                values: c.values,
                present_count: c.present_count,
            });
        };

        match metric.kind {
            MetricKind::Counter | MetricKind::Gauge => {
                collector::collect_scalar(&metric.name, reports, &mut sink)
            }
            MetricKind::SummaryBasic => {
                collector::collect_summary(&metric.name, &Stat::BASIC, reports, &mut sink)
            }
            MetricKind::Summary => {
                collector::collect_summary(&metric.name, &Stat::FULL, reports, &mut sink)
            }
            MetricKind::SummarySetBasic | MetricKind::SummarySet => {
                let stats: &[Stat] = if metric.kind == MetricKind::SummarySet {
                    &Stat::FULL
                } else {
                    &Stat::BASIC
                };
                let entries =
                    collector::discover_entries(&metric.name, observed.iter().map(String::as_str));
                collector::collect_summary_set(&metric.name, &entries, stats, reports, &mut sink)
            }
            MetricKind::Unknown => {}
        }
    }

    let unclassified_keys = observed
        .into_iter()
        .filter(|k| !consumed.contains(k))
        .collect();

    Extraction {
        rows,
        unclassified_keys,
    }
}
