use serde::Serialize;

use super::{
    collector::summary_key,
    schema::{MetricDefinition, MetricKind},
    types::{Report, Stat},
};

/// One chart update for one node, a small fixed-size vector per kind.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartPoint {
    pub metric_name: String,
    pub values: Vec<Option<f64>>,
}

const GAUGE_LABELS: &[&str] = &["Value"];
const COUNTER_LABELS: &[&str] = &["Change"];
const SUMMARY_BASIC_LABELS: &[&str] = &["Average", "Max"];
const SUMMARY_LABELS: &[&str] = &["Median", "95% percentile"];

/// Series labels for the chart of `kind`, or `None` if the kind is not charted.
pub fn chart_labels(kind: MetricKind) -> Option<&'static [&'static str]> {
    match kind {
        MetricKind::Gauge => Some(GAUGE_LABELS),
        MetricKind::Counter => Some(COUNTER_LABELS),
        MetricKind::SummaryBasic => Some(SUMMARY_BASIC_LABELS),
        MetricKind::Summary => Some(SUMMARY_LABELS),
        MetricKind::SummarySetBasic | MetricKind::SummarySet | MetricKind::Unknown => None,
    }
}

/// Chart points for one node's fresh `report`.
///
/// Counters chart the change since `previous`; with no previous report,
/// or no previous value, the counter yields no point this round.
pub fn chart_points(
    metrics: &[MetricDefinition],
    previous: Option<&Report>,
    report: &Report,
) -> Vec<ChartPoint> {
    metrics
        .iter()
        .filter(|m| m.in_charts)
        .filter_map(|m| chart_point(m, previous, report))
        .collect()
}

fn chart_point(
    metric: &MetricDefinition,
    previous: Option<&Report>,
    report: &Report,
) -> Option<ChartPoint> {
    let name = metric.name.as_str();
    let values = match metric.kind {
        MetricKind::Gauge => vec![Some(report.number(name)?)],
        MetricKind::Counter => {
            let last = previous?.number(name)?;
            vec![Some(report.number(name)? - last)]
        }
        MetricKind::SummaryBasic => vec![
            report.number(&summary_key(Stat::Avg, name)),
            report.number(&summary_key(Stat::Max, name)),
        ],
        MetricKind::Summary => vec![
            report.number(&summary_key(Stat::P50, name)),
            report.number(&summary_key(Stat::P95, name)),
        ],
        MetricKind::SummarySetBasic | MetricKind::SummarySet | MetricKind::Unknown => {
            return None
        }
    };
    if values.iter().all(Option::is_none) {
        return None;
    }
    Some(ChartPoint {
        metric_name: metric.name.clone(),
        values,
    })
}
