use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::{fmt, sync::Arc};

use crate::result::{ZmResult, ZmSerialErr};

/// Flat key/value status snapshot of one node for one round.
///
/// Key order is the order the node sent them in, which keeps key-union
/// iteration deterministic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Report(Map<String, Value>);

impl Report {
    pub fn parse(text: &str) -> ZmResult<Report> {
        match serde_json::from_str::<Value>(text)? {
            Value::Object(map) => Ok(Report(map)),
            other => Err(ZmSerialErr::ReportNotObject {
                found: json_type_name(&other),
            }
            .into()),
        }
    }

    pub fn from_value(value: Value) -> Option<Report> {
        match value {
            Value::Object(map) => Some(Report(map)),
            _ => None,
        }
    }

    /// Present value for `key`; a JSON `null` counts as absent.
    pub fn value(&self, key: &str) -> Option<&Value> {
        self.0.get(key).filter(|v| !v.is_null())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.value(key).is_some()
    }

    pub fn number(&self, key: &str) -> Option<f64> {
        self.value(key).and_then(Value::as_f64)
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }
}

fn json_type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// One slot per node target, `None` when the node produced no report.
pub type RoundReports = [Option<Arc<Report>>];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stat {
    Avg,
    Min,
    Max,
    Cnt,
    Sum,
    P50,
    P95,
    P99,
    P999,
}

impl Stat {
    pub const BASIC: [Stat; 5] = [Stat::Avg, Stat::Min, Stat::Max, Stat::Cnt, Stat::Sum];
    pub const FULL: [Stat; 9] = [
        Stat::Avg,
        Stat::Min,
        Stat::Max,
        Stat::Cnt,
        Stat::Sum,
        Stat::P50,
        Stat::P95,
        Stat::P99,
        Stat::P999,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stat::Avg => "avg",
            Stat::Min => "min",
            Stat::Max => "max",
            Stat::Cnt => "cnt",
            Stat::Sum => "sum",
            Stat::P50 => "p50",
            Stat::P95 => "p95",
            Stat::P99 => "p99",
            Stat::P999 => "p999",
        }
    }
}

impl fmt::Display for Stat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Labels attached to a row so the table can group summary and set rows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Qualifiers {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stat: Option<Stat>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry: Option<String>,
}

impl Qualifiers {
    pub fn scalar() -> Self {
        Self::default()
    }

    pub fn stat(stat: Stat) -> Self {
        Self {
            stat: Some(stat),
            entry: None,
        }
    }

    pub fn entry_stat(entry: &str, stat: Stat) -> Self {
        Self {
            stat: Some(stat),
            entry: Some(entry.to_owned()),
        }
    }
}

/// One statistic across all nodes of a round.
///
/// `values[i]` belongs to node target `i`; `None` marks a node that had no
/// report or no value for `key`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractedRow {
    pub metric_name: String,
    pub key: String,
    #[serde(flatten)]
    pub qualifiers: Qualifiers,
    pub values: Vec<Option<Value>>,
    pub present_count: usize,
}
