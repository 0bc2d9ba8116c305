use serde::{Deserialize, Serialize};
use std::{collections::HashSet, fmt, path::Path};

use super::types::RoundReports;
use crate::result::{ZmConfigErr, ZmIoErr, ZmResult, ZmSerialErr};

const BUILTIN_DEFS: &str = include_str!("defs.yaml");

/// Fixed vocabulary of metric kinds, serialized with their display labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MetricKind {
    Counter,
    Gauge,
    #[serde(rename = "Summary (Basic)")]
    SummaryBasic,
    Summary,
    #[serde(rename = "Summary Set (Basic)")]
    SummarySetBasic,
    #[serde(rename = "Summary Set")]
    SummarySet,
    /// Any label this build does not know; such metrics are inert.
    #[serde(other)]
    Unknown,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricDefinition {
    pub name: String,
    pub kind: MetricKind,
    #[serde(default = "default_true", alias = "inStats")]
    pub in_stats: bool,
    #[serde(default = "default_true", alias = "inCharts")]
    pub in_charts: bool,
}

impl MetricDefinition {
    pub fn new(name: &str, kind: MetricKind) -> Self {
        Self {
            name: name.to_owned(),
            kind,
            in_stats: true,
            in_charts: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SchemaVersion(pub String);

impl SchemaVersion {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SchemaVersion {
    fn from(s: &str) -> Self {
        SchemaVersion(s.to_owned())
    }
}

/// Metric list of one server version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSchema {
    pub version: SchemaVersion,
    /// Key that only servers of this version report.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discriminator: Option<String>,
    #[serde(default)]
    pub metrics: Vec<MetricDefinition>,
}

impl MetricSchema {
    pub fn metric(&self, name: &str) -> Option<&MetricDefinition> {
        self.metrics.iter().find(|m| m.name == name)
    }

    pub fn metric_mut(&mut self, name: &str) -> Option<&mut MetricDefinition> {
        self.metrics.iter_mut().find(|m| m.name == name)
    }

    fn matches(&self, reports: &RoundReports) -> bool {
        let Some(key) = self.discriminator.as_deref() else {
            return false;
        };
        reports.iter().flatten().any(|r| r.contains(key))
    }

    fn dedup_metrics(&mut self) {
        let mut seen = HashSet::new();
        let version = &self.version;
        self.metrics.retain(|m| {
            let first = seen.insert(m.name.clone());
            if !first {
                tracing::debug!("schema {} lists metric {} twice, keeping the first", version, m.name);
            }
            first
        });
    }
}

/// All known schema versions, oldest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaCatalog {
    pub versions: Vec<MetricSchema>,
}

impl SchemaCatalog {
    pub fn builtin() -> ZmResult<Self> {
        Self::from_yaml_str(BUILTIN_DEFS, "builtin defs.yaml")
    }

    pub fn load(path: impl AsRef<Path>) -> ZmResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|err| ZmIoErr::OpenFile {
            path: path.to_path_buf(),
            err,
        })?;
        Self::from_yaml_str(&text, &path.display().to_string())
    }

    pub fn from_yaml_str(text: &str, context: &str) -> ZmResult<Self> {
        let mut catalog: SchemaCatalog =
            serde_yaml::from_str(text).map_err(|err| ZmSerialErr::YamlDecode {
                err,
                context: context.to_owned(),
            })?;
        catalog.validate()?;
        Ok(catalog)
    }

    fn validate(&mut self) -> ZmResult<()> {
        if self.versions.is_empty() {
            return Err(ZmConfigErr::EmptySchemaCatalog.into());
        }
        let mut labels = HashSet::new();
        for schema in &mut self.versions {
            if !labels.insert(schema.version.clone()) {
                return Err(ZmConfigErr::DuplicateSchemaVersion(schema.version.0.clone()).into());
            }
            schema.dedup_metrics();
        }
        Ok(())
    }

    pub fn get(&self, version: &str) -> Option<&MetricSchema> {
        self.versions.iter().find(|s| s.version.as_str() == version)
    }

    /// Newest version whose discriminating key shows up in any report,
    /// else the oldest version.
    pub fn detect(&self, reports: &RoundReports) -> Option<&MetricSchema> {
        self.versions
            .iter()
            .rev()
            .find(|s| s.matches(reports))
            .or_else(|| self.versions.first())
    }
}
