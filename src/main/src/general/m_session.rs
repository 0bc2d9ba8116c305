use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use async_trait::async_trait;
use parking_lot::RwLock;
use zm_derive::LogicalModule;

use crate::{
    general::{
        ensemble::NodeSet,
        metrics::{MetricDefinition, MetricSchema, RoundReports, SchemaCatalog},
    },
    result::{ZmConfigErr, ZmResult},
    sys::{LogicalModule, LogicalModuleNewArgs},
    util::JoinHandleWrapper,
};

/// Schema in effect after a resolution attempt.
#[derive(Debug, Clone)]
pub struct ResolvedSchema {
    pub schema: MetricSchema,
    /// Resolved by this call rather than by an earlier round.
    pub fresh: bool,
}

/// State one monitoring session owns: the catalog, the schema once it is
/// resolved, and the current node set.
pub struct PollSession {
    catalog: Arc<SchemaCatalog>,
    active: RwLock<Option<MetricSchema>>,
    node_set: RwLock<Arc<NodeSet>>,
    generation: AtomicU64,
}

impl PollSession {
    pub fn new(catalog: Arc<SchemaCatalog>) -> Self {
        Self {
            catalog,
            active: RwLock::new(None),
            node_set: RwLock::new(Arc::new(NodeSet::empty())),
            generation: AtomicU64::new(0),
        }
    }

    pub fn catalog(&self) -> &SchemaCatalog {
        &self.catalog
    }

    pub fn node_set(&self) -> Arc<NodeSet> {
        self.node_set.read().clone()
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// True while no ensemble change happened since `generation` was taken.
    pub fn is_current(&self, generation: u64) -> bool {
        self.generation() == generation
    }

    /// Replaces the node set when `ensemble_text` differs from the last one.
    ///
    /// Returns the new set, or `None` when the text was unchanged.
    pub fn update_ensemble(&self, ensemble_text: &str) -> Option<Arc<NodeSet>> {
        self.update_ensemble_with(ensemble_text, |_| {})
    }

    /// Like `update_ensemble`, and runs `on_change` with the new set before
    /// any round can commit against it.
    pub fn update_ensemble_with(
        &self,
        ensemble_text: &str,
        on_change: impl FnOnce(&Arc<NodeSet>),
    ) -> Option<Arc<NodeSet>> {
        let mut node_set = self.node_set.write();
        if node_set.ensemble_text() == ensemble_text {
            return None;
        }
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let next = Arc::new(NodeSet::parse(ensemble_text, generation));
        tracing::info!(
            generation,
            hosts = ?next.hosts(),
            "ensemble changed"
        );
        *node_set = next.clone();
        on_change(&next);
        Some(next)
    }

    /// Runs `commit` only if the node set of `generation` is still current.
    ///
    /// No ensemble change can land while `commit` runs. `commit` must not
    /// read or replace the node set itself.
    pub fn commit_if_current<R>(&self, generation: u64, commit: impl FnOnce() -> R) -> Option<R> {
        let _node_set = self.node_set.read();
        if !self.is_current(generation) {
            return None;
        }
        Some(commit())
    }

    pub fn active_schema(&self) -> Option<MetricSchema> {
        self.active.read().clone()
    }

    /// Picks the schema on the first round that has any report; later calls
    /// return the same schema.
    pub fn resolve_schema(&self, reports: &RoundReports) -> Option<ResolvedSchema> {
        if let Some(schema) = self.active.read().as_ref() {
            return Some(ResolvedSchema {
                schema: schema.clone(),
                fresh: false,
            });
        }
        if reports.iter().all(Option::is_none) {
            return None;
        }

        let mut active = self.active.write();
        if let Some(schema) = active.as_ref() {
            return Some(ResolvedSchema {
                schema: schema.clone(),
                fresh: false,
            });
        }
        let schema = self.catalog.detect(reports)?;
        if schema.metrics.is_empty() {
            tracing::warn!("schema {} lists no metrics, staying unresolved", schema.version);
            return None;
        }
        tracing::info!("resolved metric schema {}", schema.version);
        *active = Some(schema.clone());
        Some(ResolvedSchema {
            schema: schema.clone(),
            fresh: true,
        })
    }

    /// Updates the display flags of `metric_name` in the resolved schema.
    pub fn set_display_flags(
        &self,
        metric_name: &str,
        in_stats: Option<bool>,
        in_charts: Option<bool>,
    ) -> ZmResult<MetricDefinition> {
        let mut active = self.active.write();
        let def = active
            .as_mut()
            .and_then(|s| s.metric_mut(metric_name))
            .ok_or_else(|| ZmConfigErr::MetricNotFound(metric_name.to_owned()))?;
        if let Some(in_stats) = in_stats {
            def.in_stats = in_stats;
        }
        if let Some(in_charts) = in_charts {
            def.in_charts = in_charts;
        }
        Ok(def.clone())
    }
}

#[derive(LogicalModule)]
pub struct SessionManager {
    session: Arc<PollSession>,
}

impl SessionManager {
    pub fn session(&self) -> &Arc<PollSession> {
        &self.session
    }
}

#[async_trait]
impl LogicalModule for SessionManager {
    fn inner_new(args: LogicalModuleNewArgs) -> Self
    where
        Self: Sized,
    {
        let session = Arc::new(PollSession::new(args.catalog));
        let _ = session.update_ensemble(&args.config.ensemble);
        Self { session }
    }

    async fn start(&self) -> ZmResult<Vec<JoinHandleWrapper>> {
        tracing::info!(
            "session manager started with {} schema versions",
            self.session.catalog().versions.len()
        );
        Ok(vec![])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::general::metrics::Report;
    use serde_json::json;

    fn session() -> PollSession {
        PollSession::new(Arc::new(SchemaCatalog::builtin().unwrap()))
    }

    fn report(v: serde_json::Value) -> Option<Arc<Report>> {
        Some(Arc::new(Report::from_value(v).unwrap()))
    }

    #[test]
    fn test_update_ensemble_only_on_change() {
        let s = session();
        assert!(s.node_set().is_empty());
        assert!(s.update_ensemble("").is_none());

        let first = s.update_ensemble("a:2181,b:2181").unwrap();
        assert_eq!(first.generation(), 1);
        assert!(s.update_ensemble("a:2181,b:2181").is_none());
        assert!(s.is_current(1));

        let second = s.update_ensemble("c").unwrap();
        assert_eq!(second.hosts(), vec!["c"]);
        assert!(!s.is_current(first.generation()));
        assert!(s.is_current(second.generation()));
    }

    #[test]
    fn test_commit_if_current() {
        let s = session();
        let first = s.update_ensemble("a").unwrap();
        assert_eq!(s.commit_if_current(first.generation(), || 7), Some(7));

        let _ = s.update_ensemble("b").unwrap();
        let mut ran = false;
        assert!(s.commit_if_current(first.generation(), || ran = true).is_none());
        assert!(!ran);
    }

    #[test]
    fn test_ensemble_change_waits_for_running_commit() {
        let s = Arc::new(session());
        let first = s.update_ensemble("a").unwrap();
        let (entered_tx, entered_rx) = std::sync::mpsc::channel();

        let committed = s.commit_if_current(first.generation(), || {
            let s2 = s.clone();
            let changer = std::thread::spawn(move || {
                entered_tx.send(()).unwrap();
                s2.update_ensemble("b").unwrap().generation()
            });
            entered_rx.recv().unwrap();
            std::thread::sleep(std::time::Duration::from_millis(50));
            // the change is still blocked behind this commit
            let current = s.generation();
            (changer, current)
        });
        let (changer, seen) = committed.unwrap();
        assert_eq!(seen, first.generation());
        assert_eq!(changer.join().unwrap(), first.generation() + 1);
    }

    #[test]
    fn test_resolve_schema_once() {
        let s = session();
        assert!(s.resolve_schema(&[None, None]).is_none());

        let first = s.resolve_schema(&[None, report(json!({"snap_count": 3}))]).unwrap();
        assert!(first.fresh);
        assert_eq!(first.schema.version.as_str(), "3.6");

        // a later round that looks like 3.5 keeps the resolved version
        let again = s.resolve_schema(&[report(json!({"packets_sent": 1}))]).unwrap();
        assert!(!again.fresh);
        assert_eq!(again.schema.version.as_str(), "3.6");
    }

    #[test]
    fn test_resolve_falls_back_to_oldest() {
        let s = session();
        let resolved = s.resolve_schema(&[report(json!({"packets_sent": 1}))]).unwrap();
        assert_eq!(resolved.schema.version.as_str(), "3.5");
    }

    #[test]
    fn test_empty_schema_stays_unresolved() {
        let catalog = SchemaCatalog::from_yaml_str("versions:\n  - version: \"x\"\n", "test").unwrap();
        let s = PollSession::new(Arc::new(catalog));
        assert!(s.resolve_schema(&[report(json!({"a": 1}))]).is_none());
        assert!(s.active_schema().is_none());
    }

    #[test]
    fn test_set_display_flags() {
        let s = session();
        assert!(s.set_display_flags("latency", Some(false), None).is_err());

        let _ = s.resolve_schema(&[report(json!({"latency": 1}))]).unwrap();
        let def = s.set_display_flags("znode_count", None, Some(false)).unwrap();
        assert!(def.in_stats);
        assert!(!def.in_charts);
        let active = s.active_schema().unwrap();
        assert!(!active.metric("znode_count").unwrap().in_charts);
        assert!(s.set_display_flags("no_such_metric", Some(true), None).is_err());
    }
}
