use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use futures::future::join_all;
use tokio::sync::Notify;

use crate::{
    general::{
        ensemble::{NodeSet, NodeTarget},
        m_session::PollSession,
        metrics::{chart::chart_points, extract, Extraction, MetricDefinition, Report},
    },
    result::{ZmNetworkErr, ZmResult},
};

use super::{
    fetch::NodeFetcher,
    prom::{PollerMetrics, RoundOutcomeLabel},
    sink::{PollState, RoundSink},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundOutcome {
    /// The node set was empty, nothing was fetched.
    NoTargets,
    Committed { rows: usize },
    /// The ensemble changed while fetching, results were dropped.
    Discarded,
}

/// `text` as a refresh delay in milliseconds. Anything that is not a
/// non-negative integer disables periodic refresh.
pub fn parse_refresh_delay(text: &str) -> u64 {
    text.trim().parse::<u64>().unwrap_or(0)
}

/// Drives polling rounds over the session's current node set.
///
/// Rounds never overlap. A trigger that arrives while a round runs is kept
/// and starts the next round as soon as the current one commits.
pub struct Orchestrator {
    fetcher: Arc<dyn NodeFetcher>,
    sink: Arc<dyn RoundSink>,
    metrics: PollerMetrics,
    refresh_delay_ms: AtomicU64,
    trigger: Notify,
    round_lock: tokio::sync::Mutex<()>,
}

impl Orchestrator {
    pub fn new(fetcher: Arc<dyn NodeFetcher>, sink: Arc<dyn RoundSink>, refresh_delay_ms: u64) -> Self {
        Self {
            fetcher,
            sink,
            metrics: PollerMetrics::new(),
            refresh_delay_ms: AtomicU64::new(refresh_delay_ms),
            trigger: Notify::new(),
            round_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn metrics(&self) -> &PollerMetrics {
        &self.metrics
    }

    pub fn refresh_delay_ms(&self) -> u64 {
        self.refresh_delay_ms.load(Ordering::Relaxed)
    }

    /// Zero disables periodic refresh. Wakes the loop so the new delay
    /// applies at once.
    pub fn set_refresh_delay(&self, delay_ms: u64) {
        tracing::info!("refresh delay set to {}ms", delay_ms);
        self.refresh_delay_ms.store(delay_ms, Ordering::Relaxed);
        self.trigger();
    }

    /// Requests a round now, or right after the one in flight.
    pub fn trigger(&self) {
        self.trigger.notify_one();
    }

    /// Applies a new ensemble text. Returns whether the node set changed.
    pub fn update_ensemble(&self, session: &PollSession, ensemble_text: &str) -> bool {
        let changed = session
            .update_ensemble_with(ensemble_text, |node_set| {
                let _ = self.metrics.nodes.set(node_set.len() as i64);
                self.sink.ensemble_changed(node_set);
            })
            .is_some();
        if changed {
            self.trigger();
        }
        changed
    }

    pub fn set_display_flags(
        &self,
        session: &PollSession,
        metric_name: &str,
        in_stats: Option<bool>,
        in_charts: Option<bool>,
    ) -> ZmResult<MetricDefinition> {
        let def = session.set_display_flags(metric_name, in_stats, in_charts)?;
        if in_charts == Some(false) {
            self.sink.chart_disabled(metric_name);
        }
        Ok(def)
    }

    /// Raw document of the node at `index`, for the proxy endpoint.
    pub async fn fetch_raw(&self, session: &PollSession, index: usize) -> ZmResult<String> {
        let node_set = session.node_set();
        let target = node_set
            .target(index)
            .ok_or(ZmNetworkErr::NodeIndexOutOfRange {
                index,
                len: node_set.len(),
            })?;
        self.fetcher.fetch(target).await
    }

    fn set_state(&self, state: PollState) {
        self.sink.status(state);
    }

    async fn fetch_report(&self, target: &NodeTarget) -> Option<Arc<Report>> {
        let text = match self.fetcher.fetch(target).await {
            Ok(text) => text,
            Err(err) => {
                tracing::warn!("fetch metrics from {} failed: {:?}", target.host, err);
                let _ = self.metrics.fetch_failures.inc();
                return None;
            }
        };
        match Report::parse(&text) {
            Ok(report) => Some(Arc::new(report)),
            Err(err) => {
                tracing::warn!("metrics from {} unusable: {:?}", target.host, err);
                let _ = self.metrics.fetch_failures.inc();
                None
            }
        }
    }

    /// Runs one round to completion over the node set current at its start.
    pub async fn run_round(&self, session: &PollSession) -> RoundOutcome {
        let _round = self.round_lock.lock().await;

        let node_set = session.node_set();
        if node_set.is_empty() {
            self.set_state(PollState::Idle);
            self.metrics.round(RoundOutcomeLabel::NoTargets);
            return RoundOutcome::NoTargets;
        }

        self.set_state(PollState::Fetching);
        let reports = join_all(node_set.targets().iter().map(|t| self.fetch_report(t))).await;

        let committed = session.commit_if_current(node_set.generation(), || {
            self.commit(session, &node_set, reports)
        });
        let outcome = if let Some(rows) = committed {
            self.metrics.round(RoundOutcomeLabel::Committed);
            RoundOutcome::Committed { rows }
        } else {
            tracing::debug!(
                "round for generation {} superseded, dropping results",
                node_set.generation()
            );
            self.metrics.round(RoundOutcomeLabel::Discarded);
            RoundOutcome::Discarded
        };
        self.set_state(PollState::Idle);
        outcome
    }

    fn commit(
        &self,
        session: &PollSession,
        node_set: &NodeSet,
        reports: Vec<Option<Arc<Report>>>,
    ) -> usize {
        let resolved = session.resolve_schema(&reports);
        if let Some(resolved) = resolved.as_ref().filter(|r| r.fresh) {
            self.sink.schema_resolved(&resolved.schema);
        }

        let extraction = match resolved.as_ref() {
            Some(resolved) => extract(&resolved.schema.metrics, &reports),
            None => Extraction::default(),
        };
        self.sink.stats_table(node_set, &extraction);
        let _ = self.metrics.rows.set(extraction.rows.len() as i64);

        if let Some(resolved) = resolved.as_ref() {
            for (target, report) in node_set.targets().iter().zip(reports.iter()) {
                let Some(report) = report else {
                    continue;
                };
                let previous = target.last_report();
                for point in chart_points(&resolved.schema.metrics, previous.as_deref(), report) {
                    self.sink.chart_update(node_set, target, &point);
                }
            }
        }

        for (target, report) in node_set.targets().iter().zip(reports) {
            target.set_last_report(report);
        }
        extraction.rows.len()
    }

    /// Polls until the task is aborted.
    pub async fn run(&self, session: &PollSession) {
        loop {
            let outcome = self.run_round(session).await;
            let delay_ms = self.refresh_delay_ms();
            if delay_ms == 0 || outcome == RoundOutcome::NoTargets {
                self.trigger.notified().await;
                continue;
            }
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_millis(delay_ms)) => {}
                _ = self.trigger.notified() => {}
            }
        }
    }
}
