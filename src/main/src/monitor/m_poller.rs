use std::sync::Arc;

use async_trait::async_trait;
use zm_derive::LogicalModule;

use crate::{
    general::m_session::SessionManager,
    logical_module_view_impl,
    result::ZmResult,
    sys::{LogicalModule, LogicalModuleNewArgs, LogicalModulesRef},
    util::JoinHandleWrapper,
};

use super::{
    orchestrator::Orchestrator,
    sink::{FanoutSink, LatestRoundStore, LogSink, RoundSink},
};

logical_module_view_impl!(PollerView);
logical_module_view_impl!(PollerView, session_manager, SessionManager);

#[derive(LogicalModule)]
pub struct Poller {
    view: PollerView,
    store: Arc<LatestRoundStore>,
    orchestrator: Arc<Orchestrator>,
}

impl Poller {
    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    pub fn store(&self) -> &Arc<LatestRoundStore> {
        &self.store
    }
}

#[async_trait]
impl LogicalModule for Poller {
    fn inner_new(args: LogicalModuleNewArgs) -> Self
    where
        Self: Sized,
    {
        let store = Arc::new(LatestRoundStore::new());
        let sinks: Vec<Arc<dyn RoundSink>> = vec![Arc::new(LogSink), store.clone()];
        let orchestrator = Arc::new(Orchestrator::new(
            args.fetcher,
            Arc::new(FanoutSink::new(sinks)),
            args.config.refresh_ms,
        ));
        Self {
            view: PollerView::new(args.logical_modules_ref),
            store,
            orchestrator,
        }
    }

    async fn init(&self) -> ZmResult<()> {
        // the session parsed the configured ensemble before sinks existed
        let session = self.view.session_manager().session();
        let node_set = session.node_set();
        let _ = self.orchestrator.metrics().nodes.set(node_set.len() as i64);
        self.store.ensemble_changed(&node_set);
        Ok(())
    }

    async fn start(&self) -> ZmResult<Vec<JoinHandleWrapper>> {
        let session = self.view.session_manager().session().clone();
        let orchestrator = self.orchestrator.clone();
        tracing::info!(
            "poller started, refresh every {}ms",
            orchestrator.refresh_delay_ms()
        );
        let handle = tokio::spawn(async move {
            orchestrator.run(&session).await;
        });
        Ok(vec![JoinHandleWrapper::new("poller", handle)])
    }
}
