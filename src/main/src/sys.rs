use crate::{
    config::ZmConfig,
    general::{
        metrics::SchemaCatalog, m_session::SessionManager, network::m_http_handler::HttpHandler,
    },
    monitor::{
        fetch::{HttpFetcher, NodeFetcher},
        m_poller::Poller,
    },
    result::ZmResult,
    util::JoinHandleWrapper,
};
use async_trait::async_trait;
use std::sync::{Arc, Weak};
use tokio::sync::Mutex;

pub struct Sys {
    logical_modules: Arc<LogicalModules>,
    sub_tasks: Mutex<Vec<JoinHandleWrapper>>,
}

impl Drop for Sys {
    fn drop(&mut self) {
        tracing::info!("drop sys");
    }
}

impl Sys {
    pub fn new(config: ZmConfig) -> ZmResult<Sys> {
        let fetcher: Arc<dyn NodeFetcher> = Arc::new(HttpFetcher::new(&config.metrics)?);
        Self::new_with_fetcher(config, fetcher)
    }

    pub fn new_with_fetcher(config: ZmConfig, fetcher: Arc<dyn NodeFetcher>) -> ZmResult<Sys> {
        let catalog = match config.schema_file.as_ref() {
            Some(path) => {
                tracing::info!("loading metric schema catalog from {:?}", path);
                SchemaCatalog::load(path)?
            }
            None => SchemaCatalog::builtin()?,
        };

        Ok(Sys {
            logical_modules: LogicalModules::new(config, Arc::new(catalog), fetcher),
            sub_tasks: Vec::new().into(),
        })
    }

    pub fn new_logical_modules_ref(&self) -> LogicalModulesRef {
        LogicalModulesRef::new(&self.logical_modules)
    }

    pub async fn wait_for_end(&mut self) -> ZmResult<()> {
        self.logical_modules.start(self).await?;
        tracing::info!("modules all started, waiting for end");

        let mut tasks = self.sub_tasks.lock().await;
        let ended = tokio::select! {
            res = join_all_tasks(&mut tasks) => Some(res),
            _ = tokio::signal::ctrl_c() => None,
        };
        match ended {
            Some(res) => res,
            None => {
                tracing::info!("received ctrl-c, stopping {} tasks", tasks.len());
                for task in tasks.iter() {
                    task.abort();
                }
                Ok(())
            }
        }
    }

    #[cfg(test)]
    pub async fn test_start_all(&self) -> LogicalModulesRef {
        if let Err(err) = self.logical_modules.start(self).await {
            panic!("start logical modules error: {:?}", err);
        }
        self.new_logical_modules_ref()
    }

    #[cfg(test)]
    pub async fn test_abort_all(&self) {
        for task in self.sub_tasks.lock().await.iter() {
            task.abort();
        }
    }
}

async fn join_all_tasks(tasks: &mut [JoinHandleWrapper]) -> ZmResult<()> {
    for task in tasks.iter_mut() {
        task.join().await?;
        tracing::info!("task {} ended", task.name());
    }
    Ok(())
}

#[derive(Clone)]
pub struct LogicalModuleNewArgs {
    pub logical_modules_ref: LogicalModulesRef,
    pub config: ZmConfig,
    pub catalog: Arc<SchemaCatalog>,
    pub fetcher: Arc<dyn NodeFetcher>,
}

#[async_trait]
pub trait LogicalModule: Send + Sync + 'static {
    fn inner_new(args: LogicalModuleNewArgs) -> Self
    where
        Self: Sized;
    async fn start(&self) -> ZmResult<Vec<JoinHandleWrapper>>;

    async fn init(&self) -> ZmResult<()> {
        Ok(())
    }
}

#[derive(Clone)]
pub struct LogicalModulesRef {
    pub inner: Weak<LogicalModules>,
}

impl LogicalModulesRef {
    pub fn new(inner: &Arc<LogicalModules>) -> LogicalModulesRef {
        LogicalModulesRef {
            inner: Arc::downgrade(inner),
        }
    }

    /// Modules are owned by `Sys`, which outlives every module and view.
    /// Views must not be dereferenced inside `inner_new`, the modules are
    /// still being built at that point.
    pub fn modules(&self) -> &LogicalModules {
        debug_assert!(self.inner.strong_count() > 0, "logical modules dropped");
        #[cfg(feature = "unsafe-log")]
        tracing::debug!("unsafe ptr begin");
        let res = unsafe { &*self.inner.as_ptr() };
        #[cfg(feature = "unsafe-log")]
        tracing::debug!("unsafe ptr end");
        res
    }
}

#[macro_export]
macro_rules! logical_module_view_impl {
    ($module:ident,$module_name:ident,Option<$type:ty>) => {
        impl $module {
            pub fn $module_name(&self) -> Option<&$type> {
                self.inner.modules().$module_name.as_ref()
            }
        }
    };
    ($module:ident,$module_name:ident,$type:ty) => {
        impl $module {
            pub fn $module_name(&self) -> &$type {
                &self.inner.modules().$module_name
            }
        }
    };
    ($module:ident) => {
        #[derive(Clone)]
        pub struct $module {
            inner: LogicalModulesRef,
        }
        impl $module {
            pub fn new(inner: LogicalModulesRef) -> Self {
                $module { inner }
            }
            #[allow(dead_code)]
            pub fn copy_module_ref(&self) -> LogicalModulesRef {
                self.inner.clone()
            }
        }
    };
}

macro_rules! init_module {
    ($self:ident,$opt:ident) => {
        $self.$opt.init().await?;
    };
}

macro_rules! init_module_opt {
    ($self:ident,$opt:ident) => {
        if let Some($opt) = $self.$opt.as_ref() {
            $opt.init().await?;
        }
    };
}

macro_rules! start_module {
    ($self:ident,$sys:ident,$opt:ident) => {
        $sys.sub_tasks
            .lock()
            .await
            .append(&mut $self.$opt.start().await?);
    };
}

macro_rules! start_module_opt {
    ($self:ident,$sys:ident,$opt:ident) => {
        if let Some($opt) = $self.$opt.as_ref() {
            $sys.sub_tasks.lock().await.append(&mut $opt.start().await?);
        }
    };
}

macro_rules! start_modules {
    ([$( $module:ident,$modulety:ty ),*], [$( $opt_module:ident,$opt_modulety:ty,$enabled:expr ),*]) => {
        pub struct LogicalModules {
            $( pub $module : $modulety, )*
            $( pub $opt_module : Option<$opt_modulety>, )*
        }

        impl LogicalModules {
            pub fn new(
                config: ZmConfig,
                catalog: Arc<SchemaCatalog>,
                fetcher: Arc<dyn NodeFetcher>,
            ) -> Arc<LogicalModules> {
                Arc::new_cyclic(|weak| {
                    let args = LogicalModuleNewArgs {
                        logical_modules_ref: LogicalModulesRef {
                            inner: weak.clone(),
                        },
                        config: config.clone(),
                        catalog,
                        fetcher,
                    };
                    LogicalModules {
                        $( $module : <$modulety>::new(args.clone()), )*
                        $( $opt_module : ($enabled)(&config).then(|| <$opt_modulety>::new(args.clone())), )*
                    }
                })
            }

            pub async fn start(&self, sys: &Sys) -> ZmResult<()> {
                $( init_module!(self, $module); )*
                $( init_module_opt!(self, $opt_module); )*

                $( start_module!(self, sys, $module); )*
                $( start_module_opt!(self, sys, $opt_module); )*
                Ok(())
            }
        }
    };
}

start_modules!(
    [session_manager, SessionManager, poller, Poller],
    [http_handler, HttpHandler, |c: &ZmConfig| c.http.enabled]
);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        general::ensemble::NodeTarget,
        monitor::orchestrator::RoundOutcome,
        result::ZmNetworkErr,
    };

    struct FixedFetcher;

    #[async_trait]
    impl NodeFetcher for FixedFetcher {
        async fn fetch(&self, target: &NodeTarget) -> ZmResult<String> {
            match target.host.as_str() {
                "down" => Err(ZmNetworkErr::BadStatus {
                    host: target.host.clone(),
                    status: 503,
                    body: String::new(),
                }
                .into()),
                _ => Ok(r#"{"packets_sent": 5, "snap_count": 1}"#.to_owned()),
            }
        }
    }

    fn test_config() -> ZmConfig {
        let mut config = ZmConfig::default();
        config.ensemble = "a:2181,down:2181".to_owned();
        config.refresh_ms = 0;
        config.http.enabled = false;
        config
    }

    #[tokio::test]
    async fn test_sys_wires_modules() {
        crate::util::test_tracing_start();
        let sys = Sys::new_with_fetcher(test_config(), Arc::new(FixedFetcher)).unwrap();
        let modules_ref = sys.test_start_all().await;
        let modules = modules_ref.modules();
        assert!(modules.http_handler.is_none());

        let session = modules.session_manager.session();
        assert_eq!(session.node_set().hosts(), vec!["a", "down"]);

        let outcome = modules.poller.orchestrator().run_round(session).await;
        let latest = modules.poller.store().latest();
        assert_eq!(
            outcome,
            RoundOutcome::Committed {
                rows: latest.rows.len()
            }
        );
        assert_eq!(latest.schema_version.as_ref().map(|v| v.as_str()), Some("3.6"));
        let packets = latest
            .rows
            .iter()
            .find(|r| r.key == "packets_sent")
            .unwrap();
        assert_eq!(packets.present_count, 1);
        assert_eq!(packets.values, vec![Some(serde_json::json!(5)), None]);
        sys.test_abort_all().await;
    }
}
