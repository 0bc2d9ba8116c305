use std::{net::SocketAddr, sync::Arc};

use async_trait::async_trait;
use axum::{
    extract::{Path, State},
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use zm_derive::LogicalModule;

use crate::{
    general::{
        ensemble::NodeSetInfo,
        m_session::{PollSession, SessionManager},
        metrics::{MetricSchema, SchemaVersion},
    },
    logical_module_view_impl,
    monitor::{
        m_poller::Poller,
        orchestrator::{parse_refresh_delay, Orchestrator},
        sink::{LatestRoundStore, PollState},
    },
    result::{ZmConfigErr, ZmError, ZmNetworkErr, ZmResult},
    sys::{LogicalModule, LogicalModuleNewArgs, LogicalModulesRef},
    util::JoinHandleWrapper,
};

logical_module_view_impl!(HttpHandlerView);
logical_module_view_impl!(HttpHandlerView, session_manager, SessionManager);
logical_module_view_impl!(HttpHandlerView, poller, Poller);

const OPENMETRICS_CONTENT_TYPE: &str = "application/openmetrics-text; version=1.0.0; charset=utf-8";

#[derive(Clone)]
pub struct HttpState {
    pub session: Arc<PollSession>,
    pub orchestrator: Arc<Orchestrator>,
    pub store: Arc<LatestRoundStore>,
    /// The only command the proxy forwards.
    pub proxy_command: String,
}

#[derive(Debug, Serialize)]
struct DefsResp {
    resolved: bool,
    versions: Vec<SchemaVersion>,
    schema: Option<MetricSchema>,
    /// Every known version while no schema is resolved.
    #[serde(skip_serializing_if = "Option::is_none")]
    catalog: Option<Vec<MetricSchema>>,
}

#[derive(Debug, Default, Deserialize)]
struct FlagsReq {
    #[serde(default, alias = "inStats")]
    in_stats: Option<bool>,
    #[serde(default, alias = "inCharts")]
    in_charts: Option<bool>,
}

#[derive(Debug, Serialize)]
struct StatusResp {
    state: PollState,
    refresh_ms: u64,
    schema_version: Option<SchemaVersion>,
    nodes: NodeSetInfo,
}

#[derive(Debug, Serialize)]
struct EnsembleResp {
    changed: bool,
    nodes: NodeSetInfo,
}

#[derive(Debug, Serialize)]
struct RefreshDelayResp {
    refresh_ms: u64,
}

#[derive(Debug, Serialize)]
struct ErrorResp {
    error: String,
}

fn error_response(status: StatusCode, err: impl std::fmt::Debug) -> Response {
    (
        status,
        Json(ErrorResp {
            error: format!("{:?}", err),
        }),
    )
        .into_response()
}

fn zm_error_response(err: ZmError) -> Response {
    let status = match &err {
        ZmError::ZmConfigErr(ZmConfigErr::MetricNotFound(_)) => StatusCode::NOT_FOUND,
        ZmError::ZmNetworkErr(ZmNetworkErr::NodeIndexOutOfRange { .. }) => StatusCode::BAD_REQUEST,
        ZmError::ZmNetworkErr(ZmNetworkErr::BadStatus { status, .. }) => {
            StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
        }
        ZmError::ZmNetworkErr(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error_response(status, err)
}

/// Joins `prefix` and the api routes. An empty prefix serves them at root.
pub fn router(state: HttpState, prefix: &str) -> Router {
    let api = Router::new()
        .route("/defs", get(handle_get_defs))
        .route("/defs/:metric", put(handle_put_flags))
        .route("/stats", get(handle_stats))
        .route("/status", get(handle_status))
        .route("/ensemble", put(handle_put_ensemble))
        .route("/refresh_ms", put(handle_put_refresh_delay))
        .route("/refresh", post(handle_refresh))
        .route("/proxy/:command/:index", get(handle_proxy))
        .route("/metrics", get(handle_prometheus))
        .with_state(state);

    let prefix = prefix.trim().trim_end_matches('/');
    let app = if prefix.is_empty() {
        api
    } else if prefix.starts_with('/') {
        Router::new().nest(prefix, api)
    } else {
        Router::new().nest(&format!("/{}", prefix), api)
    };
    app.layer(CorsLayer::permissive())
}

async fn handle_get_defs(State(state): State<HttpState>) -> Json<DefsResp> {
    let schema = state.session.active_schema();
    let catalog = state.session.catalog();
    Json(DefsResp {
        resolved: schema.is_some(),
        versions: catalog.versions.iter().map(|s| s.version.clone()).collect(),
        catalog: schema.is_none().then(|| catalog.versions.clone()),
        schema,
    })
}

async fn handle_put_flags(
    State(state): State<HttpState>,
    Path(metric): Path<String>,
    Json(req): Json<FlagsReq>,
) -> Response {
    tracing::debug!("set display flags of {}: {:?}", metric, req);
    match state
        .orchestrator
        .set_display_flags(&state.session, &metric, req.in_stats, req.in_charts)
    {
        Ok(def) => Json(def).into_response(),
        Err(err) => zm_error_response(err),
    }
}

async fn handle_stats(State(state): State<HttpState>) -> Response {
    Json(state.store.latest()).into_response()
}

async fn handle_status(State(state): State<HttpState>) -> Json<StatusResp> {
    Json(StatusResp {
        state: state.store.state(),
        refresh_ms: state.orchestrator.refresh_delay_ms(),
        schema_version: state.session.active_schema().map(|s| s.version),
        nodes: state.session.node_set().info(),
    })
}

async fn handle_put_ensemble(State(state): State<HttpState>, body: String) -> Json<EnsembleResp> {
    let changed = state.orchestrator.update_ensemble(&state.session, &body);
    Json(EnsembleResp {
        changed,
        nodes: state.session.node_set().info(),
    })
}

async fn handle_put_refresh_delay(
    State(state): State<HttpState>,
    body: String,
) -> Json<RefreshDelayResp> {
    let refresh_ms = parse_refresh_delay(&body);
    state.orchestrator.set_refresh_delay(refresh_ms);
    Json(RefreshDelayResp { refresh_ms })
}

async fn handle_refresh(State(state): State<HttpState>) -> StatusCode {
    state.orchestrator.trigger();
    StatusCode::ACCEPTED
}

async fn handle_proxy(
    State(state): State<HttpState>,
    Path((command, index)): Path<(String, usize)>,
) -> Response {
    if command != state.proxy_command {
        return error_response(
            StatusCode::BAD_REQUEST,
            format!("command {} is not proxied", command),
        );
    }
    match state.orchestrator.fetch_raw(&state.session, index).await {
        Ok(text) => {
            let mut resp = (StatusCode::OK, text).into_response();
            let _ = resp.headers_mut().insert(
                "content-type",
                HeaderValue::from_static("application/json"),
            );
            resp
        }
        Err(ZmError::ZmNetworkErr(ZmNetworkErr::BadStatus { status, body, .. })) => {
            tracing::debug!("proxy {} of node {} answered {}", command, index, status);
            let status = StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY);
            (status, body).into_response()
        }
        Err(err) => {
            tracing::debug!("proxy {} of node {} failed: {:?}", command, index, err);
            zm_error_response(err)
        }
    }
}

async fn handle_prometheus(State(state): State<HttpState>) -> Response {
    tracing::debug!("handle_prometheus");
    let body = state.orchestrator.metrics().encode();
    let mut resp = (StatusCode::OK, body).into_response();
    let _ = resp.headers_mut().insert(
        "content-type",
        HeaderValue::from_static(OPENMETRICS_CONTENT_TYPE),
    );
    resp
}

#[derive(LogicalModule)]
pub struct HttpHandler {
    view: HttpHandlerView,
    addr: String,
    prefix: String,
    proxy_command: String,
}

impl HttpHandler {
    fn state(&self) -> HttpState {
        let poller = self.view.poller();
        HttpState {
            session: self.view.session_manager().session().clone(),
            orchestrator: poller.orchestrator().clone(),
            store: poller.store().clone(),
            proxy_command: self.proxy_command.clone(),
        }
    }
}

#[async_trait]
impl LogicalModule for HttpHandler {
    fn inner_new(args: LogicalModuleNewArgs) -> Self
    where
        Self: Sized,
    {
        Self {
            view: HttpHandlerView::new(args.logical_modules_ref.clone()),
            addr: args.config.http.addr.clone(),
            prefix: args.config.http.prefix.clone(),
            proxy_command: args.config.metrics.command.clone(),
        }
    }

    async fn start(&self) -> ZmResult<Vec<JoinHandleWrapper>> {
        let addr: SocketAddr = self
            .addr
            .parse()
            .map_err(|_| ZmConfigErr::InvalidHttpAddr(self.addr.clone()))?;
        let server = axum::Server::try_bind(&addr).map_err(|err| ZmNetworkErr::HttpBind {
            addr: self.addr.clone(),
            err,
        })?;
        let app = router(self.state(), &self.prefix);
        tracing::info!("http start on {}{}", addr, self.prefix);

        let handle = tokio::spawn(async move {
            if let Err(err) = server.serve(app.into_make_service()).await {
                tracing::error!("http server on {} stopped: {:?}", addr, err);
            }
            tracing::info!("http end on {}", addr);
        });
        Ok(vec![JoinHandleWrapper::new("http_handler", handle)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        general::{ensemble::NodeTarget, metrics::SchemaCatalog},
        monitor::{fetch::NodeFetcher, sink::RoundSink},
    };
    use axum::{body::Body, http::Request};
    use tower::ServiceExt;

    struct EchoFetcher;

    #[async_trait]
    impl NodeFetcher for EchoFetcher {
        async fn fetch(&self, target: &NodeTarget) -> ZmResult<String> {
            if target.host == "down" {
                return Err(ZmNetworkErr::BadStatus {
                    host: target.host.clone(),
                    status: 503,
                    body: "This ZooKeeper instance is not currently serving requests".to_owned(),
                }
                .into());
            }
            Ok(format!(r#"{{"znode_count": {}, "host": "{}"}}"#, target.index, target.host))
        }
    }

    fn state(ensemble: &str) -> HttpState {
        crate::util::test_tracing_start();
        let session = Arc::new(PollSession::new(Arc::new(SchemaCatalog::builtin().unwrap())));
        let store = Arc::new(LatestRoundStore::new());
        let sink: Arc<dyn RoundSink> = store.clone();
        let orchestrator = Arc::new(Orchestrator::new(Arc::new(EchoFetcher), sink, 2000));
        let _ = orchestrator.update_ensemble(&session, ensemble);
        HttpState {
            session,
            orchestrator,
            store,
            proxy_command: "monitor".to_owned(),
        }
    }

    async fn call(app: Router, req: Request<Body>) -> (StatusCode, serde_json::Value) {
        let resp = app.oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = hyper::body::to_bytes(resp.into_body()).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, value)
    }

    fn get_req(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn put_req(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("PUT")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_owned()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_status_and_stats() {
        let st = state("a:2181,b:2181");
        let _ = st.orchestrator.run_round(&st.session).await;
        let app = router(st.clone(), "/zk-metrics");

        let (status, body) = call(app.clone(), get_req("/zk-metrics/status")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["state"], "IDLE");
        assert_eq!(body["refresh_ms"], 2000);
        assert_eq!(body["schema_version"], "3.5");
        assert_eq!(body["nodes"]["hosts"], serde_json::json!(["a", "b"]));

        let (status, body) = call(app, get_req("/zk-metrics/stats")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["rows"][0]["key"], "znode_count");
        assert_eq!(body["rows"][0]["values"], serde_json::json!([0, 1]));
        assert_eq!(body["unclassified_keys"], serde_json::json!(["host"]));
    }

    #[tokio::test]
    async fn test_defs_and_flags() {
        let st = state("a");
        let app = router(st.clone(), "/zk-metrics/");

        let (_, body) = call(app.clone(), get_req("/zk-metrics/defs")).await;
        assert_eq!(body["resolved"], false);
        assert_eq!(body["versions"], serde_json::json!(["3.5", "3.6"]));
        assert_eq!(body["catalog"][1]["discriminator"], "snap_count");

        let (status, _) = call(
            app.clone(),
            put_req("/zk-metrics/defs/znode_count", r#"{"in_charts": false}"#),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let _ = st.orchestrator.run_round(&st.session).await;
        let (status, body) = call(
            app.clone(),
            put_req("/zk-metrics/defs/znode_count", r#"{"inCharts": false}"#),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["in_charts"], false);
        assert_eq!(body["in_stats"], true);

        let (_, body) = call(app, get_req("/zk-metrics/defs")).await;
        assert_eq!(body["resolved"], true);
        assert_eq!(body["schema"]["version"], "3.5");
        assert!(body.get("catalog").is_none());
    }

    #[tokio::test]
    async fn test_ensemble_and_refresh_delay() {
        let st = state("a");
        let app = router(st.clone(), "");

        let (_, body) = call(app.clone(), put_req("/ensemble", "x:1, y:2")).await;
        assert_eq!(body["changed"], true);
        assert_eq!(body["nodes"]["hosts"], serde_json::json!(["x", "y"]));
        let (_, body) = call(app.clone(), put_req("/ensemble", "x:1, y:2")).await;
        assert_eq!(body["changed"], false);

        let (_, body) = call(app.clone(), put_req("/refresh_ms", "-3")).await;
        assert_eq!(body["refresh_ms"], 0);
        assert_eq!(st.orchestrator.refresh_delay_ms(), 0);
        let (_, body) = call(app.clone(), put_req("/refresh_ms", "500")).await;
        assert_eq!(body["refresh_ms"], 500);

        let req = Request::builder()
            .method("POST")
            .uri("/refresh")
            .body(Body::empty())
            .unwrap();
        let (status, _) = call(app, req).await;
        assert_eq!(status, StatusCode::ACCEPTED);
    }

    #[tokio::test]
    async fn test_proxy() {
        let st = state("a,down");
        let app = router(st, "/zk-metrics");

        let (status, body) = call(app.clone(), get_req("/zk-metrics/proxy/monitor/0")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["host"], "a");

        let resp = app
            .clone()
            .oneshot(get_req("/zk-metrics/proxy/monitor/1"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = hyper::body::to_bytes(resp.into_body()).await.unwrap();
        assert_eq!(
            &body[..],
            b"This ZooKeeper instance is not currently serving requests"
        );
        let (status, _) = call(app.clone(), get_req("/zk-metrics/proxy/monitor/7")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = call(app, get_req("/zk-metrics/proxy/conf/0")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_prometheus_endpoint() {
        let st = state("a");
        let _ = st.orchestrator.run_round(&st.session).await;
        let app = router(st, "/zk-metrics");
        let resp = app.oneshot(get_req("/zk-metrics/metrics")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers()["content-type"],
            HeaderValue::from_static(OPENMETRICS_CONTENT_TYPE)
        );
        let bytes = hyper::body::to_bytes(resp.into_body()).await.unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains("zk_metrics_poller_rounds_total{outcome=\"committed\"} 1"));
        assert!(text.contains("zk_metrics_poller_nodes 1"));
    }
}
