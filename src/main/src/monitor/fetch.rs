use std::time::Duration;

use async_trait::async_trait;

use crate::{
    config::MetricsEndpointConfig,
    general::ensemble::NodeTarget,
    result::{ErrCvt, ZmNetworkErr, ZmResult},
};

/// Retrieves the raw metrics document of one node.
#[async_trait]
pub trait NodeFetcher: Send + Sync + 'static {
    async fn fetch(&self, target: &NodeTarget) -> ZmResult<String>;
}

/// Fetches `{scheme}://{host}:{port}/commands/{command}` from each node's
/// admin server.
pub struct HttpFetcher {
    client: reqwest::Client,
    scheme: String,
    port: u16,
    command: String,
}

impl HttpFetcher {
    pub fn new(conf: &MetricsEndpointConfig) -> ZmResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(conf.timeout_ms))
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|err| ErrCvt(err).to_zm_network_err())?;
        Ok(Self {
            client,
            scheme: conf.scheme.clone(),
            port: conf.port,
            command: conf.command.clone(),
        })
    }

    pub fn url_for(&self, host: &str) -> String {
        format!(
            "{}://{}:{}/commands/{}",
            self.scheme, host, self.port, self.command
        )
    }
}

#[async_trait]
impl NodeFetcher for HttpFetcher {
    async fn fetch(&self, target: &NodeTarget) -> ZmResult<String> {
        let url = self.url_for(&target.host);
        tracing::trace!("fetching {}", url);

        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|err| ZmNetworkErr::Http {
                host: target.host.clone(),
                err,
            })?;

        let status = resp.status();
        let body = resp.text().await.map_err(|err| ZmNetworkErr::Http {
            host: target.host.clone(),
            err,
        })?;
        if !status.is_success() {
            return Err(ZmNetworkErr::BadStatus {
                host: target.host.clone(),
                status: status.as_u16(),
                body,
            }
            .into());
        }
        Ok(body)
    }
}
