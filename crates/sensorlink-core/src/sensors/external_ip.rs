// ── External IP sensors ──
//
// Asks one or more echo endpoints for the host's public address and
// reports each family as its own diagnostic sensor. An endpoint that fails
// or answers with something other than an IP address is skipped.

use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};
use url::Url;

use crate::error::CoreError;
use crate::model::{Category, Entity};
use crate::worker::{PollingWorker, SensorSource};

pub const EXTERNAL_IP_WORKER_ID: &str = "external_ip";

const DEFAULT_INTERVAL: Duration = Duration::from_secs(5 * 60);
const DEFAULT_JITTER: Duration = Duration::from_secs(60);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
const ICON: &str = "mdi:web";

#[derive(Debug, Clone)]
pub struct ExternalIpConfig {
    pub endpoints: Vec<Url>,
    pub interval: Duration,
    pub jitter: Duration,
}

impl Default for ExternalIpConfig {
    fn default() -> Self {
        let endpoints = ["https://api.ipify.org", "https://api6.ipify.org"]
            .iter()
            .filter_map(|u| Url::parse(u).ok())
            .collect();
        Self {
            endpoints,
            interval: DEFAULT_INTERVAL,
            jitter: DEFAULT_JITTER,
        }
    }
}

pub struct ExternalIp {
    http: reqwest::Client,
    config: ExternalIpConfig,
}

impl ExternalIp {
    pub fn new(config: ExternalIpConfig) -> Result<Self, CoreError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| CoreError::WorkerStart {
                id: EXTERNAL_IP_WORKER_ID.to_owned(),
                reason: e.to_string(),
            })?;
        Ok(Self { http, config })
    }

    /// Build a [`PollingWorker`] around this source.
    pub fn worker(config: ExternalIpConfig) -> Result<PollingWorker<Self>, CoreError> {
        Ok(PollingWorker::new(Self::new(config)?))
    }

    async fn lookup(&self, endpoint: &Url) -> Option<IpAddr> {
        let response = match self.http.get(endpoint.clone()).send().await {
            Ok(r) => r,
            Err(e) => {
                debug!(%endpoint, error = %e, "external address lookup failed");
                return None;
            }
        };
        if !response.status().is_success() {
            debug!(%endpoint, status = %response.status(), "external address lookup rejected");
            return None;
        }
        let body = response.text().await.ok()?;
        match body.trim().parse::<IpAddr>() {
            Ok(addr) => Some(addr),
            Err(_) => {
                warn!(%endpoint, "endpoint did not return an IP address");
                None
            }
        }
    }
}

fn entity_for(addr: IpAddr) -> Result<Entity, CoreError> {
    let (id, name) = match addr {
        IpAddr::V4(_) => ("external_ipv4", "External IPv4 Address"),
        IpAddr::V6(_) => ("external_ipv6", "External IPv6 Address"),
    };
    Entity::builder(id, name)
        .value(addr.to_string())
        .icon(ICON)
        .category(Category::Diagnostic)
        .build()
}

#[async_trait]
impl SensorSource for ExternalIp {
    fn id(&self) -> &str {
        EXTERNAL_IP_WORKER_ID
    }

    fn interval(&self) -> Duration {
        self.config.interval
    }

    fn jitter(&self) -> Duration {
        self.config.jitter
    }

    async fn poll(&self, _delta: Duration) -> Result<Vec<Entity>, CoreError> {
        let lookups = self.config.endpoints.iter().map(|e| self.lookup(e));
        let found = futures_util::future::join_all(lookups).await;

        let mut entities: Vec<Entity> = Vec::new();
        for addr in found.into_iter().flatten() {
            let entity = entity_for(addr)?;
            // First answer per family wins.
            if !entities.iter().any(|e| e.id() == entity.id()) {
                entities.push(entity);
            }
        }
        Ok(entities)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::model::StateValue;

    fn config(server: &MockServer, paths: &[&str]) -> ExternalIpConfig {
        ExternalIpConfig {
            endpoints: paths
                .iter()
                .map(|p| Url::parse(&format!("{}{p}", server.uri())).unwrap())
                .collect(),
            ..ExternalIpConfig::default()
        }
    }

    #[tokio::test]
    async fn reports_each_family_once() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v4"))
            .respond_with(ResponseTemplate::new(200).set_body_string("203.0.113.7\n"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v6"))
            .respond_with(ResponseTemplate::new(200).set_body_string("2001:db8::1"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v4-again"))
            .respond_with(ResponseTemplate::new(200).set_body_string("198.51.100.1"))
            .mount(&server)
            .await;

        let source = ExternalIp::new(config(&server, &["/v4", "/v6", "/v4-again"])).unwrap();
        let entities = source.poll(Duration::ZERO).await.unwrap();

        assert_eq!(entities.len(), 2);
        assert_eq!(entities[0].id(), "external_ipv4");
        assert_eq!(
            entities[0].value(),
            Some(&StateValue::Text("203.0.113.7".into()))
        );
        assert_eq!(entities[0].category(), Some(Category::Diagnostic));
        assert_eq!(entities[1].id(), "external_ipv6");
    }

    #[tokio::test]
    async fn failures_and_garbage_are_skipped() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/down"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/html"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>hi</html>"))
            .mount(&server)
            .await;

        let source = ExternalIp::new(config(&server, &["/down", "/html"])).unwrap();
        assert!(source.poll(Duration::ZERO).await.unwrap().is_empty());
    }

    #[test]
    fn defaults() {
        let config = ExternalIpConfig::default();
        assert_eq!(config.endpoints.len(), 2);
        assert_eq!(config.interval, DEFAULT_INTERVAL);
    }
}
