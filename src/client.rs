//! Shared HTTP client construction and endpoint configuration.
//!
//! One reusable [`reqwest::Client`] serves every protocol operation so
//! connection reuse and timeout policy stay consistent. All tunables,
//! including the unsafe-TLS toggle the upstream protocol occasionally
//! requires, are explicit construction-time configuration rather than
//! process-wide state.

use std::time::Duration;

use reqwest::Client;

use crate::error::QueryError;

const CONNECT_TIMEOUT_SECS: u64 = 10;
const READ_TIMEOUT_SECS: u64 = 30;

/// Remote endpoints driven by the resolution protocol.
///
/// Defaults target the production Microsoft services; tests override them
/// with a local mock server.
#[derive(Debug, Clone)]
pub struct Endpoints {
    /// Windows Update SOAP endpoint (cookie handshake and file list).
    pub wu_client: String,
    /// Secured variant of the WU endpoint (download URL lookup).
    pub wu_secured: String,
    /// StoreEdgeFD JSON catalog base (products and package manifests).
    pub store_edge: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            wu_client: "https://fe3.delivery.mp.microsoft.com/ClientWebService/client.asmx"
                .to_string(),
            wu_secured:
                "https://fe3.delivery.mp.microsoft.com/ClientWebService/client.asmx/secured"
                    .to_string(),
            store_edge: "https://storeedgefd.dsx.mp.microsoft.com".to_string(),
        }
    }
}

impl Endpoints {
    /// Points every endpoint at one base URL, for tests against a mock server.
    #[must_use]
    pub fn with_base(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            wu_client: format!("{base}/ClientWebService/client.asmx"),
            wu_secured: format!("{base}/ClientWebService/client.asmx/secured"),
            store_edge: base.to_string(),
        }
    }
}

/// Construction-time configuration for [`StoreClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// TCP connect timeout in seconds.
    pub connect_timeout_secs: u64,
    /// Whole-request timeout in seconds.
    pub read_timeout_secs: u64,
    /// Accept invalid TLS certificates. Some upstream mirrors present
    /// certificates that fail validation; off by default.
    pub accept_invalid_certs: bool,
    /// Override for the `User-Agent` header; `None` uses the crate default.
    pub user_agent: Option<String>,
    /// Remote endpoint set.
    pub endpoints: Endpoints,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: CONNECT_TIMEOUT_SECS,
            read_timeout_secs: READ_TIMEOUT_SECS,
            accept_invalid_certs: false,
            user_agent: None,
            endpoints: Endpoints::default(),
        }
    }
}

/// Default `User-Agent` for protocol requests (identifies the tool).
#[must_use]
fn default_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("storelinks/{version}")
}

/// Client for the store resolution protocol.
///
/// Cheap to clone; clones share the underlying connection pool, which lets
/// concurrent fan-out tasks reuse one client per process.
#[derive(Debug, Clone)]
pub struct StoreClient {
    pub(crate) http: Client,
    pub(crate) endpoints: Endpoints,
}

impl StoreClient {
    /// Builds a client from the given configuration.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::ClientBuild`] when the underlying HTTP client
    /// cannot be constructed.
    pub fn new(config: ClientConfig) -> Result<Self, QueryError> {
        let user_agent = config.user_agent.unwrap_or_else(default_user_agent);
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.read_timeout_secs))
            .user_agent(user_agent)
            .gzip(true)
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()
            .map_err(|source| QueryError::ClientBuild { source })?;

        Ok(Self {
            http,
            endpoints: config.endpoints,
        })
    }

    /// The endpoint set this client targets.
    #[must_use]
    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }
}

/// Races a future against cooperative cancellation.
///
/// Every suspension point in the protocol goes through this so cancellation
/// propagates as [`QueryError::Canceled`] rather than being swallowed by the
/// catch-and-default handling used for ordinary transport failures.
pub(crate) async fn cancellable<T>(
    token: &tokio_util::sync::CancellationToken,
    fut: impl Future<Output = T>,
) -> Result<T, QueryError> {
    tokio::select! {
        biased;
        () = token.cancelled() => Err(QueryError::Canceled),
        value = fut => Ok(value),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_endpoints_target_production() {
        let endpoints = Endpoints::default();
        assert!(endpoints.wu_client.contains("fe3.delivery.mp.microsoft.com"));
        assert!(endpoints.wu_secured.ends_with("/secured"));
        assert!(endpoints.store_edge.contains("storeedgefd"));
    }

    #[test]
    fn test_with_base_rewrites_all_endpoints() {
        let endpoints = Endpoints::with_base("http://127.0.0.1:9999/");
        assert_eq!(
            endpoints.wu_client,
            "http://127.0.0.1:9999/ClientWebService/client.asmx"
        );
        assert_eq!(
            endpoints.wu_secured,
            "http://127.0.0.1:9999/ClientWebService/client.asmx/secured"
        );
        assert_eq!(endpoints.store_edge, "http://127.0.0.1:9999");
    }

    #[test]
    fn test_client_builds_with_defaults() {
        let client = StoreClient::new(ClientConfig::default());
        assert!(client.is_ok());
    }

    #[test]
    fn test_default_user_agent_carries_crate_version() {
        let ua = default_user_agent();
        assert!(ua.starts_with("storelinks/"));
        assert!(ua.contains(env!("CARGO_PKG_VERSION")));
    }

    #[tokio::test]
    async fn test_cancellable_returns_canceled_on_cancelled_token() {
        let token = tokio_util::sync::CancellationToken::new();
        token.cancel();
        let result = cancellable(&token, async { 42 }).await;
        assert!(matches!(result, Err(QueryError::Canceled)));
    }

    #[tokio::test]
    async fn test_cancellable_passes_through_when_not_cancelled() {
        let token = tokio_util::sync::CancellationToken::new();
        let result = cancellable(&token, async { 42 }).await;
        assert_eq!(result.unwrap(), 42);
    }
}
