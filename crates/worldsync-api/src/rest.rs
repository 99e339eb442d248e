// Snapshot REST client
//
// Thin wrapper over `reqwest::Client` for the one collaborator endpoint this
// workspace consumes: the full entity/edge snapshot. Used for the initial
// load, for push-triggered refetches, and for periodic polling.

use std::time::Duration;

use tracing::debug;
use url::Url;

use crate::error::Error;
use crate::snapshot::WorldSnapshot;

const USER_AGENT: &str = concat!("worldsync/", env!("CARGO_PKG_VERSION"));
const BODY_PREVIEW_CHARS: usize = 200;

/// HTTP client for the world snapshot endpoint.
#[derive(Debug, Clone)]
pub struct SnapshotClient {
    http: reqwest::Client,
    url: Url,
}

impl SnapshotClient {
    /// Build a client with its own connection pool and request timeout.
    pub fn new(url: Url, timeout: Duration) -> Result<Self, Error> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self { http, url })
    }

    /// Create a client with a pre-built `reqwest::Client`.
    pub fn with_client(http: reqwest::Client, url: Url) -> Self {
        Self { http, url }
    }

    /// The snapshot endpoint URL.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Fetch the current snapshot.
    pub async fn fetch(&self) -> Result<WorldSnapshot, Error> {
        debug!("GET {}", self.url);

        let resp = self.http.get(self.url.clone()).send().await?;
        let status = resp.status();

        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Http {
                status: status.as_u16(),
                body: preview(&body),
            });
        }

        let body = resp.text().await?;
        serde_json::from_str(&body).map_err(|e| Error::Deserialization {
            message: format!("{e} (body preview: {:?})", preview(&body)),
            body,
        })
    }
}

fn preview(body: &str) -> String {
    body.chars().take(BODY_PREVIEW_CHARS).collect()
}
