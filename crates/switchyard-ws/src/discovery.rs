//! DevTools target discovery.
//!
//! A DevTools endpoint lists its debuggable targets as a JSON array at
//! `/json`. Each entry may carry a WebSocket debugger URL that a
//! [`Multiplexer`] can be bound to.

use serde::{Deserialize, Serialize};
use switchyard::{Multiplexer, TransportError};
use thiserror::Error;
use tracing::debug;

use crate::WS_TARGET;
use crate::transport::dial;

/// One debuggable target reported by a DevTools listing endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Target {
    /// Free-form description, usually empty.
    #[serde(default)]
    pub description: String,
    /// URL of the DevTools front end for this target.
    #[serde(default)]
    pub devtools_frontend_url: String,
    /// Favicon of the loaded page.
    #[serde(default)]
    pub favicon_url: String,
    /// Target identifier.
    pub id: String,
    /// Target kind, such as `page` or `service_worker`.
    #[serde(rename = "type", default)]
    pub kind: String,
    /// Currently loaded URL.
    #[serde(default)]
    pub url: String,
    /// WebSocket endpoint for the debugging protocol. Absent while another
    /// client is attached.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub web_socket_debugger_url: Option<String>,
}

/// Errors raised while discovering or connecting to a target.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// The listing endpoint could not be fetched or decoded.
    #[error("failed to fetch target listing from {url}: {source}")]
    Http {
        /// Listing endpoint.
        url: String,
        /// Underlying HTTP or decoding failure.
        #[source]
        source: reqwest::Error,
    },

    /// The listing contained no target that can be connected to.
    #[error("no debuggable targets listed at {url}")]
    NoTargets {
        /// Listing endpoint.
        url: String,
    },

    /// The chosen target does not expose a WebSocket debugger URL.
    #[error("target {id} has no WebSocket debugger URL")]
    MissingDebuggerUrl {
        /// Target identifier.
        id: String,
    },

    /// The WebSocket connection could not be established.
    #[error("failed to connect to {url}: {source}")]
    Transport {
        /// Debugger URL that was dialled.
        url: String,
        /// Underlying transport failure.
        #[source]
        source: TransportError,
    },
}

impl Target {
    /// Dials this target's debugger URL and binds a multiplexer to it.
    ///
    /// # Errors
    ///
    /// Returns [`DiscoveryError::MissingDebuggerUrl`] when the target has no
    /// debugger URL and [`DiscoveryError::Transport`] when dialling fails.
    pub async fn connect(&self) -> Result<Multiplexer, DiscoveryError> {
        let url = self.debugger_url()?;
        let transport = dial(url)
            .await
            .map_err(|source| DiscoveryError::Transport {
                url: url.to_owned(),
                source,
            })?;
        Ok(Multiplexer::new(transport))
    }

    fn debugger_url(&self) -> Result<&str, DiscoveryError> {
        self.web_socket_debugger_url
            .as_deref()
            .filter(|url| !url.is_empty())
            .ok_or_else(|| DiscoveryError::MissingDebuggerUrl {
                id: self.id.clone(),
            })
    }

    fn is_connectable(&self) -> bool {
        self.debugger_url().is_ok()
    }
}

/// Fetches the target listing from `url`.
///
/// # Errors
///
/// Returns [`DiscoveryError::Http`] when the request fails, the endpoint
/// answers with an error status or the body is not a target array.
pub async fn discover(client: &reqwest::Client, url: &str) -> Result<Vec<Target>, DiscoveryError> {
    let http_error = |source: reqwest::Error| DiscoveryError::Http {
        url: url.to_owned(),
        source,
    };
    let targets: Vec<Target> = client
        .get(url)
        .send()
        .await
        .and_then(reqwest::Response::error_for_status)
        .map_err(http_error)?
        .json()
        .await
        .map_err(http_error)?;
    debug!(target: WS_TARGET, url, count = targets.len(), "discovered targets");
    Ok(targets)
}

/// Discovers the targets at `url` and connects to the first one exposing a
/// debugger URL.
///
/// # Errors
///
/// Returns [`DiscoveryError::NoTargets`] when no listed target can be
/// connected to, or any error from [`discover`] and [`Target::connect`].
pub async fn connect(url: &str) -> Result<Multiplexer, DiscoveryError> {
    let targets = discover(&reqwest::Client::new(), url).await?;
    let target = targets
        .iter()
        .find(|target| target.is_connectable())
        .ok_or_else(|| DiscoveryError::NoTargets {
            url: url.to_owned(),
        })?;
    debug!(target: WS_TARGET, id = %target.id, kind = %target.kind, "connecting to target");
    target.connect().await
}
