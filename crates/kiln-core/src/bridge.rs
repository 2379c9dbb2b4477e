//! Quiesce/resume bridge toward the live process.
//!
//! On the hot-swap path the watcher must replace artifact files the live
//! process may be holding open. The bridge speaks a small two-phase
//! protocol against the process's control API:
//!
//! 1. `POST /api/watcher/prepare-rebuild` - stop and release file handles on
//!    the named units before their backing files are overwritten
//! 2. the caller replaces the artifact files on disk
//! 3. `POST /api/watcher/rebuild-complete` - reload the named units now that
//!    new files are in place
//!
//! Authentication is a short-lived bearer token obtained by exchanging the
//! shared key (`POST /api/auth/token`); the token is cached and refreshed
//! transparently when it nears expiry, and dropped whenever the bridge is
//! re-configured after a process restart.
//!
//! Every call is best effort and returns a [`BridgeOutcome`] instead of an
//! error: the caller makes an explicit fallback decision (typically a full
//! relaunch) when the peer is unreachable, and never fails the overall
//! rebuild on bridge trouble. Request timeouts are short so a hung peer
//! cannot stall the poll loop.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::RuntimeConfig;

/// Refresh the token once it is older than this.
const TOKEN_TTL: Duration = Duration::from_secs(3500);

/// Timeout for the token exchange.
const AUTH_TIMEOUT: Duration = Duration::from_secs(5);

/// Timeout for quiesce/resume calls.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// What the live process reported for a bridge call.
#[derive(Debug, Clone, Default)]
pub struct BridgeReport {
    /// Units the process stopped before the replacement.
    pub stopped: Vec<String>,
    /// Units the process unloaded before the replacement.
    pub unloaded: Vec<String>,
    /// Units the process restarted after the replacement.
    pub restarted: Vec<String>,
    /// Per-unit errors reported by the process.
    pub errors: Vec<String>,
}

/// Result of a bridge call.
#[derive(Debug, Clone)]
pub enum BridgeOutcome {
    /// The live process confirmed the operation.
    Confirmed(BridgeReport),
    /// The live process confirmed, but reported per-unit errors.
    ConfirmedWithErrors(BridgeReport),
    /// The live process could not be reached (not running, no shared key
    /// configured, or the request failed). Never fatal; callers fall back
    /// to a relaunch when confirmation matters.
    Unreachable,
}

impl BridgeOutcome {
    /// Whether the peer confirmed the call, with or without unit errors.
    #[must_use]
    pub fn is_confirmed(&self) -> bool {
        !matches!(self, Self::Unreachable)
    }

    fn from_report(report: BridgeReport) -> Self {
        if report.errors.is_empty() {
            Self::Confirmed(report)
        } else {
            Self::ConfirmedWithErrors(report)
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TokenRequest<'a> {
    api_key: &'a str,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    token: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PrepareRebuildRequest<'a> {
    module_uuids: &'a [String],
    source_uuids: &'a [String],
}

#[derive(Debug, Default, Deserialize)]
struct PrepareRebuildResponse {
    #[serde(default)]
    stopped: Vec<String>,
    #[serde(default)]
    unloaded: Vec<String>,
    #[serde(default)]
    errors: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RebuildCompleteRequest<'a> {
    source_uuids: &'a [String],
}

#[derive(Debug, Default, Deserialize)]
struct RebuildCompleteResponse {
    #[serde(default)]
    restarted: Vec<String>,
    #[serde(default)]
    errors: Vec<String>,
}

struct BearerToken {
    value: String,
    obtained_at: Instant,
}

impl BearerToken {
    fn is_fresh(&self, now: Instant) -> bool {
        now.duration_since(self.obtained_at) < TOKEN_TTL
    }
}

/// Client for the live process's quiesce/resume API.
pub struct ReloadBridge {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    token: Option<BearerToken>,
}

impl Default for ReloadBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl ReloadBridge {
    /// An unconfigured bridge; call [`ReloadBridge::configure`] before use.
    #[must_use]
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: String::new(),
            api_key: None,
            token: None,
        }
    }

    /// Point the bridge at the live process described by the served runtime
    /// config. Drops any cached token: a restarted process invalidates
    /// outstanding tokens implicitly.
    pub fn configure(&mut self, runtime: &RuntimeConfig) {
        self.base_url = format!("http://localhost:{}", runtime.port);
        self.api_key = runtime.api_key().map(ToString::to_string);
        self.token = None;
    }

    /// Ask the live process to quiesce the named units before their backing
    /// files are replaced.
    pub async fn prepare_rebuild(
        &mut self,
        module_uuids: &[String],
        source_uuids: &[String],
    ) -> BridgeOutcome {
        let body = PrepareRebuildRequest {
            module_uuids,
            source_uuids,
        };
        let Some(response) = self
            .post::<_, PrepareRebuildResponse>("/api/watcher/prepare-rebuild", &body)
            .await
        else {
            return BridgeOutcome::Unreachable;
        };

        if !response.errors.is_empty() {
            warn!(errors = ?response.errors, "prepare-rebuild reported errors");
        }
        if !response.stopped.is_empty() || !response.unloaded.is_empty() {
            debug!(stopped = ?response.stopped, unloaded = ?response.unloaded, "units quiesced");
        }
        BridgeOutcome::from_report(BridgeReport {
            stopped: response.stopped,
            unloaded: response.unloaded,
            restarted: Vec::new(),
            errors: response.errors,
        })
    }

    /// Signal that new artifacts are in place so the quiesced units can be
    /// reloaded.
    pub async fn rebuild_complete(&mut self, source_uuids: &[String]) -> BridgeOutcome {
        let body = RebuildCompleteRequest { source_uuids };
        let Some(response) = self
            .post::<_, RebuildCompleteResponse>("/api/watcher/rebuild-complete", &body)
            .await
        else {
            return BridgeOutcome::Unreachable;
        };

        if !response.errors.is_empty() {
            warn!(errors = ?response.errors, "rebuild-complete reported errors");
        }
        if !response.restarted.is_empty() {
            debug!(restarted = ?response.restarted, "units reloaded");
        }
        BridgeOutcome::from_report(BridgeReport {
            stopped: Vec::new(),
            unloaded: Vec::new(),
            restarted: response.restarted,
            errors: response.errors,
        })
    }

    /// Obtain or refresh the bearer token. `None` when no shared key is
    /// configured or the exchange failed.
    async fn ensure_token(&mut self) -> Option<String> {
        let api_key = self.api_key.as_deref()?;
        if let Some(token) = &self.token {
            if token.is_fresh(Instant::now()) {
                return Some(token.value.clone());
            }
        }

        let result = self
            .client
            .post(format!("{}/api/auth/token", self.base_url))
            .timeout(AUTH_TIMEOUT)
            .json(&TokenRequest { api_key })
            .send()
            .await;
        let response = match result {
            Ok(response) => response,
            Err(err) => {
                debug!(%err, "token exchange failed");
                return None;
            }
        };
        let parsed: TokenResponse = match response.json().await {
            Ok(parsed) => parsed,
            Err(err) => {
                warn!(%err, "malformed token response");
                return None;
            }
        };
        if parsed.token.is_empty() {
            return None;
        }

        self.token = Some(BearerToken {
            value: parsed.token.clone(),
            obtained_at: Instant::now(),
        });
        Some(parsed.token)
    }

    /// Authenticated POST. `None` on any transport or protocol failure -
    /// the peer being down during a relaunch is the normal case, not an
    /// error.
    async fn post<B: Serialize, R: for<'de> Deserialize<'de>>(
        &mut self,
        path: &str,
        body: &B,
    ) -> Option<R> {
        let token = self.ensure_token().await?;
        let result = self
            .client
            .post(format!("{}{path}", self.base_url))
            .timeout(REQUEST_TIMEOUT)
            .bearer_auth(token)
            .json(body)
            .send()
            .await;
        let response = match result {
            Ok(response) => response,
            Err(err) => {
                debug!(path, %err, "bridge unreachable");
                return None;
            }
        };
        if !response.status().is_success() {
            warn!(path, status = %response.status(), "bridge call rejected");
            return None;
        }
        match response.json().await {
            Ok(parsed) => Some(parsed),
            Err(err) => {
                warn!(path, %err, "malformed bridge response");
                None
            }
        }
    }
}
