// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Local HTTP listener receiving the identity provider's browser redirect.

use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse};
use axum::routing::get;
use axum::Router;
use parking_lot::Mutex;
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{AuthError, Result};

/// Addresses tried in order for the callback listener.
pub const DEFAULT_CALLBACK_ADDRS: [&str; 2] = ["localhost:8000", "localhost:18000"];

pub const CALLBACK_PATH: &str = "/callback";

/// Bound on how long a finished listener waits for the browser to read the
/// result page.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

const PAGE_TEMPLATE: &str = include_str!("callback_success.html");

/// Authorization code and state carried by a valid callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackResult {
    pub code: String,
    pub state: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// Check a callback against the state the gateway handed out.
pub fn validate_callback(query: CallbackQuery, expected_state: Option<&str>) -> Result<CallbackResult> {
    if let Some(error) = query.error.filter(|e| !e.is_empty()) {
        let detail = query.error_description.filter(|d| !d.is_empty());
        return Err(AuthError::protocol(match detail {
            Some(d) => format!("identity provider returned {error}: {d}"),
            None => format!("identity provider returned {error}"),
        }));
    }
    let Some(expected) = expected_state else {
        return Err(AuthError::protocol("callback arrived before the login was started"));
    };
    let state = query.state.unwrap_or_default();
    if state != expected {
        return Err(AuthError::protocol("callback state does not match the login request"));
    }
    let code = query.code.filter(|c| !c.is_empty()).ok_or_else(|| {
        AuthError::protocol("callback did not include an authorization code")
    })?;
    Ok(CallbackResult { code, state })
}

/// Page shown in the browser once the redirect has been accepted.
#[derive(Debug, Clone)]
pub struct ResultPage {
    pub server: String,
    pub version: String,
    pub commit: String,
}

impl ResultPage {
    pub fn new(server: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            version: crate::VERSION.to_owned(),
            commit: crate::COMMIT.to_owned(),
        }
    }

    /// Local builds show which commit they were built from.
    pub fn version_label(&self) -> String {
        if self.version.contains("-local") {
            format!("{} (commit {})", self.version, self.commit)
        } else {
            self.version.clone()
        }
    }

    pub fn success(&self) -> String {
        self.render(
            "You are signed in",
            "m8ctl received your credentials. You can close this window and return to the terminal.",
        )
    }

    pub fn failure(&self, err: &AuthError) -> String {
        self.render("Sign-in failed", &format!("{err}. Return to the terminal and try again."))
    }

    fn render(&self, title: &str, message: &str) -> String {
        PAGE_TEMPLATE
            .replace("{{title}}", &escape(title))
            .replace("{{message}}", &escape(message))
            .replace("{{server}}", &escape(&self.server))
            .replace("{{version}}", &escape(&self.version_label()))
    }
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

type ResultSender = oneshot::Sender<Result<CallbackResult>>;

/// Shared state for the callback route.
#[derive(Clone)]
pub struct CallbackState {
    expected_state: Arc<Mutex<Option<String>>>,
    result_tx: Arc<Mutex<Option<ResultSender>>>,
    page: Arc<ResultPage>,
    done: CancellationToken,
}

impl CallbackState {
    pub fn new(page: ResultPage) -> (Self, oneshot::Receiver<Result<CallbackResult>>) {
        let (tx, rx) = oneshot::channel();
        let state = Self {
            expected_state: Arc::new(Mutex::new(None)),
            result_tx: Arc::new(Mutex::new(Some(tx))),
            page: Arc::new(page),
            done: CancellationToken::new(),
        };
        (state, rx)
    }

    pub fn expect_state(&self, state: &str) {
        *self.expected_state.lock() = Some(state.to_owned());
    }
}

pub fn build_router(state: CallbackState) -> Router {
    Router::new().route(CALLBACK_PATH, get(callback)).with_state(state)
}

/// `GET /callback`
async fn callback(
    State(s): State<CallbackState>,
    Query(q): Query<CallbackQuery>,
) -> impl IntoResponse {
    let Some(tx) = s.result_tx.lock().take() else {
        return (StatusCode::GONE, Html(s.page.failure(&AuthError::protocol("login already handled"))));
    };

    let expected = s.expected_state.lock().clone();
    let outcome = validate_callback(q, expected.as_deref());
    let response = match outcome {
        Ok(_) => (StatusCode::OK, Html(s.page.success())),
        Err(ref e) => {
            warn!("rejected login callback: {e}");
            (StatusCode::BAD_REQUEST, Html(s.page.failure(e)))
        }
    };
    let _ = tx.send(outcome);
    s.done.cancel();
    response
}

/// A bound callback listener. Nothing is served until [`receive`] runs.
///
/// [`receive`]: CallbackListener::receive
pub struct CallbackListener {
    listener: TcpListener,
    addr: SocketAddr,
    state: CallbackState,
    result_rx: oneshot::Receiver<Result<CallbackResult>>,
}

impl CallbackListener {
    /// Bind the first free candidate address.
    pub async fn bind<S: AsRef<str>>(candidates: &[S], page: ResultPage) -> Result<Self> {
        let mut tried = Vec::new();
        for candidate in candidates {
            let candidate = candidate.as_ref();
            match TcpListener::bind(candidate).await {
                Ok(listener) => {
                    let addr = listener.local_addr()?;
                    debug!(%addr, "callback listener bound");
                    let (state, result_rx) = CallbackState::new(page);
                    return Ok(Self { listener, addr, state, result_rx });
                }
                Err(e) => {
                    debug!(candidate, "callback address unavailable: {e}");
                    tried.push(candidate.to_owned());
                }
            }
        }
        Err(AuthError::network(format!(
            "no local port available for the login callback (tried {})",
            tried.join(", ")
        )))
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// URL registered with the gateway as the redirect target.
    pub fn redirect_uri(&self) -> String {
        format!("http://localhost:{}{CALLBACK_PATH}", self.addr.port())
    }

    /// Only callbacks carrying `state` are accepted.
    pub fn expect_state(&self, state: &str) {
        self.state.expect_state(state);
    }

    /// Serve until the first callback arrives, then shut down.
    ///
    /// Dropping the returned future closes the listener.
    pub async fn receive(self) -> Result<CallbackResult> {
        let Self { listener, state, mut result_rx, .. } = self;
        let done = state.done.clone();
        let serve = axum::serve(listener, build_router(state))
            .with_graceful_shutdown(done.cancelled_owned())
            .into_future();
        tokio::pin!(serve);

        tokio::select! {
            outcome = &mut result_rx => {
                if tokio::time::timeout(DRAIN_TIMEOUT, &mut serve).await.is_err() {
                    debug!("callback listener did not drain in time");
                }
                outcome.map_err(|_| AuthError::protocol("callback listener closed without a result"))?
            }
            served = &mut serve => {
                Err(AuthError::network(match served {
                    Ok(()) => "callback listener stopped unexpectedly".to_owned(),
                    Err(e) => format!("callback listener failed: {e}"),
                }))
            }
        }
    }
}

#[cfg(test)]
#[path = "callback_tests.rs"]
mod tests;
