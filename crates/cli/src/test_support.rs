// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test infrastructure: an in-memory control plane, a fake browser,
//! and assertion helpers.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Once};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::Mutex;
use tonic::{Request, Response, Status};

use crate::auth::flow::BrowserOpener;
use crate::error::{AuthError, Result};
use crate::gateway::{
    proto, utc_to_timestamp, AuthGateway, AuthenticatedUser, ClusterGateway, ClusterInfo,
    ClusterToken, Connector, GatewayClient, GatewayFuture, UpstreamAuth,
};

static CRYPTO_INIT: Once = Once::new();

/// Install the ring crypto provider for reqwest/rustls.
pub fn ensure_crypto() {
    CRYPTO_INIT.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

#[derive(Default)]
struct Counters {
    connects: AtomicU32,
    upstream: AtomicU32,
    authenticate: AtomicU32,
    token: AtomicU32,
    list: AtomicU32,
}

struct PlaneState {
    username: String,
    code: String,
    state: String,
    user_token_ttl: TimeDelta,
    cluster_token_ttl: TimeDelta,
    clusters: Vec<ClusterInfo>,
    failing_clusters: HashSet<String>,
    reject_next_token_calls: u32,
    fail_listing: bool,
    token_delay: Duration,
    issued: u32,
}

/// In-memory control plane.
///
/// Its identity provider redirects straight back to the callback URL with a
/// fixed code and state, so a [`FakeBrowser`] completes the login by
/// fetching the redirect URL.
#[derive(Clone)]
pub struct FakeControlPlane {
    state: Arc<Mutex<PlaneState>>,
    counters: Arc<Counters>,
}

impl Default for FakeControlPlane {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeControlPlane {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(PlaneState {
                username: "alice@example.com".to_owned(),
                code: "auth-code".to_owned(),
                state: "state-xyz".to_owned(),
                user_token_ttl: TimeDelta::hours(12),
                cluster_token_ttl: TimeDelta::hours(1),
                clusters: Vec::new(),
                failing_clusters: HashSet::new(),
                reject_next_token_calls: 0,
                fail_listing: false,
                token_delay: Duration::ZERO,
                issued: 0,
            })),
            counters: Arc::new(Counters::default()),
        }
    }

    pub fn with_clusters(self, ids: &[&str]) -> Self {
        self.state.lock().clusters = ids
            .iter()
            .map(|id| ClusterInfo { id: (*id).to_owned(), name: format!("{id}-name") })
            .collect();
        self
    }

    pub fn with_username(self, username: &str) -> Self {
        self.state.lock().username = username.to_owned();
        self
    }

    pub fn with_cluster_token_ttl(self, ttl: TimeDelta) -> Self {
        self.state.lock().cluster_token_ttl = ttl;
        self
    }

    pub fn with_token_delay(self, delay: Duration) -> Self {
        self.state.lock().token_delay = delay;
        self
    }

    pub fn fail_cluster(&self, id: &str) {
        self.state.lock().failing_clusters.insert(id.to_owned());
    }

    pub fn fail_listing(&self) {
        self.state.lock().fail_listing = true;
    }

    /// The next `n` cluster token calls answer `Unauthenticated`.
    pub fn reject_next_token_calls(&self, n: u32) {
        self.state.lock().reject_next_token_calls = n;
    }

    /// The state the identity provider hands back.
    pub fn set_returned_state(&self, state: &str) {
        self.state.lock().state = state.to_owned();
    }

    pub fn connects(&self) -> u32 {
        self.counters.connects.load(Ordering::SeqCst)
    }

    pub fn upstream_calls(&self) -> u32 {
        self.counters.upstream.load(Ordering::SeqCst)
    }

    pub fn authenticate_calls(&self) -> u32 {
        self.counters.authenticate.load(Ordering::SeqCst)
    }

    pub fn token_calls(&self) -> u32 {
        self.counters.token.load(Ordering::SeqCst)
    }

    pub fn list_calls(&self) -> u32 {
        self.counters.list.load(Ordering::SeqCst)
    }

    /// Total number of gateway RPCs served.
    pub fn rpc_calls(&self) -> u32 {
        self.upstream_calls() + self.authenticate_calls() + self.token_calls() + self.list_calls()
    }

    fn upstream(&self, callback_url: &str) -> Result<UpstreamAuth> {
        self.counters.upstream.fetch_add(1, Ordering::SeqCst);
        let s = self.state.lock();
        Ok(UpstreamAuth {
            redirect_url: format!("{callback_url}?code={}&state={}", s.code, s.state),
            state: "state-xyz".to_owned(),
        })
    }

    fn authenticate(&self, code: &str, state: &str) -> Result<AuthenticatedUser> {
        self.counters.authenticate.fetch_add(1, Ordering::SeqCst);
        let mut s = self.state.lock();
        if code != s.code || state != "state-xyz" {
            return Err(AuthError::from(Status::unauthenticated("bad code")));
        }
        s.issued += 1;
        Ok(AuthenticatedUser {
            access_token: format!("user-token-{}", s.issued),
            username: s.username.clone(),
            expiry: Some(Utc::now() + s.user_token_ttl),
        })
    }

    async fn token(&self, cluster_id: &str, role: &str) -> Result<ClusterToken> {
        self.counters.token.fetch_add(1, Ordering::SeqCst);
        let delay = self.state.lock().token_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let mut s = self.state.lock();
        if s.reject_next_token_calls > 0 {
            s.reject_next_token_calls -= 1;
            return Err(AuthError::from(Status::unauthenticated("token expired")));
        }
        if s.failing_clusters.contains(cluster_id) {
            return Err(AuthError::from(Status::not_found(format!("cluster {cluster_id}"))));
        }
        s.issued += 1;
        Ok(ClusterToken {
            access_token: format!("cluster-token-{cluster_id}-{role}-{}", s.issued),
            expiry: Some(Utc::now() + s.cluster_token_ttl),
        })
    }

    fn list(&self) -> Result<Vec<ClusterInfo>> {
        self.counters.list.fetch_add(1, Ordering::SeqCst);
        let s = self.state.lock();
        if s.fail_listing {
            return Err(AuthError::from(Status::internal("listing unavailable")));
        }
        Ok(s.clusters.clone())
    }
}

impl AuthGateway for FakeControlPlane {
    fn request_upstream_authentication<'a>(
        &'a self,
        callback_url: &'a str,
    ) -> GatewayFuture<'a, UpstreamAuth> {
        Box::pin(async move { self.upstream(callback_url) })
    }

    fn request_authentication<'a>(
        &'a self,
        code: &'a str,
        state: &'a str,
    ) -> GatewayFuture<'a, AuthenticatedUser> {
        Box::pin(async move { self.authenticate(code, state) })
    }
}

impl ClusterGateway for FakeControlPlane {
    fn get_auth_token<'a>(
        &'a self,
        cluster_id: &'a str,
        role: &'a str,
    ) -> GatewayFuture<'a, ClusterToken> {
        Box::pin(self.token(cluster_id, role))
    }

    fn list_clusters(&self) -> GatewayFuture<'_, Vec<ClusterInfo>> {
        Box::pin(async move { self.list() })
    }
}

/// Hands out the shared [`FakeControlPlane`] and records every connect.
#[derive(Clone)]
pub struct FakeConnector {
    pub plane: FakeControlPlane,
    tokens: Arc<Mutex<Vec<Option<String>>>>,
}

impl FakeConnector {
    pub fn new(plane: FakeControlPlane) -> Self {
        Self { plane, tokens: Arc::new(Mutex::new(Vec::new())) }
    }

    /// Bearer tokens presented on each connect, in order.
    pub fn presented_tokens(&self) -> Vec<Option<String>> {
        self.tokens.lock().clone()
    }
}

impl Connector for FakeConnector {
    fn connect<'a>(
        &'a self,
        _server: &'a str,
        token: Option<&'a str>,
    ) -> GatewayFuture<'a, Arc<dyn GatewayClient>> {
        Box::pin(async move {
            self.plane.counters.connects.fetch_add(1, Ordering::SeqCst);
            self.tokens.lock().push(token.map(str::to_owned));
            let client: Arc<dyn GatewayClient> = Arc::new(self.plane.clone());
            Ok(client)
        })
    }
}

/// Follows the identity provider redirect like a real browser would.
#[derive(Clone, Default)]
pub struct FakeBrowser {
    opened: Arc<Mutex<Vec<String>>>,
    responses: Arc<Mutex<Vec<(u16, String)>>>,
}

impl FakeBrowser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn opened(&self) -> Vec<String> {
        self.opened.lock().clone()
    }

    /// Status and body of every completed visit.
    pub fn responses(&self) -> Vec<(u16, String)> {
        self.responses.lock().clone()
    }
}

impl BrowserOpener for FakeBrowser {
    fn open(&self, url: &str) -> anyhow::Result<()> {
        ensure_crypto();
        self.opened.lock().push(url.to_owned());
        let url = url.to_owned();
        let responses = Arc::clone(&self.responses);
        tokio::spawn(async move {
            if let Ok(resp) = reqwest::get(&url).await {
                let status = resp.status().as_u16();
                let body = resp.text().await.unwrap_or_default();
                responses.lock().push((status, body));
            }
        });
        Ok(())
    }
}

/// Records the URL and never visits it.
#[derive(Clone, Default)]
pub struct IdleBrowser {
    opened: Arc<Mutex<Vec<String>>>,
}

impl IdleBrowser {
    pub fn opened(&self) -> Vec<String> {
        self.opened.lock().clone()
    }
}

impl BrowserOpener for IdleBrowser {
    fn open(&self, url: &str) -> anyhow::Result<()> {
        self.opened.lock().push(url.to_owned());
        Ok(())
    }
}

/// Fails to launch; the flow must keep waiting for the callback.
pub struct BrokenBrowser;

impl BrowserOpener for BrokenBrowser {
    fn open(&self, _url: &str) -> anyhow::Result<()> {
        anyhow::bail!("no display")
    }
}

/// Convert any `Display` error into `anyhow` (for results whose error type is
/// not `std::error::Error`, such as `axum_test`'s).
pub trait AnyhowExt<T> {
    fn anyhow(self) -> anyhow::Result<T>;
}

impl<T, E: std::fmt::Display> AnyhowExt<T> for std::result::Result<T, E> {
    fn anyhow(self) -> anyhow::Result<T> {
        self.map_err(|e| anyhow::anyhow!("{e}"))
    }
}

/// Expiry `secs` seconds from now.
pub fn expiry_in(secs: i64) -> Option<DateTime<Utc>> {
    Some(Utc::now() + TimeDelta::seconds(secs))
}

// -- gRPC server side ---------------------------------------------------------

fn bearer(metadata: &tonic::metadata::MetadataMap) -> std::result::Result<(), Status> {
    metadata
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .filter(|t| !t.is_empty())
        .map(|_| ())
        .ok_or_else(|| Status::unauthenticated("missing bearer token"))
}

fn to_status(err: AuthError) -> Status {
    match err {
        AuthError::Rpc(status) => status,
        AuthError::Unauthenticated(msg) => Status::unauthenticated(msg),
        other => Status::internal(other.to_string()),
    }
}

#[tonic::async_trait]
impl proto::gateway_server::Gateway for FakeControlPlane {
    async fn request_upstream_authentication(
        &self,
        request: Request<proto::UpstreamAuthenticationRequest>,
    ) -> std::result::Result<Response<proto::UpstreamAuthenticationResponse>, Status> {
        let auth = self.upstream(&request.into_inner().callback_url).map_err(to_status)?;
        Ok(Response::new(proto::UpstreamAuthenticationResponse {
            upstream_idp_redirect: auth.redirect_url,
            state: auth.state,
        }))
    }

    async fn request_authentication(
        &self,
        request: Request<proto::AuthenticationRequest>,
    ) -> std::result::Result<Response<proto::AuthenticationResponse>, Status> {
        let req = request.into_inner();
        let user = self.authenticate(&req.code, &req.state).map_err(to_status)?;
        Ok(Response::new(proto::AuthenticationResponse {
            access_token: user.access_token,
            username: user.username,
            expiry: user.expiry.map(utc_to_timestamp),
        }))
    }
}

#[tonic::async_trait]
impl proto::cluster_auth_server::ClusterAuth for FakeControlPlane {
    async fn get_auth_token(
        &self,
        request: Request<proto::ClusterAuthTokenRequest>,
    ) -> std::result::Result<Response<proto::ClusterAuthTokenResponse>, Status> {
        bearer(request.metadata())?;
        let req = request.into_inner();
        let token = self.token(&req.cluster_id, &req.role).await.map_err(to_status)?;
        Ok(Response::new(proto::ClusterAuthTokenResponse {
            access_token: token.access_token,
            expiry: token.expiry.map(utc_to_timestamp),
        }))
    }
}

type SummaryStream = std::pin::Pin<
    Box<dyn tokio_stream::Stream<Item = std::result::Result<proto::ClusterSummary, Status>> + Send>,
>;

#[tonic::async_trait]
impl proto::cluster_server::Cluster for FakeControlPlane {
    type GetAllStream = SummaryStream;

    async fn get_all(
        &self,
        request: Request<proto::GetAllRequest>,
    ) -> std::result::Result<Response<Self::GetAllStream>, Status> {
        bearer(request.metadata())?;
        let clusters = self.list().map_err(to_status)?;
        let items = clusters.into_iter().map(|c| {
            Ok::<_, Status>(proto::ClusterSummary {
                display_name: c.name.clone(),
                id: c.id,
                name: c.name,
            })
        });
        Ok(Response::new(Box::pin(tokio_stream::iter(items))))
    }
}

/// Serve `plane` over gRPC on a random port.
///
/// Returns the bound address and a join handle for the server task.
pub async fn spawn_grpc_gateway(
    plane: FakeControlPlane,
) -> anyhow::Result<(SocketAddr, tokio::task::JoinHandle<()>)> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let incoming = tokio_stream::wrappers::TcpListenerStream::new(listener);
    let router = tonic::transport::Server::builder()
        .add_service(proto::gateway_server::GatewayServer::new(plane.clone()))
        .add_service(proto::cluster_auth_server::ClusterAuthServer::new(plane.clone()))
        .add_service(proto::cluster_server::ClusterServer::new(plane));
    let handle = tokio::spawn(async move {
        let _ = router.serve_with_incoming(incoming).await;
    });
    Ok((addr, handle))
}

/// Assert that an expression evaluates to `Err` whose Display output
/// contains the given substring.
#[macro_export]
macro_rules! assert_err_contains {
    ($expr:expr, $substr:expr) => {{
        let result = $expr;
        let err = result.expect_err(concat!("expected Err for: ", stringify!($expr)));
        let msg = err.to_string();
        assert!(msg.contains($substr), "expected error containing {:?}, got: {msg:?}", $substr);
    }};
}
