// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! gRPC client for the control-plane gateway (`m8.gateway.v1`).
//!
//! The flow and the broker only see the [`AuthGateway`] and
//! [`ClusterGateway`] seams; [`GrpcConnector`] is the production
//! implementation behind them.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tonic::metadata::{Ascii, MetadataValue};
use tonic::service::interceptor::InterceptedService;
use tonic::transport::{Channel, ClientTlsConfig, Endpoint};
use tonic::{Request, Status};
use tracing::debug;

use crate::error::{AuthError, Result};

/// Generated protobuf types for the `m8.gateway.v1` package.
pub mod proto {
    tonic::include_proto!("m8.gateway.v1");
}

/// Boxed future returned by every gateway call.
pub type GatewayFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Default per-call transport timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Answer to `RequestUpstreamAuthentication`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamAuth {
    /// Identity provider URL to open in the browser.
    pub redirect_url: String,
    /// Anti-forgery token the callback must echo.
    pub state: String,
}

/// Answer to `RequestAuthentication`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub access_token: String,
    pub username: String,
    pub expiry: Option<DateTime<Utc>>,
}

/// A token scoped to one cluster and role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterToken {
    pub access_token: String,
    pub expiry: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterInfo {
    pub id: String,
    pub name: String,
}

/// The two-step browser login handshake.
///
/// Object-safe for use as `Arc<dyn GatewayClient>`.
pub trait AuthGateway: Send + Sync {
    fn request_upstream_authentication<'a>(
        &'a self,
        callback_url: &'a str,
    ) -> GatewayFuture<'a, UpstreamAuth>;

    fn request_authentication<'a>(
        &'a self,
        code: &'a str,
        state: &'a str,
    ) -> GatewayFuture<'a, AuthenticatedUser>;
}

/// Cluster-scoped token issuance and cluster enumeration.
pub trait ClusterGateway: Send + Sync {
    fn get_auth_token<'a>(
        &'a self,
        cluster_id: &'a str,
        role: &'a str,
    ) -> GatewayFuture<'a, ClusterToken>;

    fn list_clusters(&self) -> GatewayFuture<'_, Vec<ClusterInfo>>;
}

/// A connected client exposing both seams.
pub trait GatewayClient: AuthGateway + ClusterGateway {}

impl<T: AuthGateway + ClusterGateway> GatewayClient for T {}

/// Opens a client against a control plane, optionally presenting a bearer
/// token on every call.
pub trait Connector: Send + Sync {
    fn connect<'a>(
        &'a self,
        server: &'a str,
        token: Option<&'a str>,
    ) -> GatewayFuture<'a, Arc<dyn GatewayClient>>;
}

/// Dials the gateway over gRPC.
#[derive(Debug, Clone)]
pub struct GrpcConnector {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl Default for GrpcConnector {
    fn default() -> Self {
        Self { connect_timeout: DEFAULT_REQUEST_TIMEOUT, request_timeout: DEFAULT_REQUEST_TIMEOUT }
    }
}

impl Connector for GrpcConnector {
    fn connect<'a>(
        &'a self,
        server: &'a str,
        token: Option<&'a str>,
    ) -> GatewayFuture<'a, Arc<dyn GatewayClient>> {
        Box::pin(async move {
            let uri = endpoint_uri(server);
            let mut endpoint = Endpoint::from_shared(uri.clone())
                .map_err(|e| AuthError::config(format!("invalid server {server:?}: {e}")))?
                .connect_timeout(self.connect_timeout)
                .timeout(self.request_timeout);
            if uri.starts_with("https://") {
                endpoint = endpoint.tls_config(ClientTlsConfig::new().with_native_roots())?;
            }
            let interceptor = BearerInterceptor::new(token)?;
            let channel = endpoint.connect().await?;
            debug!(%uri, authenticated = token.is_some(), "connected to gateway");
            let client: Arc<dyn GatewayClient> = Arc::new(GrpcClient::new(channel, interceptor));
            Ok(client)
        })
    }
}

/// Servers are configured as `host:port` or a full URL; bare hosts get TLS.
pub fn endpoint_uri(server: &str) -> String {
    let server = server.trim().trim_end_matches('/');
    if server.starts_with("http://") || server.starts_with("https://") {
        server.to_owned()
    } else {
        format!("https://{server}")
    }
}

/// Attaches `authorization: Bearer <token>` to outgoing requests.
#[derive(Clone, Default)]
pub struct BearerInterceptor {
    header: Option<MetadataValue<Ascii>>,
}

impl BearerInterceptor {
    pub fn new(token: Option<&str>) -> Result<Self> {
        let header = match token {
            Some(t) if !t.is_empty() => Some(
                format!("Bearer {t}")
                    .parse::<MetadataValue<Ascii>>()
                    .map_err(|_| AuthError::config("stored token contains invalid characters"))?,
            ),
            _ => None,
        };
        Ok(Self { header })
    }
}

impl tonic::service::Interceptor for BearerInterceptor {
    fn call(&mut self, mut req: Request<()>) -> std::result::Result<Request<()>, Status> {
        if let Some(ref header) = self.header {
            req.metadata_mut().insert("authorization", header.clone());
        }
        Ok(req)
    }
}

type Authed = InterceptedService<Channel, BearerInterceptor>;

/// Cheap to clone; every call works on its own copy of the stubs.
#[derive(Clone)]
pub struct GrpcClient {
    gateway: proto::gateway_client::GatewayClient<Authed>,
    cluster_auth: proto::cluster_auth_client::ClusterAuthClient<Authed>,
    cluster: proto::cluster_client::ClusterClient<Authed>,
}

impl GrpcClient {
    pub fn new(channel: Channel, interceptor: BearerInterceptor) -> Self {
        Self {
            gateway: proto::gateway_client::GatewayClient::with_interceptor(
                channel.clone(),
                interceptor.clone(),
            ),
            cluster_auth: proto::cluster_auth_client::ClusterAuthClient::with_interceptor(
                channel.clone(),
                interceptor.clone(),
            ),
            cluster: proto::cluster_client::ClusterClient::with_interceptor(channel, interceptor),
        }
    }
}

impl AuthGateway for GrpcClient {
    fn request_upstream_authentication<'a>(
        &'a self,
        callback_url: &'a str,
    ) -> GatewayFuture<'a, UpstreamAuth> {
        Box::pin(async move {
            let mut client = self.gateway.clone();
            let resp = client
                .request_upstream_authentication(proto::UpstreamAuthenticationRequest {
                    callback_url: callback_url.to_owned(),
                })
                .await?
                .into_inner();
            if resp.upstream_idp_redirect.is_empty() {
                return Err(AuthError::protocol("gateway returned no identity provider URL"));
            }
            Ok(UpstreamAuth { redirect_url: resp.upstream_idp_redirect, state: resp.state })
        })
    }

    fn request_authentication<'a>(
        &'a self,
        code: &'a str,
        state: &'a str,
    ) -> GatewayFuture<'a, AuthenticatedUser> {
        Box::pin(async move {
            let mut client = self.gateway.clone();
            let resp = client
                .request_authentication(proto::AuthenticationRequest {
                    code: code.to_owned(),
                    state: state.to_owned(),
                })
                .await?
                .into_inner();
            if resp.access_token.is_empty() {
                return Err(AuthError::protocol("gateway returned an empty access token"));
            }
            Ok(AuthenticatedUser {
                access_token: resp.access_token,
                username: resp.username,
                expiry: timestamp_to_utc(resp.expiry),
            })
        })
    }
}

impl ClusterGateway for GrpcClient {
    fn get_auth_token<'a>(
        &'a self,
        cluster_id: &'a str,
        role: &'a str,
    ) -> GatewayFuture<'a, ClusterToken> {
        Box::pin(async move {
            let mut client = self.cluster_auth.clone();
            let resp = client
                .get_auth_token(proto::ClusterAuthTokenRequest {
                    cluster_id: cluster_id.to_owned(),
                    role: role.to_owned(),
                })
                .await?
                .into_inner();
            Ok(ClusterToken { access_token: resp.access_token, expiry: timestamp_to_utc(resp.expiry) })
        })
    }

    fn list_clusters(&self) -> GatewayFuture<'_, Vec<ClusterInfo>> {
        Box::pin(async move {
            let mut client = self.cluster.clone();
            let mut stream = client
                .get_all(proto::GetAllRequest { include_deleted: false })
                .await?
                .into_inner();
            let mut clusters = Vec::new();
            while let Some(summary) = stream.message().await? {
                clusters.push(ClusterInfo { id: summary.id, name: summary.name });
            }
            Ok(clusters)
        })
    }
}

/// A missing timestamp is the zero expiry.
pub fn timestamp_to_utc(ts: Option<prost_types::Timestamp>) -> Option<DateTime<Utc>> {
    let ts = ts?;
    let nanos = u32::try_from(ts.nanos).ok()?;
    DateTime::from_timestamp(ts.seconds, nanos)
}

pub fn utc_to_timestamp(at: DateTime<Utc>) -> prost_types::Timestamp {
    prost_types::Timestamp {
        seconds: at.timestamp(),
        nanos: i32::try_from(at.timestamp_subsec_nanos()).unwrap_or(0),
    }
}

#[cfg(test)]
#[path = "gateway_tests.rs"]
mod tests;
