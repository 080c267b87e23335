//! gRPC server implementation.

use std::net::SocketAddr;
use std::sync::Arc;
use tonic::transport::Server;
use tracing::{error, info};

use super::proto::rate_limit_service_server::RateLimitServiceServer;
use super::service::RateLimitServiceImpl;
use crate::auth::TokenAuthority;
use crate::error::{Error, Result};
use crate::ratelimit::RateLimiterBackend;

/// gRPC server for the rate limit service.
pub struct GrpcServer<R: RateLimiterBackend + 'static> {
    /// Address to bind to
    addr: SocketAddr,
    /// The rate limiter instance
    rate_limiter: Arc<R>,
    /// Token verifier, if callers may authenticate
    authority: Option<Arc<TokenAuthority>>,
}

impl<R: RateLimiterBackend + 'static> GrpcServer<R> {
    /// Create a new gRPC server where every caller is anonymous.
    pub fn new(addr: SocketAddr, rate_limiter: Arc<R>) -> Self {
        Self {
            addr,
            rate_limiter,
            authority: None,
        }
    }

    /// Identify callers by bearer tokens signed by `authority`.
    pub fn with_authority(mut self, authority: Arc<TokenAuthority>) -> Self {
        self.authority = Some(authority);
        self
    }

    fn service(&self) -> RateLimitServiceServer<RateLimitServiceImpl<R>> {
        let service = match &self.authority {
            Some(authority) => {
                RateLimitServiceImpl::with_authority(self.rate_limiter.clone(), authority.clone())
            }
            None => RateLimitServiceImpl::new(self.rate_limiter.clone()),
        };
        RateLimitServiceServer::new(service)
    }

    /// Start the gRPC server.
    ///
    /// This method will block until the server is shut down.
    pub async fn serve(self) -> Result<()> {
        info!(
            addr = %self.addr,
            authenticated = self.authority.is_some(),
            "Starting gRPC server for RateLimitService"
        );

        Server::builder()
            .add_service(self.service())
            .serve(self.addr)
            .await
            .map_err(|e| {
                error!(error = %e, "gRPC server failed");
                Error::Grpc(e)
            })
    }

    /// Start the gRPC server with graceful shutdown.
    ///
    /// The server will shut down when the provided signal resolves.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send,
    {
        info!(
            addr = %self.addr,
            authenticated = self.authority.is_some(),
            "Starting gRPC server for RateLimitService with graceful shutdown"
        );

        Server::builder()
            .add_service(self.service())
            .serve_with_shutdown(self.addr, signal)
            .await
            .map_err(|e| {
                error!(error = %e, "gRPC server failed");
                Error::Grpc(e)
            })
    }
}
