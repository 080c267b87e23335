//! Rate limit service implementation.

use std::sync::Arc;
use tonic::{Request, Response, Status};
use tracing::{debug, error, instrument, warn};

use super::proto::rate_limit_service_server::RateLimitService;
use super::proto::{
    CheckRateLimitRequest, CheckRateLimitResponse, UsageStatsRequest, UsageStatsResponse,
};

use crate::auth::{bearer_token, TokenAuthority, AUTHORIZATION};
use crate::error::Error;
use crate::ratelimit::{Identity, RateLimiterBackend};

/// Implementation of the `RateLimitService` gRPC interface.
pub struct RateLimitServiceImpl<R: RateLimiterBackend> {
    /// The rate limiter instance
    rate_limiter: Arc<R>,
    /// Verifies bearer tokens; without one every caller is anonymous
    authority: Option<Arc<TokenAuthority>>,
}

impl<R: RateLimiterBackend> RateLimitServiceImpl<R> {
    /// Create a service that treats every caller as anonymous.
    pub fn new(rate_limiter: Arc<R>) -> Self {
        Self {
            rate_limiter,
            authority: None,
        }
    }

    /// Create a service that identifies callers by their bearer tokens.
    pub fn with_authority(rate_limiter: Arc<R>, authority: Arc<TokenAuthority>) -> Self {
        Self {
            rate_limiter,
            authority: Some(authority),
        }
    }

    /// Resolve the caller from request metadata.
    ///
    /// No credentials means anonymous. Credentials that fail verification
    /// are rejected rather than downgraded.
    fn identify<T>(&self, request: &Request<T>) -> Result<Option<Identity>, Status> {
        let Some(authority) = self.authority.as_ref() else {
            return Ok(None);
        };
        let Some(value) = request.metadata().get(AUTHORIZATION) else {
            return Ok(None);
        };

        let token = value
            .to_str()
            .ok()
            .and_then(bearer_token)
            .ok_or_else(|| Status::unauthenticated("malformed authorization metadata"))?;

        authority.verify(token).map(Some).map_err(|e| {
            warn!(error = %e, "Rejected caller credentials");
            Status::unauthenticated("invalid credentials")
        })
    }
}

/// Map a crate error onto a client-visible status without leaking detail.
fn status_for(err: Error) -> Status {
    match err {
        Error::InvalidArgument(msg) => Status::invalid_argument(msg),
        Error::Unauthenticated | Error::Token(_) => Status::unauthenticated("authentication required"),
        Error::RateLimited { action, .. } => {
            Status::resource_exhausted(format!("rate limit exceeded for {}", action))
        }
        other => {
            error!(error = %other, "Rate limit backend failure");
            Status::internal("rate limit backend failure")
        }
    }
}

#[tonic::async_trait]
impl<R: RateLimiterBackend + 'static> RateLimitService for RateLimitServiceImpl<R> {
    /// Decide whether the caller may perform an action.
    #[instrument(skip(self, request), fields(action = %request.get_ref().action))]
    async fn check_rate_limit(
        &self,
        request: Request<CheckRateLimitRequest>,
    ) -> Result<Response<CheckRateLimitResponse>, Status> {
        if request.get_ref().action.is_empty() {
            warn!("Received rate limit check without an action");
            return Err(Status::invalid_argument("action is required"));
        }

        let identity = self.identify(&request)?;
        let req = request.into_inner();

        let decision = self
            .rate_limiter
            .check_rate_limit(identity.as_ref(), &req.action)
            .await
            .map_err(status_for)?;

        if !decision.allowed {
            warn!(
                uid = identity.as_ref().map(|id| id.uid.as_str()),
                action = %req.action,
                reset_at = decision.reset_at,
                "Rate limit exceeded"
            );
        }

        Ok(Response::new(decision.into()))
    }

    /// Report the caller's usage of every quota in their tier.
    #[instrument(skip(self, request))]
    async fn get_usage_stats(
        &self,
        request: Request<UsageStatsRequest>,
    ) -> Result<Response<UsageStatsResponse>, Status> {
        let Some(identity) = self.identify(&request)? else {
            return Err(Status::unauthenticated("authentication required"));
        };

        let stats = self
            .rate_limiter
            .usage_stats(Some(&identity))
            .await
            .map_err(status_for)?;

        debug!(uid = %identity.uid, actions = stats.len(), "Reporting usage");
        Ok(Response::new(stats.into()))
    }
}
