//! Client for guarding actions with a remote rate limit service.

use std::future::Future;
use std::sync::Arc;

use tonic::metadata::{Ascii, MetadataValue};
use tonic::transport::{Channel, Endpoint};
use tonic::Request;
use tracing::{debug, warn};

use super::proto::rate_limit_service_client::RateLimitServiceClient;
use super::proto::{CheckRateLimitRequest, UsageStatsRequest};
use crate::auth::AUTHORIZATION;
use crate::clock::{Clock, SystemClock};
use crate::error::{Error, Result};
use crate::ratelimit::{fail_open, Decision, UsageStats};

/// A rate limit client that never blocks the caller on service failure.
#[derive(Clone)]
pub struct RateLimitClient {
    inner: RateLimitServiceClient<Channel>,
    token: Option<String>,
    clock: Arc<dyn Clock>,
}

impl RateLimitClient {
    /// Create a client for `endpoint`. The connection is made on first use.
    pub fn connect_lazy(endpoint: impl Into<String>) -> Result<Self> {
        let endpoint = Endpoint::from_shared(endpoint.into())
            .map_err(|e| Error::InvalidArgument(format!("invalid endpoint: {}", e)))?;
        Ok(Self::new(endpoint.connect_lazy()))
    }

    pub fn new(channel: Channel) -> Self {
        Self {
            inner: RateLimitServiceClient::new(channel),
            token: None,
            clock: Arc::new(SystemClock),
        }
    }

    /// Authenticate calls with a bearer token.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    fn request<T>(&self, message: T) -> Result<Request<T>> {
        let mut request = Request::new(message);
        if let Some(ref token) = self.token {
            let value: MetadataValue<Ascii> = format!("Bearer {}", token)
                .parse()
                .map_err(|_| Error::InvalidArgument("token is not valid metadata".to_string()))?;
            request.metadata_mut().insert(AUTHORIZATION, value);
        }
        Ok(request)
    }

    /// Check an action, surfacing every failure.
    pub async fn try_check(&mut self, action: &str) -> Result<Decision> {
        let request = self.request(CheckRateLimitRequest {
            action: action.to_string(),
        })?;
        let response = self.inner.check_rate_limit(request).await?;
        Ok(response.into_inner().into())
    }

    /// Check an action, allowing it if the service cannot be reached.
    pub async fn check(&mut self, action: &str) -> Decision {
        let result = self.try_check(action).await;
        let decision = fail_open(result, self.clock.now_millis());
        if !decision.allowed {
            debug!(action = action, reset_at = decision.reset_at, "Action rate limited");
        }
        decision
    }

    /// Usage statistics for the authenticated caller.
    ///
    /// `None` without a token or when the service fails.
    pub async fn usage_stats(&mut self) -> Option<UsageStats> {
        self.token.as_ref()?;

        let request = self.request(UsageStatsRequest {}).ok()?;
        match self.inner.get_usage_stats(request).await {
            Ok(response) => Some(response.into_inner().into()),
            Err(status) => {
                warn!(code = ?status.code(), message = %status.message(), "Could not fetch usage statistics");
                None
            }
        }
    }

    /// Run `f` if `action` is allowed, otherwise return [`Error::RateLimited`].
    pub async fn execute_with_rate_limit<T, F, Fut>(&mut self, action: &str, f: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let decision = self.check(action).await;
        if !decision.allowed {
            return Err(Error::RateLimited {
                action: action.to_string(),
                reset_at: decision.reset_at,
            });
        }
        Ok(f().await)
    }
}
