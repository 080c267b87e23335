//! gRPC boundary of the rate limit service.

mod client;
mod server;
mod service;

pub mod proto;

pub use client::RateLimitClient;
pub use server::GrpcServer;
pub use service::RateLimitServiceImpl;

// Re-export commonly used types
pub use proto::{
    rate_limit_service_client::RateLimitServiceClient,
    rate_limit_service_server::RateLimitServiceServer, CheckRateLimitRequest,
    CheckRateLimitResponse, UsageStatsRequest, UsageStatsResponse,
};
