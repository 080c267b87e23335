use tonic_build::manual::{Builder, Method, Service};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("cargo:rerun-if-changed=build.rs");

    // Messages are hand-written prost structs in src/grpc/proto.rs, so only the
    // service and client stubs are generated here.
    let service = Service::builder()
        .name("RateLimitService")
        .package("ledgerlimit.v1")
        .method(
            Method::builder()
                .name("check_rate_limit")
                .route_name("CheckRateLimit")
                .input_type("crate::grpc::proto::CheckRateLimitRequest")
                .output_type("crate::grpc::proto::CheckRateLimitResponse")
                .codec_path("tonic::codec::ProstCodec")
                .build(),
        )
        .method(
            Method::builder()
                .name("get_usage_stats")
                .route_name("GetUsageStats")
                .input_type("crate::grpc::proto::UsageStatsRequest")
                .output_type("crate::grpc::proto::UsageStatsResponse")
                .codec_path("tonic::codec::ProstCodec")
                .build(),
        )
        .build();

    Builder::new()
        .build_server(true)
        .build_client(true)
        .compile(&[service]);

    Ok(())
}
