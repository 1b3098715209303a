//! Build script for mesh-types.
//!
//! The discovery messages are hand-written prost types in `src/lib.rs`, so
//! only the gRPC service glue has to be generated. The manual builder does
//! that without a `protoc` install.

use tonic_build::manual::{Builder, Method, Service};

const DISCOVERY: &str = "crate::envoy::service::discovery::v3";

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    let ads = Service::builder()
        .name("AggregatedDiscoveryService")
        .package("envoy.service.discovery.v3")
        .method(
            Method::builder()
                .name("stream_aggregated_resources")
                .route_name("StreamAggregatedResources")
                .input_type(format!("{DISCOVERY}::DiscoveryRequest"))
                .output_type(format!("{DISCOVERY}::DiscoveryResponse"))
                .codec_path("tonic::codec::ProstCodec")
                .client_streaming()
                .server_streaming()
                .build(),
        )
        .build();

    Builder::new()
        .build_client(true)
        .build_server(true)
        .compile(&[ads]);
}
