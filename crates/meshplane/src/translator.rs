//! Canonical service list to discovery resources.
//!
//! | Service record | Resource |
//! |----------------|----------|
//! | one per service | STATIC `Cluster` with one inline endpoint at `ip:port` |
//! | all services | one `RouteConfiguration` with a route per service |
//!
//! Every service is routed by the `service` request header: a request with
//! `service: reviews` goes to the `reviews` cluster. Listener and endpoint
//! types are published empty so clients subscribing to them get an answer.

use std::sync::Arc;

use mesh_cache::ResourceSet;
use mesh_core::{BoxResource, CanonicalList, ServiceMeta, TypeUrl};
use mesh_types::envoy::config::cluster::v3::cluster::{ClusterDiscoveryType, DiscoveryType};
use mesh_types::envoy::config::cluster::v3::Cluster;
use mesh_types::envoy::config::core::v3::address;
use mesh_types::envoy::config::core::v3::socket_address::{PortSpecifier, Protocol};
use mesh_types::envoy::config::core::v3::{Address, SocketAddress};
use mesh_types::envoy::config::endpoint::v3::lb_endpoint::HostIdentifier;
use mesh_types::envoy::config::endpoint::v3::{
    ClusterLoadAssignment, Endpoint, LbEndpoint, LocalityLbEndpoints,
};
use mesh_types::envoy::config::route::v3::header_matcher::HeaderMatchSpecifier;
use mesh_types::envoy::config::route::v3::route::Action;
use mesh_types::envoy::config::route::v3::route_action::ClusterSpecifier;
use mesh_types::envoy::config::route::v3::route_match::PathSpecifier;
use mesh_types::envoy::config::route::v3::{
    HeaderMatcher, Route, RouteAction, RouteConfiguration, RouteMatch, VirtualHost,
};
use mesh_types::envoy::r#type::matcher::v3::string_matcher::MatchPattern;
use mesh_types::envoy::r#type::matcher::v3::StringMatcher;

/// Name of the single route configuration.
pub const ROUTE_CONFIG_NAME: &str = "outbound_route";

/// Name of the virtual host holding every route.
pub const VIRTUAL_HOST_NAME: &str = "mesh";

/// Request header selecting the destination service.
pub const SERVICE_HEADER: &str = "service";

/// Translate a canonical list into the resources published for it.
///
/// Output order follows the list, so equal lists give byte-identical
/// resources.
///
/// # Panics
///
/// Panics if a record has no address or a zero port. The registry drops
/// such records, so reaching one here is a bug.
///
/// # Example
///
/// ```rust
/// use mesh_core::{CanonicalList, ServiceMeta, TypeUrl};
///
/// let (list, _) = CanonicalList::from_records(vec![ServiceMeta::new("reviews", "10.0.0.7", 9080)]);
/// let resources = meshplane::translate(&list);
///
/// assert_eq!(resources.get(TypeUrl::CLUSTER).unwrap().len(), 1);
/// assert_eq!(resources.get(TypeUrl::ROUTE).unwrap().len(), 1);
/// ```
pub fn translate(services: &CanonicalList) -> ResourceSet {
    let clusters: Vec<BoxResource> = services
        .iter()
        .map(|service| Arc::new(build_cluster(service)) as BoxResource)
        .collect();

    let routes: Vec<BoxResource> = vec![Arc::new(build_route_config(services))];

    ResourceSet::new()
        .with_type(TypeUrl::CLUSTER, clusters)
        .with_type(TypeUrl::ROUTE, routes)
        .with_type(TypeUrl::LISTENER, vec![])
        .with_type(TypeUrl::ENDPOINT, vec![])
}

/// STATIC cluster with the service's address inlined.
pub fn build_cluster(service: &ServiceMeta) -> Cluster {
    if !service.has_address() {
        panic!(
            "service {:?} has no usable address ({:?}:{})",
            service.name, service.ip, service.port
        );
    }

    let endpoint = LbEndpoint {
        host_identifier: Some(HostIdentifier::Endpoint(Endpoint {
            address: Some(Address {
                address: Some(address::Address::SocketAddress(SocketAddress {
                    protocol: Protocol::Tcp as i32,
                    address: service.ip.clone(),
                    port_specifier: Some(PortSpecifier::PortValue(u32::from(service.port))),
                })),
            }),
        })),
        health_status: 0,
    };

    Cluster {
        name: service.name.clone(),
        cluster_discovery_type: Some(ClusterDiscoveryType::Type(DiscoveryType::Static as i32)),
        connect_timeout: service
            .connect_timeout
            .as_duration()
            .map(|d| prost_types::Duration {
                seconds: d.as_secs() as i64,
                nanos: d.subsec_nanos() as i32,
            }),
        load_assignment: Some(ClusterLoadAssignment {
            cluster_name: service.name.clone(),
            endpoints: vec![LocalityLbEndpoints {
                locality: None,
                lb_endpoints: vec![endpoint],
                priority: 0,
            }],
        }),
    }
}

/// The route configuration for all services, in list order.
pub fn build_route_config(services: &CanonicalList) -> RouteConfiguration {
    RouteConfiguration {
        name: ROUTE_CONFIG_NAME.to_string(),
        virtual_hosts: vec![VirtualHost {
            name: VIRTUAL_HOST_NAME.to_string(),
            domains: vec!["*".to_string()],
            routes: services.iter().map(build_route).collect(),
        }],
    }
}

fn build_route(service: &ServiceMeta) -> Route {
    Route {
        name: service.name.clone(),
        r#match: Some(RouteMatch {
            path_specifier: Some(PathSpecifier::Prefix("/".to_string())),
            headers: vec![HeaderMatcher {
                name: SERVICE_HEADER.to_string(),
                header_match_specifier: Some(HeaderMatchSpecifier::StringMatch(StringMatcher {
                    match_pattern: Some(MatchPattern::Exact(service.name.clone())),
                })),
            }],
        }),
        action: Some(Action::Route(RouteAction {
            cluster_specifier: Some(ClusterSpecifier::Cluster(service.name.clone())),
        })),
    }
}
