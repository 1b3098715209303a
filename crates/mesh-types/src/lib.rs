//! # mesh-types
//!
//! Protobuf types for the Envoy discovery APIs meshplane speaks.
//!
//! This crate provides the subset of the Envoy v3 API the control plane
//! needs, as prost messages with the upstream field numbers:
//!
//! - Discovery service types (DiscoveryRequest, DiscoveryResponse, Node)
//! - Resource types the translator emits (Cluster, ClusterLoadAssignment,
//!   RouteConfiguration)
//! - The `AggregatedDiscoveryService` gRPC client and server, generated at
//!   build time
//!
//! Unknown fields sent by a proxy are skipped by prost on decode, so the
//! partial message definitions interoperate with full Envoy clients.
//!
//! The resource messages implement [`mesh_core::Resource`]. Because
//! [`prost::Message`] also has an `encode` method, call
//! `Resource::encode(&msg)` when both traits are in scope.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![allow(missing_docs)] // Message fields mirror the upstream protos

pub use prost::Message;
pub use prost_types::Any;

use std::any::Any as StdAny;

use mesh_core::{Resource, TypeUrl};

pub mod envoy {
    //! Envoy API types.

    pub mod service {
        //! Envoy discovery service definitions.

        pub mod discovery {
            //! Core discovery service types.

            pub mod v3 {
                //! Discovery service v3 API.

                use crate::envoy::config::core::v3::{ControlPlane, Node};
                use crate::google::rpc::Status;

                /// Discovery request sent by clients.
                #[derive(Clone, PartialEq, ::prost::Message)]
                pub struct DiscoveryRequest {
                    /// Version of the last accepted response (empty on first request).
                    #[prost(string, tag = "1")]
                    pub version_info: String,
                    /// Node information.
                    #[prost(message, optional, tag = "2")]
                    pub node: Option<Node>,
                    /// Requested resource names (empty for wildcard).
                    #[prost(string, repeated, tag = "3")]
                    pub resource_names: Vec<String>,
                    /// Type URL of requested resources.
                    #[prost(string, tag = "4")]
                    pub type_url: String,
                    /// Nonce of the response being acknowledged.
                    #[prost(string, tag = "5")]
                    pub response_nonce: String,
                    /// Set when the client rejects the last response (NACK).
                    #[prost(message, optional, tag = "6")]
                    pub error_detail: Option<Status>,
                }

                /// Discovery response sent by servers.
                #[derive(Clone, PartialEq, ::prost::Message)]
                pub struct DiscoveryResponse {
                    /// Version of this response.
                    #[prost(string, tag = "1")]
                    pub version_info: String,
                    /// Complete set of resources of one type.
                    #[prost(message, repeated, tag = "2")]
                    pub resources: Vec<::prost_types::Any>,
                    #[prost(bool, tag = "3")]
                    pub canary: bool,
                    /// Type URL of the resources.
                    #[prost(string, tag = "4")]
                    pub type_url: String,
                    /// Unique nonce for this response.
                    #[prost(string, tag = "5")]
                    pub nonce: String,
                    /// Control plane identifier.
                    #[prost(message, optional, tag = "6")]
                    pub control_plane: Option<ControlPlane>,
                }

                include!(concat!(
                    env!("OUT_DIR"),
                    "/envoy.service.discovery.v3.AggregatedDiscoveryService.rs"
                ));
            }
        }
    }

    pub mod config {
        //! Envoy configuration types.

        pub mod core {
            //! Core configuration types.

            pub mod v3 {
                //! Core v3 API.

                /// Node information.
                #[derive(Clone, PartialEq, ::prost::Message)]
                pub struct Node {
                    /// Node identifier.
                    #[prost(string, tag = "1")]
                    pub id: String,
                    /// Cluster the node belongs to.
                    #[prost(string, tag = "2")]
                    pub cluster: String,
                    #[prost(string, tag = "6")]
                    pub user_agent_name: String,
                }

                /// Control plane identifier.
                #[derive(Clone, PartialEq, ::prost::Message)]
                pub struct ControlPlane {
                    #[prost(string, tag = "1")]
                    pub identifier: String,
                }

                /// Locality information.
                #[derive(Clone, PartialEq, ::prost::Message)]
                pub struct Locality {
                    #[prost(string, tag = "1")]
                    pub region: String,
                    #[prost(string, tag = "2")]
                    pub zone: String,
                    #[prost(string, tag = "3")]
                    pub sub_zone: String,
                }

                /// Address.
                #[derive(Clone, PartialEq, ::prost::Message)]
                pub struct Address {
                    #[prost(oneof = "address::Address", tags = "1")]
                    pub address: Option<address::Address>,
                }

                pub mod address {
                    //! Address types.

                    #[derive(Clone, PartialEq, ::prost::Oneof)]
                    pub enum Address {
                        #[prost(message, tag = "1")]
                        SocketAddress(super::SocketAddress),
                    }
                }

                /// Socket address.
                #[derive(Clone, PartialEq, ::prost::Message)]
                pub struct SocketAddress {
                    #[prost(enumeration = "socket_address::Protocol", tag = "1")]
                    pub protocol: i32,
                    #[prost(string, tag = "2")]
                    pub address: String,
                    #[prost(oneof = "socket_address::PortSpecifier", tags = "3")]
                    pub port_specifier: Option<socket_address::PortSpecifier>,
                }

                pub mod socket_address {
                    //! Socket address sub-types.

                    #[derive(
                        Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration,
                    )]
                    #[repr(i32)]
                    pub enum Protocol {
                        Tcp = 0,
                        Udp = 1,
                    }

                    #[derive(Clone, PartialEq, ::prost::Oneof)]
                    pub enum PortSpecifier {
                        #[prost(uint32, tag = "3")]
                        PortValue(u32),
                    }
                }
            }
        }

        pub mod cluster {
            //! Cluster configuration.

            pub mod v3 {
                //! Cluster v3 API.

                use crate::envoy::config::endpoint::v3::ClusterLoadAssignment;

                /// Cluster configuration.
                #[derive(Clone, PartialEq, ::prost::Message)]
                pub struct Cluster {
                    /// Cluster name.
                    #[prost(string, tag = "1")]
                    pub name: String,
                    #[prost(oneof = "cluster::ClusterDiscoveryType", tags = "2")]
                    pub cluster_discovery_type: Option<cluster::ClusterDiscoveryType>,
                    /// Timeout for new upstream connections.
                    #[prost(message, optional, tag = "4")]
                    pub connect_timeout: Option<::prost_types::Duration>,
                    /// Inline endpoints for STATIC clusters.
                    #[prost(message, optional, tag = "33")]
                    pub load_assignment: Option<ClusterLoadAssignment>,
                }

                pub mod cluster {
                    //! Cluster sub-types.

                    #[derive(
                        Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration,
                    )]
                    #[repr(i32)]
                    pub enum DiscoveryType {
                        Static = 0,
                        StrictDns = 1,
                        LogicalDns = 2,
                        Eds = 3,
                        OriginalDst = 4,
                    }

                    #[derive(Clone, PartialEq, ::prost::Oneof)]
                    pub enum ClusterDiscoveryType {
                        #[prost(enumeration = "DiscoveryType", tag = "2")]
                        Type(i32),
                    }
                }
            }
        }

        pub mod endpoint {
            //! Endpoint configuration.

            pub mod v3 {
                //! Endpoint v3 API.

                use crate::envoy::config::core::v3::{Address, Locality};

                /// Cluster load assignment.
                #[derive(Clone, PartialEq, ::prost::Message)]
                pub struct ClusterLoadAssignment {
                    #[prost(string, tag = "1")]
                    pub cluster_name: String,
                    #[prost(message, repeated, tag = "2")]
                    pub endpoints: Vec<LocalityLbEndpoints>,
                }

                /// Locality LB endpoints.
                #[derive(Clone, PartialEq, ::prost::Message)]
                pub struct LocalityLbEndpoints {
                    #[prost(message, optional, tag = "1")]
                    pub locality: Option<Locality>,
                    #[prost(message, repeated, tag = "2")]
                    pub lb_endpoints: Vec<LbEndpoint>,
                    #[prost(uint32, tag = "5")]
                    pub priority: u32,
                }

                /// Load balancing endpoint.
                #[derive(Clone, PartialEq, ::prost::Message)]
                pub struct LbEndpoint {
                    #[prost(oneof = "lb_endpoint::HostIdentifier", tags = "1")]
                    pub host_identifier: Option<lb_endpoint::HostIdentifier>,
                    #[prost(int32, tag = "2")]
                    pub health_status: i32,
                }

                pub mod lb_endpoint {
                    //! LB endpoint sub-types.

                    #[derive(Clone, PartialEq, ::prost::Oneof)]
                    pub enum HostIdentifier {
                        #[prost(message, tag = "1")]
                        Endpoint(super::Endpoint),
                    }
                }

                /// Upstream host.
                #[derive(Clone, PartialEq, ::prost::Message)]
                pub struct Endpoint {
                    #[prost(message, optional, tag = "1")]
                    pub address: Option<Address>,
                }
            }
        }

        pub mod route {
            //! Route configuration.

            pub mod v3 {
                //! Route v3 API.

                use crate::envoy::r#type::matcher::v3::StringMatcher;

                /// Route configuration.
                #[derive(Clone, PartialEq, ::prost::Message)]
                pub struct RouteConfiguration {
                    #[prost(string, tag = "1")]
                    pub name: String,
                    #[prost(message, repeated, tag = "2")]
                    pub virtual_hosts: Vec<VirtualHost>,
                }

                /// Virtual host.
                #[derive(Clone, PartialEq, ::prost::Message)]
                pub struct VirtualHost {
                    #[prost(string, tag = "1")]
                    pub name: String,
                    #[prost(string, repeated, tag = "2")]
                    pub domains: Vec<String>,
                    #[prost(message, repeated, tag = "3")]
                    pub routes: Vec<Route>,
                }

                /// A single route.
                #[derive(Clone, PartialEq, ::prost::Message)]
                pub struct Route {
                    #[prost(message, optional, tag = "1")]
                    pub r#match: Option<RouteMatch>,
                    #[prost(oneof = "route::Action", tags = "2")]
                    pub action: Option<route::Action>,
                    #[prost(string, tag = "14")]
                    pub name: String,
                }

                pub mod route {
                    //! Route sub-types.

                    #[derive(Clone, PartialEq, ::prost::Oneof)]
                    pub enum Action {
                        #[prost(message, tag = "2")]
                        Route(super::RouteAction),
                    }
                }

                /// Route match criteria.
                #[derive(Clone, PartialEq, ::prost::Message)]
                pub struct RouteMatch {
                    #[prost(oneof = "route_match::PathSpecifier", tags = "1")]
                    pub path_specifier: Option<route_match::PathSpecifier>,
                    #[prost(message, repeated, tag = "6")]
                    pub headers: Vec<HeaderMatcher>,
                }

                pub mod route_match {
                    //! Route match sub-types.

                    #[derive(Clone, PartialEq, ::prost::Oneof)]
                    pub enum PathSpecifier {
                        #[prost(string, tag = "1")]
                        Prefix(String),
                    }
                }

                /// Header match criteria.
                #[derive(Clone, PartialEq, ::prost::Message)]
                pub struct HeaderMatcher {
                    #[prost(string, tag = "1")]
                    pub name: String,
                    #[prost(oneof = "header_matcher::HeaderMatchSpecifier", tags = "13")]
                    pub header_match_specifier: Option<header_matcher::HeaderMatchSpecifier>,
                }

                pub mod header_matcher {
                    //! Header matcher sub-types.

                    #[derive(Clone, PartialEq, ::prost::Oneof)]
                    pub enum HeaderMatchSpecifier {
                        #[prost(message, tag = "13")]
                        StringMatch(super::StringMatcher),
                    }
                }

                /// Route action.
                #[derive(Clone, PartialEq, ::prost::Message)]
                pub struct RouteAction {
                    #[prost(oneof = "route_action::ClusterSpecifier", tags = "1")]
                    pub cluster_specifier: Option<route_action::ClusterSpecifier>,
                }

                pub mod route_action {
                    //! Route action sub-types.

                    #[derive(Clone, PartialEq, ::prost::Oneof)]
                    pub enum ClusterSpecifier {
                        #[prost(string, tag = "1")]
                        Cluster(String),
                    }
                }
            }
        }
    }

    pub mod r#type {
        //! Envoy matcher types.

        pub mod matcher {
            //! Matchers.

            pub mod v3 {
                //! Matcher v3 API.

                /// String matcher.
                #[derive(Clone, PartialEq, ::prost::Message)]
                pub struct StringMatcher {
                    #[prost(oneof = "string_matcher::MatchPattern", tags = "1")]
                    pub match_pattern: Option<string_matcher::MatchPattern>,
                }

                pub mod string_matcher {
                    //! String matcher sub-types.

                    #[derive(Clone, PartialEq, ::prost::Oneof)]
                    pub enum MatchPattern {
                        #[prost(string, tag = "1")]
                        Exact(String),
                    }
                }
            }
        }
    }
}

pub mod google {
    //! Google API types.

    pub mod rpc {
        //! gRPC status types.

        /// Status carried in a NACK.
        #[derive(Clone, PartialEq, ::prost::Message)]
        pub struct Status {
            #[prost(int32, tag = "1")]
            pub code: i32,
            #[prost(string, tag = "2")]
            pub message: String,
            #[prost(message, repeated, tag = "3")]
            pub details: Vec<::prost_types::Any>,
        }
    }
}

use envoy::config::cluster::v3::Cluster;
use envoy::config::endpoint::v3::ClusterLoadAssignment;
use envoy::config::route::v3::RouteConfiguration;

macro_rules! impl_resource {
    ($ty:ty, $type_url:expr, $name:ident) => {
        impl Resource for $ty {
            fn type_url(&self) -> &str {
                $type_url
            }

            fn name(&self) -> &str {
                &self.$name
            }

            fn encode(&self) -> mesh_core::Result<prost_types::Any> {
                Ok(prost_types::Any {
                    type_url: $type_url.to_string(),
                    value: Message::encode_to_vec(self),
                })
            }

            fn as_any(&self) -> &dyn StdAny {
                self
            }
        }
    };
}

impl_resource!(Cluster, TypeUrl::CLUSTER, name);
impl_resource!(ClusterLoadAssignment, TypeUrl::ENDPOINT, cluster_name);
impl_resource!(RouteConfiguration, TypeUrl::ROUTE, name);
