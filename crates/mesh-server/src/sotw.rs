//! State-of-the-World subscription state for one ADS stream.
//!
//! Every response carries the complete set of resources of its type. The
//! state here decides, per resource type, whether an incoming request is a
//! fresh subscription, an ACK, a NACK or stale, and whether a snapshot
//! should be pushed. It performs no I/O so the stream handler stays a thin
//! loop around it.
//!
//! Push rules for one type:
//!
//! - at most one response is outstanding; the next push waits for its ACK
//!   or NACK
//! - a snapshot is offered only if its sequence is newer than anything
//!   offered before, so an ACKed version is never followed by an older one
//! - a snapshot whose content the client already holds is skipped, even
//!   under a new version

use std::collections::HashMap;

use mesh_cache::Snapshot;
use mesh_core::{ResourceVersion, TypeUrl};
use mesh_types::envoy::config::core::v3::ControlPlane;
use mesh_types::envoy::service::discovery::v3::{DiscoveryRequest, DiscoveryResponse};

use crate::utils::generate_nonce;

/// How a request relates to the subscription for its type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestKind {
    /// Empty nonce: a new subscription, or a re-subscription.
    Subscribe,
    /// The client accepted the outstanding response.
    Ack {
        /// Version that was accepted.
        version: String,
    },
    /// The client rejected the outstanding response.
    Nack {
        /// Version that was rejected.
        version: String,
        /// Error message reported by the client.
        message: String,
    },
    /// The nonce does not match the outstanding response.
    Stale,
}

#[derive(Debug, Clone)]
struct Outstanding {
    nonce: String,
    version: ResourceVersion,
    fingerprint: u64,
}

#[derive(Debug, Clone, Default)]
struct Subscription {
    /// Version the client reports holding.
    held_version: String,
    /// Fingerprint of the content the client holds, once it ACKed a push.
    held_fingerprint: Option<u64>,
    /// Highest snapshot sequence offered or skipped for this type.
    offered_sequence: u64,
    outstanding: Option<Outstanding>,
}

/// Subscription state of one stream, keyed by type URL.
#[derive(Debug, Default)]
pub struct SotwState {
    subscriptions: HashMap<TypeUrl, Subscription>,
}

impl SotwState {
    /// Create empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a request to the subscription for its type.
    pub fn on_request(&mut self, request: &DiscoveryRequest) -> RequestKind {
        let type_url = request.type_url.as_str();

        if request.response_nonce.is_empty() {
            // The client may carry a version over from an earlier stream;
            // nothing is known about its content.
            self.subscriptions.insert(
                TypeUrl::new(type_url),
                Subscription {
                    held_version: request.version_info.clone(),
                    ..Default::default()
                },
            );
            return RequestKind::Subscribe;
        }

        let Some(sub) = self.subscriptions.get_mut(type_url) else {
            return RequestKind::Stale;
        };
        let sent = match sub.outstanding.take() {
            Some(sent) if sent.nonce == request.response_nonce => sent,
            other => {
                sub.outstanding = other;
                return RequestKind::Stale;
            }
        };

        match &request.error_detail {
            Some(status) => RequestKind::Nack {
                version: sent.version.into_inner(),
                message: status.message.clone(),
            },
            None => {
                sub.held_version = sent.version.as_str().to_string();
                sub.held_fingerprint = Some(sent.fingerprint);
                RequestKind::Ack {
                    version: sent.version.into_inner(),
                }
            }
        }
    }

    /// Build the response that should be pushed for `type_url`, if any.
    ///
    /// A returned response is recorded as outstanding.
    pub fn next_response(
        &mut self,
        type_url: &str,
        snapshot: &Snapshot,
        control_plane: Option<&ControlPlane>,
    ) -> Option<DiscoveryResponse> {
        let sub = self.subscriptions.get_mut(type_url)?;
        if sub.outstanding.is_some() {
            return None;
        }

        let version = snapshot.version();
        if version.sequence() <= sub.offered_sequence {
            return None;
        }
        let resources = snapshot.get_resources(type_url)?;
        sub.offered_sequence = version.sequence();

        let holds_current = match sub.held_fingerprint {
            Some(fingerprint) => fingerprint == resources.fingerprint(),
            None => sub.held_version == version.as_str(),
        };
        if holds_current {
            return None;
        }

        let nonce = generate_nonce();
        sub.outstanding = Some(Outstanding {
            nonce: nonce.clone(),
            version: version.clone(),
            fingerprint: resources.fingerprint(),
        });

        Some(DiscoveryResponse {
            version_info: version.as_str().to_string(),
            resources: resources.encoded().to_vec(),
            canary: false,
            type_url: type_url.to_string(),
            nonce,
            control_plane: control_plane.cloned(),
        })
    }

    /// Type URLs with a subscription.
    pub fn type_urls(&self) -> Vec<TypeUrl> {
        self.subscriptions.keys().cloned().collect()
    }

    /// Whether a response for the type awaits ACK or NACK.
    pub fn is_pending(&self, type_url: &str) -> bool {
        self.subscriptions
            .get(type_url)
            .is_some_and(|s| s.outstanding.is_some())
    }

    /// Version the client holds for the type, as far as the stream knows.
    pub fn held_version(&self, type_url: &str) -> Option<&str> {
        self.subscriptions
            .get(type_url)
            .map(|s| s.held_version.as_str())
    }
}
