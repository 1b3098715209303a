//! Snapshot: immutable, versioned collection of discovery resources.
//!
//! A snapshot represents a consistent view of all resources for a node
//! at a specific version. Snapshots are:
//!
//! - **Immutable**: Once created, a snapshot cannot be modified
//! - **Versioned**: Each snapshot carries the version minted at publish time
//! - **Type-organized**: Resources are grouped by their type URL, in order
//! - **Pre-encoded**: Resources are encoded once, so every stream pushing
//!   the snapshot shares the same bytes

use std::collections::BTreeMap;
use std::hash::Hasher;
use std::time::Instant;

use fnv::FnvHasher;
use mesh_core::{BoxResource, ResourceVersion, Result, TypeUrl};

/// Resources to publish, grouped by type URL.
///
/// Resources keep the order they were added in. Publishing the same set
/// twice produces snapshots with identical per-type content.
///
/// # Example
///
/// ```rust
/// use mesh_cache::ResourceSet;
/// use mesh_core::TypeUrl;
///
/// let set = ResourceSet::new()
///     .with_type(TypeUrl::CLUSTER, vec![])
///     .with_type(TypeUrl::LISTENER, vec![]);
///
/// assert!(set.contains_type(TypeUrl::CLUSTER));
/// assert_eq!(set.total_resources(), 0);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ResourceSet {
    resources: BTreeMap<TypeUrl, Vec<BoxResource>>,
}

impl ResourceSet {
    /// Create an empty resource set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the resources for one type, replacing any already present.
    pub fn insert(&mut self, type_url: impl Into<TypeUrl>, resources: Vec<BoxResource>) {
        self.resources.insert(type_url.into(), resources);
    }

    /// Builder-style [`ResourceSet::insert`].
    #[must_use]
    pub fn with_type(mut self, type_url: impl Into<TypeUrl>, resources: Vec<BoxResource>) -> Self {
        self.insert(type_url, resources);
        self
    }

    /// Get the resources for a type.
    pub fn get(&self, type_url: &str) -> Option<&[BoxResource]> {
        self.resources.get(type_url).map(Vec::as_slice)
    }

    /// Whether the set carries the type (even with no resources).
    pub fn contains_type(&self, type_url: &str) -> bool {
        self.resources.contains_key(type_url)
    }

    /// Iterate over `(type_url, resources)` pairs in type URL order.
    pub fn iter(&self) -> impl Iterator<Item = (&TypeUrl, &[BoxResource])> {
        self.resources.iter().map(|(t, r)| (t, r.as_slice()))
    }

    /// Total number of resources across all types.
    pub fn total_resources(&self) -> usize {
        self.resources.values().map(Vec::len).sum()
    }
}

/// Resources for a specific type within a snapshot.
#[derive(Debug, Clone)]
pub struct SnapshotResources {
    /// Resources in publish order.
    resources: Vec<BoxResource>,
    /// Wire form of `resources`, same order.
    encoded: Vec<prost_types::Any>,
    /// FNV-1a over the encoded resources.
    fingerprint: u64,
}

impl SnapshotResources {
    fn encode(resources: &[BoxResource]) -> Result<Self> {
        let encoded = resources
            .iter()
            .map(|r| r.encode())
            .collect::<Result<Vec<_>>>()?;

        let mut hasher = FnvHasher::default();
        for any in &encoded {
            hasher.write(any.type_url.as_bytes());
            hasher.write_u8(0);
            hasher.write_usize(any.value.len());
            hasher.write(&any.value);
        }

        Ok(Self {
            resources: resources.to_vec(),
            encoded,
            fingerprint: hasher.finish(),
        })
    }

    /// Get the number of resources.
    #[inline]
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// Check if there are no resources.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Get a resource by name.
    pub fn get(&self, name: &str) -> Option<&BoxResource> {
        self.resources.iter().find(|r| r.name() == name)
    }

    /// Iterate over resources in publish order.
    pub fn iter(&self) -> impl Iterator<Item = &BoxResource> {
        self.resources.iter()
    }

    /// Resource names in publish order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.resources.iter().map(|r| r.name())
    }

    /// The encoded resources, ready to place in a response.
    #[inline]
    pub fn encoded(&self) -> &[prost_types::Any] {
        &self.encoded
    }

    /// Content fingerprint. Equal content yields equal fingerprints.
    #[inline]
    pub fn fingerprint(&self) -> u64 {
        self.fingerprint
    }
}

/// An immutable snapshot of discovery resources for a node.
///
/// Snapshots are the unit of cache storage and are shared behind an `Arc`,
/// so a reader always sees every resource type of one version together.
#[derive(Debug, Clone)]
pub struct Snapshot {
    version: ResourceVersion,
    resources: BTreeMap<TypeUrl, SnapshotResources>,
    created_at: Instant,
}

impl Snapshot {
    /// Encode a resource set into a snapshot at the given version.
    ///
    /// # Errors
    ///
    /// Returns the first resource encoding failure.
    pub fn new(version: ResourceVersion, set: &ResourceSet) -> Result<Self> {
        let resources = set
            .resources
            .iter()
            .map(|(type_url, resources)| {
                SnapshotResources::encode(resources).map(|r| (type_url.clone(), r))
            })
            .collect::<Result<BTreeMap<_, _>>>()?;

        Ok(Self {
            version,
            resources,
            created_at: Instant::now(),
        })
    }

    /// Get the version of this snapshot.
    #[inline]
    pub fn version(&self) -> &ResourceVersion {
        &self.version
    }

    /// Get the creation timestamp.
    #[inline]
    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Get resources for a specific type.
    pub fn get_resources(&self, type_url: &str) -> Option<&SnapshotResources> {
        self.resources.get(type_url)
    }

    /// Check if this snapshot contains a specific resource type.
    pub fn contains_type(&self, type_url: &str) -> bool {
        self.resources.contains_key(type_url)
    }

    /// Get all type URLs present in this snapshot.
    pub fn type_urls(&self) -> impl Iterator<Item = &TypeUrl> {
        self.resources.keys()
    }

    /// Get the total number of resources across all types.
    pub fn total_resources(&self) -> usize {
        self.resources.values().map(SnapshotResources::len).sum()
    }

    /// Check if this snapshot has no resources.
    pub fn is_empty(&self) -> bool {
        self.resources.values().all(SnapshotResources::is_empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mesh_core::AnyResource;
    use std::sync::Arc;

    fn resource(type_url: &str, name: &str, payload: &[u8]) -> BoxResource {
        Arc::new(AnyResource::new(
            name,
            prost_types::Any {
                type_url: type_url.to_string(),
                value: payload.to_vec(),
            },
        ))
    }

    #[test]
    fn snapshot_keeps_publish_order() {
        let set = ResourceSet::new().with_type(
            TypeUrl::CLUSTER,
            vec![
                resource(TypeUrl::CLUSTER, "b", b"2"),
                resource(TypeUrl::CLUSTER, "a", b"1"),
            ],
        );
        let snapshot = Snapshot::new(ResourceVersion::from_sequence(1), &set).unwrap();

        let clusters = snapshot.get_resources(TypeUrl::CLUSTER).unwrap();
        assert_eq!(clusters.names().collect::<Vec<_>>(), ["b", "a"]);
        assert_eq!(clusters.encoded()[0].value, b"2");
        assert!(clusters.get("a").is_some());
        assert_eq!(snapshot.version().as_str(), "v1");
        assert_eq!(snapshot.total_resources(), 2);
    }

    #[test]
    fn empty_types_are_present() {
        let set = ResourceSet::new().with_type(TypeUrl::LISTENER, vec![]);
        let snapshot = Snapshot::new(ResourceVersion::from_sequence(1), &set).unwrap();

        assert!(snapshot.contains_type(TypeUrl::LISTENER));
        assert!(!snapshot.contains_type(TypeUrl::CLUSTER));
        assert!(snapshot.is_empty());
    }

    #[test]
    fn fingerprint_tracks_content_not_version() {
        let set = |payload: &[u8]| {
            ResourceSet::new().with_type(
                TypeUrl::ROUTE,
                vec![resource(TypeUrl::ROUTE, "outbound_route", payload)],
            )
        };

        let v1 = Snapshot::new(ResourceVersion::from_sequence(1), &set(b"x")).unwrap();
        let v2 = Snapshot::new(ResourceVersion::from_sequence(2), &set(b"x")).unwrap();
        let v3 = Snapshot::new(ResourceVersion::from_sequence(3), &set(b"y")).unwrap();

        let fp = |s: &Snapshot| s.get_resources(TypeUrl::ROUTE).unwrap().fingerprint();
        assert_eq!(fp(&v1), fp(&v2));
        assert_ne!(fp(&v2), fp(&v3));
    }

    #[test]
    fn fingerprint_depends_on_order() {
        let a = resource(TypeUrl::CLUSTER, "a", b"a");
        let b = resource(TypeUrl::CLUSTER, "b", b"b");

        let ab = ResourceSet::new().with_type(TypeUrl::CLUSTER, vec![a.clone(), b.clone()]);
        let ba = ResourceSet::new().with_type(TypeUrl::CLUSTER, vec![b, a]);

        let fp = |set: &ResourceSet| {
            Snapshot::new(ResourceVersion::from_sequence(1), set)
                .unwrap()
                .get_resources(TypeUrl::CLUSTER)
                .unwrap()
                .fingerprint()
        };
        assert_ne!(fp(&ab), fp(&ba));
    }
}
