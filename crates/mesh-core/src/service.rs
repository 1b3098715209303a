//! The canonical service record and the list it is persisted in.
//!
//! [`ServiceMeta`] is what the registry stores for every mesh-enabled
//! service and what the translator turns into clusters and routes.
//! [`CanonicalList`] is the sorted, de-duplicated collection of those
//! records for one namespace, together with its byte-exact serialized form.

use std::fmt;
use std::time::Duration;

use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};

use crate::duration::{format_duration, parse_duration};

/// Lower clamp bound for connect timeouts.
pub const MIN_CONNECT_TIMEOUT: Duration = Duration::ZERO;

/// Upper clamp bound for connect timeouts.
pub const MAX_CONNECT_TIMEOUT: Duration = Duration::from_secs(60);

/// Persisted text of [`ConnectTimeout::Unset`].
pub const UNSET_TIMEOUT_TEXT: &str = "-1s";

const UNSET_TIMEOUT_NANOS: i64 = -1_000_000_000;

/// Connect timeout of a service.
///
/// `Unset` is distinct from `Set(0s)`: it means no timeout annotation was
/// given (or it could not be parsed), so the proxy default applies.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ConnectTimeout {
    /// No usable timeout was configured.
    #[default]
    Unset,
    /// A timeout within `[MIN_CONNECT_TIMEOUT, MAX_CONNECT_TIMEOUT]`.
    Set(Duration),
}

impl ConnectTimeout {
    /// Build a timeout from an optional annotation value.
    ///
    /// Absent, empty and unparsable values yield [`ConnectTimeout::Unset`];
    /// parsed values are clamped into range, never rejected.
    ///
    /// # Example
    ///
    /// ```rust
    /// use mesh_core::ConnectTimeout;
    /// use std::time::Duration;
    ///
    /// assert_eq!(ConnectTimeout::from_annotation(None), ConnectTimeout::Unset);
    /// assert_eq!(ConnectTimeout::from_annotation(Some("soon")), ConnectTimeout::Unset);
    /// assert_eq!(
    ///     ConnectTimeout::from_annotation(Some("90s")),
    ///     ConnectTimeout::Set(Duration::from_secs(60)),
    /// );
    /// ```
    #[must_use]
    pub fn from_annotation(value: Option<&str>) -> Self {
        match value {
            Some(text) if !text.is_empty() => parse_duration(text)
                .map(Self::clamped)
                .unwrap_or(Self::Unset),
            _ => Self::Unset,
        }
    }

    /// Clamp signed nanoseconds into the allowed range.
    #[must_use]
    pub fn clamped(nanos: i64) -> Self {
        let max = MAX_CONNECT_TIMEOUT.as_nanos() as i64;
        let min = MIN_CONNECT_TIMEOUT.as_nanos() as i64;
        Self::Set(Duration::from_nanos(nanos.clamp(min, max) as u64))
    }

    /// The configured duration, if any.
    #[must_use]
    pub fn as_duration(&self) -> Option<Duration> {
        match self {
            Self::Unset => None,
            Self::Set(d) => Some(*d),
        }
    }

    /// Whether a timeout was configured.
    #[must_use]
    pub fn is_set(&self) -> bool {
        matches!(self, Self::Set(_))
    }

    fn to_text(self) -> String {
        match self {
            Self::Unset => UNSET_TIMEOUT_TEXT.to_string(),
            Self::Set(d) => format_duration(d.as_nanos() as i64),
        }
    }
}

impl fmt::Display for ConnectTimeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

impl Serialize for ConnectTimeout {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_text())
    }
}

impl<'de> Deserialize<'de> for ConnectTimeout {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct TimeoutVisitor;

        impl Visitor<'_> for TimeoutVisitor {
            type Value = ConnectTimeout;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a duration string such as \"5s\" or \"-1s\"")
            }

            fn visit_str<E: de::Error>(self, value: &str) -> Result<Self::Value, E> {
                let nanos = parse_duration(value).map_err(E::custom)?;
                if nanos == UNSET_TIMEOUT_NANOS {
                    Ok(ConnectTimeout::Unset)
                } else {
                    Ok(ConnectTimeout::clamped(nanos))
                }
            }
        }

        deserializer.deserialize_str(TimeoutVisitor)
    }
}

/// Canonical record of one mesh-enabled service.
///
/// `ip` is non-empty and `port` is non-zero for every record the registry
/// produces; records failing that are dropped before they get here.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServiceMeta {
    /// Service name, unique within one canonical list.
    pub name: String,
    /// Cluster address of the service.
    pub ip: String,
    /// First declared service port.
    pub port: u16,
    /// Connect timeout for the upstream cluster.
    #[serde(rename = "timeout")]
    pub connect_timeout: ConnectTimeout,
}

impl ServiceMeta {
    /// Create a record with an unset timeout.
    #[must_use]
    pub fn new(name: impl Into<String>, ip: impl Into<String>, port: u16) -> Self {
        Self {
            name: name.into(),
            ip: ip.into(),
            port,
            connect_timeout: ConnectTimeout::Unset,
        }
    }

    /// Set the connect timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: ConnectTimeout) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Whether the record has a non-empty address and a non-zero port.
    #[must_use]
    pub fn has_address(&self) -> bool {
        !self.ip.is_empty() && self.port != 0
    }
}

/// Sorted, de-duplicated service records for one namespace.
///
/// Records are ordered by name with a stable sort, so records sharing a
/// name keep their encounter order and the first one wins.
///
/// # Example
///
/// ```rust
/// use mesh_core::{CanonicalList, ServiceMeta};
///
/// let (list, dropped) = CanonicalList::from_records(vec![
///     ServiceMeta::new("b", "10.0.0.2", 81),
///     ServiceMeta::new("a", "10.0.0.1", 80),
///     ServiceMeta::new("a", "10.0.0.9", 90),
/// ]);
///
/// let names: Vec<_> = list.iter().map(|s| s.name.as_str()).collect();
/// assert_eq!(names, ["a", "b"]);
/// assert_eq!(list.iter().next().unwrap().ip, "10.0.0.1");
/// assert_eq!(dropped, vec!["a".to_string()]);
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CanonicalList {
    services: Vec<ServiceMeta>,
}

impl CanonicalList {
    /// Build a canonical list, returning the names of dropped duplicates.
    #[must_use]
    pub fn from_records(mut records: Vec<ServiceMeta>) -> (Self, Vec<String>) {
        // `sort_by` is stable.
        records.sort_by(|a, b| a.name.cmp(&b.name));

        let mut services: Vec<ServiceMeta> = Vec::with_capacity(records.len());
        let mut dropped = Vec::new();
        for record in records {
            match services.last() {
                Some(prev) if prev.name == record.name => dropped.push(record.name),
                _ => services.push(record),
            }
        }

        (Self { services }, dropped)
    }

    /// Parse a persisted list.
    ///
    /// A persisted `null` is read as an empty list. The result is
    /// re-canonicalized, so a hand-edited blob still yields sorted output.
    /// A record without an address or with port `0` makes the whole blob
    /// malformed.
    pub fn from_bytes(bytes: &[u8]) -> serde_json::Result<Self> {
        let records: Option<Vec<ServiceMeta>> = serde_json::from_slice(bytes)?;
        let records = records.unwrap_or_default();
        if let Some(bad) = records.iter().find(|record| !record.has_address()) {
            return Err(de::Error::custom(format!(
                "service {:?} has no usable address ({:?}:{})",
                bad.name, bad.ip, bad.port
            )));
        }
        Ok(Self::from_records(records).0)
    }

    /// Serialize as pretty JSON with two-space indentation.
    ///
    /// Equal lists always serialize to identical bytes.
    pub fn to_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec_pretty(&self.services)
    }

    /// Iterate the records in canonical order.
    pub fn iter(&self) -> std::slice::Iter<'_, ServiceMeta> {
        self.services.iter()
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.services.len()
    }

    /// Whether the list holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// Borrow the records as a slice.
    #[must_use]
    pub fn as_slice(&self) -> &[ServiceMeta] {
        &self.services
    }
}

impl<'a> IntoIterator for &'a CanonicalList {
    type Item = &'a ServiceMeta;
    type IntoIter = std::slice::Iter<'a, ServiceMeta>;

    fn into_iter(self) -> Self::IntoIter {
        self.services.iter()
    }
}
