//! Snapshot version tokens.
//!
//! Every publish into the snapshot cache gets a fresh [`ResourceVersion`].
//! The token carries both the string sent on the wire and the sequence
//! number it was minted from, so the server can order versions without
//! parsing strings. Tokens minted by a [`VersionClock`] are prefixed with
//! the clock's epoch, so a restarted process never reissues a token an
//! earlier process already handed out.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Version token for a published snapshot.
///
/// Two versions compare equal only when both the wire string and the
/// sequence match. Versions minted by one [`VersionClock`] are strictly
/// increasing in [`ResourceVersion::sequence`].
///
/// # Example
///
/// ```rust
/// use mesh_core::VersionClock;
///
/// let clock = VersionClock::with_epoch(1_700_000_000_000);
/// let v1 = clock.next();
/// let v2 = clock.next();
///
/// assert_eq!(v1.as_str(), "1700000000000-v1");
/// assert!(v2.is_newer_than(&v1));
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ResourceVersion {
    token: String,
    sequence: u64,
}

impl ResourceVersion {
    /// Create a version from a sequence number, using the `v<N>` token form.
    #[must_use]
    pub fn from_sequence(sequence: u64) -> Self {
        Self {
            token: format!("v{sequence}"),
            sequence,
        }
    }

    /// Create a version whose token is prefixed with `epoch`.
    #[must_use]
    pub fn with_epoch(epoch: u64, sequence: u64) -> Self {
        Self {
            token: format!("{epoch}-v{sequence}"),
            sequence,
        }
    }

    /// Get the wire token.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.token
    }

    /// Get the sequence number the token was minted from.
    #[must_use]
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Whether this version was minted after `other`.
    #[must_use]
    pub fn is_newer_than(&self, other: &ResourceVersion) -> bool {
        self.sequence > other.sequence
    }

    /// Consume and return the wire token.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.token
    }
}

impl fmt::Display for ResourceVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.token)
    }
}

impl AsRef<str> for ResourceVersion {
    fn as_ref(&self) -> &str {
        &self.token
    }
}

impl PartialEq<str> for ResourceVersion {
    fn eq(&self, other: &str) -> bool {
        self.token == other
    }
}

impl PartialEq<&str> for ResourceVersion {
    fn eq(&self, other: &&str) -> bool {
        self.token == *other
    }
}

/// Monotonic source of [`ResourceVersion`]s.
#[derive(Debug)]
pub struct VersionClock {
    epoch: u64,
    last: AtomicU64,
}

impl Default for VersionClock {
    fn default() -> Self {
        Self::new()
    }
}

impl VersionClock {
    /// Create a clock whose epoch is the current time in milliseconds.
    #[must_use]
    pub fn new() -> Self {
        let epoch = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis() as u64)
            .unwrap_or_default();
        Self::with_epoch(epoch)
    }

    /// Create a clock with a fixed epoch.
    #[must_use]
    pub fn with_epoch(epoch: u64) -> Self {
        Self {
            epoch,
            last: AtomicU64::new(0),
        }
    }

    /// The prefix of every token this clock mints.
    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Mint the next version.
    pub fn next(&self) -> ResourceVersion {
        let sequence = self.last.fetch_add(1, Ordering::SeqCst) + 1;
        ResourceVersion::with_epoch(self.epoch, sequence)
    }

    /// The most recently minted sequence, or 0 if none.
    #[must_use]
    pub fn current(&self) -> u64 {
        self.last.load(Ordering::SeqCst)
    }
}
