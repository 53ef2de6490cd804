//! Cache entry with an absolute expiration.

/// A single stored value and the tick at which it stops being visible.
///
/// `expiration == 0` means the entry never expires.
#[derive(Debug, Clone)]
pub(crate) struct Entry<V> {
    /// The stored value.
    pub(crate) value: V,

    /// Absolute expiration in clock ticks, or 0 for no TTL.
    pub(crate) expiration: i64,

    /// Due tick of the latest wake-up scheduled for this entry.
    pub(crate) armed: i64,
}

impl<V> Entry<V> {
    /// Create a new entry.
    pub(crate) fn new(value: V, expiration: i64) -> Self {
        Self {
            value,
            expiration,
            armed: expiration,
        }
    }

    /// Whether the entry carries a TTL at all.
    pub(crate) fn has_ttl(&self) -> bool {
        self.expiration > 0
    }

    /// Check if this entry has expired at a given time.
    pub(crate) fn is_expired_at(&self, now: i64) -> bool {
        self.has_ttl() && now >= self.expiration
    }

    /// Whether a wake-up later than `due` is still pending and fires no later
    /// than the expiration.
    pub(crate) fn is_covered_after(&self, due: i64) -> bool {
        self.armed > due && self.armed <= self.expiration
    }

    /// Ticks left before expiry. Negative once expired, meaningless without a TTL.
    pub(crate) fn remaining(&self, now: i64) -> i64 {
        self.expiration.saturating_sub(now)
    }
}
