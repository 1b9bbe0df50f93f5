//! Expiring-soon classification.
//!
//! "Expiring soon" and "already expired" are disjoint: an expired token is
//! treated as invalid by the decoder and never reaches this check as a
//! rotation candidate.

/// Anything carrying a Unix expiry timestamp.
pub trait Expiring {
    fn expires_at(&self) -> u64;
}

/// True iff `0 < expires_at - now < threshold`.
pub fn is_expiring_soon<T: Expiring + ?Sized>(token: &T, threshold: u64, now: u64) -> bool {
    let exp = token.expires_at();
    if exp <= now {
        return false;
    }
    exp - now < threshold
}
