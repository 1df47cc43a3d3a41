//! Passcode and reference generation.
//!
//! Passcodes permit leading zeros: every digit is drawn independently and
//! uniformly from the OS random source, so all `10^length` strings are
//! equally likely.

use chrono::{DateTime, Utc};
use rand::{distributions::Alphanumeric, rngs::OsRng, Rng};

pub const TRANSACTION_REFERENCE_PREFIX: &str = "TXN_";
pub const GATEWAY_REFERENCE_PREFIX: &str = "PG_";
const REFERENCE_SUFFIX_LEN: usize = 8;

/// Fixed-length decimal passcode.
pub fn generate_passcode(length: usize) -> String {
    (0..length)
        .map(|_| char::from(b'0' + OsRng.gen_range(0..10u8)))
        .collect()
}

/// Random alphanumeric string of `len` characters.
pub fn random_suffix(len: usize) -> String {
    OsRng
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// `TXN_<unixMillis>_<8 alphanumerics>`; sorts by creation time.
pub fn generate_transaction_reference(now: DateTime<Utc>) -> String {
    format!(
        "{}{}_{}",
        TRANSACTION_REFERENCE_PREFIX,
        now.timestamp_millis(),
        random_suffix(REFERENCE_SUFFIX_LEN)
    )
}

/// `PG_<unixMillis>_<8 alphanumerics>`, as minted by the sandbox gateway.
pub fn generate_gateway_reference(now: DateTime<Utc>) -> String {
    format!(
        "{}{}_{}",
        GATEWAY_REFERENCE_PREFIX,
        now.timestamp_millis(),
        random_suffix(REFERENCE_SUFFIX_LEN)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn passcode_has_exact_length_and_digits_only() {
        for len in [4, 6, 10] {
            let code = generate_passcode(len);
            assert_eq!(code.len(), len);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn passcodes_cover_leading_zeros() {
        let seen_leading_zero = (0..2000).any(|_| generate_passcode(6).starts_with('0'));
        assert!(seen_leading_zero);
    }

    #[test]
    fn transaction_reference_format() {
        let now = Utc::now();
        let reference = generate_transaction_reference(now);
        let mut parts = reference.splitn(3, '_');
        assert_eq!(parts.next(), Some("TXN"));
        assert_eq!(
            parts.next().and_then(|p| p.parse::<i64>().ok()),
            Some(now.timestamp_millis())
        );
        let suffix = parts.next().unwrap();
        assert_eq!(suffix.len(), 8);
        assert!(suffix.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn references_do_not_collide_within_one_millisecond() {
        let now = Utc::now();
        let refs: HashSet<_> = (0..10_000)
            .map(|_| generate_transaction_reference(now))
            .collect();
        assert_eq!(refs.len(), 10_000);
    }
}
