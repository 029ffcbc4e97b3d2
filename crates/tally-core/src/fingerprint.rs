//! Transaction fingerprints
//!
//! A fingerprint is the SHA-256 digest of `date|amount|transaction_name`,
//! hex encoded. Statement imports use it to skip rows that were already
//! stored for the same user.

use chrono::NaiveDate;
use sha2::{Digest, Sha256};

/// Compute the fingerprint of a transaction
///
/// The date is rendered as `YYYY-MM-DD` and the amount in its shortest
/// decimal form (`15000`, `12.5`), so the same values always hash alike.
pub fn fingerprint(date: NaiveDate, amount: f64, transaction_name: &str) -> String {
    let input = format!("{}|{}|{}", date.format("%Y-%m-%d"), amount, transaction_name);
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_fingerprint_deterministic() {
        let a = fingerprint(d("2024-03-01"), 15000.0, "GRAB FOOD");
        let b = fingerprint(d("2024-03-01"), 15000.0, "GRAB FOOD");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_fingerprint_is_sha256_of_joined_fields() {
        // sha256("2024-03-01|12.5|Coffee")
        let mut hasher = Sha256::new();
        hasher.update(b"2024-03-01|12.5|Coffee");
        let expected = hex::encode(hasher.finalize());
        assert_eq!(fingerprint(d("2024-03-01"), 12.5, "Coffee"), expected);
    }

    #[test]
    fn test_fingerprint_integral_amount_has_no_fraction() {
        let mut hasher = Sha256::new();
        hasher.update(b"2024-03-01|15000|GRAB");
        let expected = hex::encode(hasher.finalize());
        assert_eq!(fingerprint(d("2024-03-01"), 15000.0, "GRAB"), expected);
    }

    #[test]
    fn test_fingerprint_differs_by_field() {
        let base = fingerprint(d("2024-03-01"), 100.0, "A");
        assert_ne!(base, fingerprint(d("2024-03-02"), 100.0, "A"));
        assert_ne!(base, fingerprint(d("2024-03-01"), 100.5, "A"));
        assert_ne!(base, fingerprint(d("2024-03-01"), 100.0, "B"));
    }
}
