//! Human-readable order numbers: `ORD-YYYYMMDD-NNNNN`.

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::OrderError;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderNumber(String);

impl OrderNumber {
    /// Generates a number for `now` using the thread-local RNG.
    ///
    /// Uniqueness is enforced by the store; callers retry on collision.
    pub fn generate(now: DateTime<Utc>) -> Self {
        Self::generate_with(now, &mut rand::rng())
    }

    pub fn generate_with<R: Rng>(now: DateTime<Utc>, rng: &mut R) -> Self {
        let suffix: u32 = rng.random_range(10_000..=99_999);
        Self(format!("ORD-{}-{suffix}", now.format("%Y%m%d")))
    }

    /// Parses and validates an existing order number.
    pub fn parse(value: &str) -> Result<Self, OrderError> {
        let invalid = || OrderError::InvalidOrderNumber(value.to_string());
        let mut parts = value.split('-');
        let (Some("ORD"), Some(date), Some(suffix), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(invalid());
        };
        let digits = |s: &str, len| s.len() == len && s.bytes().all(|b| b.is_ascii_digit());
        if !digits(date, 8) || !digits(suffix, 5) {
            return Err(invalid());
        }
        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for OrderNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for OrderNumber {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn generated_numbers_have_expected_shape() {
        let now = Utc.with_ymd_and_hms(2024, 3, 7, 12, 0, 0).unwrap();
        for _ in 0..100 {
            let number = OrderNumber::generate(now);
            assert!(number.as_str().starts_with("ORD-20240307-"));
            let suffix: u32 = number.as_str()[13..].parse().unwrap();
            assert!((10_000..=99_999).contains(&suffix));
            assert_eq!(OrderNumber::parse(number.as_str()), Ok(number));
        }
    }

    #[test]
    fn parse_rejects_malformed() {
        for bad in [
            "ORD-2024037-12345",
            "ORD-20240307-1234",
            "INV-20240307-12345",
            "ORD-20240307-12345-1",
        ] {
            assert!(OrderNumber::parse(bad).is_err(), "{bad}");
        }
    }
}
