use crate::error::{Result, SpecLedgerError};
use chrono::{DateTime, Utc};
use regex::Regex;
use sha2::{Digest, Sha256};
use std::sync::OnceLock;

pub const ID_PREFIX: &str = "SL-";

/// Number of distinct IDs: six hex characters.
const ID_SPACE: f64 = 16_777_216.0;

static ID_RE: OnceLock<Regex> = OnceLock::new();

fn id_re() -> &'static Regex {
    ID_RE.get_or_init(|| Regex::new(r"^SL-[0-9a-f]{6}$").unwrap())
}

/// Nanoseconds since the Unix epoch, as a decimal-friendly integer.
fn unix_nanos(at: DateTime<Utc>) -> i128 {
    i128::from(at.timestamp()) * 1_000_000_000 + i128::from(at.timestamp_subsec_nanos())
}

/// Derive an issue ID from `spec|title|nanos`: SHA-256, first three bytes as
/// lowercase hex, prefixed with `SL-`. The same triple always yields the same ID.
pub fn derive(spec: &str, title: &str, created_at: DateTime<Utc>) -> String {
    let data = format!("{spec}|{title}|{}", unix_nanos(created_at));
    let digest = Sha256::digest(data.as_bytes());
    format!("{ID_PREFIX}{}", hex::encode(&digest[..3]))
}

pub fn parse(s: &str) -> Result<&str> {
    if id_re().is_match(s) {
        Ok(s)
    } else {
        Err(SpecLedgerError::InvalidIdFormat(s.to_string()))
    }
}

pub fn is_valid(s: &str) -> bool {
    id_re().is_match(s)
}

/// Birthday bound `1 - exp(-n² / (2·2²⁴))`, always within `[0, 1)`.
pub fn collision_probability(n: usize) -> f64 {
    if n <= 1 {
        return 0.0;
    }
    let n = n as f64;
    -(-(n * n) / (2.0 * ID_SPACE)).exp_m1()
}
