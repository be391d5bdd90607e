//! Bloom pre-screen for block headers.
//!
//! Every block header carries a 2048-bit bloom summarising the addresses
//! and topics of all logs in the block. Checking the configured filters
//! against the bloom answers "might this block contain a matching log"
//! without an `eth_getLogs` round-trip. False positives are expected;
//! false negatives are not.

use ethbloom::{Bloom, Input};
use thiserror::Error;

use crate::filter::LogFilterSpec;

/// Byte length of an EVM logs bloom.
const BLOOM_BYTES: usize = 256;

#[derive(Debug, Error)]
pub enum BloomError {
    #[error("invalid logs bloom hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),
    #[error("logs bloom must be {BLOOM_BYTES} bytes, got {0}")]
    BadLength(usize),
}

/// Decode a hex-encoded (`0x…`) logs bloom from a block header.
pub fn parse_bloom(raw: &str) -> Result<Bloom, BloomError> {
    let bytes = hex::decode(raw.trim_start_matches("0x"))?;
    if bytes.len() != BLOOM_BYTES {
        return Err(BloomError::BadLength(bytes.len()));
    }
    Ok(Bloom::from_slice(&bytes))
}

/// Returns `true` if any of `filters` might have a matching log in a block
/// with this bloom.
pub fn might_contain(bloom: &Bloom, filters: &[LogFilterSpec]) -> bool {
    filters.iter().any(|f| filter_might_match(bloom, f))
}

/// A filter passes the pre-screen iff the bloom contains its address and,
/// for each constrained topic position, at least one allowed value.
fn filter_might_match(bloom: &Bloom, filter: &LogFilterSpec) -> bool {
    if !filter.address.is_empty() && !contains_hex(bloom, &filter.address) {
        return false;
    }
    for position in &filter.topics {
        let Some(allowed) = position else { continue };
        if allowed.is_empty() {
            continue;
        }
        if !allowed.iter().any(|t| contains_hex(bloom, t)) {
            return false;
        }
    }
    true
}

fn contains_hex(bloom: &Bloom, value: &str) -> bool {
    match hex::decode(value.trim_start_matches("0x")) {
        Ok(bytes) => bloom.contains_input(Input::Raw(&bytes)),
        // An undecodable filter value must not turn into a false negative;
        // the exact filter downstream settles it.
        Err(_) => true,
    }
}
