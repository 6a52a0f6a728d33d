//! Memory size parsing
//!
//! Accepts a decimal count with an optional binary unit suffix:
//! `k`/`K` (KiB), `m`/`M` (MiB), `g`/`G` (GiB). A string ending in a digit
//! is a plain byte count.

use crate::error::MemoryLimitError;

const KIB: i64 = 1024;
const MIB: i64 = 1024 * KIB;
const GIB: i64 = 1024 * MIB;

/// Parse a memory limit such as `"100m"`, `"1g"`, `"512k"` or `"2048"` into bytes.
///
/// The result is always `prefix * multiplier` computed in integer arithmetic.
pub fn parse_memory_limit(input: &str) -> Result<i64, MemoryLimitError> {
    let trimmed = input.trim();
    let unit = trimmed.chars().last().ok_or(MemoryLimitError::Empty)?;

    let (digits, multiplier) = match unit {
        'k' | 'K' => (&trimmed[..trimmed.len() - 1], KIB),
        'm' | 'M' => (&trimmed[..trimmed.len() - 1], MIB),
        'g' | 'G' => (&trimmed[..trimmed.len() - 1], GIB),
        c if c.is_ascii_digit() => (trimmed, 1),
        c => return Err(MemoryLimitError::InvalidSuffix(c)),
    };

    let base: i64 = digits
        .parse()
        .map_err(|source| MemoryLimitError::InvalidNumber {
            input: digits.to_string(),
            source,
        })?;

    base.checked_mul(multiplier)
        .ok_or_else(|| MemoryLimitError::Overflow {
            input: trimmed.to_string(),
        })
}
