//! Cross-cutting helpers: logging and shared test fixtures.

pub mod log;

#[cfg(test)]
pub mod test_utils;

/// Seconds since the Unix epoch, truncated to the protocol's 32-bit range.
pub fn unix_timestamp() -> u32 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as u32)
        .unwrap_or(0)
}
