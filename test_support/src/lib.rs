//! ABOUTME: Shared testing utilities and helper functions
//! ABOUTME: Common test fixtures for all aura crates

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

static COUNTER: AtomicU64 = AtomicU64::new(0);

/// Unique SQLite file path in the system temp dir
pub fn unique_db_path(prefix: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    std::env::temp_dir().join(format!(
        "aura-{}-{}-{}-{}.db",
        prefix,
        std::process::id(),
        nanos,
        n
    ))
}

/// Deterministic E.164 test number in the reserved +1 555 range
pub fn test_phone(n: u32) -> String {
    format!("+1555{:07}", n % 10_000_000)
}

/// Smallest valid PNG: 1x1 transparent pixel
pub fn tiny_png() -> Vec<u8> {
    vec![
        0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44,
        0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1F,
        0x15, 0xC4, 0x89, 0x00, 0x00, 0x00, 0x0A, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9C, 0x63, 0x00,
        0x01, 0x00, 0x00, 0x05, 0x00, 0x01, 0x0D, 0x0A, 0x2D, 0xB4, 0x00, 0x00, 0x00, 0x00, 0x49,
        0x45, 0x4E, 0x44, 0xAE, 0x42, 0x60, 0x82,
    ]
}

/// JPEG-looking bytes (SOI marker + padding + EOI), enough for content sniffing
pub fn fake_jpeg(len: usize) -> Vec<u8> {
    let mut data = vec![0xFF, 0xD8, 0xFF, 0xE0];
    data.resize(len.max(6) - 2, 0x42);
    data.extend_from_slice(&[0xFF, 0xD9]);
    data
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_db_paths_differ() {
        assert_ne!(unique_db_path("a"), unique_db_path("a"));
    }

    #[test]
    fn test_phone_format() {
        assert_eq!(test_phone(42), "+15550000042");
    }

    #[test]
    fn test_fixtures() {
        assert_eq!(&tiny_png()[1..4], b"PNG");
        let jpeg = fake_jpeg(64);
        assert_eq!(jpeg.len(), 64);
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
    }
}
