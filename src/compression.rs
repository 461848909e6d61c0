//! Compression envelope (spec.md §4.4): a 2-character `0|`/`1|` prefix
//! gating an optional GZIP+Base64 payload.

use std::io::{Read, Write};

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use flate2::{read::GzDecoder, write::GzEncoder, Compression};

use crate::error::SecurityError;

/// Invariant: `level` in `0..=9`, `threshold_bytes >= 0` (enforced by type).
#[derive(Debug, Clone)]
pub struct CompressionConfig {
    pub enabled: bool,
    pub threshold_bytes: usize,
    pub level: u32,
    pub max_decompressed_bytes: usize,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            threshold_bytes: 1024,
            level: 6,
            max_decompressed_bytes: 0,
        }
    }
}

/// Apply the envelope: skip compression (`0|<payload>`) when disabled, below
/// threshold, or when gzip doesn't shrink the payload below 90% of its
/// original size; otherwise `1|<base64(gzip(payload))>`.
pub fn encode(payload: &[u8], config: &CompressionConfig) -> String {
    if !config.enabled || payload.len() < config.threshold_bytes {
        return format!("0|{}", String::from_utf8_lossy(payload));
    }

    let mut encoder = GzEncoder::new(Vec::new(), Compression::new(config.level));
    if encoder.write_all(payload).is_err() {
        return format!("0|{}", String::from_utf8_lossy(payload));
    }
    let Ok(gzipped) = encoder.finish() else {
        return format!("0|{}", String::from_utf8_lossy(payload));
    };

    if gzipped.len() * 10 >= payload.len() * 9 {
        return format!("0|{}", String::from_utf8_lossy(payload));
    }

    format!("1|{}", URL_SAFE_NO_PAD.encode(gzipped))
}

/// Invert `encode`. An unrecognized prefix is treated as legacy raw content
/// for backward compatibility (spec.md §4.4).
pub fn decode(envelope: &str, config: &CompressionConfig) -> Result<Vec<u8>, SecurityError> {
    let Some(rest) = envelope.strip_prefix("1|") else {
        let body = envelope.strip_prefix("0|").unwrap_or(envelope);
        return Ok(body.as_bytes().to_vec());
    };

    let gzipped = URL_SAFE_NO_PAD
        .decode(rest)
        .map_err(|_| SecurityError::InvalidComponent)?;

    let limit = if config.max_decompressed_bytes > 0 {
        config.max_decompressed_bytes
    } else {
        usize::MAX
    };

    let mut decoder = GzDecoder::new(gzipped.as_slice());
    let mut out = Vec::new();
    let mut chunk = [0u8; 8192];
    loop {
        let read = decoder
            .read(&mut chunk)
            .map_err(|_| SecurityError::InvalidComponent)?;
        if read == 0 {
            break;
        }
        if out.len() + read > limit {
            return Err(SecurityError::DecompressedSizeExceeded);
        }
        out.extend_from_slice(&chunk[..read]);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_compression_is_identity_with_prefix() {
        let config = CompressionConfig {
            enabled: false,
            ..Default::default()
        };
        let payload = b"hello world";
        assert_eq!(encode(payload, &config), "0|hello world");
    }

    #[test]
    fn below_threshold_stays_raw() {
        let config = CompressionConfig {
            enabled: true,
            threshold_bytes: 1024,
            ..Default::default()
        };
        let payload = b"short";
        assert_eq!(encode(payload, &config), "0|short");
    }

    #[test]
    fn large_repetitive_payload_round_trips_through_gzip() {
        let config = CompressionConfig {
            enabled: true,
            threshold_bytes: 16,
            level: 6,
            max_decompressed_bytes: 0,
        };
        let payload = "a".repeat(4000);
        let envelope = encode(payload.as_bytes(), &config);
        assert!(envelope.starts_with("1|"));
        let decoded = decode(&envelope, &config).unwrap();
        assert_eq!(decoded, payload.as_bytes());
    }

    #[test]
    fn decompression_cap_aborts() {
        let config = CompressionConfig {
            enabled: true,
            threshold_bytes: 16,
            level: 6,
            max_decompressed_bytes: 10,
        };
        let payload = "b".repeat(4000);
        let envelope = encode(payload.as_bytes(), &config);
        assert!(matches!(
            decode(&envelope, &config),
            Err(SecurityError::DecompressedSizeExceeded)
        ));
    }

    #[test]
    fn unrecognized_prefix_treated_as_legacy_raw() {
        let config = CompressionConfig::default();
        let decoded = decode("legacy-frame-without-prefix", &config).unwrap();
        assert_eq!(decoded, b"legacy-frame-without-prefix");
    }
}
