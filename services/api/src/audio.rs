//! Audio payload handling for the media bridge.
//!
//! Both legs of the bridge speak G.711 μ-law at 8 kHz, so frames are never
//! resampled; they are only checked and re-encoded as standard base64.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

/// Audio format name the realtime backend expects for telephony audio.
pub const G711_ULAW: &str = "g711_ulaw";

/// Re-encodes a base64 audio payload, rejecting anything that does not decode.
///
/// Returns the number of audio bytes alongside the normalized payload.
pub fn normalize_payload(payload: &str) -> Result<(String, usize), base64::DecodeError> {
    let bytes = STANDARD.decode(payload)?;
    Ok((STANDARD.encode(&bytes), bytes.len()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_valid_payload() {
        let encoded = STANDARD.encode([0xffu8, 0x7f, 0x00, 0x80]);
        let (normalized, len) = normalize_payload(&encoded).unwrap();

        assert_eq!(normalized, encoded);
        assert_eq!(len, 4);
    }

    #[test]
    fn test_normalize_rejects_invalid_base64() {
        assert!(normalize_payload("not base64!").is_err());
    }

    #[test]
    fn test_normalize_empty_payload() {
        let (normalized, len) = normalize_payload("").unwrap();
        assert!(normalized.is_empty());
        assert_eq!(len, 0);
    }
}
