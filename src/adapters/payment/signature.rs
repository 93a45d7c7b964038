//! Webhook signature primitives shared by the provider adapters.
//!
//! HMAC-SHA256 with constant-time comparison, plus parsers for the two
//! signature header formats.

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// HMAC-SHA256 of `message` under `secret`.
pub fn hmac_sha256(secret: &[u8], message: &[u8]) -> Option<Vec<u8>> {
    let mut mac = HmacSha256::new_from_slice(secret).ok()?;
    mac.update(message);
    Some(mac.finalize().into_bytes().to_vec())
}

/// Lowercase hex SHA-256 of `payload`.
pub fn sha256_hex(payload: &[u8]) -> String {
    hex::encode(Sha256::digest(payload))
}

/// Compares an expected MAC to a provided one without leaking timing.
pub fn signatures_match(expected: &[u8], provided: &[u8]) -> bool {
    expected.ct_eq(provided).unwrap_u8() == 1
}

/// Why a signature header couldn't be parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureParseError {
    MissingHeader,
    MissingField(&'static str),
    InvalidTimestamp,
    InvalidSignatureFormat,
}

impl std::fmt::Display for SignatureParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingHeader => write!(f, "Missing signature header"),
            Self::MissingField(name) => write!(f, "Missing '{}' in signature header", name),
            Self::InvalidTimestamp => write!(f, "Invalid timestamp format"),
            Self::InvalidSignatureFormat => write!(f, "Invalid signature format (not valid hex)"),
        }
    }
}

impl std::error::Error for SignatureParseError {}

/// Stripe-style header: `t=<unix>,v1=<hex>[,v1=<hex>...][,v0=<hex>]`.
///
/// Several `v1` entries appear while a signing secret is being rolled.
#[derive(Debug, Clone)]
pub struct TimestampedSignature {
    pub timestamp: i64,
    pub signatures: Vec<Vec<u8>>,
}

impl TimestampedSignature {
    pub fn parse(header: &str) -> Result<Self, SignatureParseError> {
        if header.trim().is_empty() {
            return Err(SignatureParseError::MissingHeader);
        }

        let mut timestamp = None;
        let mut signatures = Vec::new();
        for part in header.split(',') {
            let Some((key, value)) = part.split_once('=') else {
                continue;
            };
            match key.trim() {
                "t" => {
                    timestamp = Some(
                        value
                            .trim()
                            .parse::<i64>()
                            .map_err(|_| SignatureParseError::InvalidTimestamp)?,
                    );
                }
                "v1" => signatures.push(
                    hex::decode(value.trim())
                        .map_err(|_| SignatureParseError::InvalidSignatureFormat)?,
                ),
                // v0 and unknown schemes are ignored
                _ => {}
            }
        }

        let timestamp = timestamp.ok_or(SignatureParseError::MissingField("t"))?;
        if signatures.is_empty() {
            return Err(SignatureParseError::MissingField("v1"));
        }
        Ok(Self {
            timestamp,
            signatures,
        })
    }
}

/// PayPal-style transmission header:
/// `transmission_id=<id>,transmission_time=<rfc3339>,signature=<hex>`.
#[derive(Debug, Clone)]
pub struct TransmissionSignature {
    pub transmission_id: String,
    pub transmission_time: String,
    pub signature: Vec<u8>,
}

impl TransmissionSignature {
    pub fn parse(header: &str) -> Result<Self, SignatureParseError> {
        if header.trim().is_empty() {
            return Err(SignatureParseError::MissingHeader);
        }

        let mut transmission_id = None;
        let mut transmission_time = None;
        let mut signature = None;
        for part in header.split(',') {
            let Some((key, value)) = part.split_once('=') else {
                continue;
            };
            let value = value.trim();
            match key.trim() {
                "transmission_id" => transmission_id = Some(value.to_string()),
                "transmission_time" => transmission_time = Some(value.to_string()),
                "signature" => {
                    signature = Some(
                        hex::decode(value)
                            .map_err(|_| SignatureParseError::InvalidSignatureFormat)?,
                    )
                }
                _ => {}
            }
        }

        Ok(Self {
            transmission_id: transmission_id
                .filter(|v| !v.is_empty())
                .ok_or(SignatureParseError::MissingField("transmission_id"))?,
            transmission_time: transmission_time
                .filter(|v| !v.is_empty())
                .ok_or(SignatureParseError::MissingField("transmission_time"))?,
            signature: signature.ok_or(SignatureParseError::MissingField("signature"))?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_timestamped_header_with_rolled_secrets() {
        let header = format!("t=1704067200,v1={},v1={},v0=00", "ab".repeat(32), "cd".repeat(32));
        let parsed = TimestampedSignature::parse(&header).unwrap();
        assert_eq!(parsed.timestamp, 1704067200);
        assert_eq!(parsed.signatures.len(), 2);
    }

    #[test]
    fn timestamped_header_requires_t_and_v1() {
        assert_eq!(
            TimestampedSignature::parse("v1=abcd").unwrap_err(),
            SignatureParseError::MissingField("t")
        );
        assert_eq!(
            TimestampedSignature::parse("t=1704067200").unwrap_err(),
            SignatureParseError::MissingField("v1")
        );
        assert_eq!(
            TimestampedSignature::parse("t=soon,v1=abcd").unwrap_err(),
            SignatureParseError::InvalidTimestamp
        );
        assert_eq!(
            TimestampedSignature::parse("t=1,v1=zz").unwrap_err(),
            SignatureParseError::InvalidSignatureFormat
        );
        assert_eq!(
            TimestampedSignature::parse("").unwrap_err(),
            SignatureParseError::MissingHeader
        );
    }

    #[test]
    fn parses_transmission_header() {
        let parsed = TransmissionSignature::parse(
            "transmission_id=abc-123,transmission_time=2024-01-01T00:00:00Z,signature=beef",
        )
        .unwrap();
        assert_eq!(parsed.transmission_id, "abc-123");
        assert_eq!(parsed.signature, vec![0xbe, 0xef]);
    }

    #[test]
    fn hmac_matches_known_vector() {
        // RFC 4231 test case 2
        let mac = hmac_sha256(b"Jefe", b"what do ya want for nothing?").unwrap();
        assert_eq!(
            hex::encode(&mac),
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn signatures_match_is_length_sensitive() {
        assert!(signatures_match(&[1, 2, 3], &[1, 2, 3]));
        assert!(!signatures_match(&[1, 2, 3], &[1, 2]));
        assert!(!signatures_match(&[1, 2, 3], &[1, 2, 4]));
    }
}
