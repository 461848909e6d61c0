//! Security utilities (spec.md §4.1): component Base64, checksums,
//! pluggable-scheme signatures, trailing-segment parsing, and identifier
//! validation.

use std::{collections::HashSet, sync::Arc};

use base64::{
    engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD},
    Engine as _,
};
use hmac::{Hmac, Mac};
use rsa::{
    pkcs1v15::{Signature as RsaSignature, SigningKey, VerifyingKey},
    signature::{SignatureEncoding, Signer, Verifier},
    RsaPrivateKey, RsaPublicKey,
};
use sha2::Sha256;

use crate::error::SecurityError;

/// URL-safe, unpadded Base64 used for every wire component (spec.md §4.1).
/// Guaranteed to never emit `|`, `/`, `+`, or `=`.
pub fn component_encode(bytes: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

pub fn component_decode(token: &str) -> Result<Vec<u8>, SecurityError> {
    URL_SAFE_NO_PAD
        .decode(token)
        .map_err(|_| SecurityError::InvalidComponent)
}

/// Padded URL-safe Base64 used for `META_B64` (both versions) and V2's
/// array-element tokens (spec.md §6 grammar: `url-safe-base64(META)`; §4.5:
/// "a URL-safe Base64 token, which the parser converts to standard Base64
/// before decoding" — the `URL_SAFE` engine performs that translation and
/// padded decode in one step).
pub fn meta_encode(bytes: &[u8]) -> String {
    URL_SAFE.encode(bytes)
}

pub fn meta_decode(token: &str) -> Result<Vec<u8>, SecurityError> {
    URL_SAFE
        .decode(token)
        .map_err(|_| SecurityError::InvalidComponent)
}

/// Checksum algorithm selection (spec.md §3 Security configuration).
#[derive(Debug, Clone)]
pub enum ChecksumConfig {
    None,
    Crc32,
    HmacSha256 { key: Vec<u8> },
}

/// A pluggable digital-signature handler (spec.md §9's "pluggable signature
/// schemes" note): `sign(bytes, private_key)` / `verify(bytes, sig,
/// public_key)`. The built-in `RSA` handler is always registered.
pub trait SignatureScheme: Send + Sync {
    fn name(&self) -> &'static str;
    fn sign(&self, payload: &[u8], private_key: &[u8]) -> Result<Vec<u8>, SecurityError>;
    fn verify(&self, payload: &[u8], signature: &[u8], public_key: &[u8]) -> Result<bool, SecurityError>;
}

/// RSA-PKCS1v15 over SHA-256, keys supplied as PKCS#1 DER.
pub struct RsaScheme;

impl SignatureScheme for RsaScheme {
    fn name(&self) -> &'static str {
        "RSA"
    }

    fn sign(&self, payload: &[u8], private_key: &[u8]) -> Result<Vec<u8>, SecurityError> {
        use rsa::pkcs1::DecodeRsaPrivateKey;
        let key = RsaPrivateKey::from_pkcs1_der(private_key)
            .map_err(|_| SecurityError::SignatureInvalid)?;
        let signing_key = SigningKey::<Sha256>::new(key);
        let signature = signing_key.sign(payload);
        Ok(signature.to_vec())
    }

    fn verify(&self, payload: &[u8], signature: &[u8], public_key: &[u8]) -> Result<bool, SecurityError> {
        use rsa::pkcs1::DecodeRsaPublicKey;
        let key = RsaPublicKey::from_pkcs1_der(public_key)
            .map_err(|_| SecurityError::SignatureInvalid)?;
        let verifying_key = VerifyingKey::<Sha256>::new(key);
        let signature =
            RsaSignature::try_from(signature).map_err(|_| SecurityError::SignatureInvalid)?;
        Ok(verifying_key.verify(payload, &signature).is_ok())
    }
}

/// Outgoing/incoming signing configuration. Held by the server/client owning
/// it; not process-global (spec.md §9).
#[derive(Clone)]
pub struct SignatureConfig {
    pub scheme: String,
    pub private_key: Option<Arc<Vec<u8>>>,
    pub public_key: Option<Arc<Vec<u8>>>,
}

/// Registry of available `SignatureScheme` handlers, keyed by scheme name.
#[derive(Clone)]
pub struct SchemeRegistry {
    schemes: Arc<Vec<Arc<dyn SignatureScheme>>>,
}

impl SchemeRegistry {
    pub fn with_defaults() -> Self {
        Self {
            schemes: Arc::new(vec![Arc::new(RsaScheme)]),
        }
    }

    pub fn register(&mut self, scheme: Arc<dyn SignatureScheme>) {
        Arc::make_mut(&mut self.schemes).push(scheme);
    }

    pub fn find(&self, name: &str) -> Option<Arc<dyn SignatureScheme>> {
        self.schemes.iter().find(|s| s.name() == name).cloned()
    }
}

impl Default for SchemeRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Full security configuration, immutable once installed on a server/client
/// (spec.md §3).
#[derive(Clone)]
pub struct SecurityConfig {
    pub checksum: ChecksumConfig,
    pub signature: Option<SignatureConfig>,
    pub schemes: SchemeRegistry,
    pub class_whitelist: Option<HashSet<String>>,
    pub max_decompressed_bytes: usize,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            checksum: ChecksumConfig::None,
            signature: None,
            schemes: SchemeRegistry::with_defaults(),
            class_whitelist: None,
            max_decompressed_bytes: 0,
        }
    }
}

/// `CHK:<hex>` segment, or `""` when checksumming is disabled.
pub fn checksum(payload: &[u8], config: &ChecksumConfig) -> String {
    match config {
        ChecksumConfig::None => String::new(),
        ChecksumConfig::Crc32 => {
            let value = crc32fast::hash(payload);
            format!("CHK:{value:08x}")
        }
        ChecksumConfig::HmacSha256 { key } => {
            let mut mac = Hmac::<Sha256>::new_from_slice(key).expect("HMAC accepts any key length");
            mac.update(payload);
            let bytes = mac.finalize().into_bytes();
            format!("CHK:{}", hex_lower(&bytes))
        }
    }
}

pub fn verify_checksum(payload: &[u8], segment: &str, config: &ChecksumConfig) -> bool {
    match config {
        ChecksumConfig::None => segment.is_empty(),
        _ => checksum(payload, config) == segment,
    }
}

/// `SIG:<SCHEME>:<base64>` segment, signing `content` plus the `CHK:` segment
/// when present (spec.md §4.1: SIG is always the last segment and covers the
/// checksum too).
pub fn signature(
    signed_payload: &[u8],
    config: &SecurityConfig,
) -> Result<String, SecurityError> {
    let Some(sig_config) = &config.signature else {
        return Ok(String::new());
    };
    let scheme = config
        .schemes
        .find(&sig_config.scheme)
        .ok_or_else(|| SecurityError::UnknownScheme(sig_config.scheme.clone()))?;
    let private_key = sig_config
        .private_key
        .as_ref()
        .ok_or(SecurityError::SignatureInvalid)?;
    let raw = scheme.sign(signed_payload, private_key)?;
    Ok(format!(
        "SIG:{}:{}",
        sig_config.scheme,
        component_encode(&raw)
    ))
}

pub fn verify_signature_segment(
    signed_payload: &[u8],
    segment: &str,
    config: &SecurityConfig,
) -> Result<(), SecurityError> {
    let Some(sig_config) = &config.signature else {
        return if segment.is_empty() {
            Ok(())
        } else {
            // Signing disabled but a signature was presented: spec is silent
            // on this exact case; treat it like signing-required-but-absent
            // for symmetry and reject rather than silently ignore it.
            Err(SecurityError::SignatureInvalid)
        };
    };
    if segment.is_empty() {
        return Err(SecurityError::SignatureMissing);
    }
    let mut parts = segment.splitn(3, ':');
    let (Some("SIG"), Some(scheme_name), Some(b64)) = (parts.next(), parts.next(), parts.next())
    else {
        return Err(SecurityError::SignatureInvalid);
    };
    let scheme = config
        .schemes
        .find(scheme_name)
        .ok_or_else(|| SecurityError::UnknownScheme(scheme_name.to_string()))?;
    let public_key = sig_config
        .public_key
        .as_ref()
        .ok_or(SecurityError::SignatureInvalid)?;
    let raw = component_decode(b64)?;
    if scheme.verify(signed_payload, &raw, public_key)? {
        Ok(())
    } else {
        Err(SecurityError::SignatureInvalid)
    }
}

/// Split a frame's content from its trailing `CHK:`/`SIG:` segments. At most
/// one of each, in that order (spec.md §4.1).
pub struct SplitFrame<'a> {
    pub content: &'a str,
    pub checksum_segment: &'a str,
    pub signature_segment: &'a str,
}

pub fn split_trailing(frame: &str) -> SplitFrame<'_> {
    let mut rest = frame;
    let mut sig = "";
    if let Some(idx) = rest.rfind("|SIG:") {
        if rest[idx + 1..].starts_with("SIG:") {
            sig = &rest[idx + 1..];
            rest = &rest[..idx];
        }
    }
    let mut chk = "";
    if let Some(idx) = rest.rfind("|CHK:") {
        if rest[idx + 1..].starts_with("CHK:") {
            chk = &rest[idx + 1..];
            rest = &rest[..idx];
        }
    }
    SplitFrame {
        content: rest,
        checksum_segment: chk,
        signature_segment: sig,
    }
}

fn hex_lower(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        write!(out, "{b:02x}").expect("writing into a String never fails");
    }
    out
}

/// `[A-Za-z_$][A-Za-z0-9_$]*`, dot-separated for class names. Rejects `..`,
/// `/`, `<`, `>`, and the empty string, so that Base64-smuggled injection
/// attempts fail fast even after successful decoding (spec.md §4.1).
pub fn is_valid_class_name(name: &str) -> bool {
    if name.is_empty() || name.contains("..") || name.contains('/') || name.contains('<') || name.contains('>') {
        return false;
    }
    name.split('.').all(is_valid_identifier)
}

pub fn is_valid_method_name(name: &str) -> bool {
    is_valid_identifier(name)
}

fn is_valid_identifier(segment: &str) -> bool {
    let mut chars = segment.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn component_round_trips_arbitrary_bytes() {
        let bytes = vec![0u8, 1, 2, 255, 254, b'|', b'=', b'+'];
        let token = component_encode(&bytes);
        assert!(!token.contains(['|', '/', '+', '=']));
        assert_eq!(component_decode(&token).unwrap(), bytes);
    }

    #[test]
    fn crc32_checksum_detects_tampering() {
        let config = ChecksumConfig::Crc32;
        let payload = b"V2|0|{{abc}}|[NQ==]";
        let chk = checksum(payload, &config);
        assert!(verify_checksum(payload, &chk, &config));
        let mut tampered = payload.to_vec();
        tampered[2] ^= 1;
        assert!(!verify_checksum(&tampered, &chk, &config));
    }

    #[test]
    fn split_trailing_recognizes_both_segments() {
        let frame = "V2|0|{{x}}|[]|CHK:deadbeef|SIG:RSA:abc";
        let split = split_trailing(frame);
        assert_eq!(split.content, "V2|0|{{x}}|[]");
        assert_eq!(split.checksum_segment, "CHK:deadbeef");
        assert_eq!(split.signature_segment, "SIG:RSA:abc");
    }

    #[test]
    fn split_trailing_handles_absent_segments() {
        let frame = "V2|0|{{x}}|[]";
        let split = split_trailing(frame);
        assert_eq!(split.content, frame);
        assert_eq!(split.checksum_segment, "");
        assert_eq!(split.signature_segment, "");
    }

    #[test]
    fn class_name_validation_rejects_injection_shapes() {
        assert!(is_valid_class_name("com.example.Foo"));
        assert!(!is_valid_class_name("com..Foo"));
        assert!(!is_valid_class_name("../etc/passwd"));
        assert!(!is_valid_class_name(""));
        assert!(!is_valid_class_name("com.example.<script>"));
    }

    fn rsa_signing_config() -> SecurityConfig {
        use rsa::pkcs1::{EncodeRsaPrivateKey, EncodeRsaPublicKey};
        let mut rng = rand::thread_rng();
        let private_key = RsaPrivateKey::new(&mut rng, 1024).expect("key generation");
        let public_key = RsaPublicKey::from(&private_key);
        let private_der = private_key.to_pkcs1_der().expect("encode private key").as_bytes().to_vec();
        let public_der = public_key.to_pkcs1_der().expect("encode public key").as_bytes().to_vec();
        SecurityConfig {
            signature: Some(SignatureConfig {
                scheme: "RSA".to_string(),
                private_key: Some(Arc::new(private_der)),
                public_key: Some(Arc::new(public_der)),
            }),
            ..SecurityConfig::default()
        }
    }

    #[test]
    fn signature_segment_round_trips_and_verifies() {
        let config = rsa_signing_config();
        let payload = b"V2|0|{{abc}}|[NQ==]";
        let segment = signature(payload, &config).unwrap();
        assert!(segment.starts_with("SIG:RSA:"));
        assert!(verify_signature_segment(payload, &segment, &config).is_ok());
    }

    #[test]
    fn tampered_content_fails_signature_verification() {
        let config = rsa_signing_config();
        let payload = b"V2|0|{{abc}}|[NQ==]";
        let segment = signature(payload, &config).unwrap();
        let tampered = b"V2|0|{{abd}}|[NQ==]";
        assert!(matches!(
            verify_signature_segment(tampered, &segment, &config),
            Err(SecurityError::SignatureInvalid)
        ));
    }

    #[test]
    fn tampered_checksum_segment_fails_signature_verification() {
        // The signed payload includes the CHK segment (spec.md §4.1), so
        // tampering with CHK alone — without re-signing — must also fail.
        let config = rsa_signing_config();
        let content = "V2|0|{{abc}}|[NQ==]";
        let original_chk = "CHK:deadbeef";
        let signed_payload = format!("{content}|{original_chk}");
        let segment = signature(signed_payload.as_bytes(), &config).unwrap();

        let tampered_chk = "CHK:beefdead";
        let tampered_payload = format!("{content}|{tampered_chk}");
        assert!(matches!(
            verify_signature_segment(tampered_payload.as_bytes(), &segment, &config),
            Err(SecurityError::SignatureInvalid)
        ));
    }
}
