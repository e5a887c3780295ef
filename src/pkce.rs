//! Random correlation material for the authorization code flow: the `state`
//! parameter, the ID-token nonce, and the PKCE verifier/challenge pair.

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::RngCore;
use sha2::{Digest, Sha256};

/// Random `state` parameter (16 bytes, base64url).
pub fn generate_state() -> String {
    random_urlsafe(16)
}

/// Random ID-token nonce (16 bytes, base64url).
pub fn generate_nonce() -> String {
    random_urlsafe(16)
}

/// Random PKCE code verifier. 48 bytes encode to 64 characters, inside the
/// 43-128 range RFC 7636 requires.
pub fn generate_code_verifier() -> String {
    random_urlsafe(48)
}

/// S256 code challenge: `BASE64URL(SHA256(verifier))`.
pub fn code_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

fn random_urlsafe(len: usize) -> String {
    let mut buf = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut buf);
    URL_SAFE_NO_PAD.encode(buf)
}
