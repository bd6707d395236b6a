//! Pairing tokens embedded in connection descriptions.

use rand::Rng;

/// Token length in bytes (produces 32 hex characters).
const TOKEN_BYTES: usize = 16;

/// Generates a random pairing token as a 32-character lowercase hex string.
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill(&mut bytes);
    hex::encode(bytes)
}

/// Compares the token presented by a connecting peer with the published one.
///
/// Constant-time over equal-length inputs.
pub fn validate_token(presented: &str, published: &str) -> bool {
    if presented.len() != published.len() {
        return false;
    }
    presented
        .bytes()
        .zip(published.bytes())
        .fold(0u8, |diff, (a, b)| diff | (a ^ b))
        == 0
}
