//! Session identifier generation and validation.

use rand::Rng;
use rand::distributions::Alphanumeric;

const GENERATED_LENGTH: usize = 32;
const MIN_LENGTH: usize = 22;
const MAX_LENGTH: usize = 256;

/// Generates a random alphanumeric session id.
pub(crate) fn generate() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(GENERATED_LENGTH)
        .map(char::from)
        .collect()
}

/// Accepts ids of 22 to 256 characters from `[0-9a-zA-Z,-]`.
pub(crate) fn is_valid(id: &str) -> bool {
    (MIN_LENGTH..=MAX_LENGTH).contains(&id.len())
        && id
            .bytes()
            .all(|byte| byte.is_ascii_alphanumeric() || byte == b',' || byte == b'-')
}
