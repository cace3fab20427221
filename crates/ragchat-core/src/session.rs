//! Per-process session identity sent with every chat request.

use std::sync::{Arc, OnceLock};
use std::time::{SystemTime, UNIX_EPOCH};

use rand::Rng;

pub const SESSION_HEADER: &str = "X-Session-ID";

const TOKEN_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const TOKEN_SUFFIX_LEN: usize = 7;

/// Lazily creates one opaque token and hands out the same value for the
/// lifetime of the client. Clones share the token.
#[derive(Debug, Clone, Default)]
pub struct SessionIdentity {
    token: Arc<OnceLock<String>>,
}

impl SessionIdentity {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a known token instead of generating one.
    pub fn with_token(token: impl Into<String>) -> Self {
        let identity = Self::new();
        let _ = identity.token.set(token.into());
        identity
    }

    pub fn token(&self) -> &str {
        self.token.get_or_init(generate_token)
    }
}

/// `session_<unix millis>_<7 base36 chars>`
fn generate_token() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();

    let mut rng = rand::thread_rng();
    let suffix: String = (0..TOKEN_SUFFIX_LEN)
        .map(|_| TOKEN_ALPHABET[rng.gen_range(0..TOKEN_ALPHABET.len())] as char)
        .collect();

    let token = format!("session_{}_{}", millis, suffix);
    tracing::debug!(%token, "created session token");
    token
}
