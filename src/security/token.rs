//! Random tokens and User-Agent fingerprints.

use rand::RngCore;
use sha2::{Digest, Sha256};

/// Length of the User-Agent digest kept in a session binding.
pub const USER_AGENT_HASH_LEN: usize = 16;

/// Generate a hex token from `bytes` bytes of OS randomness.
pub fn generate_token(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rand::rngs::OsRng.fill_bytes(&mut buf);
    hex::encode(buf)
}

/// Short SHA-256 fingerprint of a User-Agent string.
///
/// A missing header hashes like the empty string so a client that never
/// sends one still binds consistently.
pub fn hash_user_agent(user_agent: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(user_agent.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    digest[..USER_AGENT_HASH_LEN].to_string()
}

/// Constant-time comparison for token checks.
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_length_and_uniqueness() {
        let a = generate_token(32);
        let b = generate_token(32);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn test_user_agent_hash_is_stable() {
        let ua = "Mozilla/5.0 (X11; Linux x86_64)";
        let h = hash_user_agent(ua);
        assert_eq!(h.len(), USER_AGENT_HASH_LEN);
        assert_eq!(h, hash_user_agent(ua));
        assert_ne!(h, hash_user_agent("curl/8.0"));
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq("abc", "abc"));
        assert!(!constant_time_eq("abc", "abd"));
        assert!(!constant_time_eq("abc", "ab"));
    }
}
