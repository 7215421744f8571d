use sha2::{Digest, Sha256};

/// Digest algorithms, ordered strongest first. Verification walks this list
/// so legacy fallback digests keep working; anything that matches on a
/// non-primary scheme is flagged for a silent upgrade to the primary one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestScheme {
    /// SHA-256 over the salted password, hex encoded.
    Primary,
    /// Weak 32-bit rolling hash over the same salted input, base36 with an
    /// `fb` prefix. Kept only to verify records written by environments
    /// without a strong primitive; never used for new writes.
    Fallback,
}

pub const VERIFY_ORDER: &[DigestScheme] = &[DigestScheme::Primary, DigestScheme::Fallback];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerifyMatch {
    pub scheme: DigestScheme,
    /// True when the stored digest matched a non-primary scheme and should
    /// be transparently re-saved with the primary digest.
    pub needs_upgrade: bool,
}

pub struct HashManager {
    static_salt: String,
}

impl HashManager {
    pub fn new(static_salt: &str) -> Self {
        Self {
            static_salt: static_salt.to_string(),
        }
    }

    fn salted(&self, password: &str) -> String {
        format!("{}{}", password, self.static_salt)
    }

    /// Digest for new writes. Always the primary scheme.
    pub fn hash(&self, password: &str) -> String {
        self.compute(DigestScheme::Primary, password)
    }

    pub fn compute(&self, scheme: DigestScheme, password: &str) -> String {
        let input = self.salted(password);
        match scheme {
            DigestScheme::Primary => {
                let digest = Sha256::digest(input.as_bytes());
                hex::encode(digest)
            }
            DigestScheme::Fallback => format!("fb{}", to_base36(rolling_hash(&input) as u64)),
        }
    }

    /// Try each scheme in order against the stored digest.
    pub fn verify(&self, stored_digest: &str, password: &str) -> Option<VerifyMatch> {
        for (position, scheme) in VERIFY_ORDER.iter().enumerate() {
            if constant_time_eq(&self.compute(*scheme, password), stored_digest) {
                return Some(VerifyMatch {
                    scheme: *scheme,
                    needs_upgrade: position > 0,
                });
            }
        }
        None
    }
}

/// 32-bit rolling hash (`h = h * 31 + c`, wrapping), the shared weak
/// primitive behind the fallback digest and the device fingerprint.
pub fn rolling_hash(input: &str) -> u32 {
    let mut hash: i32 = 0;
    for c in input.chars() {
        hash = hash.wrapping_shl(5).wrapping_sub(hash).wrapping_add(c as i32);
    }
    hash.unsigned_abs()
}

pub fn to_base36(mut value: u64) -> String {
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

    if value == 0 {
        return "0".to_string();
    }

    let mut out = Vec::new();
    while value > 0 {
        out.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    out.reverse();
    String::from_utf8(out).expect("base36 digits are ASCII")
}

/// Compare two digests in constant time to avoid leaking prefix length
fn constant_time_eq(a: &str, b: &str) -> bool {
    a.len() == b.len()
        && a.as_bytes()
            .iter()
            .zip(b.as_bytes().iter())
            .fold(0u8, |acc, (x, y)| acc | (x ^ y))
            == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> HashManager {
        HashManager::new("test-salt")
    }

    #[test]
    fn test_primary_hash_round_trip() {
        let m = manager();
        let digest = m.hash("pw123456");

        let matched = m.verify(&digest, "pw123456").unwrap();
        assert_eq!(matched.scheme, DigestScheme::Primary);
        assert!(!matched.needs_upgrade);
    }

    #[test]
    fn test_fallback_round_trip_flags_upgrade() {
        let m = manager();
        let digest = m.compute(DigestScheme::Fallback, "pw123456");
        assert!(digest.starts_with("fb"));

        let matched = m.verify(&digest, "pw123456").unwrap();
        assert_eq!(matched.scheme, DigestScheme::Fallback);
        assert!(matched.needs_upgrade);
    }

    #[test]
    fn test_wrong_password_matches_nothing() {
        let m = manager();
        let digest = m.hash("correct-horse");
        assert!(m.verify(&digest, "wrong-horse").is_none());
    }

    #[test]
    fn test_digests_are_deterministic() {
        let m = manager();
        assert_eq!(m.hash("abc"), m.hash("abc"));
        assert_eq!(
            m.compute(DigestScheme::Fallback, "abc"),
            m.compute(DigestScheme::Fallback, "abc")
        );
    }

    #[test]
    fn test_salt_changes_digest() {
        let a = HashManager::new("salt-a").hash("pw");
        let b = HashManager::new("salt-b").hash("pw");
        assert_ne!(a, b);
    }

    #[test]
    fn test_scheme_families_cannot_collide() {
        // Primary digests are 64 hex chars; fallback digests carry the fb
        // prefix and stay far shorter.
        let m = manager();
        let primary = m.hash("pw");
        let fallback = m.compute(DigestScheme::Fallback, "pw");

        assert_eq!(primary.len(), 64);
        assert!(fallback.len() < 12);
        assert!(fallback.starts_with("fb"));
    }

    #[test]
    fn test_rolling_hash_known_values() {
        assert_eq!(rolling_hash(""), 0);
        // "a" -> 'a' as i32 = 97
        assert_eq!(rolling_hash("a"), 97);
        // "ab" -> 97 * 31 + 98
        assert_eq!(rolling_hash("ab"), 97 * 31 + 98);
    }

    #[test]
    fn test_to_base36() {
        assert_eq!(to_base36(0), "0");
        assert_eq!(to_base36(35), "z");
        assert_eq!(to_base36(36), "10");
        assert_eq!(to_base36(1_295), "zz");
    }
}
