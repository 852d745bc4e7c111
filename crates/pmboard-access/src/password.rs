//! PBKDF2-SHA256 password hashes in PHC string format.
//!
//! Stored form: `$pbkdf2-sha256$i=<rounds>,l=32$<salt>$<hash>`. Verification
//! reads the parameters back from the stored string, so raising `ROUNDS`
//! does not invalidate existing hashes.

use pbkdf2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use pbkdf2::{Algorithm, Params, Pbkdf2};
use pmboard_state::random_bytes;

use crate::error::{AccessError, AccessResult};

pub const MIN_PASSWORD_LEN: usize = 6;

const ROUNDS: u32 = 100_000;
const OUTPUT_LEN: usize = 32;
const SALT_BYTES: usize = 16;

pub fn hash_password(password: &str) -> AccessResult<String> {
    let salt = SaltString::encode_b64(&random_bytes(SALT_BYTES)?)
        .map_err(|e| AccessError::PasswordHash(e.to_string()))?;
    let params = Params {
        rounds: ROUNDS,
        output_length: OUTPUT_LEN,
    };
    let hash = Pbkdf2
        .hash_password_customized(
            password.as_bytes(),
            Some(Algorithm::Pbkdf2Sha256.ident()),
            None,
            params,
            &salt,
        )
        .map_err(|e| AccessError::PasswordHash(e.to_string()))?;
    Ok(hash.to_string())
}

/// Check `password` against a stored hash. Malformed hashes never verify.
pub fn verify_password(password: &str, stored: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored) else {
        return false;
    };
    Pbkdf2.verify_password(password.as_bytes(), &parsed).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_verifies_only_the_right_password() {
        let stored = hash_password("hunter22").unwrap();
        assert!(stored.starts_with("$pbkdf2-sha256$i=100000,l=32$"));
        assert!(verify_password("hunter22", &stored));
        assert!(!verify_password("hunter23", &stored));
    }

    #[test]
    fn salts_differ_between_hashes() {
        let a = hash_password("same").unwrap();
        let b = hash_password("same").unwrap();
        assert_ne!(a, b);
        assert!(verify_password("same", &a) && verify_password("same", &b));
    }

    #[test]
    fn hashes_with_other_round_counts_still_verify() {
        let salt = SaltString::encode_b64(b"fixed-salt-bytes").unwrap();
        let stored = Pbkdf2
            .hash_password_customized(
                b"legacy",
                Some(Algorithm::Pbkdf2Sha256.ident()),
                None,
                Params {
                    rounds: 1_000,
                    output_length: OUTPUT_LEN,
                },
                &salt,
            )
            .unwrap()
            .to_string();
        assert!(verify_password("legacy", &stored));
        assert!(!verify_password("legacy!", &stored));
    }

    #[test]
    fn malformed_hashes_never_verify() {
        assert!(!verify_password("x", ""));
        assert!(!verify_password("x", "plain"));
        assert!(!verify_password("x", "sha256$10000$aa$bb"));
        assert!(!verify_password("x", "$md5$aa$bb"));
        assert!(!verify_password("x", "$pbkdf2-sha256$i=1000,l=32$c2FsdA$"));
    }
}
