use std::sync::{Arc, OnceLock};

use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};

use quill_db::IdentityStore;
use quill_types::models::User;

/// Hash a password with Argon2id and a random salt. Returns the PHC string.
pub fn hash_password(plain: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(plain.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("password hashing failed: {}", e))?;
    Ok(hash.to_string())
}

fn password_matches(plain: &str, phc: &str) -> bool {
    PasswordHash::new(phc)
        .map(|parsed| {
            Argon2::default()
                .verify_password(plain.as_bytes(), &parsed)
                .is_ok()
        })
        .unwrap_or(false)
}

/// Verified against when the username is unknown, so both failure paths do
/// one Argon2 verification.
fn dummy_hash() -> &'static str {
    static DUMMY: OnceLock<String> = OnceLock::new();
    DUMMY.get_or_init(|| hash_password("quill-timing-guard").unwrap_or_default())
}

#[derive(Clone)]
pub struct CredentialVerifier {
    identities: Arc<dyn IdentityStore>,
}

impl CredentialVerifier {
    pub fn new(identities: Arc<dyn IdentityStore>) -> Self {
        Self { identities }
    }

    /// `None` for an unknown username and for a wrong password alike.
    pub fn verify(&self, username: &str, password: &str) -> anyhow::Result<Option<User>> {
        match self.identities.find_by_username(username)? {
            Some(user) if password_matches(password, &user.password_hash) => Ok(Some(user)),
            Some(_) => Ok(None),
            None => {
                password_matches(password, dummy_hash());
                Ok(None)
            }
        }
    }
}
