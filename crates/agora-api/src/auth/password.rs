/// Password hashing and verification using Argon2id
///
/// Hashes are PHC strings carrying algorithm, parameters and a random
/// 16-byte salt, so verification needs nothing but the stored string.
/// Verification fails closed: a malformed hash or an internal error is a
/// mismatch, never an error the caller has to interpret.
use agora_core::HashingConfig;
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2, Params,
};
use lazy_static::lazy_static;
use thiserror::Error;

lazy_static! {
    /// Dummy hash at the default cost, built at most once per process
    static ref DEFAULT_DUMMY_HASH: String = dummy_hash(&HashingConfig::default());
}

/// Password hashing errors
#[derive(Debug, Error)]
pub enum PasswordError {
    #[error("Invalid hashing parameters: {0}")]
    InvalidParams(String),

    #[error("Failed to hash password: {0}")]
    HashingFailed(String),
}

fn to_params(config: &HashingConfig) -> Result<Params, PasswordError> {
    Params::new(
        config.memory_cost_kib,
        config.time_cost,
        config.parallelism,
        Some(32),
    )
    .map_err(|e| PasswordError::InvalidParams(e.to_string()))
}

/// Hash a plaintext password with the configured Argon2id cost
///
/// # Example
///
/// ```no_run
/// use agora_api::auth::password::hash_password;
/// use agora_core::HashingConfig;
///
/// let hash = hash_password("SecureP@ssw0rd!", &HashingConfig::default()).unwrap();
/// assert!(hash.starts_with("$argon2id$"));
/// ```
pub fn hash_password(password: &str, config: &HashingConfig) -> Result<String, PasswordError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::new(
        argon2::Algorithm::Argon2id,
        argon2::Version::V0x13,
        to_params(config)?,
    );

    let password_hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| PasswordError::HashingFailed(e.to_string()))?;

    Ok(password_hash.to_string())
}

/// Check a plaintext password against a stored PHC hash
///
/// Returns `false` for a wrong password and for any hash that cannot be
/// parsed or evaluated.
pub fn verify_password(password: &str, hash: &str) -> bool {
    let parsed_hash = match PasswordHash::new(hash) {
        Ok(parsed) => parsed,
        Err(e) => {
            tracing::warn!(error = %e, "Stored password hash is malformed");
            return false;
        }
    };

    // Parameters come from the PHC string, not from Argon2::default()
    match Argon2::default().verify_password(password.as_bytes(), &parsed_hash) {
        Ok(()) => true,
        Err(argon2::password_hash::Error::Password) => false,
        Err(e) => {
            tracing::warn!(error = %e, "Password verification failed");
            false
        }
    }
}

/// Hash off the async reactor; Argon2 is deliberately slow
pub async fn hash_password_blocking(
    password: String,
    config: HashingConfig,
) -> Result<String, PasswordError> {
    tokio::task::spawn_blocking(move || hash_password(&password, &config))
        .await
        .map_err(|e| PasswordError::HashingFailed(e.to_string()))?
}

/// Verify off the async reactor; a panicked or cancelled task is a mismatch
pub async fn verify_password_blocking(password: String, hash: String) -> bool {
    tokio::task::spawn_blocking(move || verify_password(&password, &hash))
        .await
        .unwrap_or(false)
}

/// Hash checked when the identity is unknown
///
/// Verification cost follows the parameters embedded in the hash, so the
/// dummy must be built with the same [`HashingConfig`] as real password
/// hashes for a missing account to cost the same as a wrong password.
pub fn dummy_hash(config: &HashingConfig) -> String {
    match hash_password("agora-unknown-identity", config) {
        Ok(hash) => hash,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to build dummy password hash");
            String::new()
        }
    }
}

/// Dummy hash for the default cost parameters
pub fn default_dummy_hash() -> String {
    DEFAULT_DUMMY_HASH.clone()
}

/// Spend one verification against a dummy hash and discard the outcome
pub async fn burn_verification(password: String, dummy_hash: String) {
    let _ = tokio::task::spawn_blocking(move || verify_password(&password, &dummy_hash)).await;
}

/// Validate password strength
///
/// Checks if a password meets minimum security requirements:
/// - 8 to 128 characters
/// - At least 1 uppercase letter
/// - At least 1 lowercase letter
/// - At least 1 digit
/// - At least 1 special character
pub fn validate_password_strength(password: &str) -> Result<(), String> {
    let len = password.chars().count();
    if len < 8 {
        return Err("Password must be at least 8 characters long".to_string());
    }
    if len > 128 {
        return Err("Password must be at most 128 characters long".to_string());
    }

    if !password.chars().any(|c| c.is_uppercase()) {
        return Err("Password must contain at least one uppercase letter".to_string());
    }

    if !password.chars().any(|c| c.is_lowercase()) {
        return Err("Password must contain at least one lowercase letter".to_string());
    }

    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err("Password must contain at least one digit".to_string());
    }

    if !password.chars().any(|c| !c.is_alphanumeric()) {
        return Err("Password must contain at least one special character".to_string());
    }

    Ok(())
}
