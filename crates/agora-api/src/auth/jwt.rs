//! Credential minting and verification
//!
//! Implements the token issuer with HMAC-SHA256 signed JWTs. Access and
//! refresh credentials are signed with different secrets and carry a `typ`
//! claim, so neither can stand in for the other. Expiry is checked against
//! the injected [`Clock`], the same one used to stamp `iat`/`exp`.

use agora_core::{Clock, IdentityClaims, Role, TokenConfig};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

/// Which of the two credential kinds a token is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// Claims of a short-lived access credential
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Token issuer
    pub iss: String,
    /// Subject - identity id
    pub sub: Uuid,
    /// Unique token id
    pub jti: Uuid,
    pub typ: TokenKind,
    pub role: Role,
    /// Issued at (Unix seconds)
    pub iat: u64,
    /// Expires at (Unix seconds)
    pub exp: u64,
}

impl AccessClaims {
    pub fn identity(&self) -> IdentityClaims {
        IdentityClaims {
            subject_id: self.sub,
            role: self.role,
        }
    }
}

/// Claims of a long-lived refresh credential
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshClaims {
    pub iss: String,
    pub sub: Uuid,
    pub jti: Uuid,
    pub typ: TokenKind,
    pub iat: u64,
    pub exp: u64,
}

/// Why a credential was not accepted
///
/// Forgery and plain expiry are kept apart so they can be logged and
/// counted separately.
#[derive(Debug, Error)]
pub enum TokenError {
    #[error("Malformed token")]
    Malformed,

    #[error("Invalid token signature")]
    BadSignature,

    #[error("Token has expired")]
    Expired,

    #[error("Failed to sign token: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),
}

impl TokenError {
    /// Stable label for metrics and audit records
    pub fn reason(&self) -> &'static str {
        match self {
            TokenError::Malformed => "malformed",
            TokenError::BadSignature => "bad_signature",
            TokenError::Expired => "expired",
            TokenError::Signing(_) => "signing",
        }
    }
}

/// Freshly minted access/refresh credentials
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CredentialPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    /// Access credential lifetime in seconds
    pub expires_in: u64,
    /// Refresh credential lifetime in seconds
    pub refresh_expires_in: u64,
}

/// Opaque id of a credential, used as its deny-list key
///
/// SHA-256 of the raw token text, so it can be computed before any
/// signature check and never reveals the credential itself.
pub fn credential_id(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Stateless credential issuer
///
/// Keys are derived once from [`TokenConfig`] at construction.
pub struct TokenIssuer {
    access_encoding: EncodingKey,
    access_decoding: DecodingKey,
    refresh_encoding: EncodingKey,
    refresh_decoding: DecodingKey,
    issuer: String,
    access_ttl_secs: u64,
    refresh_ttl_secs: u64,
    clock: Arc<dyn Clock>,
}

impl TokenIssuer {
    pub fn new(config: &TokenConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            access_encoding: EncodingKey::from_secret(config.access_secret.as_bytes()),
            access_decoding: DecodingKey::from_secret(config.access_secret.as_bytes()),
            refresh_encoding: EncodingKey::from_secret(config.refresh_secret.as_bytes()),
            refresh_decoding: DecodingKey::from_secret(config.refresh_secret.as_bytes()),
            issuer: config.issuer.clone(),
            access_ttl_secs: config.access_ttl_secs,
            refresh_ttl_secs: config.refresh_ttl_secs,
            clock,
        }
    }

    pub fn access_ttl_secs(&self) -> u64 {
        self.access_ttl_secs
    }

    pub fn refresh_ttl_secs(&self) -> u64 {
        self.refresh_ttl_secs
    }

    /// Current time on the issuer's clock
    pub fn now(&self) -> u64 {
        self.clock.now()
    }

    /// Mint an access credential and a refresh credential for `claims`
    pub fn issue_pair(&self, claims: &IdentityClaims) -> Result<CredentialPair, TokenError> {
        let now = self.clock.now();

        let access = AccessClaims {
            iss: self.issuer.clone(),
            sub: claims.subject_id,
            jti: Uuid::new_v4(),
            typ: TokenKind::Access,
            role: claims.role,
            iat: now,
            exp: now + self.access_ttl_secs,
        };
        let refresh = RefreshClaims {
            iss: self.issuer.clone(),
            sub: claims.subject_id,
            jti: Uuid::new_v4(),
            typ: TokenKind::Refresh,
            iat: now,
            exp: now + self.refresh_ttl_secs,
        };

        let header = Header::new(Algorithm::HS256);
        let access_token = encode(&header, &access, &self.access_encoding)?;
        let refresh_token = encode(&header, &refresh, &self.refresh_encoding)?;

        Ok(CredentialPair {
            access_token,
            refresh_token,
            token_type: "Bearer".to_string(),
            expires_in: self.access_ttl_secs,
            refresh_expires_in: self.refresh_ttl_secs,
        })
    }

    /// Verify signature, kind and expiry of an access credential
    pub fn verify_access(&self, token: &str) -> Result<AccessClaims, TokenError> {
        let claims: AccessClaims = self.decode(token, &self.access_decoding)?;
        self.check(claims.typ, TokenKind::Access, claims.exp)?;
        Ok(claims)
    }

    /// Verify signature, kind and expiry of a refresh credential
    pub fn verify_refresh(&self, token: &str) -> Result<RefreshClaims, TokenError> {
        let claims: RefreshClaims = self.decode(token, &self.refresh_decoding)?;
        self.check(claims.typ, TokenKind::Refresh, claims.exp)?;
        Ok(claims)
    }

    fn decode<T: DeserializeOwned>(&self, token: &str, key: &DecodingKey) -> Result<T, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.issuer]);
        validation.set_required_spec_claims(&["exp", "sub", "iss"]);
        // Expiry is checked against our own clock with no leeway
        validation.validate_exp = false;
        validation.leeway = 0;

        let token_data = decode::<T>(token, key, &validation).map_err(|e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::InvalidSignature
            | jsonwebtoken::errors::ErrorKind::InvalidAlgorithm => TokenError::BadSignature,
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => TokenError::Expired,
            _ => TokenError::Malformed,
        })?;

        Ok(token_data.claims)
    }

    fn check(&self, actual: TokenKind, expected: TokenKind, exp: u64) -> Result<(), TokenError> {
        if actual != expected {
            return Err(TokenError::Malformed);
        }
        if exp <= self.clock.now() {
            return Err(TokenError::Expired);
        }
        Ok(())
    }
}
