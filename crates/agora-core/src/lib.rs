//! Agora Core - Identity models, collaborator traits, and shared types
//!
//! This crate defines the abstractions the session service is built on:
//! - Roles and identity claim sets
//! - Identity records as kept by the identity store
//! - Common error types
//! - Traits for the identity store and notification senders
//! - Clock abstraction used for credential timestamps
//! - Configuration management

pub mod clock;
pub mod config;
pub mod identity;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{
    AppConfig, ConfigError, DatabaseConfig, HashingConfig, IdentityBackend, LoggingConfig,
    ServerConfig, SessionBackend, SessionStoreConfig, TokenConfig,
};
pub use identity::{MemoryIdentityStore, PgIdentityStore};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

// ============================================================================
// Error Types
// ============================================================================

/// Core error types for agora operations
#[derive(Error, Debug)]
pub enum AgoraError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    Conflict(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Notification error: {0}")]
    NotificationError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, AgoraError>;

// ============================================================================
// Roles
// ============================================================================

/// Role tag carried by every identity and every access credential.
///
/// Roles form a closed, flat set. Authorization is a membership test against
/// an allowed set; there is no ordering and no inheritance between roles.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Citizen,
    Representative,
    Admin,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Citizen, Role::Representative, Role::Admin];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Citizen => "citizen",
            Role::Representative => "representative",
            Role::Admin => "admin",
        }
    }

    /// True when this role is one of `allowed`
    pub fn is_in(&self, allowed: &[Role]) -> bool {
        allowed.contains(self)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = AgoraError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "citizen" => Ok(Role::Citizen),
            "representative" => Ok(Role::Representative),
            "admin" => Ok(Role::Admin),
            other => Err(AgoraError::ValidationError(format!("unknown role: {other}"))),
        }
    }
}

// ============================================================================
// Identity
// ============================================================================

/// Claim set embedded in every minted credential.
///
/// Supplied by the identity store at registration or login; immutable per
/// issuance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityClaims {
    pub subject_id: Uuid,
    pub role: Role,
}

/// Identity as held by the identity store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityRecord {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub phone: Option<String>,
    /// Argon2 PHC string; never serialized outward
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: Role,
    pub state: Option<String>,
    pub lga: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_authenticated_at: Option<DateTime<Utc>>,
}

impl IdentityRecord {
    pub fn claims(&self) -> IdentityClaims {
        IdentityClaims {
            subject_id: self.id,
            role: self.role,
        }
    }
}

/// Identity about to be persisted by registration
#[derive(Debug, Clone)]
pub struct NewIdentity {
    pub email: String,
    pub name: String,
    pub phone: Option<String>,
    pub password_hash: String,
    pub role: Role,
    pub state: Option<String>,
    pub lga: Option<String>,
}

impl NewIdentity {
    pub fn into_record(self, id: Uuid, created_at: DateTime<Utc>) -> IdentityRecord {
        IdentityRecord {
            id,
            email: self.email,
            name: self.name,
            phone: self.phone,
            password_hash: self.password_hash,
            role: self.role,
            state: self.state,
            lga: self.lga,
            created_at,
            last_authenticated_at: None,
        }
    }
}

/// Lower-case and trim an email so lookups are case-insensitive
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

// ============================================================================
// Traits
// ============================================================================

/// Identity store consumed by the session service.
///
/// The session service only reads identities, creates them at registration,
/// and stamps the last authentication time.
#[async_trait::async_trait]
pub trait IdentityStore: Send + Sync {
    /// Look up an identity by its (normalized) email
    async fn find_by_email(&self, email: &str) -> Result<Option<IdentityRecord>>;

    /// Look up an identity by subject id
    async fn find_by_id(&self, id: Uuid) -> Result<Option<IdentityRecord>>;

    /// Persist a new identity; fails with `Conflict` if the email is taken
    async fn create(&self, identity: NewIdentity) -> Result<IdentityRecord>;

    /// Record a successful authentication
    async fn touch_last_authenticated(&self, id: Uuid, at: DateTime<Utc>) -> Result<()>;

    /// Get backend name for logging
    fn name(&self) -> &str;
}

/// Notification sender (mail/SMS); called fire-and-forget
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    /// Greet a newly registered identity
    async fn welcome(&self, identity: &IdentityRecord) -> Result<()>;

    /// Tell an identity its session was closed
    async fn logged_out(&self, identity: &IdentityRecord) -> Result<()>;
}

// ============================================================================
// Tests
// ============================================================================
