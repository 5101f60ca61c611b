//! Identity store adapters
//!
//! PostgreSQL-backed store for deployments and an in-memory store for
//! development and tests. Both implement [`IdentityStore`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::FromRow;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{AgoraError, IdentityRecord, IdentityStore, NewIdentity, Result, Role};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS identities (
    id UUID PRIMARY KEY,
    email TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL,
    phone TEXT,
    password_hash TEXT NOT NULL,
    role TEXT NOT NULL CHECK (role IN ('citizen', 'representative', 'admin')),
    state TEXT,
    lga TEXT,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    last_authenticated_at TIMESTAMPTZ
)
"#;

const SELECT_COLUMNS: &str =
    "id, email, name, phone, password_hash, role, state, lga, created_at, last_authenticated_at";

/// PostgreSQL identity store
pub struct PgIdentityStore {
    pool: PgPool,
}

impl PgIdentityStore {
    /// Create a new identity store connection
    pub async fn connect(database_url: &str, pool_size: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(pool_size)
            .connect(database_url)
            .await
            .map_err(|e| AgoraError::DatabaseError(format!("PostgreSQL connection failed: {e}")))?;

        Ok(Self { pool })
    }

    /// Create from an existing pool
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the identities table if it does not exist
    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(|e| AgoraError::DatabaseError(format!("Failed to create schema: {e}")))?;
        Ok(())
    }
}

/// Identity row from database
#[derive(Debug, FromRow)]
struct IdentityRow {
    id: Uuid,
    email: String,
    name: String,
    phone: Option<String>,
    password_hash: String,
    role: String,
    state: Option<String>,
    lga: Option<String>,
    created_at: DateTime<Utc>,
    last_authenticated_at: Option<DateTime<Utc>>,
}

impl TryFrom<IdentityRow> for IdentityRecord {
    type Error = AgoraError;

    fn try_from(row: IdentityRow) -> Result<Self> {
        let role: Role = row
            .role
            .parse()
            .map_err(|_| AgoraError::DatabaseError(format!("Unknown role in row: {}", row.role)))?;

        Ok(IdentityRecord {
            id: row.id,
            email: row.email,
            name: row.name,
            phone: row.phone,
            password_hash: row.password_hash,
            role,
            state: row.state,
            lga: row.lga,
            created_at: row.created_at,
            last_authenticated_at: row.last_authenticated_at,
        })
    }
}

#[async_trait]
impl IdentityStore for PgIdentityStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<IdentityRecord>> {
        let row: Option<IdentityRow> =
            sqlx::query_as(&format!("SELECT {SELECT_COLUMNS} FROM identities WHERE email = $1"))
                .bind(email)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| AgoraError::DatabaseError(format!("Failed to fetch identity: {e}")))?;

        row.map(IdentityRecord::try_from).transpose()
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<IdentityRecord>> {
        let row: Option<IdentityRow> =
            sqlx::query_as(&format!("SELECT {SELECT_COLUMNS} FROM identities WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| AgoraError::DatabaseError(format!("Failed to fetch identity: {e}")))?;

        row.map(IdentityRecord::try_from).transpose()
    }

    async fn create(&self, identity: NewIdentity) -> Result<IdentityRecord> {
        let row: IdentityRow = sqlx::query_as(&format!(
            r#"
            INSERT INTO identities (id, email, name, phone, password_hash, role, state, lga, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, NOW())
            RETURNING {SELECT_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(&identity.email)
        .bind(&identity.name)
        .bind(&identity.phone)
        .bind(&identity.password_hash)
        .bind(identity.role.as_str())
        .bind(&identity.state)
        .bind(&identity.lga)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                AgoraError::Conflict(identity.email.clone())
            }
            other => AgoraError::DatabaseError(format!("Failed to create identity: {other}")),
        })?;

        IdentityRecord::try_from(row)
    }

    async fn touch_last_authenticated(&self, id: Uuid, at: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE identities SET last_authenticated_at = $2 WHERE id = $1")
            .bind(id)
            .bind(at)
            .execute(&self.pool)
            .await
            .map_err(|e| AgoraError::DatabaseError(format!("Failed to update identity: {e}")))?;

        Ok(())
    }

    fn name(&self) -> &str {
        "postgres"
    }
}

/// In-memory identity store keyed by subject id
#[derive(Default)]
pub struct MemoryIdentityStore {
    identities: RwLock<HashMap<Uuid, IdentityRecord>>,
}

impl MemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.identities.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.identities.read().await.is_empty()
    }
}

#[async_trait]
impl IdentityStore for MemoryIdentityStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<IdentityRecord>> {
        let identities = self.identities.read().await;
        Ok(identities.values().find(|i| i.email == email).cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<IdentityRecord>> {
        Ok(self.identities.read().await.get(&id).cloned())
    }

    async fn create(&self, identity: NewIdentity) -> Result<IdentityRecord> {
        // Check and insert under one write lock so concurrent registrations
        // of the same email cannot both succeed
        let mut identities = self.identities.write().await;
        if identities.values().any(|i| i.email == identity.email) {
            return Err(AgoraError::Conflict(identity.email));
        }

        let record = identity.into_record(Uuid::new_v4(), Utc::now());
        identities.insert(record.id, record.clone());
        Ok(record)
    }

    async fn touch_last_authenticated(&self, id: Uuid, at: DateTime<Utc>) -> Result<()> {
        let mut identities = self.identities.write().await;
        let record = identities
            .get_mut(&id)
            .ok_or_else(|| AgoraError::NotFound(format!("identity {id}")))?;
        record.last_authenticated_at = Some(at);
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_identity(email: &str) -> NewIdentity {
        NewIdentity {
            email: email.to_string(),
            name: "Test".to_string(),
            phone: None,
            password_hash: "$argon2id$v=19$stub".to_string(),
            role: Role::Citizen,
            state: None,
            lga: None,
        }
    }

    #[tokio::test]
    async fn test_memory_create_and_find() {
        let store = MemoryIdentityStore::new();
        let created = store.create(new_identity("alice@example.com")).await.unwrap();

        let by_email = store.find_by_email("alice@example.com").await.unwrap().unwrap();
        assert_eq!(by_email.id, created.id);

        let by_id = store.find_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(by_id.email, "alice@example.com");
        assert!(store.find_by_email("bob@example.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_memory_duplicate_is_conflict() {
        let store = MemoryIdentityStore::new();
        store.create(new_identity("alice@example.com")).await.unwrap();

        let result = store.create(new_identity("alice@example.com")).await;
        assert!(matches!(result, Err(AgoraError::Conflict(_))));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_memory_touch_last_authenticated() {
        let store = MemoryIdentityStore::new();
        let created = store.create(new_identity("alice@example.com")).await.unwrap();
        assert!(created.last_authenticated_at.is_none());

        let at = Utc::now();
        store.touch_last_authenticated(created.id, at).await.unwrap();
        let reloaded = store.find_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(reloaded.last_authenticated_at, Some(at));

        assert!(matches!(
            store.touch_last_authenticated(Uuid::new_v4(), at).await,
            Err(AgoraError::NotFound(_))
        ));
    }

    #[test]
    fn test_row_with_unknown_role_is_rejected() {
        let row = IdentityRow {
            id: Uuid::new_v4(),
            email: "x@example.com".to_string(),
            name: "X".to_string(),
            phone: None,
            password_hash: String::new(),
            role: "superuser".to_string(),
            state: None,
            lga: None,
            created_at: Utc::now(),
            last_authenticated_at: None,
        };
        assert!(IdentityRecord::try_from(row).is_err());
    }
}
