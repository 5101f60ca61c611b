//! Security audit logging for authentication events
//!
//! All audit events are logged at INFO level with the "audit" target, so
//! they can be filtered and routed apart from application logs. Each record
//! carries the event as structured fields and as one JSON document.
//!
//! Plaintext secrets and raw credentials never appear in an event;
//! credentials are referred to by their fingerprint.
//!
//! # Example
//!
//! ```ignore
//! use agora_api::audit::{audit_log, AuditContext, AuditEvent};
//!
//! audit_log(
//!     &AuditEvent::LoginSuccess { user_id, email: email.clone() },
//!     &AuditContext::from_headers(&headers),
//! );
//! ```

use agora_core::Role;
use axum::http::HeaderMap;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

/// Security audit events for authentication and authorization
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum AuditEvent {
    RegistrationSuccess {
        user_id: Uuid,
        email: String,
        role: Role,
    },

    RegistrationFailure {
        email: String,
        reason: String,
    },

    LoginSuccess {
        user_id: Uuid,
        email: String,
    },

    /// Reason is for operators only; callers always see the same error
    LoginFailure {
        email: String,
        reason: String,
    },

    TokenRefresh {
        user_id: Uuid,
    },

    RefreshRejected {
        user_id: Option<Uuid>,
        reason: String,
    },

    Logout {
        user_id: Uuid,
        credential_id: String,
    },

    /// Access credential rejected at the gateway
    InvalidToken {
        reason: String,
    },

    AccessDenied {
        user_id: Uuid,
        role: Role,
        allowed: Vec<Role>,
        resource: String,
    },

    SessionRevoked {
        subject_id: Uuid,
        revoked_by: Uuid,
    },

    StoreUnavailable {
        operation: String,
    },
}

impl AuditEvent {
    fn summary(&self) -> &'static str {
        match self {
            AuditEvent::RegistrationSuccess { .. } => "Registration successful",
            AuditEvent::RegistrationFailure { .. } => "Registration failed",
            AuditEvent::LoginSuccess { .. } => "Login successful",
            AuditEvent::LoginFailure { .. } => "Login failed",
            AuditEvent::TokenRefresh { .. } => "Token refresh",
            AuditEvent::RefreshRejected { .. } => "Token refresh rejected",
            AuditEvent::Logout { .. } => "User logout",
            AuditEvent::InvalidToken { .. } => "Invalid token",
            AuditEvent::AccessDenied { .. } => "Access denied",
            AuditEvent::SessionRevoked { .. } => "Session revoked",
            AuditEvent::StoreUnavailable { .. } => "Session store unavailable",
        }
    }

    fn subject(&self) -> Option<Uuid> {
        match self {
            AuditEvent::RegistrationSuccess { user_id, .. }
            | AuditEvent::LoginSuccess { user_id, .. }
            | AuditEvent::TokenRefresh { user_id }
            | AuditEvent::Logout { user_id, .. }
            | AuditEvent::AccessDenied { user_id, .. } => Some(*user_id),
            AuditEvent::RefreshRejected { user_id, .. } => *user_id,
            AuditEvent::SessionRevoked { subject_id, .. } => Some(*subject_id),
            _ => None,
        }
    }
}

/// Request metadata attached to every audit record
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditContext {
    /// Client IP address (from proxy headers)
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl AuditContext {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        Self {
            ip_address: extract_ip_address(headers),
            user_agent: extract_user_agent(headers),
        }
    }
}

/// Log a security audit event with structured fields
pub fn audit_log(event: &AuditEvent, ctx: &AuditContext) {
    let event_json = serde_json::to_string(event)
        .unwrap_or_else(|e| format!("{{\"error\":\"Failed to serialize audit event: {e}\"}}"));

    info!(
        target: "audit",
        timestamp = %Utc::now(),
        event = %event_json,
        user_id = ?event.subject(),
        ip_address = ?ctx.ip_address,
        user_agent = ?ctx.user_agent,
        "{}",
        event.summary()
    );
}

/// Extract IP address from request headers
///
/// Checks X-Forwarded-For, then X-Real-IP. The peer address is not
/// available here.
pub fn extract_ip_address(headers: &HeaderMap) -> Option<String> {
    // First entry of the chain is the client
    if let Some(xff) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        if let Some(first_ip) = xff.split(',').next() {
            return Some(first_ip.trim().to_string());
        }
    }

    headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}

pub fn extract_user_agent(headers: &HeaderMap) -> Option<String> {
    headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|ua| ua.to_str().ok())
        .map(|s| s.to_string())
}
