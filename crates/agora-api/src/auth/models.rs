//! Request and response bodies of the auth endpoints

use super::jwt::CredentialPair;
use super::password::validate_password_strength;
use agora_core::{IdentityRecord, Role};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationError};

fn strong_password(password: &str) -> Result<(), ValidationError> {
    validate_password_strength(password).map_err(|msg| {
        let mut error = ValidationError::new("password_strength");
        error.message = Some(msg.into());
        error
    })
}

/// Registration request
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct RegisterRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[validate(length(min = 2, max = 100, message = "Name must be 2 to 100 characters"))]
    pub name: String,

    #[validate(length(min = 7, max = 20, message = "Phone must be 7 to 20 characters"))]
    pub phone: Option<String>,

    #[validate(custom(function = "strong_password"))]
    pub password: String,

    /// Defaults to `citizen`; `admin` cannot be self-assigned
    #[serde(default)]
    pub role: Option<Role>,

    #[validate(length(min = 1, max = 100))]
    pub state: Option<String>,

    /// Local government area
    #[validate(length(min = 1, max = 100))]
    pub lga: Option<String>,
}

/// Login request
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct LoginRequest {
    #[validate(length(min = 1, message = "Email is required"))]
    pub email: String,

    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

/// Token refresh request
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct RefreshRequest {
    #[validate(length(min = 1, message = "Refresh token is required"))]
    pub refresh_token: String,
}

/// Public view of an identity
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserSummary {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    pub role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lga: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_authenticated_at: Option<DateTime<Utc>>,
}

impl From<&IdentityRecord> for UserSummary {
    fn from(record: &IdentityRecord) -> Self {
        Self {
            id: record.id,
            email: record.email.clone(),
            name: record.name.clone(),
            phone: record.phone.clone(),
            role: record.role,
            state: record.state.clone(),
            lga: record.lga.clone(),
            created_at: record.created_at,
            last_authenticated_at: record.last_authenticated_at,
        }
    }
}

/// Register and login response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AuthResponse {
    pub user: UserSummary,
    pub tokens: CredentialPair,
}

/// Refresh response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RefreshResponse {
    pub tokens: CredentialPair,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Whether an identity currently holds a session
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SessionStatus {
    pub subject_id: Uuid,
    pub active: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn register_request() -> RegisterRequest {
        RegisterRequest {
            email: "alice@example.com".to_string(),
            name: "Alice".to_string(),
            phone: None,
            password: "SecureP@ssw0rd!".to_string(),
            role: None,
            state: Some("Lagos".to_string()),
            lga: None,
        }
    }

    #[test]
    fn test_valid_registration() {
        assert!(register_request().validate().is_ok());
    }

    #[test]
    fn test_registration_field_rules() {
        let mut bad_email = register_request();
        bad_email.email = "not-an-email".to_string();
        assert!(bad_email.validate().is_err());

        let mut short_name = register_request();
        short_name.name = "A".to_string();
        assert!(short_name.validate().is_err());

        let mut weak = register_request();
        weak.password = "password".to_string();
        let errors = weak.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("password"));

        let mut empty_state = register_request();
        empty_state.state = Some(String::new());
        assert!(empty_state.validate().is_err());
    }

    #[test]
    fn test_role_is_optional_in_json() {
        let request: RegisterRequest = serde_json::from_value(serde_json::json!({
            "email": "bob@example.com",
            "name": "Bob",
            "password": "SecureP@ssw0rd!"
        }))
        .unwrap();
        assert_eq!(request.role, None);

        let unknown = serde_json::from_value::<RegisterRequest>(serde_json::json!({
            "email": "bob@example.com",
            "name": "Bob",
            "password": "SecureP@ssw0rd!",
            "role": "moderator"
        }));
        assert!(unknown.is_err());
    }

    #[test]
    fn test_empty_login_fields_rejected() {
        let request = LoginRequest {
            email: String::new(),
            password: "x".to_string(),
        };
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_summary_omits_password_hash() {
        let record = agora_core::NewIdentity {
            email: "alice@example.com".to_string(),
            name: "Alice".to_string(),
            phone: None,
            password_hash: "$argon2id$secret".to_string(),
            role: Role::Citizen,
            state: None,
            lga: None,
        }
        .into_record(Uuid::new_v4(), Utc::now());

        let json = serde_json::to_string(&UserSummary::from(&record)).unwrap();
        assert!(!json.contains("argon2"));
        assert!(json.contains("\"role\":\"citizen\""));
    }
}
