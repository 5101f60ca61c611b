//! Authentication and authorization
//!
//! - `password`: secret hashing and verification (Argon2id)
//! - `jwt`: access/refresh credential issuing and verification
//! - `middleware`: per-request gateway and role guard
//! - `service`: register, login, refresh and logout orchestration
//! - `models`: request and response bodies

pub mod jwt;
pub mod middleware;
pub mod models;
pub mod password;
pub mod service;

pub use jwt::{credential_id, AccessClaims, CredentialPair, RefreshClaims, TokenError, TokenIssuer};
pub use middleware::{auth_middleware, require_role, AuthError, AuthGateway, AuthenticatedUser};
pub use models::{
    AuthResponse, LoginRequest, MessageResponse, RefreshRequest, RefreshResponse, RegisterRequest,
    SessionStatus, UserSummary,
};
pub use password::{hash_password, validate_password_strength, verify_password};
pub use service::AuthService;
