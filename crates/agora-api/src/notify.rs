//! Notification delivery
//!
//! Mail and SMS gateways sit outside this service. [`TracingNotifier`]
//! records each notification as a log line for deployments without one.

use agora_core::{IdentityRecord, Notifier, Result};
use async_trait::async_trait;
use std::sync::Arc;

#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn welcome(&self, identity: &IdentityRecord) -> Result<()> {
        tracing::info!(
            target: "notify",
            user_id = %identity.id,
            role = %identity.role,
            "Welcome notification queued"
        );
        Ok(())
    }

    async fn logged_out(&self, identity: &IdentityRecord) -> Result<()> {
        tracing::info!(
            target: "notify",
            user_id = %identity.id,
            "Logout notification queued"
        );
        Ok(())
    }
}

/// Which notification to send
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Welcome,
    LoggedOut,
}

/// Send a notification on a detached task; failures are only logged
pub fn spawn_notification(
    notifier: Arc<dyn Notifier>,
    kind: NotificationKind,
    identity: IdentityRecord,
) {
    tokio::spawn(async move {
        let result = match kind {
            NotificationKind::Welcome => notifier.welcome(&identity).await,
            NotificationKind::LoggedOut => notifier.logged_out(&identity).await,
        };
        if let Err(e) = result {
            tracing::warn!(user_id = %identity.id, kind = ?kind, error = %e, "Notification failed");
        }
    });
}
