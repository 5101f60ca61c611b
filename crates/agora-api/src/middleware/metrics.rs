//! Request and authentication metrics
//!
//! Per-endpoint request counts and latency are recorded by
//! [`metrics_middleware`]; authentication outcomes are counted in
//! [`AuthMetrics`], shared by the gateway and the auth service.

use crate::state::AppState;
use axum::{
    extract::{MatchedPath, Request, State},
    middleware::Next,
    response::Response,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Series label for requests that matched no route
pub const UNMATCHED_ENDPOINT: &str = "unmatched";

/// Metrics tracking middleware
///
/// Records:
/// - Request count per endpoint
/// - Request latency distribution
/// - Response status codes
///
/// Endpoints are labelled by route template, so the number of series is
/// bounded by the routing table whatever paths clients send.
pub async fn metrics_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    let endpoint = endpoint_label(&request);

    let response = next.run(request).await;

    let latency_us = start.elapsed().as_micros() as u64;
    state
        .record_request(endpoint, response.status().as_u16(), latency_us)
        .await;

    response
}

fn endpoint_label(request: &Request) -> String {
    request
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_string())
        .unwrap_or_else(|| UNMATCHED_ENDPOINT.to_string())
}

/// Authentication outcome counters
#[derive(Debug, Default)]
pub struct AuthMetrics {
    pub registrations: AtomicU64,
    pub logins_ok: AtomicU64,
    pub logins_failed: AtomicU64,
    pub refreshes_ok: AtomicU64,
    pub refreshes_rejected: AtomicU64,
    pub logouts: AtomicU64,
    pub rejected_missing: AtomicU64,
    pub rejected_malformed: AtomicU64,
    pub rejected_bad_signature: AtomicU64,
    pub rejected_expired: AtomicU64,
    pub rejected_revoked: AtomicU64,
    pub store_unavailable: AtomicU64,
}

impl AuthMetrics {
    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a rejected access credential by its reason label
    pub fn record_rejection(&self, reason: &str) {
        let counter = match reason {
            "missing" => &self.rejected_missing,
            "bad_signature" => &self.rejected_bad_signature,
            "expired" => &self.rejected_expired,
            "revoked" => &self.rejected_revoked,
            _ => &self.rejected_malformed,
        };
        Self::incr(counter);
    }

    /// Append the counters in Prometheus text format
    pub fn render(&self, output: &mut String) {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);

        for (name, help, value) in [
            (
                "agora_registrations_total",
                "Identities registered",
                load(&self.registrations),
            ),
            (
                "agora_logouts_total",
                "Sessions closed by logout",
                load(&self.logouts),
            ),
            (
                "agora_store_unavailable_total",
                "Requests failed closed because the session store was unavailable",
                load(&self.store_unavailable),
            ),
        ] {
            output.push_str(&format!("# HELP {name} {help}\n"));
            output.push_str(&format!("# TYPE {name} counter\n"));
            output.push_str(&format!("{name} {value}\n\n"));
        }

        output.push_str("# HELP agora_logins_total Login attempts by outcome\n");
        output.push_str("# TYPE agora_logins_total counter\n");
        output.push_str(&format!(
            "agora_logins_total{{outcome=\"ok\"}} {}\n",
            load(&self.logins_ok)
        ));
        output.push_str(&format!(
            "agora_logins_total{{outcome=\"failed\"}} {}\n\n",
            load(&self.logins_failed)
        ));

        output.push_str("# HELP agora_refreshes_total Refresh attempts by outcome\n");
        output.push_str("# TYPE agora_refreshes_total counter\n");
        output.push_str(&format!(
            "agora_refreshes_total{{outcome=\"ok\"}} {}\n",
            load(&self.refreshes_ok)
        ));
        output.push_str(&format!(
            "agora_refreshes_total{{outcome=\"rejected\"}} {}\n\n",
            load(&self.refreshes_rejected)
        ));

        output.push_str(
            "# HELP agora_rejected_credentials_total Access credentials rejected by reason\n",
        );
        output.push_str("# TYPE agora_rejected_credentials_total counter\n");
        for (reason, counter) in [
            ("missing", &self.rejected_missing),
            ("malformed", &self.rejected_malformed),
            ("bad_signature", &self.rejected_bad_signature),
            ("expired", &self.rejected_expired),
            ("revoked", &self.rejected_revoked),
        ] {
            output.push_str(&format!(
                "agora_rejected_credentials_total{{reason=\"{reason}\"}} {}\n",
                load(counter)
            ));
        }
        output.push('\n');
    }
}
