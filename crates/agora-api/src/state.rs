//! Application state management

use crate::auth::middleware::AuthGateway;
use crate::auth::service::AuthService;
use crate::auth::jwt::TokenIssuer;
use crate::middleware::metrics::AuthMetrics;
use crate::session::{SessionStore, TimeoutStore};
use agora_core::{AppConfig, Clock, IdentityStore, Notifier};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Latency histogram buckets
#[derive(Debug, Default, Clone)]
pub struct LatencyBuckets {
    pub under_10ms: u64,
    pub ms_10_50: u64,
    pub ms_50_100: u64,
    pub ms_100_500: u64,
    pub ms_500_1000: u64,
    pub over_1s: u64,
}

/// Request metrics of one endpoint
#[derive(Debug, Default, Clone)]
pub struct EndpointMetrics {
    pub status_counts: HashMap<u16, u64>,
    pub total_latency_us: u64,
    pub latency_count: u64,
    pub latency_buckets: LatencyBuckets,
}

impl EndpointMetrics {
    fn record(&mut self, status: u16, latency_us: u64) {
        *self.status_counts.entry(status).or_insert(0) += 1;
        self.total_latency_us += latency_us;
        self.latency_count += 1;

        let buckets = &mut self.latency_buckets;
        match latency_us {
            0..=9_999 => buckets.under_10ms += 1,
            10_000..=49_999 => buckets.ms_10_50 += 1,
            50_000..=99_999 => buckets.ms_50_100 += 1,
            100_000..=499_999 => buckets.ms_100_500 += 1,
            500_000..=999_999 => buckets.ms_500_1000 += 1,
            _ => buckets.over_1s += 1,
        }
    }
}

/// Application state shared across handlers
pub struct AppState {
    /// Application configuration
    pub config: AppConfig,
    /// Server start time
    pub start_time: Instant,
    /// Request counter
    pub request_count: AtomicU64,
    /// Per-endpoint request metrics
    pub metrics: RwLock<HashMap<String, EndpointMetrics>>,
    pub auth_metrics: Arc<AuthMetrics>,
    /// Session store, already bounded by the configured timeout
    pub sessions: Arc<dyn SessionStore>,
    pub issuer: Arc<TokenIssuer>,
    pub gateway: AuthGateway,
    pub auth: AuthService,
}

impl AppState {
    /// Wire the services from their collaborators
    pub fn new(
        config: AppConfig,
        identities: Arc<dyn IdentityStore>,
        sessions: Arc<dyn SessionStore>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let sessions: Arc<dyn SessionStore> = Arc::new(TimeoutStore::new(
            sessions,
            Duration::from_millis(config.session_store.operation_timeout_ms),
        ));
        let issuer = Arc::new(TokenIssuer::new(&config.tokens, clock));
        let auth_metrics = Arc::new(AuthMetrics::default());

        let gateway = AuthGateway::new(issuer.clone(), sessions.clone(), auth_metrics.clone());
        let auth = AuthService::new(
            identities,
            sessions.clone(),
            issuer.clone(),
            notifier,
            auth_metrics.clone(),
        )
        .with_hashing(config.hashing.clone())
        .with_identity_timeout(Duration::from_millis(config.database.operation_timeout_ms));

        Self {
            config,
            start_time: Instant::now(),
            request_count: AtomicU64::new(0),
            metrics: RwLock::new(HashMap::new()),
            auth_metrics,
            sessions,
            issuer,
            gateway,
            auth,
        }
    }

    /// Record one finished request
    pub async fn record_request(&self, endpoint: String, status: u16, latency_us: u64) {
        self.request_count.fetch_add(1, Ordering::Relaxed);
        self.metrics
            .write()
            .await
            .entry(endpoint)
            .or_default()
            .record(status, latency_us);
    }

    /// Get total request count
    pub fn get_request_count(&self) -> u64 {
        self.request_count.load(Ordering::Relaxed)
    }

    /// Get uptime in seconds
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
