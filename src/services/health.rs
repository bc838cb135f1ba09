//! Health check HTTP server for process supervision
//!
//! Provides liveness and readiness probes for systemd/k8s. Readiness
//! tracks the database connection; an engaged kill switch reports
//! degraded rather than unready, because the recovery endpoints must
//! stay reachable while the pipeline is halted.

use crate::domain::KillSwitchState;
use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

/// Health status for a component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy)
    }
}

/// Component health check result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub name: String,
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_check: Option<DateTime<Utc>>,
}

/// Overall system health response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub timestamp: DateTime<Utc>,
    pub uptime_seconds: u64,
    pub components: Vec<ComponentHealth>,
    pub kill_switch_state: String,
}

/// Shared state for the health server, updated by the daemon's probe
/// task.
pub struct HealthState {
    /// When the daemon started
    pub started_at: DateTime<Utc>,
    /// Is the database reachable
    pub db_connected: AtomicBool,
    /// Last database probe timestamp
    pub last_db_check: RwLock<Option<DateTime<Utc>>>,
    /// Last observed kill-switch state
    pub kill_switch_state: RwLock<KillSwitchState>,
}

impl HealthState {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            db_connected: AtomicBool::new(false),
            last_db_check: RwLock::new(None),
            kill_switch_state: RwLock::new(KillSwitchState::Active),
        }
    }

    /// Record a database probe result
    pub async fn record_db_check(&self, success: bool) {
        *self.last_db_check.write().await = Some(Utc::now());
        self.db_connected.store(success, Ordering::SeqCst);
    }

    /// Record the observed kill-switch state
    pub async fn record_kill_switch(&self, state: KillSwitchState) {
        *self.kill_switch_state.write().await = state;
    }

    /// Get overall health status
    pub async fn get_health(&self) -> HealthResponse {
        let mut components = Vec::new();
        let mut overall_status = HealthStatus::Healthy;

        // Database health. The pipeline cannot run without it.
        let db_connected = self.db_connected.load(Ordering::SeqCst);
        let db_status = if db_connected {
            HealthStatus::Healthy
        } else {
            HealthStatus::Unhealthy
        };
        if db_status == HealthStatus::Unhealthy {
            overall_status = HealthStatus::Unhealthy;
        }
        components.push(ComponentHealth {
            name: "database".to_string(),
            status: db_status,
            message: if !db_connected {
                Some("Disconnected".to_string())
            } else {
                None
            },
            last_check: *self.last_db_check.read().await,
        });

        // Kill-switch state. Engaged is degraded, not unready: the
        // daemon is up and the recovery path must stay routable.
        let switch = *self.kill_switch_state.read().await;
        let switch_status = if switch.is_engaged() {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        };
        if switch_status == HealthStatus::Degraded && overall_status == HealthStatus::Healthy {
            overall_status = HealthStatus::Degraded;
        }
        components.push(ComponentHealth {
            name: "kill_switch".to_string(),
            status: switch_status,
            message: if switch.is_engaged() {
                Some(format!("Pipeline halted: {}", switch))
            } else {
                None
            },
            last_check: Some(Utc::now()),
        });

        let uptime = (Utc::now() - self.started_at).num_seconds() as u64;

        HealthResponse {
            status: overall_status,
            timestamp: Utc::now(),
            uptime_seconds: uptime,
            components,
            kill_switch_state: switch.to_string(),
        }
    }
}

impl Default for HealthState {
    fn default() -> Self {
        Self::new()
    }
}

/// Health check server
pub struct HealthServer {
    state: Arc<HealthState>,
    port: u16,
}

impl HealthServer {
    pub fn new(state: Arc<HealthState>, port: u16) -> Self {
        Self { state, port }
    }

    /// Start the health server
    pub async fn run(&self) -> crate::error::Result<()> {
        let app = router(Arc::clone(&self.state));

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        info!("Starting health server on {}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app).await.map_err(|e| {
            crate::error::WardenError::Internal(format!("Health server error: {}", e))
        })?;

        Ok(())
    }

    /// Get shared state for updating from other components
    pub fn state(&self) -> Arc<HealthState> {
        Arc::clone(&self.state)
    }
}

fn router(state: Arc<HealthState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/health/live", get(liveness_handler))
        .route("/health/ready", get(readiness_handler))
        .with_state(state)
}

/// Full health check endpoint
async fn health_handler(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    let health = state.get_health().await;
    let status_code = match health.status {
        HealthStatus::Healthy => StatusCode::OK,
        HealthStatus::Degraded => StatusCode::OK, // Still return 200 for degraded
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status_code, Json(health))
}

/// Kubernetes liveness probe - is the process alive?
async fn liveness_handler() -> impl IntoResponse {
    StatusCode::OK
}

/// Kubernetes readiness probe - is the service ready to handle traffic?
async fn readiness_handler(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    let health = state.get_health().await;
    match health.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_health_state_new() {
        let state = HealthState::new();
        assert!(!state.db_connected.load(Ordering::SeqCst));

        // No database probe recorded yet, so not ready.
        let health = state.get_health().await;
        assert_eq!(health.status, HealthStatus::Unhealthy);
    }

    #[tokio::test]
    async fn test_db_probe_flips_readiness() {
        let state = HealthState::new();
        state.record_db_check(true).await;
        let health = state.get_health().await;
        assert_eq!(health.status, HealthStatus::Healthy);

        state.record_db_check(false).await;
        let health = state.get_health().await;
        assert_eq!(health.status, HealthStatus::Unhealthy);
    }

    #[tokio::test]
    async fn test_engaged_kill_switch_is_degraded_not_unready() {
        let state = HealthState::new();
        state.record_db_check(true).await;
        state.record_kill_switch(KillSwitchState::Suspended).await;

        let health = state.get_health().await;
        assert_eq!(health.status, HealthStatus::Degraded);
        assert_eq!(health.kill_switch_state, "SUSPENDED");
    }

    #[tokio::test]
    async fn test_probe_routes() {
        use axum::body::Body;
        use axum::http::Request;
        use tower::ServiceExt;

        let state = Arc::new(HealthState::new());
        let app = router(state.clone());

        // Liveness answers even when nothing else works.
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/health/live")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        // Not ready until a database probe lands.
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/health/ready")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        state.record_db_check(true).await;
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health/ready")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
