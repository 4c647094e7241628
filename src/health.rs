//! Health check module
//! Provides health status for the application and its dependencies

use crate::database::error::DatabaseError;
use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde::Serialize;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, error, info};

/// Health status response
#[derive(Debug, Serialize, Clone)]
pub struct HealthStatus {
    pub status: HealthState,
    pub checks: HashMap<String, ComponentHealth>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Overall health state
#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub enum HealthState {
    Healthy,
    Unhealthy,
}

/// Individual component health status
#[derive(Debug, Serialize, Clone)]
pub struct ComponentHealth {
    pub status: ComponentState,
    pub response_time_ms: Option<u128>,
    pub details: Option<String>,
}

/// Component state
#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub enum ComponentState {
    Up,
    Down,
}

impl HealthStatus {
    pub fn new() -> Self {
        Self {
            status: HealthState::Healthy,
            checks: HashMap::new(),
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn is_healthy(&self) -> bool {
        matches!(self.status, HealthState::Healthy)
    }
}

impl Default for HealthStatus {
    fn default() -> Self {
        Self::new()
    }
}

impl ComponentHealth {
    pub fn up(response_time_ms: Option<u128>) -> Self {
        Self {
            status: ComponentState::Up,
            response_time_ms,
            details: None,
        }
    }

    pub fn down(details: Option<String>) -> Self {
        Self {
            status: ComponentState::Down,
            response_time_ms: None,
            details,
        }
    }
}

/// Health checker for the application
#[derive(Clone)]
pub struct HealthChecker {
    /// `None` when running on the in-memory store
    db_pool: Option<sqlx::PgPool>,
}

impl HealthChecker {
    pub fn new(db_pool: Option<sqlx::PgPool>) -> Self {
        Self { db_pool }
    }

    pub async fn check_health(&self) -> HealthStatus {
        let mut health_status = HealthStatus::new();
        let mut overall_healthy = true;

        match &self.db_pool {
            Some(pool) => {
                match timeout(Duration::from_secs(5), check_database_health(pool)).await {
                    Ok(Ok(response_time)) => {
                        health_status.checks.insert(
                            "database".to_string(),
                            ComponentHealth::up(Some(response_time)),
                        );
                        debug!("Database health check: OK ({}ms)", response_time);
                    }
                    Ok(Err(e)) => {
                        overall_healthy = false;
                        health_status.checks.insert(
                            "database".to_string(),
                            ComponentHealth::down(Some(e.to_string())),
                        );
                        error!("Database health check failed: {}", e);
                    }
                    Err(_) => {
                        overall_healthy = false;
                        health_status.checks.insert(
                            "database".to_string(),
                            ComponentHealth::down(Some("Timeout".to_string())),
                        );
                        error!("Database health check timed out");
                    }
                }
            }
            None => {
                health_status.checks.insert(
                    "database".to_string(),
                    ComponentHealth {
                        details: Some("in-memory store".to_string()),
                        ..ComponentHealth::up(None)
                    },
                );
            }
        }

        health_status.status = if overall_healthy {
            HealthState::Healthy
        } else {
            HealthState::Unhealthy
        };

        health_status
    }
}

async fn check_database_health(pool: &sqlx::PgPool) -> Result<u128, DatabaseError> {
    let start = Instant::now();
    crate::database::health_check(pool).await?;
    Ok(start.elapsed().as_millis())
}

async fn health(
    State(checker): State<HealthChecker>,
) -> Result<Json<HealthStatus>, (StatusCode, Json<HealthStatus>)> {
    let health_status = checker.check_health().await;

    // 503 if any component is down
    if health_status.is_healthy() {
        Ok(Json(health_status))
    } else {
        error!("❌ Health check failed - service unhealthy");
        Err((StatusCode::SERVICE_UNAVAILABLE, Json(health_status)))
    }
}

/// Readiness probe - all dependencies must answer
async fn readiness(
    state: State<HealthChecker>,
) -> Result<Json<HealthStatus>, (StatusCode, Json<HealthStatus>)> {
    let result = health(state).await;
    if result.is_ok() {
        info!("✅ Readiness check passed");
    }
    result
}

/// Liveness probe - the process is running
async fn liveness() -> &'static str {
    "OK"
}

pub fn routes(checker: HealthChecker) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/health/ready", get(readiness))
        .route("/health/live", get(liveness))
        .with_state(checker)
}
