// Monitoring - tracing setup and service health reporting

use serde::Serialize;
use std::time::Instant;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::entities::current_time_millis;
use crate::infrastructure::database::DatabaseInterface;

/// Install the global tracing subscriber. `RUST_LOG` overrides the default `info` filter.
pub fn initialize_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceStatus {
    Healthy,
    Unhealthy,
}

/// Health status for the service and its store
#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    pub status: ServiceStatus,
    pub database_status: ServiceStatus,
    pub response_time_ms: f64,
    pub timestamp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        self.status == ServiceStatus::Healthy
    }
}

pub async fn check_health(db: &dyn DatabaseInterface) -> HealthStatus {
    let started = Instant::now();
    let result = db.health_check().await;
    let response_time_ms = started.elapsed().as_secs_f64() * 1000.0;

    let (status, details) = match result {
        Ok(()) => (ServiceStatus::Healthy, None),
        Err(e) => {
            tracing::error!(error = %e, "Database health check failed");
            (ServiceStatus::Unhealthy, Some(e.to_string()))
        }
    };
    HealthStatus {
        status,
        database_status: status,
        response_time_ms,
        timestamp: current_time_millis(),
        details,
    }
}
