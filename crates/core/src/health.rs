use std::cell::Cell;
use std::time::{Duration, Instant, SystemTime};

use tracing::{debug, warn};

use crate::gateway::HealthGateway;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    Checking,
    Healthy,
    Unhealthy,
}

impl HealthStatus {
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Checking => "checking",
            Self::Healthy => "healthy",
            Self::Unhealthy => "unhealthy",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub last_latency: Option<Duration>,
    pub last_checked_at: Option<SystemTime>,
}

/// Liveness of the remote engine. Probe failures only ever change the status.
#[derive(Debug)]
pub struct HealthMonitor<B: HealthGateway> {
    backend: B,
    status: Cell<HealthStatus>,
    last_latency: Cell<Option<Duration>>,
    last_checked_at: Cell<Option<SystemTime>>,
}

impl<B: HealthGateway> HealthMonitor<B> {
    #[must_use]
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            status: Cell::new(HealthStatus::Checking),
            last_latency: Cell::new(None),
            last_checked_at: Cell::new(None),
        }
    }

    #[must_use]
    pub fn status(&self) -> HealthStatus {
        self.status.get()
    }

    #[must_use]
    pub fn report(&self) -> HealthReport {
        HealthReport {
            status: self.status.get(),
            last_latency: self.last_latency.get(),
            last_checked_at: self.last_checked_at.get(),
        }
    }

    pub async fn check(&self) -> HealthStatus {
        self.status.set(HealthStatus::Checking);
        let started_at = Instant::now();

        let status = match self.backend.ping().await {
            Ok(()) => {
                let latency = started_at.elapsed();
                debug!(latency_ms = latency.as_millis(), "engine healthy");
                self.last_latency.set(Some(latency));
                HealthStatus::Healthy
            }
            Err(error) => {
                warn!(%error, "engine health check failed");
                self.last_latency.set(None);
                HealthStatus::Unhealthy
            }
        };

        self.last_checked_at.set(Some(SystemTime::now()));
        self.status.set(status);
        status
    }
}
