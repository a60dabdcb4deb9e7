use std::{sync::OnceLock, time::Instant};

use serde::Serialize;

pub const SERVICE_NAME: &str = "api-gateway";

static PROCESS_START: OnceLock<Instant> = OnceLock::new();

/// Instant the process started, pinned by the first call.
///
/// `main` calls this before anything else so uptime counts from launch.
pub fn process_start() -> Instant {
    *PROCESS_START.get_or_init(Instant::now)
}

/// Liveness of the gateway process itself. Backends are never contacted.
#[derive(Debug, Clone)]
pub struct HealthReporter {
    started: Instant,
}

#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub service: &'static str,
    /// Seconds since the process started
    pub uptime: f64,
    pub timestamp: String,
}

impl HealthReporter {
    pub fn new() -> Self {
        Self {
            started: process_start(),
        }
    }

    pub fn uptime_secs(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }

    pub fn report(&self) -> HealthReport {
        HealthReport {
            status: "healthy",
            service: SERVICE_NAME,
            uptime: self.uptime_secs(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

impl Default for HealthReporter {
    fn default() -> Self {
        Self::new()
    }
}
