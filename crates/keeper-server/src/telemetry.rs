use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;

use keeper_core::Queue;

/// A named liveness check. `Err` carries the reason it failed.
pub type HealthCheck = Arc<dyn Fn() -> Result<(), String> + Send + Sync>;

/// The checks behind `GET /healthz`, run in name order.
#[derive(Clone)]
pub struct HealthChecks {
    checks: BTreeMap<String, HealthCheck>,
}

impl Default for HealthChecks {
    fn default() -> Self {
        let mut checks = Self {
            checks: BTreeMap::new(),
        };
        checks.set("ping", || Ok(()));
        checks
    }
}

impl HealthChecks {
    /// Register or replace the check called `name`.
    pub fn set<F>(&mut self, name: impl Into<String>, check: F)
    where
        F: Fn() -> Result<(), String> + Send + Sync + 'static,
    {
        self.checks.insert(name.into(), Arc::new(check));
    }

    /// Add a check that fails until the in-process queue has finished its
    /// first rebuild.
    pub fn with_queue(mut self, queue: Queue) -> Self {
        self.set("queue", move || {
            if queue.is_ready() {
                Ok(())
            } else {
                Err("queue is not ready".to_string())
            }
        });
        self
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.checks.keys().map(String::as_str)
    }

    /// First failing check, as `"<name>: <reason>"`.
    pub fn run(&self) -> Result<(), String> {
        for (name, check) in &self.checks {
            check().map_err(|reason| format!("{name}: {reason}"))?;
        }
        Ok(())
    }
}

/// Router for the telemetry listener.
pub fn build_telemetry_router(checks: HealthChecks) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .with_state(checks)
}

async fn healthz(State(checks): State<HealthChecks>) -> impl IntoResponse {
    match checks.run() {
        Ok(()) => (StatusCode::OK, "ok".to_string()),
        Err(reason) => {
            tracing::warn!(reason = %reason, "health check failed");
            (StatusCode::INTERNAL_SERVER_ERROR, reason)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ping_is_registered_by_default() {
        let checks = HealthChecks::default();
        assert_eq!(checks.names().collect::<Vec<_>>(), vec!["ping"]);
        assert!(checks.run().is_ok());
    }

    #[test]
    fn failing_check_names_itself() {
        let mut checks = HealthChecks::default();
        checks.set("store", || Err("connection refused".into()));
        assert_eq!(checks.run().unwrap_err(), "store: connection refused");
    }
}
