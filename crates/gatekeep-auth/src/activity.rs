//! Activity sink that writes events to the tracing pipeline.

use gatekeep_core::models::activity::{ActivityEvent, Severity};
use gatekeep_core::repository::ActivitySink;
use tracing::{info, warn};

/// Logs each event under the `gatekeep::activity` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingActivitySink;

impl ActivitySink for TracingActivitySink {
    fn record(&self, event: ActivityEvent) {
        let principal_id = event.principal_id.map(|id| id.to_string());
        let tenant_id = event.tenant_id.map(|id| id.to_string());
        match event.severity {
            Severity::Info => info!(
                target: "gatekeep::activity",
                kind = event.kind.as_str(),
                principal_id = principal_id.as_deref(),
                tenant_id = tenant_id.as_deref(),
                metadata = %event.metadata,
                "activity"
            ),
            Severity::Warning | Severity::Critical => warn!(
                target: "gatekeep::activity",
                kind = event.kind.as_str(),
                severity = ?event.severity,
                principal_id = principal_id.as_deref(),
                tenant_id = tenant_id.as_deref(),
                metadata = %event.metadata,
                "activity"
            ),
        }
    }
}
