use switchyard_core::{AuditEvent, AuditSink};
use tracing::info;

/// Writes every audit event to the tracing pipeline.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn emit(&self, event: AuditEvent) {
        let call_id = event.call_id.as_ref().map(|id| id.0.as_str()).unwrap_or("none");
        info!(
            event_name = "audit.call.transition",
            audit_event_id = %event.event_id,
            audit_event_type = %event.event_type,
            conversation_id = %event.conversation_id,
            call_id,
            category = ?event.category,
            outcome = ?event.outcome,
            metadata = ?event.metadata,
            occurred_at = %event.occurred_at.to_rfc3339(),
            "audit event"
        );
    }
}
