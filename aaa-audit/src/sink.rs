use crate::event::AuditEvent;
use std::future::Future;
use std::pin::Pin;

/// A destination for [`AuditEvent`]s emitted by `GroupCore` mutations.
///
/// Audit emission never fails the mutation it records: `GroupCore`
/// operations log a `tracing::warn!` and continue if `record` errors, the
/// same best-effort contract the `Materializer`'s fan-out/fan-in uses.
pub trait AuditSink: Send + Sync + 'static {
    fn record(&self, event: AuditEvent) -> Pin<Box<dyn Future<Output = Result<(), AuditError>> + Send + '_>>;
}

#[derive(Debug)]
pub struct AuditError(pub String);

impl std::fmt::Display for AuditError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "audit sink error: {}", self.0)
    }
}

impl std::error::Error for AuditError {}

/// Emits each event as a structured `tracing::info!` record, one field per
/// [`AuditEvent`] attribute. This is the default sink wired into `aaa-core`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: AuditEvent) -> Pin<Box<dyn Future<Output = Result<(), AuditError>> + Send + '_>> {
        Box::pin(async move {
            tracing::info!(
                action = event.action.as_str(),
                org_id = %event.org_id,
                actor = %event.actor,
                target = %event.target,
                detail = ?event.detail,
                "audit event"
            );
            Ok(())
        })
    }
}

/// Captures emitted events in memory, for asserting on audit behavior in
/// tests without a real sink.
#[derive(Default)]
pub struct InMemoryAuditSink {
    events: std::sync::Mutex<Vec<AuditEvent>>,
}

impl InMemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().expect("audit sink mutex poisoned").clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().expect("audit sink mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AuditSink for InMemoryAuditSink {
    fn record(&self, event: AuditEvent) -> Pin<Box<dyn Future<Output = Result<(), AuditError>> + Send + '_>> {
        Box::pin(async move {
            self.events.lock().expect("audit sink mutex poisoned").push(event);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::AuditAction;

    #[tokio::test]
    async fn in_memory_sink_captures_events_in_order() {
        let sink = InMemoryAuditSink::new();
        sink.record(AuditEvent::new(AuditAction::CreateGroup, "org1", "user:alice", "G1"))
            .await
            .unwrap();
        sink.record(AuditEvent::new(AuditAction::AddMember, "org1", "user:alice", "M1"))
            .await
            .unwrap();

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].action, AuditAction::CreateGroup);
        assert_eq!(events[1].target, "M1");
    }

    #[tokio::test]
    async fn tracing_sink_always_succeeds() {
        let sink = TracingAuditSink;
        let result = sink
            .record(AuditEvent::new(AuditAction::DeleteGroup, "org1", "user:alice", "G1"))
            .await;
        assert!(result.is_ok());
    }
}
