//! Audit event sink for `GroupCore` mutations.
//!
//! Every operation that changes persisted state (`CreateGroup`, `AddMember`,
//! `AssignRoleToGroup`, ...) emits an [`event::AuditEvent`] through an
//! [`sink::AuditSink`] after its write commits. Sink failures never fail the
//! mutation — audit is best-effort, mirroring the `Materializer`'s fan-out
//! contract.

pub mod event;
pub mod sink;

pub use event::{AuditAction, AuditEvent};
pub use sink::{AuditError, AuditSink, InMemoryAuditSink, TracingAuditSink};

pub mod prelude {
    pub use crate::event::{AuditAction, AuditEvent};
    pub use crate::sink::{AuditSink, InMemoryAuditSink, TracingAuditSink};
}
