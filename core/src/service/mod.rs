//! Operations exposed to callers.
//!
//! Every operation takes an authenticated, organization-scoped [`Caller`],
//! runs in exactly one store transaction and publishes its events only after
//! that transaction committed. Failures roll back everything; the service
//! never retries on its own, conflicts surface as [`EngineError::Conflict`].

mod participations;
mod queries;
mod sessions;

pub use queries::{ParticipantView, SessionSummary};

use crate::capability::{Capability, RoleCapability};
use crate::config::EngineConfig;
use crate::environment::Clock;
use crate::error::{EngineError, ErrorKind, Result};
use crate::events::{DomainEvent, EventPublisher, ParticipationEvent, TracingPublisher};
use crate::forms::{AttributeOverrides, FormAnswers};
use crate::lifecycle::SessionEnvironment;
use crate::participation::ParticipationEnvironment;
use crate::store::TransactionalStore;
use crate::types::{AttendanceStatus, Caller, ParticipationId, PaymentStatus};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Body of a self-service join
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JoinRequest {
    /// Answers to the session's join form
    pub form_answers: Option<FormAnswers>,
    /// Per-participation attribute overrides
    pub attribute_overrides: Option<AttributeOverrides>,
    /// Invite token for invite-only organizations
    pub invite_token: Option<String>,
}

/// One row of a bulk attendance update
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceUpdate {
    /// Participation to update
    pub participation_id: ParticipationId,
    /// New attendance
    pub attendance: AttendanceStatus,
}

/// One row of a bulk payment update
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentUpdate {
    /// Participation to update
    pub participation_id: ParticipationId,
    /// New payment status
    pub payment: PaymentStatus,
}

/// The session and participation engine, generic over its store.
pub struct ParticipationService<S> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    capability: Arc<dyn Capability>,
    publisher: Arc<dyn EventPublisher>,
    config: EngineConfig,
}

impl<S> Clone for ParticipationService<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            clock: Arc::clone(&self.clock),
            capability: Arc::clone(&self.capability),
            publisher: Arc::clone(&self.publisher),
            config: self.config.clone(),
        }
    }
}

impl<S: TransactionalStore> ParticipationService<S> {
    /// Creates a service with role-based capabilities and tracing publication
    #[must_use]
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            capability: Arc::new(RoleCapability),
            publisher: Arc::new(TracingPublisher),
            config: EngineConfig::default(),
        }
    }

    /// Replaces the capability check
    #[must_use]
    pub fn with_capability(mut self, capability: Arc<dyn Capability>) -> Self {
        self.capability = capability;
        self
    }

    /// Replaces the event publisher
    #[must_use]
    pub fn with_publisher(mut self, publisher: Arc<dyn EventPublisher>) -> Self {
        self.publisher = publisher;
        self
    }

    /// Replaces the engine configuration
    #[must_use]
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// The underlying store
    #[must_use]
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    fn is_admin(&self, caller: &Caller) -> bool {
        self.capability.can_administer(caller.membership.as_ref())
    }

    fn require_admin(&self, caller: &Caller) -> Result<()> {
        if self.is_admin(caller) {
            Ok(())
        } else {
            Err(EngineError::AdminRequired)
        }
    }

    fn participation_env(&self) -> ParticipationEnvironment {
        ParticipationEnvironment::new(Arc::clone(&self.clock))
    }

    fn session_env(&self) -> SessionEnvironment {
        SessionEnvironment::new(Arc::clone(&self.clock))
    }

    /// Hands committed events to the publisher and counts admissions.
    fn publish<E: Into<DomainEvent>>(&self, events: impl IntoIterator<Item = E>) {
        let events: Vec<DomainEvent> = events.into_iter().map(Into::into).collect();
        if events.is_empty() {
            return;
        }

        for event in &events {
            match event {
                DomainEvent::Participation(ParticipationEvent::ParticipantAdmitted {
                    status, ..
                }) => {
                    metrics::counter!("huddle_admissions_total", "status" => status.as_str())
                        .increment(1);
                }
                DomainEvent::Participation(ParticipationEvent::ParticipantPromoted { .. }) => {
                    metrics::counter!("huddle_promotions_total").increment(1);
                }
                _ => {}
            }
        }

        self.publisher.publish(&events);
    }
}

/// Logs and counts a failed operation.
fn rejected(operation: &'static str, error: &EngineError) {
    if error.kind() == ErrorKind::Internal {
        tracing::error!(operation, error = %error, "Operation failed");
    } else {
        tracing::warn!(operation, code = error.code(), error = %error, "Request rejected");
    }
    metrics::counter!("huddle_rejections_total", "reason" => error.code()).increment(1);
}
