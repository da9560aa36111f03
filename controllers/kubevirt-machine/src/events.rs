//! Kubernetes Events on Machines.
//!
//! Events are fire-and-forget: a failed publish is logged and never fails the
//! reconciliation that emitted it.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::Client;
use tracing::warn;

/// Publishes Kubernetes Events.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish an event about `resource_ref`.
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    );
}

/// [`EventPublisher`] backed by `kube::runtime::events::Recorder`.
pub struct KubeEventPublisher {
    recorder: Recorder,
}

impl KubeEventPublisher {
    /// Create a publisher reporting as `controller_name`.
    pub fn new(client: Client, controller_name: &str) -> Self {
        let reporter = Reporter {
            controller: controller_name.to_string(),
            instance: std::env::var("POD_NAME").ok(),
        };
        Self {
            recorder: Recorder::new(client, reporter),
        }
    }
}

#[async_trait]
impl EventPublisher for KubeEventPublisher {
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    ) {
        let event = Event {
            type_,
            reason: reason.to_string(),
            note,
            action: action.to_string(),
            secondary: None,
        };
        if let Err(e) = self.recorder.publish(&event, resource_ref).await {
            warn!("Failed to publish {} event for {:?}: {}", reason, resource_ref.name, e);
        }
    }
}

/// Event reasons, shown in the REASON column of `kubectl get events`.
pub mod reasons {
    /// VM created for the machine
    pub const CREATED: &str = "Created";
    /// VM changed by an update
    pub const UPDATED: &str = "Updated";
    /// VM deleted
    pub const DELETED: &str = "Deleted";
    /// VM or boot secret creation failed
    pub const FAILED_CREATE: &str = "FailedCreate";
    /// VM update failed
    pub const FAILED_UPDATE: &str = "FailedUpdate";
    /// VM deletion failed
    pub const FAILED_DELETE: &str = "FailedDelete";
    /// Machine spec or shared config is unusable
    pub const INVALID_CONFIGURATION: &str = "InvalidConfiguration";
}

/// Event actions.
pub mod actions {
    pub const CREATE: &str = "Create";
    pub const UPDATE: &str = "Update";
    pub const DELETE: &str = "Delete";
    pub const RECONCILE: &str = "Reconcile";
}
