//! Typed access to the analysis service, one outstanding call per [`OperationKey`].

use std::{
    collections::{BTreeMap, HashMap},
    fmt,
    sync::{Arc, Mutex, MutexGuard},
};

use shared::{
    domain::{SessionId, TreeMethod},
    error::{ErrorKind, ServiceError},
    protocol::{HealthResponse, SessionInfoResponse, SessionListResponse, STATUS_HEALTHY},
};
use thiserror::Error;
use tracing::debug;

use crate::{
    transport::PhyloBackend,
    types::{AlignmentState, ComparisonResult, Session, TreeArtifact},
    upload::FastaUpload,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OperationKey {
    Upload,
    Align,
    BuildTree(TreeMethod),
    Compare(TreeMethod, TreeMethod),
    FetchTree(TreeMethod),
    SessionInfo,
    ListSessions,
    Health,
}

impl OperationKey {
    pub fn operation(&self) -> &'static str {
        match self {
            OperationKey::Upload => "upload",
            OperationKey::Align => "align",
            OperationKey::BuildTree(_) => "build_tree",
            OperationKey::Compare(..) => "compare_trees",
            OperationKey::FetchTree(_) => "get_tree",
            OperationKey::SessionInfo => "session_info",
            OperationKey::ListSessions => "list_sessions",
            OperationKey::Health => "health",
        }
    }

    /// Methods that tell keys of the same operation apart, in request order.
    pub fn discriminator(&self) -> Vec<TreeMethod> {
        match self {
            OperationKey::BuildTree(method) | OperationKey::FetchTree(method) => vec![*method],
            OperationKey::Compare(method1, method2) => vec![*method1, *method2],
            _ => Vec::new(),
        }
    }
}

impl fmt::Display for OperationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.operation())?;
        for method in self.discriminator() {
            write!(f, ":{method}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OperationStatus {
    pub in_flight: bool,
    pub last_error: Option<ServiceError>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    #[error("`{0}` is already in flight")]
    AlreadyInFlight(OperationKey),
    #[error(transparent)]
    Service(#[from] ServiceError),
}

impl GatewayError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            // Turned away locally; nothing was sent.
            GatewayError::AlreadyInFlight(_) => ErrorKind::Validation,
            GatewayError::Service(err) => err.kind,
        }
    }
}

#[derive(Default)]
struct TrackerInner {
    generation: u64,
    slots: HashMap<OperationKey, OperationStatus>,
}

/// Status slots keyed by operation. Cloning shares the slots.
#[derive(Clone, Default)]
pub struct OperationTracker {
    inner: Arc<Mutex<TrackerInner>>,
}

impl OperationTracker {
    fn lock(&self) -> MutexGuard<'_, TrackerInner> {
        // A panic while holding the lock cannot leave a slot half-written.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn begin(&self, key: OperationKey) -> Result<InFlightTicket, GatewayError> {
        let mut inner = self.lock();
        let generation = inner.generation;
        let slot = inner.slots.entry(key).or_default();
        if slot.in_flight {
            return Err(GatewayError::AlreadyInFlight(key));
        }
        slot.in_flight = true;
        Ok(InFlightTicket {
            tracker: self.clone(),
            key,
            generation,
            settled: false,
        })
    }

    pub fn status(&self, key: OperationKey) -> OperationStatus {
        self.lock().slots.get(&key).cloned().unwrap_or_default()
    }

    pub fn is_in_flight(&self, key: OperationKey) -> bool {
        self.status(key).in_flight
    }

    pub fn snapshot(&self) -> BTreeMap<OperationKey, OperationStatus> {
        self.lock()
            .slots
            .iter()
            .filter(|(_, status)| **status != OperationStatus::default())
            .map(|(key, status)| (*key, status.clone()))
            .collect()
    }

    /// Records a failure detected locally, without any call being made.
    pub fn record_rejection(&self, key: OperationKey, error: ServiceError) {
        self.lock().slots.entry(key).or_default().last_error = Some(error);
    }

    /// Drops every slot. Tickets issued before this call settle as no-ops.
    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.generation += 1;
        inner.slots.clear();
    }

    fn slot_for(
        inner: &mut TrackerInner,
        key: OperationKey,
        generation: u64,
    ) -> Option<&mut OperationStatus> {
        if inner.generation != generation {
            return None;
        }
        inner.slots.get_mut(&key)
    }

    fn finish(&self, key: OperationKey, generation: u64, last_error: Option<ServiceError>) {
        let mut inner = self.lock();
        if let Some(slot) = Self::slot_for(&mut inner, key, generation) {
            slot.in_flight = false;
            slot.last_error = last_error;
        }
    }

    fn release(&self, key: OperationKey, generation: u64) {
        let mut inner = self.lock();
        if let Some(slot) = Self::slot_for(&mut inner, key, generation) {
            slot.in_flight = false;
        }
    }
}

/// Proof that a key's slot is held. Dropping it unsettled (for example when
/// the calling future is cancelled) frees the slot and keeps the last error.
pub struct InFlightTicket {
    tracker: OperationTracker,
    key: OperationKey,
    generation: u64,
    settled: bool,
}

impl InFlightTicket {
    pub fn key(&self) -> OperationKey {
        self.key
    }

    pub fn settle<T>(mut self, result: Result<T, ServiceError>) -> Result<T, ServiceError> {
        self.settled = true;
        self.tracker
            .finish(self.key, self.generation, result.as_ref().err().cloned());
        result
    }
}

impl Drop for InFlightTicket {
    fn drop(&mut self) {
        if !self.settled {
            self.tracker.release(self.key, self.generation);
        }
    }
}

#[derive(Clone)]
pub struct Gateway {
    backend: Arc<dyn PhyloBackend>,
    tracker: OperationTracker,
}

impl Gateway {
    pub fn new(backend: Arc<dyn PhyloBackend>) -> Self {
        Self {
            backend,
            tracker: OperationTracker::default(),
        }
    }

    pub fn tracker(&self) -> &OperationTracker {
        &self.tracker
    }

    fn begin(&self, key: OperationKey) -> Result<InFlightTicket, GatewayError> {
        let ticket = self.tracker.begin(key)?;
        debug!(op = %key, "dispatching remote call");
        Ok(ticket)
    }

    pub async fn upload(&self, upload: &FastaUpload) -> Result<Session, GatewayError> {
        let ticket = self.begin(OperationKey::Upload)?;
        let result = self
            .backend
            .upload_fasta(upload)
            .await
            .and_then(Session::try_from);
        Ok(ticket.settle(result)?)
    }

    pub async fn align(&self, session_id: &SessionId) -> Result<AlignmentState, GatewayError> {
        let ticket = self.begin(OperationKey::Align)?;
        let result = self
            .backend
            .align(session_id)
            .await
            .and_then(AlignmentState::try_from);
        Ok(ticket.settle(result)?)
    }

    pub async fn build_tree(
        &self,
        session_id: &SessionId,
        method: TreeMethod,
    ) -> Result<TreeArtifact, GatewayError> {
        let ticket = self.begin(OperationKey::BuildTree(method))?;
        let result = self
            .backend
            .build_tree(session_id, method)
            .await
            .and_then(|response| TreeArtifact::from_build_response(method, response));
        Ok(ticket.settle(result)?)
    }

    pub async fn compare_trees(
        &self,
        session_id: &SessionId,
        method1: TreeMethod,
        method2: TreeMethod,
    ) -> Result<ComparisonResult, GatewayError> {
        let ticket = self.begin(OperationKey::Compare(method1, method2))?;
        let result = self
            .backend
            .compare_trees(session_id, method1, method2)
            .await
            .and_then(ComparisonResult::try_from)
            .and_then(|comparison| {
                if comparison.method1 == method1 && comparison.method2 == method2 {
                    Ok(comparison)
                } else {
                    Err(ServiceError::server(format!(
                        "requested {method1} vs {method2} but the service compared {} vs {}",
                        comparison.method1, comparison.method2
                    )))
                }
            });
        Ok(ticket.settle(result)?)
    }

    pub async fn fetch_tree(
        &self,
        session_id: &SessionId,
        method: TreeMethod,
    ) -> Result<TreeArtifact, GatewayError> {
        let ticket = self.begin(OperationKey::FetchTree(method))?;
        let result = self
            .backend
            .get_tree(session_id, method)
            .await
            .and_then(|response| TreeArtifact::from_get_response(method, response));
        Ok(ticket.settle(result)?)
    }

    pub async fn session_info(
        &self,
        session_id: &SessionId,
    ) -> Result<SessionInfoResponse, GatewayError> {
        let ticket = self.begin(OperationKey::SessionInfo)?;
        let result = self.backend.session_info(session_id).await;
        Ok(ticket.settle(result)?)
    }

    pub async fn list_sessions(&self) -> Result<SessionListResponse, GatewayError> {
        let ticket = self.begin(OperationKey::ListSessions)?;
        let result = self.backend.list_sessions().await;
        Ok(ticket.settle(result)?)
    }

    pub async fn health(&self) -> Result<HealthResponse, GatewayError> {
        let ticket = self.begin(OperationKey::Health)?;
        let result = self.backend.health().await.and_then(|health| {
            if health.status == STATUS_HEALTHY {
                Ok(health)
            } else {
                Err(ServiceError::server(format!(
                    "service reports status '{}'",
                    health.status
                )))
            }
        });
        Ok(ticket.settle(result)?)
    }
}

#[cfg(test)]
#[path = "tests/gateway_tests.rs"]
mod tests;
