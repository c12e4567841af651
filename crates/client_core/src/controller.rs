//! The upload → align → build → compare workflow and the state it owns.

use std::{collections::BTreeMap, sync::Arc};

use shared::{
    domain::{Stage, TreeMethod},
    error::{ErrorKind, ServiceError},
};
use thiserror::Error;
use tokio::sync::{broadcast, RwLock};
use tracing::{info, warn};

use crate::{
    config::Settings,
    gateway::{Gateway, GatewayError, OperationKey, OperationStatus},
    interpret::{interpret, ComparisonInterpretation},
    layout::TreeLayout,
    transport::HttpPhyloBackend,
    types::{AlignmentState, ComparisonResult, Session, TreeArtifact},
    upload::FastaUpload,
};

const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("invalid selection: {0}")]
    Selection(String),
    #[error("cannot {action} during the {stage} stage")]
    InvalidStage { action: &'static str, stage: Stage },
    #[error("`{0}` is already in flight")]
    AlreadyInFlight(OperationKey),
    #[error(transparent)]
    Service(ServiceError),
    #[error("`{0}` completed after its session was replaced; result discarded")]
    Superseded(OperationKey),
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::Validation(_)
            | PipelineError::Selection(_)
            | PipelineError::InvalidStage { .. }
            | PipelineError::AlreadyInFlight(_) => ErrorKind::Validation,
            PipelineError::Service(err) => err.kind,
            PipelineError::Superseded(_) => ErrorKind::Unknown,
        }
    }
}

impl From<GatewayError> for PipelineError {
    fn from(value: GatewayError) -> Self {
        match value {
            GatewayError::AlreadyInFlight(key) => PipelineError::AlreadyInFlight(key),
            GatewayError::Service(err) => PipelineError::Service(err),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    StageChanged { from: Stage, to: Stage },
    OperationStarted(OperationKey),
    OperationFailed {
        key: OperationKey,
        error: ServiceError,
    },
    TreeBuilt(TreeMethod),
    ComparisonReady {
        method1: TreeMethod,
        method2: TreeMethod,
    },
    Reset,
}

#[derive(Debug, Default)]
struct PipelineState {
    /// Bumped whenever the session is replaced or discarded.
    epoch: u64,
    stage: Stage,
    session: Option<Session>,
    alignment: Option<AlignmentState>,
    trees: BTreeMap<TreeMethod, TreeArtifact>,
    comparison: Option<ComparisonResult>,
}

impl PipelineState {
    fn session_label(&self) -> &str {
        self.session
            .as_ref()
            .map(|session| session.session_id.as_str())
            .unwrap_or("-")
    }
}

/// Point-in-time copy of the workflow, for display.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSnapshot {
    pub stage: Stage,
    pub session: Option<Session>,
    pub alignment: Option<AlignmentState>,
    pub trees: BTreeMap<TreeMethod, TreeArtifact>,
    pub comparison: Option<ComparisonResult>,
    pub operations: BTreeMap<OperationKey, OperationStatus>,
}

impl PipelineSnapshot {
    pub fn upload_done(&self) -> bool {
        self.session.is_some()
    }

    pub fn aligned(&self) -> bool {
        self.alignment.is_some()
    }

    pub fn has_tree(&self) -> bool {
        !self.trees.is_empty()
    }

    pub fn compared(&self) -> bool {
        self.comparison.is_some()
    }

    pub fn can_compare(&self) -> bool {
        self.trees.len() >= 2
    }

    pub fn tree_progress(&self) -> String {
        format!(
            "{} of {} trees built",
            self.trees.len(),
            TreeMethod::ALL.len()
        )
    }

    pub fn status(&self, key: OperationKey) -> OperationStatus {
        self.operations.get(&key).cloned().unwrap_or_default()
    }
}

pub struct PipelineController {
    gateway: Gateway,
    state: RwLock<PipelineState>,
    events: broadcast::Sender<PipelineEvent>,
    max_upload_bytes: u64,
}

impl PipelineController {
    pub fn new(gateway: Gateway, max_upload_bytes: u64) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            gateway,
            state: RwLock::new(PipelineState::default()),
            events,
            max_upload_bytes,
        }
    }

    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let backend = HttpPhyloBackend::new(settings)?;
        Ok(Self::new(
            Gateway::new(Arc::new(backend)),
            settings.max_upload_bytes,
        ))
    }

    pub fn gateway(&self) -> &Gateway {
        &self.gateway
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: PipelineEvent) {
        // No receivers is fine.
        let _ = self.events.send(event);
    }

    fn start(&self, key: OperationKey) -> Result<(), PipelineError> {
        if self.gateway.tracker().is_in_flight(key) {
            return Err(PipelineError::AlreadyInFlight(key));
        }
        self.emit(PipelineEvent::OperationStarted(key));
        Ok(())
    }

    fn fail(&self, key: OperationKey, err: GatewayError) -> PipelineError {
        if let GatewayError::Service(error) = &err {
            warn!(op = %key, kind = ?error.kind, "operation failed: {}", error.message);
            self.emit(PipelineEvent::OperationFailed {
                key,
                error: error.clone(),
            });
        }
        err.into()
    }

    fn superseded(&self, key: OperationKey, epoch: u64) -> PipelineError {
        warn!(op = %key, epoch, "discarding result issued for a replaced session");
        PipelineError::Superseded(key)
    }

    /// Records a local rejection under `key`; a selection naming fewer than
    /// two methods has no key and is only returned.
    fn reject_selection(&self, key: Option<OperationKey>, message: String) -> PipelineError {
        if let Some(key) = key {
            let error = ServiceError::validation(message.clone());
            self.gateway.tracker().record_rejection(key, error.clone());
            self.emit(PipelineEvent::OperationFailed { key, error });
        }
        PipelineError::Selection(message)
    }

    fn advance(&self, state: &mut PipelineState, to: Stage) {
        let from = state.stage;
        if from == to {
            return;
        }
        state.stage = to;
        info!(
            session_id = state.session_label(),
            %from,
            %to,
            "pipeline stage changed"
        );
        self.emit(PipelineEvent::StageChanged { from, to });
    }

    /// Validates locally, then uploads. A rejected file never reaches the
    /// service and leaves the current session untouched.
    pub async fn submit_upload(&self, upload: FastaUpload) -> Result<Session, PipelineError> {
        let key = OperationKey::Upload;
        if let Err(error) = upload.validate(self.max_upload_bytes) {
            warn!(filename = %upload.filename, "upload rejected: {}", error.message);
            self.gateway.tracker().record_rejection(key, error.clone());
            self.emit(PipelineEvent::OperationFailed {
                key,
                error: error.clone(),
            });
            return Err(PipelineError::Validation(error.message));
        }

        let epoch = self.state.read().await.epoch;
        self.start(key)?;
        let result = self.gateway.upload(&upload).await;

        let mut state = self.state.write().await;
        if state.epoch != epoch {
            return Err(self.superseded(key, epoch));
        }
        let session = result.map_err(|err| self.fail(key, err))?;

        let next_epoch = state.epoch + 1;
        let stage = state.stage;
        *state = PipelineState {
            epoch: next_epoch,
            stage,
            session: Some(session.clone()),
            ..PipelineState::default()
        };
        self.gateway.tracker().clear();
        info!(
            session_id = %session.session_id,
            filename = %session.filename,
            sequences = session.sequence_count,
            "upload accepted"
        );
        self.advance(&mut state, Stage::Sequences);
        Ok(session)
    }

    pub async fn request_alignment(&self) -> Result<AlignmentState, PipelineError> {
        let key = OperationKey::Align;
        let (epoch, session_id) = {
            let state = self.state.read().await;
            let invalid = PipelineError::InvalidStage {
                action: "align",
                stage: state.stage,
            };
            if state.stage != Stage::Sequences || state.alignment.is_some() {
                return Err(invalid);
            }
            let Some(session) = state.session.as_ref() else {
                return Err(invalid);
            };
            (state.epoch, session.session_id.clone())
        };

        self.start(key)?;
        let result = self.gateway.align(&session_id).await;

        let mut state = self.state.write().await;
        if state.epoch != epoch {
            return Err(self.superseded(key, epoch));
        }
        let alignment = result.map_err(|err| self.fail(key, err))?;
        if state.alignment.is_some() {
            warn!(session_id = %session_id, "alignment already set; keeping the first");
            return Err(PipelineError::InvalidStage {
                action: "align",
                stage: state.stage,
            });
        }

        info!(
            session_id = %session_id,
            alignment_length = alignment.alignment_length,
            sequences = alignment.aligned_sequences.len(),
            "alignment complete"
        );
        state.alignment = Some(alignment.clone());
        self.advance(&mut state, Stage::Trees);
        Ok(alignment)
    }

    /// Builds (or rebuilds) the tree for `method`. Each method has its own
    /// slot, so `nj` and `ml` can be built at the same time.
    pub async fn request_tree(&self, method: TreeMethod) -> Result<TreeArtifact, PipelineError> {
        let key = OperationKey::BuildTree(method);
        let (epoch, session_id) = {
            let state = self.state.read().await;
            let session = match (&state.session, &state.alignment) {
                (Some(session), Some(_)) => session,
                _ => {
                    return Err(PipelineError::InvalidStage {
                        action: "build a tree",
                        stage: state.stage,
                    })
                }
            };
            (state.epoch, session.session_id.clone())
        };

        self.start(key)?;
        let result = self.gateway.build_tree(&session_id, method).await;

        let mut state = self.state.write().await;
        if state.epoch != epoch {
            return Err(self.superseded(key, epoch));
        }
        let artifact = result.map_err(|err| self.fail(key, err))?;

        if let Some(session) = &state.session {
            if !artifact.leaf_names_match(&session.sequence_names) {
                warn!(
                    session_id = %session_id,
                    %method,
                    "tree leaves differ from the uploaded sequence names"
                );
            }
        }
        info!(
            session_id = %session_id,
            %method,
            nodes = artifact.tree.node_count(),
            "tree built"
        );
        state.trees.insert(method, artifact.clone());
        self.emit(PipelineEvent::TreeBuilt(method));
        Ok(artifact)
    }

    /// Compares the first two distinct methods in `selection`. Both trees
    /// must already be built; otherwise nothing is sent.
    pub async fn request_comparison(
        &self,
        selection: &[TreeMethod],
    ) -> Result<ComparisonResult, PipelineError> {
        let requested = match selection {
            [first, second, ..] => Some(OperationKey::Compare(*first, *second)),
            _ => None,
        };
        let mut methods: Vec<TreeMethod> = Vec::with_capacity(selection.len());
        for method in selection {
            if !methods.contains(method) {
                methods.push(*method);
            }
        }

        let (epoch, session_id, method1, method2) = {
            let state = self.state.read().await;
            let (method1, method2) = match methods.as_slice() {
                [first, second, ..] => (*first, *second),
                _ => {
                    return Err(self.reject_selection(
                        requested,
                        format!(
                            "select two different methods to compare ({} selected)",
                            methods.len()
                        ),
                    ))
                }
            };
            if let Some(missing) = [method1, method2]
                .into_iter()
                .find(|method| !state.trees.contains_key(method))
            {
                return Err(self.reject_selection(
                    Some(OperationKey::Compare(method1, method2)),
                    format!("the {missing} tree has not been built yet"),
                ));
            }
            let Some(session) = state.session.as_ref() else {
                return Err(PipelineError::InvalidStage {
                    action: "compare trees",
                    stage: state.stage,
                });
            };
            (state.epoch, session.session_id.clone(), method1, method2)
        };

        let key = OperationKey::Compare(method1, method2);
        self.start(key)?;
        let result = self
            .gateway
            .compare_trees(&session_id, method1, method2)
            .await;

        let mut state = self.state.write().await;
        if state.epoch != epoch {
            return Err(self.superseded(key, epoch));
        }
        let comparison = result.map_err(|err| self.fail(key, err))?;

        if comparison.leaf_sets_diverge() {
            warn!(
                session_id = %session_id,
                unique_tree1 = comparison.terminals.unique1.len(),
                unique_tree2 = comparison.terminals.unique2.len(),
                "compared trees do not share the same leaf set"
            );
        }
        info!(
            session_id = %session_id,
            %method1,
            %method2,
            similarity = comparison.similarity.percentage,
            rf_normalized = comparison.rf_distance.normalized,
            "comparison ready"
        );
        state.comparison = Some(comparison.clone());
        self.advance(&mut state, Stage::Comparison);
        self.emit(PipelineEvent::ComparisonReady { method1, method2 });
        Ok(comparison)
    }

    /// Jumps to the comparison stage without running a comparison.
    pub async fn enter_comparison(&self) -> Result<(), PipelineError> {
        let mut state = self.state.write().await;
        if state.trees.len() < 2 {
            return Err(PipelineError::InvalidStage {
                action: "enter comparison",
                stage: state.stage,
            });
        }
        self.advance(&mut state, Stage::Comparison);
        Ok(())
    }

    pub async fn reset(&self) {
        let mut state = self.state.write().await;
        let from = state.stage;
        let epoch = state.epoch + 1;
        *state = PipelineState {
            epoch,
            ..PipelineState::default()
        };
        self.gateway.tracker().clear();
        info!(epoch, "pipeline reset");
        self.emit(PipelineEvent::Reset);
        if from != Stage::Upload {
            self.emit(PipelineEvent::StageChanged {
                from,
                to: Stage::Upload,
            });
        }
    }

    pub async fn stage(&self) -> Stage {
        self.state.read().await.stage
    }

    pub async fn can_compare(&self) -> bool {
        self.state.read().await.trees.len() >= 2
    }

    pub fn status(&self, key: OperationKey) -> OperationStatus {
        self.gateway.tracker().status(key)
    }

    pub async fn snapshot(&self) -> PipelineSnapshot {
        let state = self.state.read().await;
        PipelineSnapshot {
            stage: state.stage,
            session: state.session.clone(),
            alignment: state.alignment.clone(),
            trees: state.trees.clone(),
            comparison: state.comparison.clone(),
            operations: self.gateway.tracker().snapshot(),
        }
    }

    pub async fn layout(&self, method: TreeMethod) -> Option<TreeLayout> {
        let state = self.state.read().await;
        state
            .trees
            .get(&method)
            .map(|artifact| TreeLayout::compute(&artifact.tree))
    }

    pub async fn interpretation(&self) -> Option<ComparisonInterpretation> {
        self.state.read().await.comparison.as_ref().map(interpret)
    }
}

#[cfg(test)]
#[path = "tests/controller_tests.rs"]
mod tests;
