//! Scripted in-memory analysis service with `oneshot`-gated replies.

use std::{
    collections::{BTreeMap, VecDeque},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

use async_trait::async_trait;
use shared::{
    domain::{SessionId, TreeMethod, TreeNode},
    error::ServiceError,
    protocol::{
        AlignResponse, BuildTreeResponse, CompareTreesResponse, ComparisonPayload,
        GetTreeResponse, HealthResponse, RfDistancePayload, SessionInfoResponse,
        SessionListResponse, SimilarityPayload, TerminalsPayload, TopologyPayload,
        UploadResponse, STATUS_HEALTHY, STATUS_SUCCESS,
    },
};
use tokio::sync::oneshot;

use crate::{transport::PhyloBackend, upload::FastaUpload};

pub const SEQUENCE_NAMES: [&str; 3] = ["Seq_A", "Seq_B", "Seq_C"];

pub fn upload_response(session_id: &str, names: &[&str]) -> UploadResponse {
    UploadResponse {
        session_id: SessionId(session_id.to_string()),
        filename: "sample.fasta".to_string(),
        sequences_count: names.len(),
        sequences: names.iter().map(|name| name.to_string()).collect(),
    }
}

pub fn align_response() -> AlignResponse {
    AlignResponse {
        status: Some(STATUS_SUCCESS.to_string()),
        alignment_length: 8,
        aligned_sequences: SEQUENCE_NAMES
            .iter()
            .zip(["ACGT-ACG", "ACGTTACG", "AC-TTACG"])
            .map(|(name, seq)| (name.to_string(), seq.to_string()))
            .collect(),
    }
}

pub fn sample_tree(names: &[&str]) -> TreeNode {
    let mut leaves: Vec<TreeNode> = names.iter().map(|name| TreeNode::leaf(*name)).collect();
    let last = leaves.pop();
    let mut children = vec![TreeNode::internal("", leaves).with_confidence(98.0)];
    children.extend(last);
    TreeNode::internal("", children)
}

pub fn build_response(method: TreeMethod) -> BuildTreeResponse {
    BuildTreeResponse {
        status: Some(STATUS_SUCCESS.to_string()),
        method,
        newick: Some("((Seq_A,Seq_B)98,Seq_C);".to_string()),
        tree_json: sample_tree(&SEQUENCE_NAMES),
    }
}

pub fn compare_response(
    method1: TreeMethod,
    method2: TreeMethod,
    percentage: f64,
    normalized: f64,
) -> CompareTreesResponse {
    CompareTreesResponse {
        status: Some(STATUS_SUCCESS.to_string()),
        method1,
        method2,
        comparison: ComparisonPayload {
            terminals: TerminalsPayload {
                common: SEQUENCE_NAMES.iter().map(|name| name.to_string()).collect(),
                unique_tree1: Vec::new(),
                unique_tree2: Vec::new(),
            },
            rf_distance: RfDistancePayload {
                distance: 0,
                max_distance: 2,
                normalized,
                common_clades: 1,
                unique_clades_tree1: 0,
                unique_clades_tree2: 0,
            },
            topology: TopologyPayload {
                internal_nodes_tree1: 2,
                internal_nodes_tree2: 2,
                max_depth_tree1: 2.0,
                max_depth_tree2: 2.0,
                depth_difference: 0.0,
            },
            branch_lengths: None,
            support_values: None,
            similarity_score: SimilarityPayload {
                terminal_similarity: 1.0,
                topological_similarity: 1.0 - normalized,
                overall_similarity: percentage / 100.0,
                similarity_percentage: percentage,
            },
        },
    }
}

struct Step<T> {
    result: Result<T, ServiceError>,
    gate: Option<oneshot::Receiver<()>>,
}

impl<T> Step<T> {
    fn queue(
        queue: &mut VecDeque<Step<T>>,
        result: Result<T, ServiceError>,
        held: bool,
    ) -> Option<oneshot::Sender<()>> {
        let (release, gate) = if held {
            let (tx, rx) = oneshot::channel();
            (Some(tx), Some(rx))
        } else {
            (None, None)
        };
        queue.push_back(Step { result, gate });
        release
    }
}

#[derive(Default)]
struct Script {
    upload: VecDeque<Step<UploadResponse>>,
    align: VecDeque<Step<AlignResponse>>,
    build: BTreeMap<TreeMethod, VecDeque<Step<BuildTreeResponse>>>,
    compare: VecDeque<Step<CompareTreesResponse>>,
}

#[derive(Default)]
pub struct ScriptedBackend {
    script: Mutex<Script>,
    calls: Mutex<Vec<String>>,
    uploads: AtomicUsize,
}

impl ScriptedBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("calls lock").clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().expect("calls lock").len()
    }

    pub fn script_upload(&self, result: Result<UploadResponse, ServiceError>) {
        Step::queue(&mut self.script.lock().expect("script").upload, result, false);
    }

    pub fn hold_upload(&self, result: Result<UploadResponse, ServiceError>) -> oneshot::Sender<()> {
        Step::queue(&mut self.script.lock().expect("script").upload, result, true)
            .expect("gate")
    }

    pub fn script_align(&self, result: Result<AlignResponse, ServiceError>) {
        Step::queue(&mut self.script.lock().expect("script").align, result, false);
    }

    pub fn hold_align(&self, result: Result<AlignResponse, ServiceError>) -> oneshot::Sender<()> {
        Step::queue(&mut self.script.lock().expect("script").align, result, true).expect("gate")
    }

    pub fn script_tree(&self, method: TreeMethod, result: Result<BuildTreeResponse, ServiceError>) {
        let mut script = self.script.lock().expect("script");
        Step::queue(script.build.entry(method).or_default(), result, false);
    }

    pub fn hold_tree(
        &self,
        method: TreeMethod,
        result: Result<BuildTreeResponse, ServiceError>,
    ) -> oneshot::Sender<()> {
        let mut script = self.script.lock().expect("script");
        Step::queue(script.build.entry(method).or_default(), result, true).expect("gate")
    }

    pub fn script_compare(&self, result: Result<CompareTreesResponse, ServiceError>) {
        Step::queue(&mut self.script.lock().expect("script").compare, result, false);
    }

    pub fn hold_compare(
        &self,
        result: Result<CompareTreesResponse, ServiceError>,
    ) -> oneshot::Sender<()> {
        Step::queue(&mut self.script.lock().expect("script").compare, result, true)
            .expect("gate")
    }

    async fn play<T>(
        &self,
        call: String,
        pick: impl FnOnce(&mut Script) -> Option<Step<T>>,
        fallback: impl FnOnce() -> T,
    ) -> Result<T, ServiceError> {
        self.calls.lock().expect("calls lock").push(call);
        let step = {
            let mut script = self.script.lock().expect("script");
            pick(&mut script)
        };
        match step {
            Some(Step { result, gate }) => {
                if let Some(gate) = gate {
                    let _ = gate.await;
                }
                result
            }
            None => Ok(fallback()),
        }
    }
}

#[async_trait]
impl PhyloBackend for ScriptedBackend {
    async fn upload_fasta(&self, upload: &FastaUpload) -> Result<UploadResponse, ServiceError> {
        let n = self.uploads.fetch_add(1, Ordering::SeqCst) + 1;
        self.play(
            format!("upload:{}", upload.filename),
            |script| script.upload.pop_front(),
            || upload_response(&format!("session-{n}"), &SEQUENCE_NAMES),
        )
        .await
    }

    async fn align(&self, session_id: &SessionId) -> Result<AlignResponse, ServiceError> {
        self.play(
            format!("align:{session_id}"),
            |script| script.align.pop_front(),
            align_response,
        )
        .await
    }

    async fn build_tree(
        &self,
        session_id: &SessionId,
        method: TreeMethod,
    ) -> Result<BuildTreeResponse, ServiceError> {
        self.play(
            format!("build_tree:{session_id}:{method}"),
            |script| script.build.get_mut(&method).and_then(VecDeque::pop_front),
            || build_response(method),
        )
        .await
    }

    async fn compare_trees(
        &self,
        session_id: &SessionId,
        method1: TreeMethod,
        method2: TreeMethod,
    ) -> Result<CompareTreesResponse, ServiceError> {
        self.play(
            format!("compare_trees:{session_id}:{method1}:{method2}"),
            |script| script.compare.pop_front(),
            || compare_response(method1, method2, 92.0, 0.05),
        )
        .await
    }

    async fn get_tree(
        &self,
        session_id: &SessionId,
        method: TreeMethod,
    ) -> Result<GetTreeResponse, ServiceError> {
        self.play(
            format!("get_tree:{session_id}:{method}"),
            |_| None,
            || {
                let built = build_response(method);
                GetTreeResponse {
                    status: built.status,
                    method,
                    newick: built.newick,
                    tree_json: built.tree_json,
                    created_at: None,
                }
            },
        )
        .await
    }

    async fn session_info(
        &self,
        session_id: &SessionId,
    ) -> Result<SessionInfoResponse, ServiceError> {
        self.play(
            format!("session_info:{session_id}"),
            |_| None,
            || SessionInfoResponse {
                session_id: session_id.clone(),
                filename: "sample.fasta".to_string(),
                sequences_count: SEQUENCE_NAMES.len(),
                sequences: SEQUENCE_NAMES.iter().map(|name| name.to_string()).collect(),
                has_alignment: false,
                available_trees: Vec::new(),
                created_at: None,
            },
        )
        .await
    }

    async fn list_sessions(&self) -> Result<SessionListResponse, ServiceError> {
        self.play(
            "list_sessions".to_string(),
            |_| None,
            || SessionListResponse {
                sessions: Vec::new(),
                total: 0,
            },
        )
        .await
    }

    async fn health(&self) -> Result<HealthResponse, ServiceError> {
        self.play(
            "health".to_string(),
            |_| None,
            || HealthResponse {
                status: STATUS_HEALTHY.to_string(),
                message: "analysis service is running".to_string(),
                timestamp: None,
            },
        )
        .await
    }
}
