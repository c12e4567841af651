//! Wire shapes of the analysis service's JSON API.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::domain::{SessionId, TreeMethod, TreeNode};

pub const STATUS_SUCCESS: &str = "success";
pub const STATUS_HEALTHY: &str = "healthy";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadResponse {
    pub session_id: SessionId,
    pub filename: String,
    pub sequences_count: usize,
    pub sequences: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlignResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    pub alignment_length: usize,
    pub aligned_sequences: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildTreeResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    pub method: TreeMethod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub newick: Option<String>,
    pub tree_json: TreeNode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetTreeResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    pub method: TreeMethod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub newick: Option<String>,
    pub tree_json: TreeNode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompareTreesRequest {
    pub method1: TreeMethod,
    pub method2: TreeMethod,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompareTreesResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    pub method1: TreeMethod,
    pub method2: TreeMethod,
    pub comparison: ComparisonPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonPayload {
    pub terminals: TerminalsPayload,
    pub rf_distance: RfDistancePayload,
    pub topology: TopologyPayload,
    /// Either summary statistics or an `{error|info: ..}` note when the
    /// trees carry no branch lengths.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch_lengths: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub support_values: Option<serde_json::Value>,
    #[serde(default)]
    pub similarity_score: SimilarityPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TerminalsPayload {
    #[serde(default)]
    pub common: Vec<String>,
    #[serde(default)]
    pub unique_tree1: Vec<String>,
    #[serde(default)]
    pub unique_tree2: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RfDistancePayload {
    pub distance: u64,
    #[serde(default)]
    pub max_distance: u64,
    pub normalized: f64,
    #[serde(default)]
    pub common_clades: u64,
    #[serde(default)]
    pub unique_clades_tree1: u64,
    #[serde(default)]
    pub unique_clades_tree2: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopologyPayload {
    pub internal_nodes_tree1: u64,
    pub internal_nodes_tree2: u64,
    #[serde(default)]
    pub max_depth_tree1: f64,
    #[serde(default)]
    pub max_depth_tree2: f64,
    pub depth_difference: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SimilarityPayload {
    #[serde(default)]
    pub terminal_similarity: f64,
    #[serde(default)]
    pub topological_similarity: f64,
    #[serde(default)]
    pub overall_similarity: f64,
    #[serde(default)]
    pub similarity_percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryStats {
    pub count: u64,
    pub mean: f64,
    pub median: f64,
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsDifference {
    pub mean_diff: f64,
    pub median_diff: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsComparison {
    pub tree1: SummaryStats,
    pub tree2: SummaryStats,
    pub difference: StatsDifference,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionInfoResponse {
    pub session_id: SessionId,
    pub filename: String,
    pub sequences_count: usize,
    pub sequences: Vec<String>,
    pub has_alignment: bool,
    #[serde(default)]
    pub available_trees: Vec<TreeMethod>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: SessionId,
    pub filename: String,
    pub sequences_count: usize,
    pub has_alignment: bool,
    #[serde(default)]
    pub trees_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionListResponse {
    pub sessions: Vec<SessionSummary>,
    pub total: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<NaiveDateTime>,
}
