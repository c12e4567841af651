//! Session data model, coerced from the service's wire payloads.

use std::collections::{BTreeMap, BTreeSet};

use shared::{
    domain::{MethodInfo, SessionId, TreeMethod, TreeNode},
    error::ServiceError,
    protocol::{
        AlignResponse, BuildTreeResponse, CompareTreesResponse, GetTreeResponse,
        StatsComparison, UploadResponse, STATUS_SUCCESS,
    },
};

pub const ALIGNMENT_PREVIEW_COLUMNS: usize = 80;

fn ensure_success(operation: &str, status: Option<&str>) -> Result<(), ServiceError> {
    match status {
        None | Some(STATUS_SUCCESS) => Ok(()),
        Some(other) => Err(ServiceError::server(format!(
            "{operation} returned status '{other}'"
        ))),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub session_id: SessionId,
    pub filename: String,
    pub sequence_names: Vec<String>,
    pub sequence_count: usize,
}

impl TryFrom<UploadResponse> for Session {
    type Error = ServiceError;

    fn try_from(value: UploadResponse) -> Result<Self, Self::Error> {
        if value.session_id.as_str().trim().is_empty() {
            return Err(ServiceError::server("upload returned an empty session id"));
        }
        if value.sequences_count != value.sequences.len() {
            return Err(ServiceError::server(format!(
                "upload reported {} sequences but listed {}",
                value.sequences_count,
                value.sequences.len()
            )));
        }
        let mut seen = BTreeSet::new();
        if let Some(dup) = value.sequences.iter().find(|name| !seen.insert(name.as_str())) {
            return Err(ServiceError::server(format!(
                "upload listed sequence '{dup}' more than once"
            )));
        }

        Ok(Self {
            session_id: value.session_id,
            filename: value.filename,
            sequence_count: value.sequences_count,
            sequence_names: value.sequences,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlignedRow<'a> {
    pub name: &'a str,
    pub columns: String,
    pub truncated: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlignmentState {
    pub alignment_length: usize,
    pub aligned_sequences: BTreeMap<String, String>,
}

impl AlignmentState {
    /// First `width` columns of every aligned sequence.
    pub fn preview(&self, width: usize) -> Vec<AlignedRow<'_>> {
        self.aligned_sequences
            .iter()
            .map(|(name, sequence)| {
                let columns: String = sequence.chars().take(width).collect();
                AlignedRow {
                    name,
                    truncated: sequence.chars().count() > width,
                    columns,
                }
            })
            .collect()
    }
}

impl TryFrom<AlignResponse> for AlignmentState {
    type Error = ServiceError;

    fn try_from(value: AlignResponse) -> Result<Self, Self::Error> {
        ensure_success("alignment", value.status.as_deref())?;
        if let Some((name, sequence)) = value
            .aligned_sequences
            .iter()
            .find(|(_, sequence)| sequence.chars().count() != value.alignment_length)
        {
            return Err(ServiceError::server(format!(
                "aligned sequence '{name}' has length {} but alignment length is {}",
                sequence.chars().count(),
                value.alignment_length
            )));
        }

        Ok(Self {
            alignment_length: value.alignment_length,
            aligned_sequences: value.aligned_sequences,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TreeArtifact {
    pub method: TreeMethod,
    pub tree: TreeNode,
    pub newick: Option<String>,
    pub info: MethodInfo,
}

impl TreeArtifact {
    pub fn new(method: TreeMethod, tree: TreeNode, newick: Option<String>) -> Self {
        Self {
            method,
            tree,
            newick,
            info: method.info(),
        }
    }

    /// Whether the tree's leaves are exactly the uploaded sequence names.
    pub fn leaf_names_match(&self, sequence_names: &[String]) -> bool {
        let leaves: BTreeSet<&str> = self.tree.leaf_names().into_iter().collect();
        let expected: BTreeSet<&str> = sequence_names.iter().map(String::as_str).collect();
        leaves == expected
    }

    fn from_wire(
        requested: TreeMethod,
        status: Option<&str>,
        method: TreeMethod,
        newick: Option<String>,
        tree: TreeNode,
    ) -> Result<Self, ServiceError> {
        ensure_success("tree build", status)?;
        if method != requested {
            return Err(ServiceError::server(format!(
                "requested a {requested} tree but the service returned {method}"
            )));
        }
        Ok(Self::new(method, tree, newick))
    }

    pub fn from_build_response(
        requested: TreeMethod,
        value: BuildTreeResponse,
    ) -> Result<Self, ServiceError> {
        Self::from_wire(
            requested,
            value.status.as_deref(),
            value.method,
            value.newick,
            value.tree_json,
        )
    }

    pub fn from_get_response(
        requested: TreeMethod,
        value: GetTreeResponse,
    ) -> Result<Self, ServiceError> {
        Self::from_wire(
            requested,
            value.status.as_deref(),
            value.method,
            value.newick,
            value.tree_json,
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Similarity {
    pub percentage: f64,
    pub terminal: f64,
    pub topological: f64,
    pub overall: f64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Terminals {
    pub common: Vec<String>,
    pub unique1: Vec<String>,
    pub unique2: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RfDistance {
    pub distance: u64,
    pub max_distance: u64,
    pub normalized: f64,
    pub common_clades: u64,
    pub unique_clades_tree1: u64,
    pub unique_clades_tree2: u64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Topology {
    pub internal_nodes_tree1: u64,
    pub internal_nodes_tree2: u64,
    pub max_depth_tree1: f64,
    pub max_depth_tree2: f64,
    pub depth_difference: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonResult {
    pub method1: TreeMethod,
    pub method2: TreeMethod,
    pub similarity: Similarity,
    pub terminals: Terminals,
    pub rf_distance: RfDistance,
    pub topology: Topology,
    pub branch_lengths: Option<StatsComparison>,
    pub support_values: Option<StatsComparison>,
}

impl ComparisonResult {
    /// True when the two trees were not built over the same leaf set.
    pub fn leaf_sets_diverge(&self) -> bool {
        !self.terminals.unique1.is_empty() || !self.terminals.unique2.is_empty()
    }
}

impl TryFrom<CompareTreesResponse> for ComparisonResult {
    type Error = ServiceError;

    fn try_from(value: CompareTreesResponse) -> Result<Self, Self::Error> {
        ensure_success("tree comparison", value.status.as_deref())?;
        let comparison = value.comparison;

        let percentage = comparison.similarity_score.similarity_percentage;
        if !percentage.is_finite() || !(0.0..=100.0).contains(&percentage) {
            return Err(ServiceError::server(format!(
                "similarity percentage {percentage} is outside 0..=100"
            )));
        }
        let normalized = comparison.rf_distance.normalized;
        if !normalized.is_finite() || !(0.0..=1.0).contains(&normalized) {
            return Err(ServiceError::server(format!(
                "normalized RF distance {normalized} is outside 0..=1"
            )));
        }

        let stats = |raw: Option<serde_json::Value>| {
            raw.and_then(|value| serde_json::from_value::<StatsComparison>(value).ok())
        };

        Ok(Self {
            method1: value.method1,
            method2: value.method2,
            similarity: Similarity {
                percentage,
                terminal: comparison.similarity_score.terminal_similarity,
                topological: comparison.similarity_score.topological_similarity,
                overall: comparison.similarity_score.overall_similarity,
            },
            terminals: Terminals {
                common: comparison.terminals.common,
                unique1: comparison.terminals.unique_tree1,
                unique2: comparison.terminals.unique_tree2,
            },
            rf_distance: RfDistance {
                distance: comparison.rf_distance.distance,
                max_distance: comparison.rf_distance.max_distance,
                normalized,
                common_clades: comparison.rf_distance.common_clades,
                unique_clades_tree1: comparison.rf_distance.unique_clades_tree1,
                unique_clades_tree2: comparison.rf_distance.unique_clades_tree2,
            },
            topology: Topology {
                internal_nodes_tree1: comparison.topology.internal_nodes_tree1,
                internal_nodes_tree2: comparison.topology.internal_nodes_tree2,
                max_depth_tree1: comparison.topology.max_depth_tree1,
                max_depth_tree2: comparison.topology.max_depth_tree2,
                depth_difference: comparison.topology.depth_difference,
            },
            branch_lengths: stats(comparison.branch_lengths),
            support_values: stats(comparison.support_values),
        })
    }
}
