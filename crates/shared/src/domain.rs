use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First eight characters, for display next to the filename.
    pub fn short(&self) -> &str {
        match self.0.char_indices().nth(8) {
            Some((idx, _)) => &self.0[..idx],
            None => &self.0,
        }
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TreeMethod {
    Nj,
    Ml,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MethodInfo {
    pub display_name: &'static str,
    pub description: &'static str,
    pub complexity: &'static str,
    pub estimated_duration: &'static str,
}

impl TreeMethod {
    pub const ALL: [TreeMethod; 2] = [TreeMethod::Nj, TreeMethod::Ml];

    pub fn token(self) -> &'static str {
        match self {
            TreeMethod::Nj => "nj",
            TreeMethod::Ml => "ml",
        }
    }

    pub fn parse(token: &str) -> Option<Self> {
        match token.trim().to_ascii_lowercase().as_str() {
            "nj" => Some(TreeMethod::Nj),
            "ml" => Some(TreeMethod::Ml),
            _ => None,
        }
    }

    pub fn info(self) -> MethodInfo {
        match self {
            TreeMethod::Nj => MethodInfo {
                display_name: "Neighbor-Joining",
                description: "Fast distance-based algorithm that produces unrooted trees.",
                complexity: "low",
                estimated_duration: "~30s",
            },
            TreeMethod::Ml => MethodInfo {
                display_name: "Maximum Likelihood",
                description: "Probabilistic method that searches for the most likely tree given the data.",
                complexity: "high",
                estimated_duration: "~2-5min",
            },
        }
    }
}

impl fmt::Display for TreeMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    #[default]
    Upload,
    Sequences,
    Trees,
    Comparison,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Upload => "upload",
            Stage::Sequences => "sequences",
            Stage::Trees => "trees",
            Stage::Comparison => "comparison",
        };
        f.write_str(name)
    }
}

/// A rooted tree as delivered by the tree-building service.
///
/// Unknown keys (`is_terminal`, `metadata`) are ignored; the fields that
/// matter here are recomputed from the structure itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct TreeNode {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TreeNode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch_length: Option<f64>,
}

impl TreeNode {
    pub fn leaf(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn internal(name: impl Into<String>, children: Vec<TreeNode>) -> Self {
        Self {
            name: name.into(),
            children,
            ..Self::default()
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }

    pub fn with_branch_length(mut self, branch_length: f64) -> Self {
        self.branch_length = Some(branch_length);
        self
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Pre-order walk with an explicit stack, yielding `(node, depth)`.
    pub fn walk(&self) -> impl Iterator<Item = (&TreeNode, usize)> {
        let mut stack = vec![(self, 0usize)];
        std::iter::from_fn(move || {
            let (node, depth) = stack.pop()?;
            stack.extend(node.children.iter().rev().map(|child| (child, depth + 1)));
            Some((node, depth))
        })
    }

    /// Leaf names in left-to-right order.
    pub fn leaf_names(&self) -> Vec<&str> {
        self.walk()
            .filter(|(node, _)| node.is_leaf())
            .map(|(node, _)| node.name.as_str())
            .collect()
    }

    pub fn node_count(&self) -> usize {
        self.walk().count()
    }

    pub fn internal_count(&self) -> usize {
        self.walk().filter(|(node, _)| !node.is_leaf()).count()
    }

    pub fn max_depth(&self) -> usize {
        self.walk().map(|(_, depth)| depth).max().unwrap_or(0)
    }
}
