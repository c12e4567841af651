//! Dendrogram layout for rooted trees, computed with explicit stacks.

use shared::domain::TreeNode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelSide {
    /// Away from the tree body; used for leaves.
    Outward,
    /// Toward the tree body; used for internal nodes.
    Inward,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LayoutNode {
    pub id: usize,
    pub parent: Option<usize>,
    pub depth: usize,
    pub x: f64,
    pub y: f64,
    pub is_leaf: bool,
    pub label: String,
    pub support_value: Option<f64>,
    pub branch_length: Option<f64>,
}

impl LayoutNode {
    pub fn label_side(&self) -> LabelSide {
        if self.is_leaf {
            LabelSide::Outward
        } else {
            LabelSide::Inward
        }
    }

    /// Support annotation for internal nodes, rounded to the nearest integer.
    pub fn support_label(&self) -> Option<String> {
        if self.is_leaf {
            return None;
        }
        self.support_value
            .filter(|value| value.is_finite())
            .map(|value| format!("{}", value.round() as i64))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TreeLayout {
    /// Nodes in pre-order; a parent always precedes its children.
    pub nodes: Vec<LayoutNode>,
    children: Vec<Vec<usize>>,
    pub leaf_count: usize,
    pub max_depth: usize,
}

impl TreeLayout {
    pub fn compute(root: &TreeNode) -> Self {
        let mut nodes: Vec<LayoutNode> = Vec::new();
        let mut children: Vec<Vec<usize>> = Vec::new();
        let mut next_leaf_rank = 0usize;
        let mut max_depth = 0usize;

        let mut stack: Vec<(&TreeNode, Option<usize>, usize)> = vec![(root, None, 0)];
        while let Some((node, parent, depth)) = stack.pop() {
            let id = nodes.len();
            let is_leaf = node.is_leaf();
            let y = if is_leaf {
                let rank = next_leaf_rank as f64;
                next_leaf_rank += 1;
                rank
            } else {
                0.0
            };
            max_depth = max_depth.max(depth);

            nodes.push(LayoutNode {
                id,
                parent,
                depth,
                x: depth as f64,
                y,
                is_leaf,
                label: node.name.clone(),
                support_value: node.confidence,
                branch_length: node.branch_length,
            });
            children.push(Vec::new());
            if let Some(parent) = parent {
                children[parent].push(id);
            }

            stack.extend(
                node.children
                    .iter()
                    .rev()
                    .map(|child| (child, Some(id), depth + 1)),
            );
        }

        // Reverse pre-order visits every child before its parent.
        for id in (0..nodes.len()).rev() {
            let kids = &children[id];
            if kids.is_empty() {
                continue;
            }
            let sum: f64 = kids.iter().map(|&kid| nodes[kid].y).sum();
            nodes[id].y = sum / kids.len() as f64;
        }

        Self {
            nodes,
            children,
            leaf_count: next_leaf_rank,
            max_depth,
        }
    }

    pub fn root(&self) -> &LayoutNode {
        &self.nodes[0]
    }

    pub fn children_of(&self, id: usize) -> impl Iterator<Item = &LayoutNode> {
        self.children
            .get(id)
            .into_iter()
            .flatten()
            .map(|&kid| &self.nodes[kid])
    }

    pub fn leaves(&self) -> impl Iterator<Item = &LayoutNode> {
        self.nodes.iter().filter(|node| node.is_leaf)
    }

    /// `(child, parent)` pairs, one per edge.
    pub fn edges(&self) -> impl Iterator<Item = (&LayoutNode, &LayoutNode)> {
        self.nodes
            .iter()
            .filter_map(|node| node.parent.map(|parent| (node, &self.nodes[parent])))
    }
}

#[cfg(test)]
#[path = "tests/layout_tests.rs"]
mod tests;
