//! Pixel projection of a [`TreeLayout`] and SVG output.

use svg::{
    node::element::{path::Data, Circle, Group, Path, Text},
    Document,
};

use crate::layout::{LabelSide, TreeLayout};

const MARKER_RADIUS: f64 = 4.0;
const LABEL_OFFSET: f64 = 8.0;
const SUPPORT_OFFSET: f64 = 10.0;
const TITLE_BASELINE: f64 = 15.0;
const LEAF_FILL: &str = "#2563eb";
const INTERNAL_FILL: &str = "#555";
const EDGE_STROKE: &str = "#999";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Margin {
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
    pub left: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
    pub margin: Margin,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 500.0,
            height: 400.0,
            margin: Margin {
                top: 20.0,
                right: 120.0,
                bottom: 20.0,
                left: 120.0,
            },
        }
    }
}

impl Viewport {
    fn inner_width(&self) -> f64 {
        (self.width - self.margin.left - self.margin.right).max(0.0)
    }

    fn inner_height(&self) -> f64 {
        (self.height - self.margin.top - self.margin.bottom).max(0.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Marker {
    Leaf,
    Internal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextAnchor {
    Start,
    End,
}

impl TextAnchor {
    fn as_svg(self) -> &'static str {
        match self {
            TextAnchor::Start => "start",
            TextAnchor::End => "end",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlacedNode {
    pub x: f64,
    pub y: f64,
    pub marker: Marker,
    pub label: String,
    pub label_dx: f64,
    pub label_anchor: TextAnchor,
    pub support: Option<String>,
}

/// Cubic curve from a child to its parent: it leaves the child horizontally
/// and enters the parent horizontally, bending at the midpoint depth.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgeCurve {
    pub from: (f64, f64),
    pub control1: (f64, f64),
    pub control2: (f64, f64),
    pub to: (f64, f64),
}

impl EdgeCurve {
    fn between(child: (f64, f64), parent: (f64, f64)) -> Self {
        let mid_x = (child.0 + parent.0) / 2.0;
        Self {
            from: child,
            control1: (mid_x, child.1),
            control2: (mid_x, parent.1),
            to: parent,
        }
    }

    pub fn path_data(&self) -> Data {
        Data::new()
            .move_to(self.from)
            .cubic_curve_to((self.control1, self.control2, self.to))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TreeDiagram {
    pub title: String,
    pub viewport: Viewport,
    pub nodes: Vec<PlacedNode>,
    pub edges: Vec<EdgeCurve>,
}

/// Scales layout units into the viewport: depth spans the inner width and
/// leaf ranks span the inner height. Each diagram has its own scale.
pub fn project(layout: &TreeLayout, viewport: Viewport, title: impl Into<String>) -> TreeDiagram {
    let inner_width = viewport.inner_width();
    let inner_height = viewport.inner_height();
    let depth_span = layout.max_depth.max(1) as f64;
    let rank_span = layout.leaf_count.saturating_sub(1) as f64;

    let position = |x: f64, y: f64| {
        let px = viewport.margin.left + x / depth_span * inner_width;
        let py = if rank_span > 0.0 {
            viewport.margin.top + y / rank_span * inner_height
        } else {
            viewport.margin.top + inner_height / 2.0
        };
        (px, py)
    };

    let nodes = layout
        .nodes
        .iter()
        .map(|node| {
            let (x, y) = position(node.x, node.y);
            let (label_dx, label_anchor) = match node.label_side() {
                LabelSide::Outward => (LABEL_OFFSET, TextAnchor::Start),
                LabelSide::Inward => (-LABEL_OFFSET, TextAnchor::End),
            };
            PlacedNode {
                x,
                y,
                marker: if node.is_leaf {
                    Marker::Leaf
                } else {
                    Marker::Internal
                },
                label: node.label.clone(),
                label_dx,
                label_anchor,
                support: node.support_label(),
            }
        })
        .collect();

    let edges = layout
        .edges()
        .map(|(child, parent)| {
            EdgeCurve::between(position(child.x, child.y), position(parent.x, parent.y))
        })
        .collect();

    TreeDiagram {
        title: title.into(),
        viewport,
        nodes,
        edges,
    }
}

fn diagram_group(diagram: &TreeDiagram) -> Group {
    let mut group = Group::new().set("class", "phylo-tree");

    for edge in &diagram.edges {
        group = group.add(
            Path::new()
                .set("class", "link")
                .set("fill", "none")
                .set("stroke", EDGE_STROKE)
                .set("d", edge.path_data()),
        );
    }

    for node in &diagram.nodes {
        let fill = match node.marker {
            Marker::Leaf => LEAF_FILL,
            Marker::Internal => INTERNAL_FILL,
        };
        group = group.add(
            Circle::new()
                .set("cx", node.x)
                .set("cy", node.y)
                .set("r", MARKER_RADIUS)
                .set("fill", fill)
                .set("stroke", "#fff")
                .set("stroke-width", 2),
        );
        group = group.add(
            Text::new(node.label.as_str())
                .set("class", "label")
                .set("x", node.x + node.label_dx)
                .set("y", node.y)
                .set("dy", ".35em")
                .set("text-anchor", node.label_anchor.as_svg())
                .set("font-size", 11)
                .set("font-family", "monospace"),
        );
        if let Some(support) = &node.support {
            group = group.add(
                Text::new(support.as_str())
                    .set("class", "bootstrap")
                    .set("x", node.x)
                    .set("y", node.y - SUPPORT_OFFSET)
                    .set("text-anchor", "middle")
                    .set("font-size", 9)
                    .set("fill", "#666"),
            );
        }
    }

    group.add(
        Text::new(diagram.title.as_str())
            .set("x", diagram.viewport.width / 2.0)
            .set("y", TITLE_BASELINE)
            .set("text-anchor", "middle")
            .set("font-size", 14)
            .set("font-weight", "bold"),
    )
}

/// Lays the diagrams out left to right, each in its own panel.
pub fn render_side_by_side(diagrams: &[TreeDiagram]) -> Document {
    let width: f64 = diagrams.iter().map(|d| d.viewport.width).sum();
    let height = diagrams
        .iter()
        .map(|d| d.viewport.height)
        .fold(0.0_f64, f64::max);

    let mut document = Document::new()
        .set("viewBox", (0, 0, width, height))
        .set("width", width)
        .set("height", height);

    let mut offset = 0.0;
    for diagram in diagrams {
        document = document.add(
            diagram_group(diagram).set("transform", format!("translate({offset},0)")),
        );
        offset += diagram.viewport.width;
    }

    document
}

#[cfg(test)]
mod tests {
    use shared::domain::TreeNode;
    use svg::node::element::path::{Command, Position};

    use super::*;

    fn three_leaf_tree() -> TreeNode {
        TreeNode::internal(
            "root",
            vec![
                TreeNode::internal("anc", vec![TreeNode::leaf("A"), TreeNode::leaf("B")])
                    .with_confidence(94.6),
                TreeNode::leaf("C"),
            ],
        )
    }

    #[test]
    fn projection_spans_the_inner_viewport() {
        let layout = TreeLayout::compute(&three_leaf_tree());
        let diagram = project(&layout, Viewport::default(), "NJ");

        let root = &diagram.nodes[0];
        assert_eq!(root.x, 120.0);
        let leaf_a = &diagram.nodes[2];
        let leaf_c = &diagram.nodes[4];
        assert_eq!(leaf_a.y, 20.0);
        assert_eq!(leaf_c.y, 380.0);
        assert_eq!(leaf_c.x, 120.0 + 130.0);
        assert_eq!(leaf_a.x, 380.0);
    }

    #[test]
    fn labels_face_away_from_the_tree_body_for_leaves() {
        let diagram = project(
            &TreeLayout::compute(&three_leaf_tree()),
            Viewport::default(),
            "ML",
        );
        let internal = &diagram.nodes[1];
        assert_eq!(internal.marker, Marker::Internal);
        assert_eq!(internal.label_anchor, TextAnchor::End);
        assert!(internal.label_dx < 0.0);
        assert_eq!(internal.support.as_deref(), Some("95"));

        let leaf = &diagram.nodes[2];
        assert_eq!(leaf.marker, Marker::Leaf);
        assert_eq!(leaf.label_anchor, TextAnchor::Start);
        assert!(leaf.label_dx > 0.0);
        assert_eq!(leaf.support, None);
    }

    #[test]
    fn edges_bend_at_the_midpoint_depth() {
        let diagram = project(
            &TreeLayout::compute(&three_leaf_tree()),
            Viewport::default(),
            "NJ",
        );
        for edge in &diagram.edges {
            let mid_x = (edge.from.0 + edge.to.0) / 2.0;
            assert_eq!(edge.control1, (mid_x, edge.from.1));
            assert_eq!(edge.control2, (mid_x, edge.to.1));
        }
        let commands = diagram.edges[0].path_data();
        assert_eq!(commands.len(), 2);
        assert!(matches!(&commands[0], Command::Move(Position::Absolute, p) if p.len() == 2));
        assert!(
            matches!(&commands[1], Command::CubicCurve(Position::Absolute, p) if p.len() == 6)
        );
    }

    #[test]
    fn single_leaf_is_centered() {
        let diagram = project(
            &TreeLayout::compute(&TreeNode::leaf("only")),
            Viewport::default(),
            "NJ",
        );
        assert_eq!(diagram.nodes[0].y, 200.0);
        assert!(diagram.edges.is_empty());
    }

    #[test]
    fn side_by_side_panels_are_offset_by_width() {
        let layout = TreeLayout::compute(&three_leaf_tree());
        let left = project(&layout, Viewport::default(), "NJ");
        let right = project(&layout, Viewport::default(), "ML");
        let svg = render_side_by_side(&[left, right]).to_string();
        assert!(svg.contains("translate(0,0)"));
        assert!(svg.contains("translate(500,0)"));
        assert!(svg.contains("width=\"1000\""));
        assert_eq!(svg.matches("class=\"bootstrap\"").count(), 2);
    }
}
