// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Proteus-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Proteus and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// A labeled shape with a position, optionally bound to edges.
///
/// The shape tag is an open string (`"rectangle"`, `"ellipse"`, `"diamond"`,
/// ...) so formats can carry shapes the model has no dedicated knowledge of.
/// Format-specific visual attributes travel opaquely in the style map.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    id: String,
    label: String,
    shape: String,
    x: f64,
    y: f64,
    width: Option<f64>,
    height: Option<f64>,
    style: BTreeMap<String, String>,
}

impl Node {
    pub fn new(id: impl Into<String>, label: impl Into<String>, x: f64, y: f64) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            shape: "rectangle".to_owned(),
            x,
            y,
            width: None,
            height: None,
            style: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn set_label(&mut self, label: impl Into<String>) {
        self.label = label.into();
    }

    pub fn shape(&self) -> &str {
        &self.shape
    }

    pub fn set_shape(&mut self, shape: impl Into<String>) {
        self.shape = shape.into();
    }

    pub fn x(&self) -> f64 {
        self.x
    }

    pub fn y(&self) -> f64 {
        self.y
    }

    pub fn width(&self) -> Option<f64> {
        self.width
    }

    pub fn height(&self) -> Option<f64> {
        self.height
    }

    pub fn set_size(&mut self, width: Option<f64>, height: Option<f64>) {
        self.width = width;
        self.height = height;
    }

    pub fn style(&self) -> &BTreeMap<String, String> {
        &self.style
    }

    pub fn style_mut(&mut self) -> &mut BTreeMap<String, String> {
        &mut self.style
    }
}

/// A directed connector between two node ids.
#[derive(Debug, Clone, PartialEq)]
pub struct Edge {
    source: String,
    target: String,
    label: Option<String>,
    style: BTreeMap<String, String>,
}

impl Edge {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            label: None,
            style: BTreeMap::new(),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn set_label<T: Into<String>>(&mut self, label: Option<T>) {
        self.label = label.map(Into::into).filter(|label| !label.is_empty());
    }

    pub fn style(&self) -> &BTreeMap<String, String> {
        &self.style
    }

    pub fn style_mut(&mut self) -> &mut BTreeMap<String, String> {
        &mut self.style
    }
}

/// Standalone text content not bound to any node.
#[derive(Debug, Clone, PartialEq)]
pub struct TextElement {
    text: String,
    x: f64,
    y: f64,
}

impl TextElement {
    pub fn new(text: impl Into<String>, x: f64, y: f64) -> Self {
        Self { text: text.into(), x, y }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn x(&self) -> f64 {
        self.x
    }

    pub fn y(&self) -> f64 {
        self.y
    }
}

/// An edge whose endpoints do not both resolve to node ids in the same
/// diagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntegrityError {
    pub edge_index: usize,
    pub missing_id: String,
}

impl fmt::Display for IntegrityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "edge {} references missing node id: {}",
            self.edge_index, self.missing_id
        )
    }
}

impl std::error::Error for IntegrityError {}

/// The canonical node/edge/text graph shared by all formats.
///
/// Order matters: readers append in source order and writers emit in model
/// order, which keeps re-serialization deterministic. Format-specific extras
/// with no canonical slot (page geometry, app-state, ...) live in the open
/// metadata map so new formats never widen the core model.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Diagram {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    texts: Vec<TextElement>,
    metadata: BTreeMap<String, serde_json::Value>,
}

impl Diagram {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn nodes_mut(&mut self) -> &mut Vec<Node> {
        &mut self.nodes
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn edges_mut(&mut self) -> &mut Vec<Edge> {
        &mut self.edges
    }

    pub fn texts(&self) -> &[TextElement] {
        &self.texts
    }

    pub fn texts_mut(&mut self) -> &mut Vec<TextElement> {
        &mut self.texts
    }

    pub fn metadata(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.metadata
    }

    pub fn metadata_mut(&mut self) -> &mut BTreeMap<String, serde_json::Value> {
        &mut self.metadata
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|node| node.id() == id)
    }

    pub fn node_ids(&self) -> BTreeSet<&str> {
        self.nodes.iter().map(Node::id).collect()
    }

    /// Reports the first edge whose source or target is not a known node id.
    pub fn validate_edges(&self) -> Result<(), IntegrityError> {
        let ids = self.node_ids();
        for (edge_index, edge) in self.edges.iter().enumerate() {
            for endpoint in [edge.source(), edge.target()] {
                if !ids.contains(endpoint) {
                    return Err(IntegrityError {
                        edge_index,
                        missing_id: endpoint.to_owned(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Removes edges with unresolved endpoints and returns how many were
    /// dropped.
    pub fn drop_dangling_edges(&mut self) -> usize {
        let ids: BTreeSet<String> =
            self.nodes.iter().map(|node| node.id().to_owned()).collect();
        let before = self.edges.len();
        self.edges
            .retain(|edge| ids.contains(edge.source()) && ids.contains(edge.target()));
        before - self.edges.len()
    }
}
