// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Proteus-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Proteus and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct DiagramReadParams {
    /// Diagram file path, relative to the project root.
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct McpNode {
    pub id: String,
    pub label: String,
    #[serde(rename = "type")]
    pub shape: String,
    pub x: f64,
    pub y: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub style: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct McpEdge {
    pub source: String,
    pub target: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct McpText {
    pub text: String,
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DiagramReadResponse {
    pub path: String,
    pub format: String,
    pub nodes: Vec<McpNode>,
    pub edges: Vec<McpEdge>,
    pub text: Vec<McpText>,
    pub metadata: serde_json::Value,
}

/// Node description accepted inside `diagram_write`'s `nodes_json`;
/// everything defaults deterministically so sparse specs stay valid.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeSpec {
    pub id: Option<String>,
    pub label: Option<String>,
    #[serde(rename = "type")]
    pub shape: Option<String>,
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub width: Option<f64>,
    pub height: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EdgeSpec {
    pub source: String,
    pub target: String,
    pub label: Option<String>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct DiagramWriteParams {
    /// Target file path, relative to the project root; the extension selects
    /// the format.
    pub path: String,
    /// JSON array of node objects (`id`, `label`, `type`, `x`, `y`,
    /// optional `width`/`height`).
    pub nodes_json: String,
    /// JSON array of edge objects (`source`, `target`, optional `label`).
    pub edges_json: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DiagramWriteResponse {
    pub path: String,
    pub format: String,
    pub nodes: u64,
    pub edges: u64,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct DiagramConvertParams {
    pub source_path: String,
    pub target_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DiagramConvertResponse {
    pub source_path: String,
    pub target_path: String,
    pub source_format: String,
    pub target_format: String,
    pub nodes: u64,
    pub edges: u64,
    pub texts: u64,
    /// Edges in the source that referenced unknown nodes and were dropped.
    pub dropped_edges: u64,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct DiagramRenderParams {
    pub path: String,
    /// Image output path (`.png` or `.svg`), relative to the project root.
    pub output_path: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DiagramRenderResponse {
    pub path: String,
    pub output_path: String,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct DiagramFromMermaidParams {
    /// Mermaid source text, e.g. a `flowchart TD` block.
    pub mermaid: String,
    /// Target `.excalidraw` path, relative to the project root.
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DiagramFromMermaidResponse {
    pub path: String,
    pub elements: u64,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ExcalidrawVerifyParams {
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ExcalidrawVerifyResponse {
    /// Whether the real Excalidraw application accepts the file.
    pub valid: bool,
    pub message: String,
    /// PNG export proving the scene rendered, when it did.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_base64: Option<String>,
}
