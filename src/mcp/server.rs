// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Proteus-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Proteus and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

use std::sync::Arc;

use base64::Engine;
use rmcp::handler::server::tool::ToolRouter;
use rmcp::handler::server::wrapper::{Json, Parameters};
use rmcp::model::{ServerCapabilities, ServerInfo};
use rmcp::{tool, tool_handler, tool_router, ErrorData, ServerHandler, ServiceExt};

use crate::convert::{convert, read_from, write_to, ConvertError};
use crate::external::{
    ExternalToolError, MermaidTranslator, ProcessMermaidTranslator, ProcessRenderer,
    ProcessVerifier, Renderer, Verifier,
};
use crate::format::DiagramFormat;
use crate::model::{Diagram, Edge, Node};
use crate::store::ProjectRoot;

use super::types::*;

const DEFAULT_RENDER_WIDTH: u32 = 1200;
const DEFAULT_RENDER_HEIGHT: u32 = 800;

#[derive(Clone)]
pub struct ProteusMcp {
    root: Arc<ProjectRoot>,
    renderer: Arc<dyn Renderer>,
    mermaid: Arc<dyn MermaidTranslator>,
    verifier: Arc<dyn Verifier>,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl ProteusMcp {
    pub fn new(root: ProjectRoot) -> Self {
        Self::with_delegates(
            root,
            Arc::new(ProcessRenderer),
            Arc::new(ProcessMermaidTranslator),
            Arc::new(ProcessVerifier),
        )
    }

    pub fn with_delegates(
        root: ProjectRoot,
        renderer: Arc<dyn Renderer>,
        mermaid: Arc<dyn MermaidTranslator>,
        verifier: Arc<dyn Verifier>,
    ) -> Self {
        Self {
            root: Arc::new(root),
            renderer,
            mermaid,
            verifier,
            tool_router: Self::tool_router(),
        }
    }

    pub async fn serve_stdio(self) -> Result<(), rmcp::RmcpError> {
        let service = self.serve((tokio::io::stdin(), tokio::io::stdout())).await?;
        service.waiting().await?;
        Ok(())
    }

    #[tool(name = "diagram_read")]
    async fn diagram_read(
        &self,
        params: Parameters<DiagramReadParams>,
    ) -> Result<Json<DiagramReadResponse>, ErrorData> {
        let DiagramReadParams { path } = params.0;
        let format = DiagramFormat::from_path(path.as_ref())
            .map_err(|err| ErrorData::invalid_params(err.to_string(), None))?;
        let diagram = read_from(&self.root, &path).map_err(convert_error)?;

        Ok(Json(DiagramReadResponse {
            path,
            format: format.label().to_owned(),
            nodes: diagram
                .nodes()
                .iter()
                .map(|node| McpNode {
                    id: node.id().to_owned(),
                    label: node.label().to_owned(),
                    shape: node.shape().to_owned(),
                    x: node.x(),
                    y: node.y(),
                    width: node.width(),
                    height: node.height(),
                    style: node.style().clone(),
                })
                .collect(),
            edges: diagram
                .edges()
                .iter()
                .map(|edge| McpEdge {
                    source: edge.source().to_owned(),
                    target: edge.target().to_owned(),
                    label: edge.label().map(str::to_owned),
                })
                .collect(),
            text: diagram
                .texts()
                .iter()
                .map(|text| McpText {
                    text: text.text().to_owned(),
                    x: text.x(),
                    y: text.y(),
                })
                .collect(),
            metadata: serde_json::json!(diagram.metadata()),
        }))
    }

    #[tool(name = "diagram_write")]
    async fn diagram_write(
        &self,
        params: Parameters<DiagramWriteParams>,
    ) -> Result<Json<DiagramWriteResponse>, ErrorData> {
        let DiagramWriteParams { path, nodes_json, edges_json } = params.0;
        let nodes: Vec<NodeSpec> = serde_json::from_str(&nodes_json).map_err(|err| {
            ErrorData::invalid_params(format!("nodes_json is not a node array: {err}"), None)
        })?;
        let edges: Vec<EdgeSpec> = match edges_json.as_deref().filter(|json| !json.trim().is_empty()) {
            Some(json) => serde_json::from_str(json).map_err(|err| {
                ErrorData::invalid_params(
                    format!("edges_json is not an edge array: {err}"),
                    None,
                )
            })?,
            None => Vec::new(),
        };
        if nodes.is_empty() {
            return Err(ErrorData::invalid_params("nodes_json must not be empty", None));
        }

        let diagram = diagram_from_specs(nodes, edges);
        diagram
            .validate_edges()
            .map_err(|err| ErrorData::invalid_params(err.to_string(), None))?;

        let (format, _) = write_to(&self.root, &path, &diagram).map_err(convert_error)?;
        Ok(Json(DiagramWriteResponse {
            path,
            format: format.label().to_owned(),
            nodes: diagram.nodes().len() as u64,
            edges: diagram.edges().len() as u64,
        }))
    }

    #[tool(name = "diagram_convert")]
    async fn diagram_convert(
        &self,
        params: Parameters<DiagramConvertParams>,
    ) -> Result<Json<DiagramConvertResponse>, ErrorData> {
        let DiagramConvertParams { source_path, target_path } = params.0;
        let report =
            convert(&self.root, &source_path, &target_path).map_err(convert_error)?;

        Ok(Json(DiagramConvertResponse {
            source_path,
            target_path,
            source_format: report.source_format.label().to_owned(),
            target_format: report.target_format.label().to_owned(),
            nodes: report.nodes as u64,
            edges: report.edges as u64,
            texts: report.texts as u64,
            dropped_edges: report.dropped_edges,
        }))
    }

    #[tool(name = "diagram_render")]
    async fn diagram_render(
        &self,
        params: Parameters<DiagramRenderParams>,
    ) -> Result<Json<DiagramRenderResponse>, ErrorData> {
        let DiagramRenderParams { path, output_path, width, height } = params.0;
        DiagramFormat::from_path(path.as_ref())
            .map_err(|err| ErrorData::invalid_params(err.to_string(), None))?;

        let extension = std::path::Path::new(&output_path)
            .extension()
            .map(|extension| extension.to_string_lossy().to_ascii_lowercase());
        if !matches!(extension.as_deref(), Some("png" | "svg")) {
            return Err(ErrorData::invalid_params(
                format!("output_path must end in .png or .svg, got: {output_path}"),
                None,
            ));
        }

        let input = self
            .root
            .resolve(&path)
            .map_err(|err| ErrorData::invalid_params(err.to_string(), None))?;
        if !input.exists() {
            return Err(ErrorData::resource_not_found(
                format!("file not found: {path}"),
                None,
            ));
        }
        let output = self
            .root
            .resolve(&output_path)
            .map_err(|err| ErrorData::invalid_params(err.to_string(), None))?;

        let width = width.unwrap_or(DEFAULT_RENDER_WIDTH);
        let height = height.unwrap_or(DEFAULT_RENDER_HEIGHT);
        self.renderer
            .render(&input, &output, width, height)
            .map_err(external_error)?;

        Ok(Json(DiagramRenderResponse { path, output_path, width, height }))
    }

    #[tool(name = "diagram_from_mermaid")]
    async fn diagram_from_mermaid(
        &self,
        params: Parameters<DiagramFromMermaidParams>,
    ) -> Result<Json<DiagramFromMermaidResponse>, ErrorData> {
        let DiagramFromMermaidParams { mermaid, path } = params.0;
        if mermaid.trim().is_empty() {
            return Err(ErrorData::invalid_params("mermaid must not be empty", None));
        }
        if DiagramFormat::from_path(path.as_ref()) != Ok(DiagramFormat::Excalidraw) {
            return Err(ErrorData::invalid_params(
                format!("path must end with .excalidraw, got: {path}"),
                None,
            ));
        }

        let scene = self.mermaid.translate(&mermaid).map_err(external_error)?;
        let elements = serde_json::from_str::<serde_json::Value>(&scene)
            .ok()
            .and_then(|doc| {
                doc.get("elements").and_then(|elements| elements.as_array().map(Vec::len))
            })
            .unwrap_or(0) as u64;

        self.root
            .write_atomic(&path, &scene)
            .map_err(|err| convert_error(err.into()))?;
        Ok(Json(DiagramFromMermaidResponse { path, elements }))
    }

    #[tool(name = "excalidraw_verify")]
    async fn excalidraw_verify(
        &self,
        params: Parameters<ExcalidrawVerifyParams>,
    ) -> Result<Json<ExcalidrawVerifyResponse>, ErrorData> {
        let ExcalidrawVerifyParams { path } = params.0;
        if DiagramFormat::from_path(path.as_ref()) != Ok(DiagramFormat::Excalidraw) {
            return Err(ErrorData::invalid_params(
                format!("path must end with .excalidraw, got: {path}"),
                None,
            ));
        }
        let scene = self
            .root
            .resolve(&path)
            .map_err(|err| ErrorData::invalid_params(err.to_string(), None))?;
        if !scene.exists() {
            return Err(ErrorData::resource_not_found(
                format!("file not found: {path}"),
                None,
            ));
        }

        match self.verifier.verify(&scene) {
            Ok(png) => Ok(Json(ExcalidrawVerifyResponse {
                valid: true,
                message: "Excalidraw opened and exported the scene".to_owned(),
                image_base64: Some(base64::engine::general_purpose::STANDARD.encode(png)),
            })),
            // The tool ran but Excalidraw rejected the file; that is the
            // verdict, not a server fault.
            Err(err @ ExternalToolError::Failed { .. }) => Ok(Json(ExcalidrawVerifyResponse {
                valid: false,
                message: err.to_string(),
                image_base64: None,
            })),
            Err(err) => Err(external_error(err)),
        }
    }
}

fn diagram_from_specs(nodes: Vec<NodeSpec>, edges: Vec<EdgeSpec>) -> Diagram {
    let mut diagram = Diagram::new();
    for (index, spec) in nodes.into_iter().enumerate() {
        let id = spec.id.unwrap_or_else(|| format!("n{}", index + 1));
        let label = spec.label.unwrap_or_default();
        let mut node = Node::new(
            id,
            label,
            spec.x.unwrap_or(index as f64 * 150.0),
            spec.y.unwrap_or(100.0),
        );
        if let Some(shape) = spec.shape {
            node.set_shape(shape);
        }
        node.set_size(spec.width, spec.height);
        diagram.nodes_mut().push(node);
    }
    for spec in edges {
        let mut edge = Edge::new(spec.source, spec.target);
        edge.set_label(spec.label);
        diagram.edges_mut().push(edge);
    }
    diagram
}

fn convert_error(err: ConvertError) -> ErrorData {
    match &err {
        ConvertError::Security(_)
        | ConvertError::UnsupportedFormat(_)
        | ConvertError::Parse { .. }
        | ConvertError::Integrity(_) => ErrorData::invalid_params(err.to_string(), None),
        ConvertError::Io { source, .. } if source.kind() == std::io::ErrorKind::NotFound => {
            ErrorData::resource_not_found(err.to_string(), None)
        }
        ConvertError::Io { .. } => ErrorData::internal_error(err.to_string(), None),
    }
}

fn external_error(err: ExternalToolError) -> ErrorData {
    ErrorData::internal_error(err.to_string(), None)
}

#[tool_handler]
impl ServerHandler for ProteusMcp {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "Proteus diagram interchange server. Reads, writes, and converts draw.io \
                 (.drawio/.xml), Excalidraw (.excalidraw), and SVG files inside one project \
                 root (tools: diagram_read, diagram_write, diagram_convert, diagram_render, \
                 diagram_from_mermaid, excalidraw_verify)"
                    .into(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests;
