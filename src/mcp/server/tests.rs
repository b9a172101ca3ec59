// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Proteus-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Proteus and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use rmcp::handler::server::wrapper::Parameters;
use rstest::rstest;

use crate::external::{ExternalToolError, MermaidTranslator, Renderer, Verifier};
use crate::store::ProjectRoot;

use super::*;

static COUNTER: AtomicUsize = AtomicUsize::new(0);

struct TempDir {
    path: PathBuf,
}

impl TempDir {
    fn new() -> Self {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.subsec_nanos())
            .unwrap_or(0);
        let path = std::env::temp_dir().join(format!(
            "proteus-mcp-test-{}-{}-{}",
            std::process::id(),
            nanos,
            COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        fs::create_dir_all(&path).unwrap();
        Self { path }
    }
}

impl Drop for TempDir {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.path);
    }
}

struct StubRenderer;

impl Renderer for StubRenderer {
    fn render(
        &self,
        _input: &Path,
        output: &Path,
        _width: u32,
        _height: u32,
    ) -> Result<(), ExternalToolError> {
        fs::write(output, b"\x89PNG")
            .map_err(|source| ExternalToolError::Io { tool: "stub", source })
    }
}

struct StubMermaid;

impl MermaidTranslator for StubMermaid {
    fn translate(&self, _mermaid: &str) -> Result<String, ExternalToolError> {
        Ok(serde_json::json!({
            "type": "excalidraw",
            "version": 2,
            "source": "stub",
            "elements": [
                {"id": "m1", "type": "rectangle", "x": 0.0, "y": 0.0, "width": 120.0, "height": 60.0}
            ],
            "appState": {},
            "files": {},
        })
        .to_string())
    }
}

struct StubVerifier {
    accept: bool,
}

impl Verifier for StubVerifier {
    fn verify(&self, _scene: &Path) -> Result<Vec<u8>, ExternalToolError> {
        if self.accept {
            Ok(b"\x89PNG".to_vec())
        } else {
            Err(ExternalToolError::Failed {
                tool: "excalidraw-brute-export-cli",
                status: Some(1),
                stdout: String::new(),
                stderr: "invalid file".to_owned(),
            })
        }
    }
}

fn server_in(dir: &TempDir) -> ProteusMcp {
    server_with_verifier(dir, true)
}

fn server_with_verifier(dir: &TempDir, accept: bool) -> ProteusMcp {
    ProteusMcp::with_delegates(
        ProjectRoot::new(&dir.path).unwrap(),
        Arc::new(StubRenderer),
        Arc::new(StubMermaid),
        Arc::new(StubVerifier { accept }),
    )
}

fn two_node_write_params(path: &str) -> DiagramWriteParams {
    DiagramWriteParams {
        path: path.to_owned(),
        nodes_json: serde_json::json!([
            {"id": "start", "label": "Start", "x": 100, "y": 100, "width": 120, "height": 60},
            {"id": "end", "label": "End", "type": "ellipse", "x": 400, "y": 100, "width": 120, "height": 60}
        ])
        .to_string(),
        edges_json: Some(
            serde_json::json!([
                {"source": "start", "target": "end", "label": "next"}
            ])
            .to_string(),
        ),
    }
}

#[tokio::test]
async fn written_excalidraw_scene_reads_back_with_the_same_graph() {
    let dir = TempDir::new();
    let server = server_in(&dir);

    let written = server
        .diagram_write(Parameters(two_node_write_params("flow.excalidraw")))
        .await
        .unwrap();
    assert_eq!(written.0.format, "excalidraw");
    assert_eq!(written.0.nodes, 2);
    assert_eq!(written.0.edges, 1);

    let read = server
        .diagram_read(Parameters(DiagramReadParams { path: "flow.excalidraw".to_owned() }))
        .await
        .unwrap();
    assert_eq!(read.0.nodes.len(), 2);
    assert_eq!(read.0.nodes[0].id, "start");
    assert_eq!(read.0.nodes[0].label, "Start");
    assert_eq!(read.0.nodes[1].shape, "ellipse");
    assert_eq!(read.0.edges.len(), 1);
    assert_eq!(read.0.edges[0].source, "start");
    assert_eq!(read.0.edges[0].target, "end");
    assert_eq!(read.0.edges[0].label.as_deref(), Some("next"));
}

#[tokio::test]
async fn drawio_converts_to_svg_with_shapes_and_arrow() {
    let dir = TempDir::new();
    let server = server_in(&dir);

    server
        .diagram_write(Parameters(two_node_write_params("flow.drawio")))
        .await
        .unwrap();

    let converted = server
        .diagram_convert(Parameters(DiagramConvertParams {
            source_path: "flow.drawio".to_owned(),
            target_path: "flow.svg".to_owned(),
        }))
        .await
        .unwrap();
    assert_eq!(converted.0.source_format, "drawio");
    assert_eq!(converted.0.target_format, "svg");
    assert_eq!(converted.0.nodes, 2);
    assert_eq!(converted.0.dropped_edges, 0);

    let svg = fs::read_to_string(dir.path.join("flow.svg")).unwrap();
    assert!(svg.contains("<rect id=\"start\""));
    assert!(svg.contains("marker-end"));
}

#[tokio::test]
async fn single_node_page_converts_to_svg_without_arrows() {
    let dir = TempDir::new();
    let server = server_in(&dir);

    server
        .diagram_write(Parameters(DiagramWriteParams {
            path: "solo.drawio".to_owned(),
            nodes_json: serde_json::json!([
                {"id": "only", "label": "Only", "x": 100, "y": 100}
            ])
            .to_string(),
            edges_json: None,
        }))
        .await
        .unwrap();
    server
        .diagram_convert(Parameters(DiagramConvertParams {
            source_path: "solo.drawio".to_owned(),
            target_path: "solo.svg".to_owned(),
        }))
        .await
        .unwrap();

    let svg = fs::read_to_string(dir.path.join("solo.svg")).unwrap();
    assert_eq!(svg.matches("<rect id=").count(), 1);
    assert!(!svg.contains("<line"));
}

#[tokio::test]
async fn converting_a_diagram_to_its_own_format_is_idempotent() {
    let dir = TempDir::new();
    let server = server_in(&dir);
    server
        .diagram_write(Parameters(two_node_write_params("flow.excalidraw")))
        .await
        .unwrap();

    for (source, target) in [("flow.excalidraw", "copy.excalidraw"), ("copy.excalidraw", "copy2.excalidraw")] {
        server
            .diagram_convert(Parameters(DiagramConvertParams {
                source_path: source.to_owned(),
                target_path: target.to_owned(),
            }))
            .await
            .unwrap();
    }

    let first = fs::read(dir.path.join("copy.excalidraw")).unwrap();
    let second = fs::read(dir.path.join("copy2.excalidraw")).unwrap();
    assert_eq!(first, second);
}

#[rstest]
#[case("notes.txt")]
#[case("noext")]
#[tokio::test]
async fn unsupported_write_targets_leave_no_file_behind(#[case] path: &str) {
    let dir = TempDir::new();
    let server = server_in(&dir);

    let err = server
        .diagram_write(Parameters(two_node_write_params(path)))
        .await
        .err().unwrap();
    assert_eq!(err.code, rmcp::model::ErrorCode::INVALID_PARAMS);
    assert!(!dir.path.join(path).exists());
}

#[tokio::test]
async fn traversal_paths_are_rejected() {
    let dir = TempDir::new();
    let server = server_in(&dir);

    let err = server
        .diagram_write(Parameters(two_node_write_params("../escape.svg")))
        .await
        .err().unwrap();
    assert!(err.message.contains("project root"), "{}", err.message);
    assert!(!dir.path.parent().unwrap().join("escape.svg").exists());
}

#[tokio::test]
async fn edges_must_reference_declared_nodes() {
    let dir = TempDir::new();
    let server = server_in(&dir);

    let mut params = two_node_write_params("flow.drawio");
    params.edges_json = Some(
        serde_json::json!([
            {"source": "start", "target": "end"},
            {"source": "start", "target": "ghost"}
        ])
        .to_string(),
    );

    let err = server.diagram_write(Parameters(params)).await.err().unwrap();
    assert!(err.message.contains("ghost"), "{}", err.message);
    assert!(!dir.path.join("flow.drawio").exists());
}

#[tokio::test]
async fn malformed_node_json_is_invalid_params() {
    let dir = TempDir::new();
    let server = server_in(&dir);

    let err = server
        .diagram_write(Parameters(DiagramWriteParams {
            path: "flow.drawio".to_owned(),
            nodes_json: "{not json".to_owned(),
            edges_json: None,
        }))
        .await
        .err().unwrap();
    assert!(err.message.contains("nodes_json"), "{}", err.message);
}

#[tokio::test]
async fn reading_a_missing_file_is_not_found() {
    let dir = TempDir::new();
    let server = server_in(&dir);

    let err = server
        .diagram_read(Parameters(DiagramReadParams { path: "absent.svg".to_owned() }))
        .await
        .err().unwrap();
    assert_eq!(err.code, rmcp::model::ErrorCode::RESOURCE_NOT_FOUND);
}

#[tokio::test]
async fn dangling_edges_in_sources_are_dropped_and_reported() {
    let dir = TempDir::new();
    let server = server_in(&dir);
    fs::write(
        dir.path.join("broken.drawio"),
        r#"<mxGraphModel><root>
            <mxCell id="n1" value="A" vertex="1">
              <mxGeometry x="0" y="0" width="80" height="40" as="geometry"/>
            </mxCell>
            <mxCell id="e1" edge="1" source="n1" target="missing"/>
        </root></mxGraphModel>"#,
    )
    .unwrap();

    let converted = server
        .diagram_convert(Parameters(DiagramConvertParams {
            source_path: "broken.drawio".to_owned(),
            target_path: "fixed.svg".to_owned(),
        }))
        .await
        .unwrap();
    assert_eq!(converted.0.edges, 0);
    assert_eq!(converted.0.dropped_edges, 1);
}

#[tokio::test]
async fn render_delegates_and_reports_dimensions() {
    let dir = TempDir::new();
    let server = server_in(&dir);
    server
        .diagram_write(Parameters(two_node_write_params("flow.drawio")))
        .await
        .unwrap();

    let rendered = server
        .diagram_render(Parameters(DiagramRenderParams {
            path: "flow.drawio".to_owned(),
            output_path: "flow.png".to_owned(),
            width: None,
            height: None,
        }))
        .await
        .unwrap();
    assert_eq!(rendered.0.width, 1200);
    assert_eq!(rendered.0.height, 800);
    assert!(dir.path.join("flow.png").exists());
}

#[tokio::test]
async fn render_rejects_non_image_outputs() {
    let dir = TempDir::new();
    let server = server_in(&dir);
    server
        .diagram_write(Parameters(two_node_write_params("flow.drawio")))
        .await
        .unwrap();

    let err = server
        .diagram_render(Parameters(DiagramRenderParams {
            path: "flow.drawio".to_owned(),
            output_path: "flow.pdf".to_owned(),
            width: None,
            height: None,
        }))
        .await
        .err().unwrap();
    assert!(err.message.contains(".png or .svg"), "{}", err.message);
}

#[tokio::test]
async fn mermaid_translation_writes_a_scene_file() {
    let dir = TempDir::new();
    let server = server_in(&dir);

    let response = server
        .diagram_from_mermaid(Parameters(DiagramFromMermaidParams {
            mermaid: "flowchart TD\n  A --> B".to_owned(),
            path: "from-mermaid.excalidraw".to_owned(),
        }))
        .await
        .unwrap();
    assert_eq!(response.0.elements, 1);

    let scene: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(dir.path.join("from-mermaid.excalidraw")).unwrap())
            .unwrap();
    assert_eq!(scene["type"], "excalidraw");
}

#[tokio::test]
async fn mermaid_requires_an_excalidraw_target() {
    let dir = TempDir::new();
    let server = server_in(&dir);

    let err = server
        .diagram_from_mermaid(Parameters(DiagramFromMermaidParams {
            mermaid: "flowchart TD\n  A --> B".to_owned(),
            path: "out.drawio".to_owned(),
        }))
        .await
        .err().unwrap();
    assert!(err.message.contains(".excalidraw"), "{}", err.message);
}

#[tokio::test]
async fn verify_reports_success_with_the_exported_image() {
    let dir = TempDir::new();
    let server = server_in(&dir);
    server
        .diagram_write(Parameters(two_node_write_params("flow.excalidraw")))
        .await
        .unwrap();

    let verdict = server
        .excalidraw_verify(Parameters(ExcalidrawVerifyParams {
            path: "flow.excalidraw".to_owned(),
        }))
        .await
        .unwrap();
    assert!(verdict.0.valid);
    assert!(verdict.0.image_base64.is_some());
}

#[tokio::test]
async fn verify_failure_is_a_verdict_not_an_error() {
    let dir = TempDir::new();
    let server = server_with_verifier(&dir, false);
    server
        .diagram_write(Parameters(two_node_write_params("flow.excalidraw")))
        .await
        .unwrap();

    let verdict = server
        .excalidraw_verify(Parameters(ExcalidrawVerifyParams {
            path: "flow.excalidraw".to_owned(),
        }))
        .await
        .unwrap();
    assert!(!verdict.0.valid);
    assert!(verdict.0.message.contains("invalid file"), "{}", verdict.0.message);
    assert!(verdict.0.image_base64.is_none());
}

#[tokio::test]
async fn full_conversion_chain_preserves_the_graph() {
    let dir = TempDir::new();
    let server = server_in(&dir);
    server
        .diagram_write(Parameters(two_node_write_params("flow.drawio")))
        .await
        .unwrap();

    for (source, target) in [
        ("flow.drawio", "flow.excalidraw"),
        ("flow.excalidraw", "flow.svg"),
        ("flow.svg", "back.drawio"),
    ] {
        server
            .diagram_convert(Parameters(DiagramConvertParams {
                source_path: source.to_owned(),
                target_path: target.to_owned(),
            }))
            .await
            .unwrap();
    }

    let read = server
        .diagram_read(Parameters(DiagramReadParams { path: "back.drawio".to_owned() }))
        .await
        .unwrap();
    assert_eq!(read.0.nodes.len(), 2);
    assert_eq!(read.0.nodes[0].label, "Start");
    assert_eq!(read.0.edges.len(), 1);
    assert_eq!(read.0.edges[0].label.as_deref(), Some("next"));
}
