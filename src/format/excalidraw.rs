// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Proteus-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Proteus and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! Excalidraw sketch-JSON reader and writer.
//!
//! The reader is deliberately lenient: a hand-drawn scene mixes shapes that
//! map onto the model with free strokes that do not, so unknown element types
//! and arrows without both endpoint bindings are skipped rather than
//! rejected. Text elements with a `containerId` are labels and attach to
//! their container (shape or arrow); the rest become standalone text.
//!
//! The writer emits the full element field set the Excalidraw application
//! expects, with all randomness (ids, seeds, version nonces, timestamps)
//! routed through an injectable [`IdSource`] so output is reproducible.

use std::collections::BTreeMap;

use serde_json::{json, Value};

use crate::model::{Diagram, Edge, Node, TextElement};

use super::{ParseError, DEFAULT_NODE_HEIGHT, DEFAULT_NODE_WIDTH};

const APP_STATE_KEY: &str = "excalidraw.app_state";
const VERSION_KEY: &str = "excalidraw.version";
pub(crate) const ARROW_ID_KEY: &str = "excalidraw.id";
const STROKE_COLOR_KEY: &str = "excalidraw.strokeColor";
const BACKGROUND_COLOR_KEY: &str = "excalidraw.backgroundColor";

// Fixed `updated` timestamp; wall-clock values would make output
// unreproducible.
const UPDATED: u64 = 1_700_000_000_000;

/// Source of element ids and seed values for the writer.
///
/// Production code uses [`SequentialIds`]; tests may substitute their own to
/// pin exact output.
pub trait IdSource {
    fn next_id(&mut self, hint: &str) -> String;
    fn next_seed(&mut self) -> u64;
}

/// Counter-backed [`IdSource`]. Ids count per hint and seeds advance
/// independently, so skipping an allocation for one element kind never
/// shifts the ids or seeds of another.
#[derive(Debug, Default)]
pub struct SequentialIds {
    ids: BTreeMap<String, u64>,
    seeds: u64,
}

impl SequentialIds {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdSource for SequentialIds {
    fn next_id(&mut self, hint: &str) -> String {
        let counter = self.ids.entry(hint.to_owned()).or_insert(0);
        *counter += 1;
        format!("{hint}-{counter}")
    }

    fn next_seed(&mut self) -> u64 {
        self.seeds += 1;
        (self.seeds * 2_654_435_761) % 999_999_937 + 1
    }
}

pub fn read(text: &str) -> Result<Diagram, ParseError> {
    let doc: Value = serde_json::from_str(text)?;
    let Some(doc) = doc.as_object() else {
        return Err(ParseError::InvalidJson { detail: "top level is not an object".to_owned() });
    };

    let mut diagram = Diagram::new();
    if let Some(app_state) = doc.get("appState") {
        diagram.metadata_mut().insert(APP_STATE_KEY.to_owned(), app_state.clone());
    }
    if let Some(version) = doc.get("version") {
        diagram.metadata_mut().insert(VERSION_KEY.to_owned(), version.clone());
    }

    let empty = Vec::new();
    let elements = doc.get("elements").and_then(Value::as_array).unwrap_or(&empty);

    // element id -> index, separately for shapes and connectors, so bound
    // labels can find their container in a second pass.
    let mut node_index: BTreeMap<String, usize> = BTreeMap::new();
    let mut edge_index: BTreeMap<String, usize> = BTreeMap::new();
    let mut pending_labels: Vec<(String, String, f64, f64)> = Vec::new();

    for element in elements {
        if element.get("isDeleted").and_then(Value::as_bool) == Some(true) {
            continue;
        }
        let kind = element.get("type").and_then(Value::as_str).unwrap_or("");
        match kind {
            "rectangle" | "ellipse" | "diamond" => {
                let id = element.get("id").and_then(Value::as_str).unwrap_or("").to_owned();
                if id.is_empty() {
                    continue;
                }
                let mut node = Node::new(&id, "", num(element, "x"), num(element, "y"));
                node.set_shape(kind);
                node.set_size(opt_num(element, "width"), opt_num(element, "height"));
                for (field, style_key) in [
                    ("strokeColor", STROKE_COLOR_KEY),
                    ("backgroundColor", BACKGROUND_COLOR_KEY),
                ] {
                    if let Some(color) = element.get(field).and_then(Value::as_str) {
                        node.style_mut().insert(style_key.to_owned(), color.to_owned());
                    }
                }
                node_index.insert(id, diagram.nodes().len());
                diagram.nodes_mut().push(node);
            }
            "arrow" | "line" => {
                let source = binding_target(element, "startBinding");
                let target = binding_target(element, "endBinding");
                // An arrow bound on only one side (or neither) is a free
                // sketch stroke, not a graph edge.
                let (Some(source), Some(target)) = (source, target) else {
                    continue;
                };
                let mut edge = Edge::new(source, target);
                if let Some(id) = element.get("id").and_then(Value::as_str) {
                    if !id.is_empty() {
                        edge.style_mut().insert(ARROW_ID_KEY.to_owned(), id.to_owned());
                        edge_index.insert(id.to_owned(), diagram.edges().len());
                    }
                }
                diagram.edges_mut().push(edge);
            }
            "text" => {
                let text = element.get("text").and_then(Value::as_str).unwrap_or("");
                if text.is_empty() {
                    continue;
                }
                let (x, y) = (num(element, "x"), num(element, "y"));
                match element.get("containerId").and_then(Value::as_str) {
                    Some(container) => {
                        pending_labels.push((container.to_owned(), text.to_owned(), x, y));
                    }
                    None => diagram.texts_mut().push(TextElement::new(text, x, y)),
                }
            }
            _ => {}
        }
    }

    for (container, text, x, y) in pending_labels {
        if let Some(&index) = node_index.get(&container) {
            diagram.nodes_mut()[index].set_label(text);
        } else if let Some(&index) = edge_index.get(&container) {
            diagram.edges_mut()[index].set_label(Some(text));
        } else {
            // Orphaned label, keep the content as free text.
            diagram.texts_mut().push(TextElement::new(text, x, y));
        }
    }

    Ok(diagram)
}

fn num(element: &Value, field: &str) -> f64 {
    element.get(field).and_then(Value::as_f64).unwrap_or(0.0)
}

fn opt_num(element: &Value, field: &str) -> Option<f64> {
    element.get(field).and_then(Value::as_f64)
}

fn binding_target<'a>(element: &'a Value, field: &str) -> Option<&'a str> {
    element.get(field)?.get("elementId")?.as_str()
}

pub fn write(diagram: &Diagram) -> String {
    write_with(diagram, &mut SequentialIds::new())
}

pub fn write_with(diagram: &Diagram, ids: &mut dyn IdSource) -> String {
    let mut elements = Vec::new();

    // Arrow ids are settled up front so shape boundElements can reference
    // them before the arrows themselves are emitted.
    let arrow_ids: Vec<String> = diagram
        .edges()
        .iter()
        .map(|edge| {
            edge.style()
                .get(ARROW_ID_KEY)
                .cloned()
                .unwrap_or_else(|| ids.next_id("arrow"))
        })
        .collect();

    for node in diagram.nodes() {
        elements.push(shape_element(diagram, node, &arrow_ids, ids));
        if !node.label().is_empty() {
            elements.push(bound_label_element(node, ids));
        }
    }

    for (edge, arrow_id) in diagram.edges().iter().zip(&arrow_ids) {
        let label_id = edge.label().map(|_| format!("{arrow_id}_text"));
        let (start, end, start_focus, end_focus) = arrow_anchors(diagram, edge);
        let (dx, dy) = (end.0 - start.0, end.1 - start.1);

        elements.push(json!({
            "id": arrow_id,
            "type": "arrow",
            "x": start.0,
            "y": start.1,
            "width": dx.abs(),
            "height": dy.abs(),
            "strokeColor": "#1e1e1e",
            "backgroundColor": "transparent",
            "fillStyle": "solid",
            "strokeWidth": 2,
            "roughness": 1,
            "opacity": 100,
            "angle": 0,
            "seed": ids.next_seed(),
            "version": 1,
            "versionNonce": ids.next_seed(),
            "isDeleted": false,
            "strokeStyle": "solid",
            "groupIds": [],
            "frameId": null,
            "roundness": null,
            "boundElements": label_id
                .as_ref()
                .map(|id| json!([{"id": id, "type": "text"}]))
                .unwrap_or_else(|| json!([])),
            "updated": UPDATED,
            "link": null,
            "locked": false,
            "points": [[0.0, 0.0], [dx, dy]],
            "startBinding": {"elementId": edge.source(), "focus": start_focus, "gap": 8},
            "endBinding": {"elementId": edge.target(), "focus": end_focus, "gap": 8},
            "startArrowhead": null,
            "endArrowhead": "arrow",
            "elbowed": false,
        }));

        if let (Some(label), Some(label_id)) = (edge.label(), label_id) {
            elements.push(json!({
                "id": label_id,
                "type": "text",
                "x": start.0 + dx / 2.0,
                "y": start.1 + dy / 2.0 - 15.0,
                "width": label.chars().count() as f64 * 8.0,
                "height": 20,
                "text": label,
                "fontSize": 14,
                "fontFamily": 1,
                "textAlign": "center",
                "verticalAlign": "middle",
                "strokeColor": "#1e1e1e",
                "backgroundColor": "transparent",
                "fillStyle": "solid",
                "strokeWidth": 1,
                "roughness": 1,
                "opacity": 100,
                "angle": 0,
                "seed": ids.next_seed(),
                "version": 1,
                "versionNonce": ids.next_seed(),
                "isDeleted": false,
                "groupIds": [],
                "frameId": null,
                "boundElements": [],
                "updated": UPDATED,
                "link": null,
                "locked": false,
                "containerId": arrow_id,
                "originalText": label,
                "autoResize": true,
                "lineHeight": 1.25,
            }));
        }
    }

    for text in diagram.texts() {
        elements.push(json!({
            "id": ids.next_id("text"),
            "type": "text",
            "x": text.x(),
            "y": text.y(),
            "width": text.text().chars().count() as f64 * 10.0,
            "height": 25,
            "text": text.text(),
            "fontSize": 20,
            "fontFamily": 1,
            "textAlign": "left",
            "verticalAlign": "top",
            "strokeColor": "#1e1e1e",
            "backgroundColor": "transparent",
            "fillStyle": "solid",
            "strokeWidth": 1,
            "roughness": 1,
            "opacity": 100,
            "angle": 0,
            "seed": ids.next_seed(),
            "version": 1,
            "versionNonce": ids.next_seed(),
            "isDeleted": false,
            "groupIds": [],
            "frameId": null,
            "boundElements": [],
            "updated": UPDATED,
            "link": null,
            "locked": false,
            "containerId": null,
            "originalText": text.text(),
            "autoResize": true,
            "lineHeight": 1.25,
        }));
    }

    let app_state = diagram
        .metadata()
        .get(APP_STATE_KEY)
        .cloned()
        .unwrap_or_else(|| json!({"gridSize": null, "viewBackgroundColor": "#ffffff"}));
    let version = diagram.metadata().get(VERSION_KEY).cloned().unwrap_or_else(|| json!(2));

    let doc = json!({
        "type": "excalidraw",
        "version": version,
        "source": "proteus",
        "elements": elements,
        "appState": app_state,
        "files": {},
    });
    // Value-to-string serialization has no failure mode.
    serde_json::to_string_pretty(&doc).expect("serializing a Value is infallible")
}

fn shape_element(
    diagram: &Diagram,
    node: &Node,
    arrow_ids: &[String],
    ids: &mut dyn IdSource,
) -> Value {
    let mut bound = Vec::new();
    if !node.label().is_empty() {
        bound.push(json!({"type": "text", "id": format!("{}_text", node.id())}));
    }
    for (edge, arrow_id) in diagram.edges().iter().zip(arrow_ids) {
        if edge.source() == node.id() || edge.target() == node.id() {
            bound.push(json!({"type": "arrow", "id": arrow_id}));
        }
    }

    let stroke = node
        .style()
        .get(STROKE_COLOR_KEY)
        .map(String::as_str)
        .unwrap_or("#1e1e1e");
    let background = node
        .style()
        .get(BACKGROUND_COLOR_KEY)
        .map(String::as_str)
        .unwrap_or("transparent");

    json!({
        "id": node.id(),
        "type": node.shape(),
        "x": node.x(),
        "y": node.y(),
        "width": node.width().unwrap_or(DEFAULT_NODE_WIDTH),
        "height": node.height().unwrap_or(DEFAULT_NODE_HEIGHT),
        "strokeColor": stroke,
        "backgroundColor": background,
        "fillStyle": "solid",
        "strokeWidth": 2,
        "roughness": 1,
        "opacity": 100,
        "angle": 0,
        "seed": ids.next_seed(),
        "version": 1,
        "versionNonce": ids.next_seed(),
        "isDeleted": false,
        "strokeStyle": "solid",
        "groupIds": [],
        "frameId": null,
        "roundness": if node.shape() == "rectangle" { json!({"type": 3}) } else { Value::Null },
        "boundElements": bound,
        "updated": UPDATED,
        "link": null,
        "locked": false,
    })
}

fn bound_label_element(node: &Node, ids: &mut dyn IdSource) -> Value {
    let label = node.label();
    let font_size = if label.chars().count() > 30 { 12 } else { 16 };
    json!({
        "id": format!("{}_text", node.id()),
        "type": "text",
        "x": node.x(),
        "y": node.y(),
        "width": node.width().unwrap_or(DEFAULT_NODE_WIDTH),
        "height": node.height().unwrap_or(DEFAULT_NODE_HEIGHT),
        "text": label,
        "fontSize": font_size,
        "fontFamily": 1,
        "textAlign": "center",
        "verticalAlign": "middle",
        "strokeColor": "#1e1e1e",
        "backgroundColor": "transparent",
        "fillStyle": "solid",
        "strokeWidth": 1,
        "roughness": 1,
        "opacity": 100,
        "angle": 0,
        "seed": ids.next_seed(),
        "version": 1,
        "versionNonce": ids.next_seed(),
        "isDeleted": false,
        "groupIds": [],
        "frameId": null,
        "boundElements": [],
        "updated": UPDATED,
        "link": null,
        "locked": false,
        "containerId": node.id(),
        "originalText": label,
        "autoResize": true,
        "lineHeight": 1.25,
    })
}

/// Picks the boundary points an arrow leaves and enters through, by dominant
/// axis between the two node centers, plus the matching binding focus
/// offsets.
fn arrow_anchors(diagram: &Diagram, edge: &Edge) -> ((f64, f64), (f64, f64), f64, f64) {
    let (Some(src), Some(tgt)) = (diagram.node(edge.source()), diagram.node(edge.target()))
    else {
        // write_diagram validates integrity first; unreachable in practice.
        return ((0.0, 0.0), (100.0, 0.0), 0.0, 0.0);
    };

    let (sw, sh) = (
        src.width().unwrap_or(DEFAULT_NODE_WIDTH),
        src.height().unwrap_or(DEFAULT_NODE_HEIGHT),
    );
    let (tw, th) = (
        tgt.width().unwrap_or(DEFAULT_NODE_WIDTH),
        tgt.height().unwrap_or(DEFAULT_NODE_HEIGHT),
    );
    let (scx, scy) = (src.x() + sw / 2.0, src.y() + sh / 2.0);
    let (tcx, tcy) = (tgt.x() + tw / 2.0, tgt.y() + th / 2.0);
    let (dx, dy) = (tcx - scx, tcy - scy);

    if dx.abs() > dy.abs() {
        let start = (if dx > 0.0 { src.x() + sw } else { src.x() }, scy);
        let end = (if dx > 0.0 { tgt.x() } else { tgt.x() + tw }, tcy);
        let focus = if dx > 0.0 { 0.5 } else { -0.5 };
        (start, end, focus, -focus)
    } else {
        let start = (scx, if dy > 0.0 { src.y() + sh } else { src.y() });
        let end = (tcx, if dy > 0.0 { tgt.y() } else { tgt.y() + th });
        let focus = if dy > 0.0 { 0.5 } else { -0.5 };
        (start, end, focus, -focus)
    }
}
