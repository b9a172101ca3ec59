// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Proteus-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Proteus and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! draw.io XML dialect reader and writer.
//!
//! Two historical container shapes are accepted: a bare `<mxGraphModel>` and
//! an `<mxfile>` wrapper holding one or more `<diagram>` pages (whose payload
//! may be percent-encoded, base64'd, raw-deflate-compressed XML). All pages
//! flatten into one diagram; page origins live under `drawio.pages` metadata
//! and the graph-model attributes under `drawio.model` so a later write can
//! reproduce the page geometry.
//!
//! Cells carry no type field. Classification is by attribute presence, which
//! is the format's own quirk: a cell with both endpoints set is an edge even
//! when it also carries geometry (those are visual waypoints, not a node).

use std::collections::BTreeMap;
use std::io::Read;

use base64::Engine;

use crate::model::{Diagram, Edge, Node, TextElement};

use super::{
    fmt_num, xml_escape, ParseError, DEFAULT_NODE_HEIGHT, DEFAULT_NODE_WIDTH,
};

pub(crate) const STYLE_KEY: &str = "drawio.style";
pub(crate) const EDGE_ID_KEY: &str = "drawio.id";
const PAGES_KEY: &str = "drawio.pages";
const MODEL_KEY: &str = "drawio.model";

const DEFAULT_NODE_STYLE: &str = "rounded=1;whiteSpace=wrap;html=1;";
const DEFAULT_ELLIPSE_STYLE: &str = "ellipse;whiteSpace=wrap;html=1;";
const DEFAULT_DIAMOND_STYLE: &str = "rhombus;whiteSpace=wrap;html=1;";
const DEFAULT_TEXT_STYLE: &str = "text;html=1;";
const DEFAULT_EDGE_STYLE: &str =
    "edgeStyle=orthogonalEdgeStyle;rounded=0;orthogonalLoop=1;jettySize=auto;html=1;";

/// How a single `mxCell` participates in the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellClass {
    Node,
    Edge,
    Text,
    Unrecognized,
}

/// Classifies an `mxCell` by attribute presence.
pub fn classify_cell(cell: roxmltree::Node<'_, '_>) -> CellClass {
    let id = cell.attribute("id").unwrap_or("");
    // Ids 0 and 1 are the implicit root/layer cells of every model.
    if id == "0" || id == "1" {
        return CellClass::Unrecognized;
    }

    if cell.attribute("source").is_some() && cell.attribute("target").is_some() {
        return CellClass::Edge;
    }

    let style = cell.attribute("style").unwrap_or("");
    let is_vertex = cell.attribute("vertex") == Some("1");
    if is_vertex && style.starts_with("text") {
        return CellClass::Text;
    }

    let has_value = cell.attribute("value").is_some_and(|value| !value.is_empty());
    let has_geometry = cell.children().any(|child| child.has_tag_name("mxGeometry"));
    if is_vertex || (has_value && has_geometry) {
        return CellClass::Node;
    }

    CellClass::Unrecognized
}

pub fn read(text: &str) -> Result<Diagram, ParseError> {
    let doc = roxmltree::Document::parse(text)?;
    let root = doc.root_element();

    let mut diagram = Diagram::new();
    let mut pages = Vec::new();

    match root.tag_name().name() {
        "mxGraphModel" => read_page(&mut diagram, &mut pages, "Main", root)?,
        "mxfile" => {
            for page in root.children().filter(|child| child.has_tag_name("diagram")) {
                let name = page.attribute("name").unwrap_or("Untitled");
                if let Some(model) =
                    page.descendants().find(|node| node.has_tag_name("mxGraphModel"))
                {
                    read_page(&mut diagram, &mut pages, name, model)?;
                } else if let Some(data) =
                    page.text().map(str::trim).filter(|data| !data.is_empty())
                {
                    let decoded = decode_page_data(data).map_err(|detail| {
                        ParseError::EncodedPage { page: name.to_owned(), detail }
                    })?;
                    let page_doc = roxmltree::Document::parse(&decoded)?;
                    let model = page_doc.root_element();
                    if !model.has_tag_name("mxGraphModel") {
                        return Err(ParseError::UnexpectedRoot {
                            found: model.tag_name().name().to_owned(),
                            expected: "<mxGraphModel> inside <diagram>",
                        });
                    }
                    read_page(&mut diagram, &mut pages, name, model)?;
                }
            }
        }
        other => {
            return Err(ParseError::UnexpectedRoot {
                found: other.to_owned(),
                expected: "<mxfile> or <mxGraphModel>",
            })
        }
    }

    diagram.metadata_mut().insert(PAGES_KEY.to_owned(), serde_json::Value::Array(pages));
    Ok(diagram)
}

fn read_page(
    diagram: &mut Diagram,
    pages: &mut Vec<serde_json::Value>,
    name: &str,
    model: roxmltree::Node<'_, '_>,
) -> Result<(), ParseError> {
    if !diagram.metadata().contains_key(MODEL_KEY) {
        let attrs: BTreeMap<String, String> = model
            .attributes()
            .map(|attr| (attr.name().to_owned(), attr.value().to_owned()))
            .collect();
        diagram
            .metadata_mut()
            .insert(MODEL_KEY.to_owned(), serde_json::json!(attrs));
    }

    let mut page_node_ids = Vec::new();
    let mut page_edges = 0u64;

    for cell in model.descendants().filter(|node| node.has_tag_name("mxCell")) {
        match classify_cell(cell) {
            CellClass::Node => {
                let node = read_node_cell(cell)?;
                page_node_ids.push(serde_json::json!(node.id()));
                diagram.nodes_mut().push(node);
            }
            CellClass::Edge => {
                diagram.edges_mut().push(read_edge_cell(cell));
                page_edges += 1;
            }
            CellClass::Text => {
                let value = cell.attribute("value").unwrap_or("");
                let (x, y) = (
                    geometry_attr(cell, "x")?.unwrap_or(0.0),
                    geometry_attr(cell, "y")?.unwrap_or(0.0),
                );
                diagram.texts_mut().push(TextElement::new(value, x, y));
            }
            CellClass::Unrecognized => {}
        }
    }

    pages.push(serde_json::json!({
        "name": name,
        "nodes": page_node_ids,
        "edges": page_edges,
    }));
    Ok(())
}

fn read_node_cell(cell: roxmltree::Node<'_, '_>) -> Result<Node, ParseError> {
    let id = cell
        .attribute("id")
        .filter(|id| !id.is_empty())
        .ok_or(ParseError::MissingAttribute { element: "mxCell".to_owned(), attribute: "id" })?;
    let label = cell.attribute("value").unwrap_or("");
    let style = cell.attribute("style").unwrap_or("");

    let mut node = Node::new(
        id,
        label,
        geometry_attr(cell, "x")?.unwrap_or(0.0),
        geometry_attr(cell, "y")?.unwrap_or(0.0),
    );
    node.set_shape(shape_from_style(style));
    node.set_size(geometry_attr(cell, "width")?, geometry_attr(cell, "height")?);
    if !style.is_empty() {
        node.style_mut().insert(STYLE_KEY.to_owned(), style.to_owned());
    }
    Ok(node)
}

fn read_edge_cell(cell: roxmltree::Node<'_, '_>) -> Edge {
    // classify_cell guarantees both endpoints are present.
    let source = cell.attribute("source").unwrap_or("");
    let target = cell.attribute("target").unwrap_or("");
    let mut edge = Edge::new(source, target);
    edge.set_label(cell.attribute("value"));
    if let Some(style) = cell.attribute("style").filter(|style| !style.is_empty()) {
        edge.style_mut().insert(STYLE_KEY.to_owned(), style.to_owned());
    }
    if let Some(id) = cell.attribute("id").filter(|id| !id.is_empty()) {
        edge.style_mut().insert(EDGE_ID_KEY.to_owned(), id.to_owned());
    }
    edge
}

fn geometry_attr(
    cell: roxmltree::Node<'_, '_>,
    attribute: &str,
) -> Result<Option<f64>, ParseError> {
    let Some(geometry) = cell.children().find(|child| child.has_tag_name("mxGeometry")) else {
        return Ok(None);
    };
    let Some(value) = geometry.attribute(attribute) else {
        return Ok(None);
    };
    value.parse::<f64>().map(Some).map_err(|_| ParseError::InvalidNumber {
        element: format!("mxCell id={}", cell.attribute("id").unwrap_or("?")),
        attribute: attribute.to_owned(),
        value: value.to_owned(),
    })
}

fn shape_from_style(style: &str) -> &'static str {
    if style.contains("ellipse") {
        "ellipse"
    } else if style.contains("rhombus") {
        "diamond"
    } else {
        "rectangle"
    }
}

fn default_style_for_shape(shape: &str) -> &'static str {
    match shape {
        "ellipse" => DEFAULT_ELLIPSE_STYLE,
        "diamond" => DEFAULT_DIAMOND_STYLE,
        _ => DEFAULT_NODE_STYLE,
    }
}

/// Decodes a compressed `<diagram>` payload: percent-decode, base64, raw
/// deflate.
fn decode_page_data(data: &str) -> Result<String, String> {
    let unquoted = percent_decode(data);
    let compressed = base64::engine::general_purpose::STANDARD
        .decode(&unquoted)
        .map_err(|err| format!("base64: {err}"))?;
    let mut inflated = String::new();
    flate2::read::DeflateDecoder::new(compressed.as_slice())
        .read_to_string(&mut inflated)
        .map_err(|err| format!("deflate: {err}"))?;
    // The inflated XML itself is percent-encoded by the draw.io editor.
    let bytes = percent_decode(&inflated);
    String::from_utf8(bytes).map_err(|err| format!("utf-8: {err}"))
}

fn percent_decode(input: &str) -> Vec<u8> {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hex = |b: u8| (b as char).to_digit(16);
            if let (Some(hi), Some(lo)) = (hex(bytes[i + 1]), hex(bytes[i + 2])) {
                out.push((hi * 16 + lo) as u8);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    out
}

pub fn write(diagram: &Diagram) -> String {
    let model_attrs = model_attrs(diagram);
    let page_name = page_name(diagram);

    let mut out = String::new();
    out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    out.push_str("<mxfile host=\"proteus\" version=\"1.0\">\n");
    out.push_str(&format!(
        "  <diagram id=\"diagram-1\" name=\"{}\">\n",
        xml_escape(&page_name)
    ));

    out.push_str("    <mxGraphModel");
    for (name, value) in &model_attrs {
        out.push_str(&format!(" {}=\"{}\"", name, xml_escape(value)));
    }
    out.push_str(">\n      <root>\n");
    out.push_str("        <mxCell id=\"0\" />\n");
    out.push_str("        <mxCell id=\"1\" parent=\"0\" />\n");

    for node in diagram.nodes() {
        let style = node
            .style()
            .get(STYLE_KEY)
            .map(String::as_str)
            .unwrap_or_else(|| default_style_for_shape(node.shape()));
        out.push_str(&format!(
            "        <mxCell id=\"{}\" value=\"{}\" style=\"{}\" vertex=\"1\" parent=\"1\">\n",
            xml_escape(node.id()),
            xml_escape(node.label()),
            xml_escape(style)
        ));
        out.push_str(&format!(
            "          <mxGeometry x=\"{}\" y=\"{}\" width=\"{}\" height=\"{}\" as=\"geometry\" />\n",
            fmt_num(node.x()),
            fmt_num(node.y()),
            fmt_num(node.width().unwrap_or(DEFAULT_NODE_WIDTH)),
            fmt_num(node.height().unwrap_or(DEFAULT_NODE_HEIGHT))
        ));
        out.push_str("        </mxCell>\n");
    }

    for (index, text) in diagram.texts().iter().enumerate() {
        out.push_str(&format!(
            "        <mxCell id=\"text-{}\" value=\"{}\" style=\"{DEFAULT_TEXT_STYLE}\" vertex=\"1\" parent=\"1\">\n",
            index + 1,
            xml_escape(text.text())
        ));
        out.push_str(&format!(
            "          <mxGeometry x=\"{}\" y=\"{}\" width=\"100\" height=\"25\" as=\"geometry\" />\n",
            fmt_num(text.x()),
            fmt_num(text.y())
        ));
        out.push_str("        </mxCell>\n");
    }

    for (index, edge) in diagram.edges().iter().enumerate() {
        let id = edge
            .style()
            .get(EDGE_ID_KEY)
            .cloned()
            .unwrap_or_else(|| format!("edge-{}", index + 1));
        let style =
            edge.style().get(STYLE_KEY).map(String::as_str).unwrap_or(DEFAULT_EDGE_STYLE);
        out.push_str(&format!(
            "        <mxCell id=\"{}\" value=\"{}\" style=\"{}\" edge=\"1\" parent=\"1\" source=\"{}\" target=\"{}\">\n",
            xml_escape(&id),
            xml_escape(edge.label().unwrap_or("")),
            xml_escape(style),
            xml_escape(edge.source()),
            xml_escape(edge.target())
        ));
        out.push_str("          <mxGeometry relative=\"1\" as=\"geometry\" />\n");
        out.push_str("        </mxCell>\n");
    }

    out.push_str("      </root>\n    </mxGraphModel>\n  </diagram>\n</mxfile>\n");
    out
}

fn model_attrs(diagram: &Diagram) -> BTreeMap<String, String> {
    if let Some(serde_json::Value::Object(attrs)) = diagram.metadata().get(MODEL_KEY) {
        let captured: BTreeMap<String, String> = attrs
            .iter()
            .filter_map(|(name, value)| {
                value.as_str().map(|value| (name.clone(), value.to_owned()))
            })
            .collect();
        if !captured.is_empty() {
            return captured;
        }
    }

    [
        ("arrows", "1"),
        ("connect", "1"),
        ("dx", "0"),
        ("dy", "0"),
        ("fold", "1"),
        ("grid", "1"),
        ("gridSize", "10"),
        ("guides", "1"),
        ("page", "1"),
        ("pageHeight", "1100"),
        ("pageScale", "1"),
        ("pageWidth", "850"),
        ("tooltips", "1"),
    ]
    .into_iter()
    .map(|(name, value)| (name.to_owned(), value.to_owned()))
    .collect()
}

fn page_name(diagram: &Diagram) -> String {
    diagram
        .metadata()
        .get(PAGES_KEY)
        .and_then(|pages| pages.as_array())
        .and_then(|pages| pages.first())
        .and_then(|page| page.get("name"))
        .and_then(|name| name.as_str())
        .map(str::to_owned)
        .unwrap_or_else(|| "Page-1".to_owned())
}
