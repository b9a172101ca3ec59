// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Proteus-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Proteus and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! SVG reader and writer.
//!
//! SVG carries no graph semantics, so reading is a best-effort
//! reconstruction: shape elements become nodes, lines and arrow-marked paths
//! become connector candidates whose endpoints are matched to the nearest
//! node outline, and text anchors are classified by position (inside a shape
//! is its label, near a connector midpoint is an edge label, anything else is
//! free text). Files drawn by hand may round-trip imperfectly; files written
//! by [`write`] reconstruct exactly.

use std::sync::OnceLock;

use regex::Regex;

use crate::model::{Diagram, Edge, Node, TextElement};

use super::{fmt_num, xml_escape, ParseError, DEFAULT_NODE_HEIGHT, DEFAULT_NODE_WIDTH};

const FILL_KEY: &str = "svg.fill";
const STROKE_KEY: &str = "svg.stroke";

// How far outside a node outline a connector endpoint may land and still
// bind to that node, and how far a text anchor may sit from a connector
// midpoint and still count as its label.
const ENDPOINT_TOLERANCE: f64 = 50.0;
const EDGE_LABEL_TOLERANCE: f64 = 20.0;

const DEFAULT_FILL: &str = "#e1f5fe";
const DEFAULT_STROKE: &str = "#0288d1";

pub fn read(text: &str) -> Result<Diagram, ParseError> {
    let doc = roxmltree::Document::parse(text)?;
    let root = doc.root_element();
    if root.tag_name().name() != "svg" {
        return Err(ParseError::UnexpectedRoot {
            found: root.tag_name().name().to_owned(),
            expected: "<svg>",
        });
    }

    let mut diagram = Diagram::new();
    let mut connectors: Vec<((f64, f64), (f64, f64))> = Vec::new();
    let mut texts: Vec<(String, f64, f64)> = Vec::new();
    let mut synthesized = 0usize;

    for element in root.descendants().filter(|node| node.is_element()) {
        // Marker definitions describe arrowheads, not content.
        if element.ancestors().any(|ancestor| ancestor.has_tag_name("defs")) {
            continue;
        }
        match element.tag_name().name() {
            "rect" => {
                // The canvas background has percentage dimensions and no
                // graph meaning.
                let Some(geometry) = rect_geometry(element) else { continue };
                push_shape(&mut diagram, &mut synthesized, element, "rectangle", geometry);
            }
            "circle" => {
                let (Some(cx), Some(cy), Some(r)) = (
                    attr_num(element, "cx"),
                    attr_num(element, "cy"),
                    attr_num(element, "r"),
                ) else {
                    continue;
                };
                push_shape(
                    &mut diagram,
                    &mut synthesized,
                    element,
                    "ellipse",
                    (cx - r, cy - r, 2.0 * r, 2.0 * r),
                );
            }
            "ellipse" => {
                let (Some(cx), Some(cy), Some(rx), Some(ry)) = (
                    attr_num(element, "cx"),
                    attr_num(element, "cy"),
                    attr_num(element, "rx"),
                    attr_num(element, "ry"),
                ) else {
                    continue;
                };
                push_shape(
                    &mut diagram,
                    &mut synthesized,
                    element,
                    "ellipse",
                    (cx - rx, cy - ry, 2.0 * rx, 2.0 * ry),
                );
            }
            "polygon" => {
                let points = parse_points(element.attribute("points").unwrap_or(""));
                if points.len() < 3 {
                    continue;
                }
                let shape = if points.len() == 4 { "diamond" } else { "rectangle" };
                let min_x = points.iter().map(|p| p.0).fold(f64::INFINITY, f64::min);
                let min_y = points.iter().map(|p| p.1).fold(f64::INFINITY, f64::min);
                let max_x = points.iter().map(|p| p.0).fold(f64::NEG_INFINITY, f64::max);
                let max_y = points.iter().map(|p| p.1).fold(f64::NEG_INFINITY, f64::max);
                push_shape(
                    &mut diagram,
                    &mut synthesized,
                    element,
                    shape,
                    (min_x, min_y, max_x - min_x, max_y - min_y),
                );
            }
            "line" => {
                let (Some(x1), Some(y1), Some(x2), Some(y2)) = (
                    attr_num(element, "x1"),
                    attr_num(element, "y1"),
                    attr_num(element, "x2"),
                    attr_num(element, "y2"),
                ) else {
                    continue;
                };
                connectors.push(((x1, y1), (x2, y2)));
            }
            "path" => {
                if element.attribute("marker-end").is_none()
                    && element.attribute("marker-start").is_none()
                {
                    continue;
                }
                let numbers = extract_numbers(element.attribute("d").unwrap_or(""));
                if numbers.len() >= 4 {
                    connectors.push((
                        (numbers[0], numbers[1]),
                        (numbers[numbers.len() - 2], numbers[numbers.len() - 1]),
                    ));
                }
            }
            "text" => {
                let content = element.text().unwrap_or("").trim();
                if content.is_empty() {
                    continue;
                }
                let (x, y) = (
                    attr_num(element, "x").unwrap_or(0.0),
                    attr_num(element, "y").unwrap_or(0.0),
                );
                texts.push((content.to_owned(), x, y));
            }
            _ => {}
        }
    }

    let edge_midpoints = bind_connectors(&mut diagram, &connectors);
    classify_texts(&mut diagram, texts, &edge_midpoints);
    Ok(diagram)
}

fn rect_geometry(element: roxmltree::Node<'_, '_>) -> Option<(f64, f64, f64, f64)> {
    let width = attr_num(element, "width")?;
    let height = attr_num(element, "height")?;
    Some((
        attr_num(element, "x").unwrap_or(0.0),
        attr_num(element, "y").unwrap_or(0.0),
        width,
        height,
    ))
}

fn push_shape(
    diagram: &mut Diagram,
    synthesized: &mut usize,
    element: roxmltree::Node<'_, '_>,
    shape: &str,
    (x, y, width, height): (f64, f64, f64, f64),
) {
    let id = match element.attribute("id").filter(|id| !id.is_empty()) {
        Some(id) => id.to_owned(),
        None => {
            *synthesized += 1;
            format!("shape-{synthesized}")
        }
    };
    let mut node = Node::new(id, "", x, y);
    node.set_shape(shape);
    node.set_size(Some(width), Some(height));
    for (attribute, style_key) in [("fill", FILL_KEY), ("stroke", STROKE_KEY)] {
        if let Some(value) = element.attribute(attribute) {
            node.style_mut().insert(style_key.to_owned(), value.to_owned());
        }
    }
    diagram.nodes_mut().push(node);
}

/// Turns connector segments into edges by snapping each endpoint to the
/// nearest node outline. Returns the midpoint of every segment that became
/// an edge, indexed like `diagram.edges()`.
fn bind_connectors(
    diagram: &mut Diagram,
    connectors: &[((f64, f64), (f64, f64))],
) -> Vec<(f64, f64)> {
    let mut midpoints = Vec::new();
    for (start, end) in connectors {
        let source = nearest_node(diagram, *start);
        let target = nearest_node(diagram, *end);
        let (Some(source), Some(target)) = (source, target) else { continue };
        if source == target {
            continue;
        }
        diagram.edges_mut().push(Edge::new(source, target));
        midpoints.push(((start.0 + end.0) / 2.0, (start.1 + end.1) / 2.0));
    }
    midpoints
}

fn nearest_node(diagram: &Diagram, point: (f64, f64)) -> Option<String> {
    let mut best: Option<(f64, &str)> = None;
    for node in diagram.nodes() {
        let distance = outline_distance(node, point);
        if distance <= ENDPOINT_TOLERANCE
            && best.map_or(true, |(best_distance, _)| distance < best_distance)
        {
            best = Some((distance, node.id()));
        }
    }
    best.map(|(_, id)| id.to_owned())
}

/// Distance from a point to a node's bounding box; zero inside or on it.
fn outline_distance(node: &Node, (x, y): (f64, f64)) -> f64 {
    let width = node.width().unwrap_or(DEFAULT_NODE_WIDTH);
    let height = node.height().unwrap_or(DEFAULT_NODE_HEIGHT);
    let dx = (node.x() - x).max(0.0).max(x - (node.x() + width));
    let dy = (node.y() - y).max(0.0).max(y - (node.y() + height));
    (dx * dx + dy * dy).sqrt()
}

fn classify_texts(
    diagram: &mut Diagram,
    texts: Vec<(String, f64, f64)>,
    edge_midpoints: &[(f64, f64)],
) {
    'texts: for (content, x, y) in texts {
        for node in diagram.nodes_mut().iter_mut() {
            if node.label().is_empty() && outline_distance(node, (x, y)) == 0.0 {
                node.set_label(content);
                continue 'texts;
            }
        }
        for (index, (mx, my)) in edge_midpoints.iter().enumerate() {
            let distance = ((x - mx).powi(2) + (y - my).powi(2)).sqrt();
            if distance <= EDGE_LABEL_TOLERANCE && diagram.edges()[index].label().is_none() {
                diagram.edges_mut()[index].set_label(Some(content));
                continue 'texts;
            }
        }
        diagram.texts_mut().push(TextElement::new(content, x, y));
    }
}

fn attr_num(element: roxmltree::Node<'_, '_>, attribute: &str) -> Option<f64> {
    element.attribute(attribute)?.parse().ok()
}

fn parse_points(points: &str) -> Vec<(f64, f64)> {
    let numbers = extract_numbers(points);
    numbers.chunks_exact(2).map(|pair| (pair[0], pair[1])).collect()
}

fn extract_numbers(text: &str) -> Vec<f64> {
    number_pattern()
        .find_iter(text)
        .filter_map(|m| m.as_str().parse().ok())
        .collect()
}

fn number_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"-?(?:\d+\.\d+|\.\d+|\d+)").expect("hard-coded pattern")
    })
}

pub fn write(diagram: &Diagram) -> String {
    let (min_x, min_y, max_x, max_y) = content_bounds(diagram);
    let width = (max_x - min_x + 100.0).max(800.0);
    let height = (max_y - min_y + 100.0).max(600.0);

    let mut out = String::new();
    out.push_str(&format!(
        "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{}\" height=\"{}\" viewBox=\"{} {} {} {}\">\n",
        fmt_num(width),
        fmt_num(height),
        fmt_num(min_x - 50.0),
        fmt_num(min_y - 50.0),
        fmt_num(width),
        fmt_num(height)
    ));
    out.push_str("  <defs>\n");
    out.push_str("    <marker id=\"arrowhead\" markerWidth=\"10\" markerHeight=\"7\" refX=\"9\" refY=\"3.5\" orient=\"auto\">\n");
    out.push_str("      <polygon points=\"0 0, 10 3.5, 0 7\" fill=\"#666\" />\n");
    out.push_str("    </marker>\n");
    out.push_str("  </defs>\n");
    out.push_str("  <rect width=\"100%\" height=\"100%\" fill=\"#ffffff\" />\n");

    for node in diagram.nodes() {
        let (x, y) = (node.x(), node.y());
        let width = node.width().unwrap_or(DEFAULT_NODE_WIDTH);
        let height = node.height().unwrap_or(DEFAULT_NODE_HEIGHT);
        let fill = node.style().get(FILL_KEY).map(String::as_str).unwrap_or(DEFAULT_FILL);
        let stroke =
            node.style().get(STROKE_KEY).map(String::as_str).unwrap_or(DEFAULT_STROKE);
        let id = xml_escape(node.id());

        match node.shape() {
            "ellipse" => out.push_str(&format!(
                "  <ellipse id=\"{id}\" cx=\"{}\" cy=\"{}\" rx=\"{}\" ry=\"{}\" fill=\"{fill}\" stroke=\"{stroke}\" stroke-width=\"2\" />\n",
                fmt_num(x + width / 2.0),
                fmt_num(y + height / 2.0),
                fmt_num(width / 2.0),
                fmt_num(height / 2.0)
            )),
            "diamond" => out.push_str(&format!(
                "  <polygon id=\"{id}\" points=\"{},{} {},{} {},{} {},{}\" fill=\"{fill}\" stroke=\"{stroke}\" stroke-width=\"2\" />\n",
                fmt_num(x + width / 2.0),
                fmt_num(y),
                fmt_num(x + width),
                fmt_num(y + height / 2.0),
                fmt_num(x + width / 2.0),
                fmt_num(y + height),
                fmt_num(x),
                fmt_num(y + height / 2.0)
            )),
            _ => out.push_str(&format!(
                "  <rect id=\"{id}\" x=\"{}\" y=\"{}\" width=\"{}\" height=\"{}\" rx=\"8\" fill=\"{fill}\" stroke=\"{stroke}\" stroke-width=\"2\" />\n",
                fmt_num(x),
                fmt_num(y),
                fmt_num(width),
                fmt_num(height)
            )),
        }

        if !node.label().is_empty() {
            out.push_str(&format!(
                "  <text x=\"{}\" y=\"{}\" text-anchor=\"middle\" font-family=\"Arial\" font-size=\"14\" fill=\"#333\">{}</text>\n",
                fmt_num(x + width / 2.0),
                fmt_num(y + height / 2.0 + 5.0),
                xml_escape(node.label())
            ));
        }
    }

    for edge in diagram.edges() {
        let (Some(source), Some(target)) =
            (diagram.node(edge.source()), diagram.node(edge.target()))
        else {
            // write_diagram validates integrity first.
            continue;
        };
        let (start, end) = connector_segment(source, target);
        out.push_str(&format!(
            "  <line x1=\"{}\" y1=\"{}\" x2=\"{}\" y2=\"{}\" stroke=\"#666\" stroke-width=\"2\" marker-end=\"url(#arrowhead)\" />\n",
            fmt_num(start.0),
            fmt_num(start.1),
            fmt_num(end.0),
            fmt_num(end.1)
        ));
        if let Some(label) = edge.label() {
            out.push_str(&format!(
                "  <text x=\"{}\" y=\"{}\" text-anchor=\"middle\" font-family=\"Arial\" font-size=\"12\" fill=\"#666\">{}</text>\n",
                fmt_num((start.0 + end.0) / 2.0),
                fmt_num((start.1 + end.1) / 2.0 - 10.0),
                xml_escape(label)
            ));
        }
    }

    for text in diagram.texts() {
        out.push_str(&format!(
            "  <text x=\"{}\" y=\"{}\" font-family=\"Arial\" font-size=\"16\" fill=\"#333\">{}</text>\n",
            fmt_num(text.x()),
            fmt_num(text.y()),
            xml_escape(text.text())
        ));
    }

    out.push_str("</svg>\n");
    out
}

fn content_bounds(diagram: &Diagram) -> (f64, f64, f64, f64) {
    let mut bounds = (0.0f64, 0.0f64, 0.0f64, 0.0f64);
    for node in diagram.nodes() {
        let width = node.width().unwrap_or(DEFAULT_NODE_WIDTH);
        let height = node.height().unwrap_or(DEFAULT_NODE_HEIGHT);
        bounds.0 = bounds.0.min(node.x());
        bounds.1 = bounds.1.min(node.y());
        bounds.2 = bounds.2.max(node.x() + width);
        bounds.3 = bounds.3.max(node.y() + height);
    }
    for text in diagram.texts() {
        bounds.0 = bounds.0.min(text.x());
        bounds.1 = bounds.1.min(text.y());
        bounds.2 = bounds.2.max(text.x());
        bounds.3 = bounds.3.max(text.y());
    }
    bounds
}

/// Center-to-center segment clipped to the two node outlines, so arrowheads
/// land on the target's border instead of its center.
fn connector_segment(source: &Node, target: &Node) -> ((f64, f64), (f64, f64)) {
    let center = |node: &Node| {
        (
            node.x() + node.width().unwrap_or(DEFAULT_NODE_WIDTH) / 2.0,
            node.y() + node.height().unwrap_or(DEFAULT_NODE_HEIGHT) / 2.0,
        )
    };
    let from = center(source);
    let to = center(target);
    (clip_to_outline(source, from, to), clip_to_outline(target, to, from))
}

/// Walks from a node's center toward `toward` and stops at the node's
/// bounding box border.
fn clip_to_outline(node: &Node, center: (f64, f64), toward: (f64, f64)) -> (f64, f64) {
    let width = node.width().unwrap_or(DEFAULT_NODE_WIDTH);
    let height = node.height().unwrap_or(DEFAULT_NODE_HEIGHT);
    let (dx, dy) = (toward.0 - center.0, toward.1 - center.1);
    if dx == 0.0 && dy == 0.0 {
        return center;
    }

    let mut t = f64::INFINITY;
    if dx != 0.0 {
        t = t.min((width / 2.0) / dx.abs());
    }
    if dy != 0.0 {
        t = t.min((height / 2.0) / dy.abs());
    }
    if !t.is_finite() {
        return center;
    }
    (center.0 + dx * t, center.1 + dy * t)
}

#[cfg(test)]
mod tests {
    use super::{extract_numbers, outline_distance, read, write};
    use crate::format::ParseError;
    use crate::model::{Diagram, Edge, Node, TextElement};

    #[test]
    fn reads_shapes_with_ids_and_contained_labels() {
        let svg = r##"<svg xmlns="http://www.w3.org/2000/svg" width="800" height="600">
          <rect width="100%" height="100%" fill="#ffffff" />
          <rect id="start" x="100" y="100" width="120" height="60" fill="#e1f5fe" stroke="#0288d1" />
          <text x="160" y="135" text-anchor="middle">Start</text>
          <ellipse id="end" cx="460" cy="130" rx="60" ry="30" fill="#e1f5fe" stroke="#0288d1" />
          <text x="40" y="300">floating note</text>
        </svg>"##;

        let diagram = read(svg).unwrap();
        assert_eq!(diagram.nodes().len(), 2);
        assert_eq!(diagram.nodes()[0].id(), "start");
        assert_eq!(diagram.nodes()[0].label(), "Start");
        assert_eq!(diagram.nodes()[0].shape(), "rectangle");
        assert_eq!(diagram.nodes()[1].id(), "end");
        assert_eq!(diagram.nodes()[1].shape(), "ellipse");
        assert_eq!(diagram.nodes()[1].x(), 400.0);
        assert_eq!(diagram.nodes()[1].width(), Some(120.0));
        assert_eq!(diagram.texts().len(), 1);
        assert_eq!(diagram.texts()[0].text(), "floating note");
    }

    #[test]
    fn synthesizes_ids_for_anonymous_shapes() {
        let svg = r#"<svg xmlns="http://www.w3.org/2000/svg">
          <rect x="0" y="0" width="50" height="50" />
          <circle cx="200" cy="200" r="25" />
        </svg>"#;

        let diagram = read(svg).unwrap();
        assert_eq!(diagram.nodes()[0].id(), "shape-1");
        assert_eq!(diagram.nodes()[1].id(), "shape-2");
        assert_eq!(diagram.nodes()[1].shape(), "ellipse");
        assert_eq!(diagram.nodes()[1].x(), 175.0);
    }

    #[test]
    fn binds_connector_endpoints_to_the_nearest_outlines() {
        let svg = r##"<svg xmlns="http://www.w3.org/2000/svg">
          <rect id="a" x="0" y="0" width="100" height="50" />
          <rect id="b" x="300" y="0" width="100" height="50" />
          <line x1="100" y1="25" x2="300" y2="25" stroke="#666" marker-end="url(#arrowhead)" />
          <text x="200" y="15" text-anchor="middle">go</text>
        </svg>"##;

        let diagram = read(svg).unwrap();
        assert_eq!(diagram.edges().len(), 1);
        assert_eq!(diagram.edges()[0].source(), "a");
        assert_eq!(diagram.edges()[0].target(), "b");
        assert_eq!(diagram.edges()[0].label(), Some("go"));
        assert!(diagram.texts().is_empty());
    }

    #[test]
    fn drops_connectors_without_two_distinct_anchors() {
        let svg = r##"<svg xmlns="http://www.w3.org/2000/svg">
          <rect id="a" x="0" y="0" width="100" height="50" />
          <line x1="100" y1="25" x2="700" y2="500" stroke="#666" />
          <line x1="0" y1="0" x2="100" y2="50" stroke="#666" />
        </svg>"##;

        let diagram = read(svg).unwrap();
        // First line trails into empty space; second starts and ends on the
        // same node.
        assert!(diagram.edges().is_empty());
    }

    #[test]
    fn reads_arrow_paths_by_their_endpoints() {
        let svg = r#"<svg xmlns="http://www.w3.org/2000/svg">
          <rect id="a" x="0" y="0" width="100" height="50" />
          <rect id="b" x="300" y="200" width="100" height="50" />
          <path d="M 100 25 C 200 25, 200 225, 300 225" marker-end="url(#arrowhead)" />
        </svg>"#;

        let diagram = read(svg).unwrap();
        assert_eq!(diagram.edges().len(), 1);
        assert_eq!(diagram.edges()[0].source(), "a");
        assert_eq!(diagram.edges()[0].target(), "b");
    }

    #[test]
    fn rejects_non_svg_roots() {
        assert!(matches!(
            read("<mxGraphModel/>"),
            Err(ParseError::UnexpectedRoot { .. })
        ));
    }

    #[test]
    fn extract_numbers_handles_path_syntax() {
        assert_eq!(
            extract_numbers("M 10.5 -20 L30,40.25"),
            vec![10.5, -20.0, 30.0, 40.25]
        );
    }

    #[test]
    fn outline_distance_is_zero_inside_and_on_the_border() {
        let mut node = Node::new("n", "", 100.0, 100.0);
        node.set_size(Some(100.0), Some(50.0));
        assert_eq!(outline_distance(&node, (150.0, 125.0)), 0.0);
        assert_eq!(outline_distance(&node, (100.0, 100.0)), 0.0);
        assert_eq!(outline_distance(&node, (210.0, 125.0)), 10.0);
    }

    fn sample_diagram() -> Diagram {
        let mut diagram = Diagram::new();
        let mut start = Node::new("start", "Start", 100.0, 100.0);
        start.set_size(Some(120.0), Some(60.0));
        diagram.nodes_mut().push(start);
        let mut choice = Node::new("choice", "OK?", 400.0, 100.0);
        choice.set_shape("diamond");
        choice.set_size(Some(120.0), Some(60.0));
        diagram.nodes_mut().push(choice);
        let mut edge = Edge::new("start", "choice");
        edge.set_label(Some("next"));
        diagram.edges_mut().push(edge);
        diagram.texts_mut().push(TextElement::new("legend", 60.0, 400.0));
        diagram
    }

    #[test]
    fn written_files_reconstruct_the_graph() {
        let diagram = sample_diagram();
        let reread = read(&write(&diagram)).unwrap();

        assert_eq!(reread.nodes().len(), 2);
        assert_eq!(reread.nodes()[0].id(), "start");
        assert_eq!(reread.nodes()[0].label(), "Start");
        assert_eq!(reread.nodes()[1].shape(), "diamond");
        assert_eq!(reread.edges().len(), 1);
        assert_eq!(reread.edges()[0].source(), "start");
        assert_eq!(reread.edges()[0].target(), "choice");
        assert_eq!(reread.edges()[0].label(), Some("next"));
        assert_eq!(reread.texts().len(), 1);
        assert_eq!(reread.texts()[0].text(), "legend");
    }

    #[test]
    fn rewriting_a_parsed_file_is_byte_stable() {
        let first = write(&sample_diagram());
        let second = write(&read(&first).unwrap());
        assert_eq!(first, second);
    }

    #[test]
    fn edges_stop_at_the_shape_borders() {
        let svg = write(&sample_diagram());
        // start's right edge is x=220, choice's left bbox edge is x=400.
        assert!(
            svg.contains("x1=\"220\" y1=\"130\" x2=\"400\" y2=\"130\""),
            "{svg}"
        );
    }

    #[test]
    fn canvas_grows_to_fit_content() {
        let mut diagram = Diagram::new();
        let mut far = Node::new("far", "", 1500.0, 900.0);
        far.set_size(Some(100.0), Some(50.0));
        diagram.nodes_mut().push(far);

        let svg = write(&diagram);
        assert!(svg.contains("width=\"1700\""), "{svg}");
        assert!(svg.contains("height=\"1050\""), "{svg}");
    }
}
