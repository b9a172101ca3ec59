// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Proteus-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Proteus and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! Format detection and the reader/writer pairs for the supported diagram
//! formats.
//!
//! Readers are lenient the way the upstream applications are: structurally
//! broken input is a [`ParseError`] with a location hint, but edges whose
//! endpoints never resolve are dropped (and counted in the
//! `dropped_dangling_edges` metadata key) rather than rejected. Writers take
//! the opposite stance and refuse diagrams with dangling edges outright.

pub mod drawio;
pub mod excalidraw;
pub mod svg;

use std::fmt;
use std::path::Path;

use crate::model::{Diagram, IntegrityError};

pub use excalidraw::{IdSource, SequentialIds};

/// Metadata key under which readers record how many dangling edges they
/// dropped.
pub const DROPPED_DANGLING_EDGES_KEY: &str = "dropped_dangling_edges";

/// Default node size writers assume when the model carries none.
pub const DEFAULT_NODE_WIDTH: f64 = 120.0;
pub const DEFAULT_NODE_HEIGHT: f64 = 60.0;

/// One of the supported interchange formats, selected by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagramFormat {
    Drawio,
    Excalidraw,
    Svg,
}

impl DiagramFormat {
    /// Detects the format from a path's extension.
    pub fn from_path(path: &Path) -> Result<Self, UnsupportedFormat> {
        let extension = path
            .extension()
            .map(|extension| extension.to_string_lossy().to_ascii_lowercase());
        match extension.as_deref() {
            Some("drawio" | "xml") => Ok(Self::Drawio),
            Some("excalidraw") => Ok(Self::Excalidraw),
            Some("svg") => Ok(Self::Svg),
            _ => Err(UnsupportedFormat { extension }),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Drawio => "drawio",
            Self::Excalidraw => "excalidraw",
            Self::Svg => "svg",
        }
    }
}

impl fmt::Display for DiagramFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// The path's extension matches no known reader/writer pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsupportedFormat {
    pub extension: Option<String>,
}

impl fmt::Display for UnsupportedFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.extension {
            Some(extension) => write!(
                f,
                "unsupported diagram format: .{extension} (expected .drawio, .xml, .excalidraw, or .svg)"
            ),
            None => f.write_str(
                "missing file extension (expected .drawio, .xml, .excalidraw, or .svg)",
            ),
        }
    }
}

impl std::error::Error for UnsupportedFormat {}

/// Malformed input for the declared format, with a location hint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    InvalidUtf8,
    InvalidXml {
        detail: String,
    },
    InvalidJson {
        detail: String,
    },
    UnexpectedRoot {
        found: String,
        expected: &'static str,
    },
    MissingAttribute {
        element: String,
        attribute: &'static str,
    },
    InvalidNumber {
        element: String,
        attribute: String,
        value: String,
    },
    EncodedPage {
        page: String,
        detail: String,
    },
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidUtf8 => f.write_str("file is not valid UTF-8"),
            Self::InvalidXml { detail } => write!(f, "invalid XML: {detail}"),
            Self::InvalidJson { detail } => write!(f, "invalid JSON: {detail}"),
            Self::UnexpectedRoot { found, expected } => {
                write!(f, "unexpected root element <{found}> (expected {expected})")
            }
            Self::MissingAttribute { element, attribute } => {
                write!(f, "element <{element}> is missing required attribute '{attribute}'")
            }
            Self::InvalidNumber { element, attribute, value } => write!(
                f,
                "element <{element}> has unparseable numeric attribute {attribute}={value:?}"
            ),
            Self::EncodedPage { page, detail } => {
                write!(f, "cannot decode compressed page data for page '{page}': {detail}")
            }
        }
    }
}

impl std::error::Error for ParseError {}

impl From<roxmltree::Error> for ParseError {
    fn from(err: roxmltree::Error) -> Self {
        Self::InvalidXml { detail: err.to_string() }
    }
}

impl From<serde_json::Error> for ParseError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidJson { detail: err.to_string() }
    }
}

/// A writer refused the diagram; producing a dangling edge is a defect, so
/// integrity is checked before a single byte is emitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteError {
    DanglingEdge(IntegrityError),
}

impl fmt::Display for WriteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DanglingEdge(err) => write!(f, "cannot serialize diagram: {err}"),
        }
    }
}

impl std::error::Error for WriteError {}

/// Parses raw bytes in the given format into a [`Diagram`].
///
/// The dangling-edge policy is enforced here, once, for every reader: edges
/// whose endpoints never resolved are dropped and counted.
pub fn read_diagram(format: DiagramFormat, bytes: &[u8]) -> Result<Diagram, ParseError> {
    let text = std::str::from_utf8(bytes).map_err(|_| ParseError::InvalidUtf8)?;
    let mut diagram = match format {
        DiagramFormat::Drawio => drawio::read(text)?,
        DiagramFormat::Excalidraw => excalidraw::read(text)?,
        DiagramFormat::Svg => svg::read(text)?,
    };

    let dropped = diagram.drop_dangling_edges();
    if dropped > 0 {
        diagram
            .metadata_mut()
            .insert(DROPPED_DANGLING_EDGES_KEY.to_owned(), serde_json::json!(dropped));
    }
    Ok(diagram)
}

/// Serializes a [`Diagram`] into the given format.
pub fn write_diagram(format: DiagramFormat, diagram: &Diagram) -> Result<String, WriteError> {
    diagram.validate_edges().map_err(WriteError::DanglingEdge)?;
    Ok(match format {
        DiagramFormat::Drawio => drawio::write(diagram),
        DiagramFormat::Excalidraw => excalidraw::write(diagram),
        DiagramFormat::Svg => svg::write(diagram),
    })
}

/// Formats a coordinate the way the upstream tools do: integral values lose
/// the trailing `.0` so output stays byte-stable across parse/format cycles.
pub(crate) fn fmt_num(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

/// Escapes text for use inside XML attribute values and text nodes.
pub(crate) fn xml_escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::{fmt_num, xml_escape, DiagramFormat};

    #[test]
    fn detects_formats_by_extension_case_insensitively() {
        for (path, format) in [
            ("a.drawio", DiagramFormat::Drawio),
            ("a.xml", DiagramFormat::Drawio),
            ("a.DRAWIO", DiagramFormat::Drawio),
            ("a.excalidraw", DiagramFormat::Excalidraw),
            ("dir/a.svg", DiagramFormat::Svg),
        ] {
            assert_eq!(DiagramFormat::from_path(Path::new(path)).unwrap(), format, "{path}");
        }
    }

    #[test]
    fn rejects_unknown_and_missing_extensions() {
        let err = DiagramFormat::from_path(Path::new("notes.txt")).unwrap_err();
        assert_eq!(err.extension.as_deref(), Some("txt"));

        let err = DiagramFormat::from_path(Path::new("noext")).unwrap_err();
        assert_eq!(err.extension, None);
    }

    #[test]
    fn fmt_num_drops_trailing_zero_fraction() {
        assert_eq!(fmt_num(100.0), "100");
        assert_eq!(fmt_num(-40.0), "-40");
        assert_eq!(fmt_num(12.5), "12.5");
    }

    #[test]
    fn xml_escape_covers_markup_characters() {
        assert_eq!(xml_escape("a<b>&\"c'"), "a&lt;b&gt;&amp;&quot;c&#39;");
    }
}
