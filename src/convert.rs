// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Proteus-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Proteus and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! Format conversion, orchestrated over the common model: read the source
//! into a [`Diagram`], write the diagram in the target format.

use std::fmt;
use std::path::PathBuf;

use crate::format::{
    read_diagram, write_diagram, DiagramFormat, ParseError, UnsupportedFormat, WriteError,
    DROPPED_DANGLING_EDGES_KEY,
};
use crate::model::Diagram;
use crate::store::{ProjectRoot, StoreError};

#[derive(Debug)]
pub enum ConvertError {
    /// The path was rejected by project-root confinement.
    Security(StoreError),
    UnsupportedFormat(UnsupportedFormat),
    Parse { path: String, source: ParseError },
    Integrity(WriteError),
    Io { path: String, source: std::io::Error },
}

impl fmt::Display for ConvertError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Security(err) => err.fmt(f),
            Self::UnsupportedFormat(err) => err.fmt(f),
            Self::Parse { path, source } => write!(f, "{path}: {source}"),
            Self::Integrity(err) => err.fmt(f),
            Self::Io { path, source } => write!(f, "{path}: {source}"),
        }
    }
}

impl std::error::Error for ConvertError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Security(err) => Some(err),
            Self::UnsupportedFormat(err) => Some(err),
            Self::Parse { source, .. } => Some(source),
            Self::Integrity(err) => Some(err),
            Self::Io { source, .. } => Some(source),
        }
    }
}

impl From<UnsupportedFormat> for ConvertError {
    fn from(err: UnsupportedFormat) -> Self {
        Self::UnsupportedFormat(err)
    }
}

impl From<StoreError> for ConvertError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Io { path, source } => {
                Self::Io { path: path.display().to_string(), source }
            }
            other => Self::Security(other),
        }
    }
}

/// What a conversion produced, for reporting back to the caller.
#[derive(Debug, Clone)]
pub struct ConvertReport {
    pub source_path: String,
    pub target_path: PathBuf,
    pub source_format: DiagramFormat,
    pub target_format: DiagramFormat,
    pub nodes: usize,
    pub edges: usize,
    pub texts: usize,
    pub dropped_edges: u64,
}

/// Reads and parses the diagram file at a root-relative path.
pub fn read_from(root: &ProjectRoot, relative: &str) -> Result<Diagram, ConvertError> {
    let format = DiagramFormat::from_path(relative.as_ref())?;
    let bytes = root.read(relative)?;
    read_diagram(format, &bytes)
        .map_err(|source| ConvertError::Parse { path: relative.to_owned(), source })
}

/// Serializes the diagram in the format the path's extension names and writes
/// it atomically.
pub fn write_to(
    root: &ProjectRoot,
    relative: &str,
    diagram: &Diagram,
) -> Result<(DiagramFormat, PathBuf), ConvertError> {
    let format = DiagramFormat::from_path(relative.as_ref())?;
    let content = write_diagram(format, diagram).map_err(ConvertError::Integrity)?;
    let path = root.write_atomic(relative, &content)?;
    Ok((format, path))
}

/// Converts one diagram file into another format.
///
/// Both extensions are validated before any file is touched: an unsupported
/// target must not leave a half-converted artifact behind, or cost a parse
/// of a source that could never be written.
pub fn convert(
    root: &ProjectRoot,
    source: &str,
    target: &str,
) -> Result<ConvertReport, ConvertError> {
    let source_format = DiagramFormat::from_path(source.as_ref())?;
    let target_format = DiagramFormat::from_path(target.as_ref())?;

    let diagram = read_from(root, source)?;
    let (_, target_path) = write_to(root, target, &diagram)?;

    Ok(ConvertReport {
        source_path: source.to_owned(),
        target_path,
        source_format,
        target_format,
        nodes: diagram.nodes().len(),
        edges: diagram.edges().len(),
        texts: diagram.texts().len(),
        dropped_edges: diagram
            .metadata()
            .get(DROPPED_DANGLING_EDGES_KEY)
            .and_then(serde_json::Value::as_u64)
            .unwrap_or(0),
    })
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{SystemTime, UNIX_EPOCH};

    use super::{convert, read_from, write_to, ConvertError};
    use crate::model::{Diagram, Edge, Node};
    use crate::store::ProjectRoot;

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
                "proteus-convert-test-{}-{}-{}",
                std::process::id(),
                nanos,
                COUNTER.fetch_add(1, Ordering::Relaxed)
            ));
            fs::create_dir_all(&path).unwrap();
            Self { path }
        }

        fn root(&self) -> ProjectRoot {
            ProjectRoot::new(&self.path).unwrap()
        }
    }

    impl Drop for TempDir {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.path);
        }
    }

    fn flow_diagram() -> Diagram {
        let mut diagram = Diagram::new();
        diagram.nodes_mut().push(Node::new("a", "Start", 100.0, 100.0));
        diagram.nodes_mut().push(Node::new("b", "End", 400.0, 100.0));
        let mut edge = Edge::new("a", "b");
        edge.set_label(Some("next"));
        diagram.edges_mut().push(edge);
        diagram
    }

    #[test]
    fn converts_between_formats_and_reports_counts() {
        let dir = TempDir::new();
        let root = dir.root();
        write_to(&root, "flow.drawio", &flow_diagram()).unwrap();

        let report = convert(&root, "flow.drawio", "flow.excalidraw").unwrap();
        assert_eq!(report.nodes, 2);
        assert_eq!(report.edges, 1);
        assert_eq!(report.dropped_edges, 0);
        assert_eq!(report.source_format.label(), "drawio");
        assert_eq!(report.target_format.label(), "excalidraw");

        let reread = read_from(&root, "flow.excalidraw").unwrap();
        assert_eq!(reread.nodes().len(), 2);
        assert_eq!(reread.edges()[0].label(), Some("next"));
    }

    #[test]
    fn unsupported_target_writes_nothing() {
        let dir = TempDir::new();
        let root = dir.root();
        write_to(&root, "flow.drawio", &flow_diagram()).unwrap();

        let err = convert(&root, "flow.drawio", "flow.txt").unwrap_err();
        assert!(matches!(err, ConvertError::UnsupportedFormat(_)));
        assert!(!dir.path.join("flow.txt").exists());
    }

    #[test]
    fn traversal_paths_are_refused() {
        let dir = TempDir::new();
        let err = convert(&dir.root(), "../outside.drawio", "flow.svg").unwrap_err();
        assert!(matches!(err, ConvertError::Security(_)));
    }

    #[test]
    fn missing_source_is_an_io_error() {
        let dir = TempDir::new();
        let err = convert(&dir.root(), "absent.drawio", "out.svg").unwrap_err();
        assert!(matches!(err, ConvertError::Io { .. }));
    }

    #[test]
    fn malformed_source_is_a_parse_error() {
        let dir = TempDir::new();
        let root = dir.root();
        root.write_atomic("broken.drawio", "not xml at all").unwrap();

        let err = convert(&root, "broken.drawio", "out.svg").unwrap_err();
        assert!(matches!(err, ConvertError::Parse { .. }));
    }

    #[test]
    fn self_conversion_reaches_a_fixpoint() {
        let dir = TempDir::new();
        let root = dir.root();
        write_to(&root, "flow.excalidraw", &flow_diagram()).unwrap();

        convert(&root, "flow.excalidraw", "copy.excalidraw").unwrap();
        let first = fs::read_to_string(dir.path.join("copy.excalidraw")).unwrap();
        convert(&root, "copy.excalidraw", "copy2.excalidraw").unwrap();
        let second = fs::read_to_string(dir.path.join("copy2.excalidraw")).unwrap();
        assert_eq!(first, second);
    }
}
