// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Proteus-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Proteus and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! External tool delegates.
//!
//! Rendering, Mermaid translation, and Excalidraw verification all lean on
//! tools from the upstream ecosystems rather than reimplementing their
//! renderers. Each capability is a trait so the server stays testable
//! without node or a drawio install; the `Process*` implementations shell
//! out to the real tools.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug)]
pub enum ExternalToolError {
    /// The tool binary could not be spawned at all.
    Unavailable { tool: &'static str, hint: &'static str },
    /// The tool ran and reported failure.
    Failed { tool: &'static str, status: Option<i32>, stdout: String, stderr: String },
    Io { tool: &'static str, source: std::io::Error },
}

impl fmt::Display for ExternalToolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable { tool, hint } => {
                write!(f, "{tool} is not available ({hint})")
            }
            Self::Failed { tool, status, stderr, .. } => {
                write!(f, "{tool} failed")?;
                if let Some(status) = status {
                    write!(f, " (exit {status})")?;
                }
                if !stderr.is_empty() {
                    write!(f, ": {}", stderr.trim())?;
                }
                Ok(())
            }
            Self::Io { tool, source } => write!(f, "{tool}: {source}"),
        }
    }
}

impl std::error::Error for ExternalToolError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Renders a diagram file to a raster/vector image file.
pub trait Renderer: Send + Sync {
    fn render(
        &self,
        input: &Path,
        output: &Path,
        width: u32,
        height: u32,
    ) -> Result<(), ExternalToolError>;
}

/// Translates Mermaid source text into an Excalidraw scene document.
pub trait MermaidTranslator: Send + Sync {
    fn translate(&self, mermaid: &str) -> Result<String, ExternalToolError>;
}

/// Checks that a scene file is accepted by the real Excalidraw application,
/// returning the PNG it exported as proof.
pub trait Verifier: Send + Sync {
    fn verify(&self, scene: &Path) -> Result<Vec<u8>, ExternalToolError>;
}

fn run(tool: &'static str, hint: &'static str, command: &mut Command) -> Result<std::process::Output, ExternalToolError> {
    let output = command.output().map_err(|err| {
        if err.kind() == std::io::ErrorKind::NotFound {
            ExternalToolError::Unavailable { tool, hint }
        } else {
            ExternalToolError::Io { tool, source: err }
        }
    })?;
    if !output.status.success() {
        return Err(ExternalToolError::Failed {
            tool,
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        });
    }
    Ok(output)
}

static SCRATCH_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// A unique scratch file path in the system temp directory. The file is not
/// created; callers own the full lifecycle.
fn scratch_path(suffix: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.subsec_nanos())
        .unwrap_or(0);
    std::env::temp_dir().join(format!(
        "proteus-{}-{}-{}{suffix}",
        std::process::id(),
        nanos,
        SCRATCH_COUNTER.fetch_add(1, Ordering::Relaxed)
    ))
}

/// Renders through the draw.io desktop CLI (`drawio -x`).
#[derive(Debug, Default)]
pub struct ProcessRenderer;

impl Renderer for ProcessRenderer {
    fn render(
        &self,
        input: &Path,
        output: &Path,
        width: u32,
        height: u32,
    ) -> Result<(), ExternalToolError> {
        const TOOL: &str = "drawio";
        const HINT: &str = "install the draw.io desktop app and ensure 'drawio' is on PATH";

        let format = output
            .extension()
            .map(|extension| extension.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_else(|| "png".to_owned());
        run(
            TOOL,
            HINT,
            Command::new("drawio")
                .arg("-x")
                .arg("-f")
                .arg(&format)
                .arg("-o")
                .arg(output)
                .arg("--width")
                .arg(width.to_string())
                .arg("--height")
                .arg(height.to_string())
                .arg(input),
        )?;
        Ok(())
    }
}

/// Translates via `npx @excalidraw/mermaid-to-excalidraw`.
#[derive(Debug, Default)]
pub struct ProcessMermaidTranslator;

impl MermaidTranslator for ProcessMermaidTranslator {
    fn translate(&self, mermaid: &str) -> Result<String, ExternalToolError> {
        const TOOL: &str = "@excalidraw/mermaid-to-excalidraw";
        const HINT: &str = "requires node; run 'npx @excalidraw/mermaid-to-excalidraw' once to install";

        let input = scratch_path(".mmd");
        let output = scratch_path(".excalidraw");
        fs::write(&input, mermaid.trim())
            .map_err(|source| ExternalToolError::Io { tool: TOOL, source })?;

        let result = run(
            TOOL,
            HINT,
            Command::new("npx")
                .arg("@excalidraw/mermaid-to-excalidraw")
                .arg(&input)
                .arg("-o")
                .arg(&output),
        )
        .and_then(|_| {
            fs::read_to_string(&output)
                .map_err(|source| ExternalToolError::Io { tool: TOOL, source })
        });

        let _ = fs::remove_file(&input);
        let _ = fs::remove_file(&output);
        result
    }
}

/// Verifies through `excalidraw-brute-export-cli`, which loads the scene in
/// the actual Excalidraw web app; a file it cannot open would show the same
/// error to a human user.
#[derive(Debug, Default)]
pub struct ProcessVerifier;

impl Verifier for ProcessVerifier {
    fn verify(&self, scene: &Path) -> Result<Vec<u8>, ExternalToolError> {
        const TOOL: &str = "excalidraw-brute-export-cli";
        const HINT: &str = "install with: npm install -g excalidraw-brute-export-cli";

        let output = scratch_path(".png");
        let result = run(
            TOOL,
            HINT,
            Command::new("npx")
                .arg("excalidraw-brute-export-cli")
                .arg("-i")
                .arg(scene)
                .arg("--format")
                .arg("png")
                .arg("--background")
                .arg("1")
                .arg("--scale")
                .arg("1")
                .arg("-o")
                .arg(&output),
        )
        .and_then(|_| {
            fs::read(&output).map_err(|source| ExternalToolError::Io { tool: TOOL, source })
        });

        let _ = fs::remove_file(&output);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::ExternalToolError;

    #[test]
    fn display_includes_exit_status_and_stderr() {
        let err = ExternalToolError::Failed {
            tool: "drawio",
            status: Some(3),
            stdout: String::new(),
            stderr: "no display found\n".to_owned(),
        };
        let rendered = err.to_string();
        assert!(rendered.contains("drawio"));
        assert!(rendered.contains("exit 3"));
        assert!(rendered.contains("no display found"));
    }

    #[test]
    fn display_carries_the_install_hint() {
        let err = ExternalToolError::Unavailable {
            tool: "excalidraw-brute-export-cli",
            hint: "install with: npm install -g excalidraw-brute-export-cli",
        };
        assert!(err.to_string().contains("npm install -g"));
    }
}
