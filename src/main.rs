// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Proteus-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Proteus and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! Proteus CLI entrypoint.
//!
//! By default this serves MCP over stdio (intended for tool integrations).
//! Use `--http` to serve MCP over streamable HTTP at
//! `http://127.0.0.1:<port>/mcp` instead.

use std::error::Error;
use std::path::Path;
use std::sync::Arc;

use axum::Router;
use rmcp::transport::{
    streamable_http_server::session::local::LocalSessionManager, StreamableHttpServerConfig,
    StreamableHttpService,
};

const DEFAULT_HTTP_PORT: u16 = 27436;

fn print_usage(program: &str) {
    eprintln!(
        "Usage:\n  {program} [<project-dir>]\n  {program} [--root <project-dir>]\n  {program} [<project-dir>] --http [--http-port <port>]\n\nAll diagram paths the MCP tools accept are relative to the project\ndirectory; nothing outside it is ever read or written.\n\nIf project-dir/--root is omitted, $PROTEUS_PROJECT_DIR is used, then the\ncurrent working directory.\n\nStdio mode (default) is for MCP clients spawning the server directly.\n--http serves MCP over streamable HTTP at `http://127.0.0.1:<port>/mcp`.\n--http-port selects the port (0 = ephemeral; default {DEFAULT_HTTP_PORT})."
    );
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
struct CliOptions {
    http: bool,
    project_dir: Option<String>,
    http_port: Option<u16>,
}

fn parse_options(mut args: impl Iterator<Item = String>) -> Result<CliOptions, ()> {
    let mut options = CliOptions::default();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--http" => {
                if options.http {
                    return Err(());
                }
                options.http = true;
            }
            "--root" => {
                if options.project_dir.is_some() {
                    return Err(());
                }
                let dir = args.next().ok_or(())?;
                options.project_dir = Some(dir);
            }
            "--http-port" => {
                if options.http_port.is_some() {
                    return Err(());
                }
                let raw = args.next().ok_or(())?;
                let port: u16 = raw.parse().map_err(|_| ())?;
                options.http_port = Some(port);
            }
            _ if arg.starts_with('-') => return Err(()),
            _ => {
                if options.project_dir.is_some() {
                    return Err(());
                }
                options.project_dir = Some(arg);
            }
        }
    }

    if options.http_port.is_some() && !options.http {
        return Err(());
    }

    Ok(options)
}

fn main() {
    let result = (|| -> Result<(), Box<dyn Error>> {
        let mut args = std::env::args();
        let program = args.next().unwrap_or_else(|| "proteus".to_owned());

        let options = match parse_options(args) {
            Ok(options) => options,
            Err(()) => {
                print_usage(&program);
                std::process::exit(2);
            }
        };

        let dir = options
            .project_dir
            .or_else(|| std::env::var("PROTEUS_PROJECT_DIR").ok())
            .unwrap_or_else(|| ".".to_owned());
        let root = proteus::store::ProjectRoot::new(Path::new(&dir))?;
        let mcp = proteus::mcp::ProteusMcp::new(root);

        let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build()?;

        if !options.http {
            runtime.block_on(mcp.serve_stdio())?;
            return Ok(());
        }

        let http_port = options.http_port.unwrap_or(DEFAULT_HTTP_PORT);
        runtime.block_on(async move {
            let listener = tokio::net::TcpListener::bind(("127.0.0.1", http_port)).await?;
            eprintln!(
                "proteus: serving MCP at http://{}/mcp",
                listener.local_addr()?
            );

            let config = StreamableHttpServerConfig {
                stateful_mode: true,
                ..StreamableHttpServerConfig::default()
            };
            let shutdown_token = config.cancellation_token.clone();

            let session_manager = Arc::new(LocalSessionManager::default());
            let mcp_service = {
                let mcp = mcp.clone();
                StreamableHttpService::new(move || Ok(mcp.clone()), session_manager, config)
            };

            let router = Router::new().nest_service("/mcp", mcp_service);
            let serve = axum::serve(listener, router).with_graceful_shutdown(async move {
                shutdown_token.cancelled().await;
            });
            serve.await?;
            Ok::<(), Box<dyn Error>>(())
        })?;
        Ok(())
    })();

    if let Err(err) = result {
        eprintln!("proteus: {err}");
        std::process::exit(1);
    }
}
