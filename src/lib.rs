// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Proteus-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Proteus and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! Proteus — diagram interchange MCP server.
//!
//! One common model, three formats (draw.io, Excalidraw, SVG), and an MCP
//! tool surface for reading, writing, and converting diagram files inside a
//! confined project root.

pub mod convert;
pub mod external;
pub mod format;
pub mod mcp;
pub mod model;
pub mod store;
