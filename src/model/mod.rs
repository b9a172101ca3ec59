// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Proteus-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Proteus and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! The common diagram model shared by every format reader and writer.

mod diagram;

pub use diagram::{Diagram, Edge, IntegrityError, Node, TextElement};
