// SPDX-License-Identifier: LGPL-2.1-or-later
// Copyright (C) 2025 Shahzad A. Bhatti <bhatti@plexobject.com>
//
// This file is part of KVPool.
//
// KVPool is free software: you can redistribute it and/or modify
// it under the terms of the GNU Lesser General Public License as published by
// the Free Software Foundation, either version 2.1 of the License, or
// (at your option) any later version.
//
// KVPool is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Lesser General Public License for more details.
//
// You should have received a copy of the GNU Lesser General Public License
// along with KVPool. If not, see <https://www.gnu.org/licenses/>.

//! # Tracing Setup
//!
//! ## Purpose
//! Structured logging for KVPool binaries.
//!
//! ## Design Notes
//! - Uses `tracing` for structured logging throughout the workspace
//! - `RUST_LOG` overrides the default filter
//! - Initialization is fallible rather than panicking, so tests and
//!   embedding applications can call it more than once

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize tracing with the `info` level as default.
///
/// ## Configuration
/// - `RUST_LOG`: Log level filter (e.g., "info", "debug", "kvpool_redis=debug")
///
/// ## Examples
/// ```rust,ignore
/// kvpool::init_tracing()?;
/// ```
pub fn init_tracing() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    init_tracing_with_default("info")
}

/// Initialize tracing, using `default_filter` when `RUST_LOG` is unset.
///
/// ## Errors
/// Fails if `default_filter` does not parse or a global subscriber is
/// already installed.
pub fn init_tracing_with_default(
    default_filter: &str,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_filter)?,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .try_init()?;

    tracing::debug!("Tracing initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_fails_cleanly() {
        let _ = init_tracing_with_default("warn");
        // only one global subscriber per process
        assert!(init_tracing().is_err());
    }
}
