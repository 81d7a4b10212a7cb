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

//! KVPool CLI Tool
//!
//! ## Purpose
//! Operator commands against the Redis pool:
//! - Clear keys by pattern
//! - Print key namespaces
//! - Register Lua scripts from a directory
//! - Run the pool until the process is signalled
//!
//! Configuration comes from `--config <file.toml>`, or from `KVPOOL_REDIS_*`
//! environment variables when no file is given.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod pool;

#[derive(Parser)]
#[command(name = "kvpool")]
#[command(about = "KVPool CLI - Manage the Redis connection pool", long_about = None)]
struct Cli {
    /// Pool configuration file (TOML). Defaults to KVPOOL_REDIS_* variables.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Delete every key matching a glob pattern
    Clear {
        /// Redis glob pattern (e.g. "app:cache:*")
        pattern: String,
    },

    /// Print the namespace for the given names under the configured prefix
    Namespace {
        /// Namespace components
        names: Vec<String>,
    },

    /// Register <dir>/<bundle>/<script>.lua and print its handle
    LoadScript {
        /// Root directory of script bundles
        dir: PathBuf,

        /// Bundle name
        bundle: String,

        /// Script name, without the .lua extension
        script: String,
    },

    /// Start the pool and keep it up until SIGTERM or Ctrl-C
    Run {
        /// Log pool statistics at this interval (seconds, 0 disables)
        #[arg(long, default_value_t = 0)]
        stats_interval_secs: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    if let Err(e) = kvpool::init_tracing() {
        eprintln!("Tracing disabled: {}", e);
    }

    let config = pool::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Clear { pattern } => pool::clear(config, &pattern).await,
        Commands::Namespace { names } => {
            pool::namespace(config, &names);
            Ok(())
        }
        Commands::LoadScript { dir, bundle, script } => {
            pool::load_script(config, &dir, &bundle, &script).await
        }
        Commands::Run {
            stats_interval_secs,
        } => pool::run(config, stats_interval_secs).await,
    }
}
