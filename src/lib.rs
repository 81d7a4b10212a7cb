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

//! KVPool: a supervised, swappable Redis connection-pool executor
//!
//! Core design:
//! - One process-wide executor, inert until a pool is configured and started
//! - The pool and its script handles are swapped in and out as one unit
//! - Shutdown always leaves callers with a working (inert) executor
//!
//! The subsystem lives in the `kvpool-redis` crate and is re-exported here,
//! together with the logging setup shared by binaries.

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub use kvpool_redis::*;

/// Re-export of the subsystem crate under a short name.
pub use kvpool_redis as redis_pool;

// Logging setup for binaries and examples
pub mod tracing_setup;

pub use tracing_setup::init_tracing;
