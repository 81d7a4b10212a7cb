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

//! Key namespaces.

/// Prefix used when none is configured.
pub const DEFAULT_PREFIX: &str = "kvpool:";

/// Build a key namespace: `prefix + name1 + ":" + ... + nameN + ":"`.
///
/// A missing or blank prefix falls back to [`DEFAULT_PREFIX`]. The prefix is
/// used verbatim otherwise, so it should carry its own trailing separator.
///
/// ```rust
/// use kvpool_redis::namespace;
///
/// assert_eq!(namespace(Some("app:"), &["users", "42"]), "app:users:42:");
/// assert_eq!(namespace(None, &[]), "kvpool:");
/// ```
pub fn namespace(prefix: Option<&str>, names: &[&str]) -> String {
    let prefix = prefix
        .filter(|p| !p.trim().is_empty())
        .unwrap_or(DEFAULT_PREFIX);
    let names_len: usize = names.iter().map(|n| n.len() + 1).sum();
    let mut ns = String::with_capacity(prefix.len() + names_len);
    ns.push_str(prefix);
    for name in names {
        ns.push_str(name);
        ns.push(':');
    }
    ns
}
