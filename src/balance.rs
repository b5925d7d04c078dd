// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Balance storage.
//!
//! A [`BalanceStore`] maps each user to exactly one [`UserBalance`]. Records
//! are materialized lazily with a zero balance on first access, so there is
//! no explicit account creation.
//!
//! Stores are plain keyed-assignment primitives: they never validate and
//! never fail. Read-modify-write atomicity is the caller's job, which in this
//! crate means the [`Ledger`](crate::Ledger) holding the user's guard.
//!
//! # Example
//!
//! ```
//! use point_ledger::{BalanceStore, MemoryBalanceStore, UserId};
//!
//! let store = MemoryBalanceStore::new();
//! assert_eq!(store.get(UserId(1)).point, 0);
//!
//! let updated = store.put(UserId(1), 500);
//! assert_eq!(updated.point, 500);
//! ```

use crate::base::{Point, UserId};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::{Deserialize, Serialize};

/// Current point balance of a single user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserBalance {
    pub user_id: UserId,
    pub point: Point,
    pub updated_at: DateTime<Utc>,
}

impl UserBalance {
    /// A zero balance stamped with the current time.
    pub fn empty(user_id: UserId) -> Self {
        Self {
            user_id,
            point: 0,
            updated_at: Utc::now(),
        }
    }
}

/// Keyed storage for user balances.
///
/// Implementations must be safe to share between threads, but are not
/// required to make `get` followed by `put` atomic.
pub trait BalanceStore: Send + Sync {
    /// Returns the stored balance, materializing a zero balance for unseen users.
    fn get(&self, user_id: UserId) -> UserBalance;

    /// Overwrites the balance for `user_id` and stamps it with the current time.
    fn put(&self, user_id: UserId, point: Point) -> UserBalance;

    /// Returns every materialized balance in no particular order.
    fn snapshot(&self) -> Vec<UserBalance>;
}

/// In-process [`BalanceStore`] backed by a [`DashMap`].
#[derive(Debug, Default)]
pub struct MemoryBalanceStore {
    balances: DashMap<UserId, UserBalance>,
}

impl MemoryBalanceStore {
    pub fn new() -> Self {
        Self {
            balances: DashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.balances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.balances.is_empty()
    }
}

impl BalanceStore for MemoryBalanceStore {
    fn get(&self, user_id: UserId) -> UserBalance {
        // Shared read for known users; the write lock is only taken to create.
        if let Some(balance) = self.balances.get(&user_id) {
            return *balance;
        }
        *self
            .balances
            .entry(user_id)
            .or_insert_with(|| UserBalance::empty(user_id))
    }

    fn put(&self, user_id: UserId, point: Point) -> UserBalance {
        let now = Utc::now();
        match self.balances.entry(user_id) {
            Entry::Occupied(mut entry) => {
                let balance = entry.get_mut();
                // Never step backwards, even if the wall clock does.
                balance.updated_at = balance.updated_at.max(now);
                balance.point = point;
                *balance
            }
            Entry::Vacant(entry) => *entry.insert(UserBalance {
                user_id,
                point,
                updated_at: now,
            }),
        }
    }

    fn snapshot(&self) -> Vec<UserBalance> {
        self.balances.iter().map(|entry| *entry.value()).collect()
    }
}
