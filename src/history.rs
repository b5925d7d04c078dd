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

//! Point history.
//!
//! Every successful charge or use appends exactly one [`PointHistory`] entry.
//! Entries are immutable; a user's history is returned in insertion order.

use crate::base::{HistoryId, Point, UserId};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Kind of balance mutation a history entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionType {
    Charge,
    Use,
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Charge => f.write_str("CHARGE"),
            Self::Use => f.write_str("USE"),
        }
    }
}

/// A single recorded charge or use.
///
/// `amount` is always the magnitude of the transaction, never the resulting
/// balance. `recorded_at` is copied from the balance the mutation produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointHistory {
    pub id: HistoryId,
    pub user_id: UserId,
    pub amount: Point,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    pub recorded_at: DateTime<Utc>,
}

/// Append-only storage for point history.
pub trait HistoryStore: Send + Sync {
    /// Assigns the next sequence id, stores the entry and returns it.
    fn append(
        &self,
        user_id: UserId,
        amount: Point,
        kind: TransactionType,
        recorded_at: DateTime<Utc>,
    ) -> PointHistory;

    /// Returns all entries for `user_id` in insertion order.
    fn list_by_user(&self, user_id: UserId) -> Vec<PointHistory>;

    /// Total number of entries across all users.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// In-process [`HistoryStore`].
///
/// Ids come from a store-wide counter; entries are bucketed per user. Appends
/// for one user are serialized by that user's guard, so each bucket is in id
/// order.
#[derive(Debug)]
pub struct MemoryHistoryStore {
    next_id: AtomicU64,
    entries: DashMap<UserId, Vec<PointHistory>>,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            entries: DashMap::new(),
        }
    }

    /// Returns every entry across all users ordered by id.
    pub fn all(&self) -> Vec<PointHistory> {
        let mut all: Vec<PointHistory> = self
            .entries
            .iter()
            .flat_map(|bucket| bucket.value().clone())
            .collect();
        all.sort_by_key(|entry| entry.id);
        all
    }
}

impl Default for MemoryHistoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl HistoryStore for MemoryHistoryStore {
    fn append(
        &self,
        user_id: UserId,
        amount: Point,
        kind: TransactionType,
        recorded_at: DateTime<Utc>,
    ) -> PointHistory {
        let mut bucket = self.entries.entry(user_id).or_default();
        // Drawn while the bucket is held so a bucket never sees ids out of order.
        let id = HistoryId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let entry = PointHistory {
            id,
            user_id,
            amount,
            kind,
            recorded_at,
        };
        bucket.push(entry);
        entry
    }

    fn list_by_user(&self, user_id: UserId) -> Vec<PointHistory> {
        self.entries
            .get(&user_id)
            .map(|bucket| bucket.value().clone())
            .unwrap_or_default()
    }

    fn len(&self) -> usize {
        (self.next_id.load(Ordering::SeqCst) - 1) as usize
    }
}
