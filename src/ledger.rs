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

//! Point ledger service.
//!
//! The [`Ledger`] validates charge and use requests and applies them to the
//! balance and history stores as one read-modify-write under a FIFO guard.
//!
//! # Operations
//!
//! - **Charge**: Adds `amount` to the user's balance, creating it if needed.
//! - **Use**: Subtracts `amount` from the user's balance (fails if insufficient).
//! - **Balance**: Reads the current balance without taking the guard.
//! - **History**: Reads the user's history without taking the guard.
//!
//! # Thread Safety
//!
//! Mutations for the same user are linearized in the order they reached the
//! guard. With [`LockScope::PerUser`] different users never wait on each other.
//! Plain reads may observe a balance whose history entry is not yet appended.

use crate::balance::{BalanceStore, MemoryBalanceStore, UserBalance};
use crate::base::{Point, UserId};
use crate::config::{LedgerConfig, LockScope};
use crate::error::LedgerError;
use crate::guard::GuardTable;
use crate::history::{HistoryStore, MemoryHistoryStore, PointHistory, TransactionType};
use tracing::debug;

/// Smallest amount accepted by [`Ledger::charge`].
pub const MIN_CHARGE: Point = 100;
/// Largest amount accepted by [`Ledger::charge`].
pub const MAX_CHARGE: Point = 50_000;
/// Smallest amount accepted by [`Ledger::use_points`].
pub const MIN_USE: Point = 100;
/// Largest amount accepted by [`Ledger::use_points`].
pub const MAX_USE: Point = 50_000;

/// Per-user point ledger.
///
/// # Invariants
///
/// - A balance is never negative.
/// - Every successful mutation appends exactly one history entry carrying the
///   transaction magnitude and the resulting balance's timestamp.
/// - A rejected request writes nothing.
pub struct Ledger<B = MemoryBalanceStore, H = MemoryHistoryStore> {
    balances: B,
    history: H,
    guards: GuardTable,
}

impl Ledger {
    /// Creates an in-memory ledger with per-user locking.
    pub fn new() -> Self {
        Self::with_config(LedgerConfig::default())
    }

    /// Creates an in-memory ledger with the given configuration.
    pub fn with_config(config: LedgerConfig) -> Self {
        Self::with_stores(MemoryBalanceStore::new(), MemoryHistoryStore::new(), config)
    }
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: BalanceStore, H: HistoryStore> Ledger<B, H> {
    /// Creates a ledger over caller-supplied stores.
    pub fn with_stores(balances: B, history: H, config: LedgerConfig) -> Self {
        Self {
            balances,
            history,
            guards: GuardTable::new(config.lock_scope),
        }
    }

    pub fn lock_scope(&self) -> LockScope {
        self.guards.scope()
    }

    /// Adds `amount` points to the user's balance.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidUser`] - `user_id` is not positive.
    /// - [`LedgerError::InvalidAmount`] - `amount` is outside [`MIN_CHARGE`]..=[`MAX_CHARGE`].
    /// - [`LedgerError::BalanceOverflow`] - The new balance does not fit in a [`Point`].
    pub fn charge(&self, user_id: UserId, amount: Point) -> Result<UserBalance, LedgerError> {
        validate_user(user_id)
            .and_then(|()| validate_amount(amount, MIN_CHARGE, MAX_CHARGE))
            .and_then(|()| {
                self.apply(user_id, amount, TransactionType::Charge, |current| {
                    current
                        .checked_add(amount)
                        .ok_or(LedgerError::BalanceOverflow)
                })
            })
            .inspect_err(|e| debug!(%user_id, amount, error = %e, "charge rejected"))
    }

    /// Subtracts `amount` points from the user's balance.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidUser`] - `user_id` is not positive.
    /// - [`LedgerError::InvalidAmount`] - `amount` is outside [`MIN_USE`]..=[`MAX_USE`].
    /// - [`LedgerError::InsufficientBalance`] - `amount` exceeds the current balance.
    pub fn use_points(&self, user_id: UserId, amount: Point) -> Result<UserBalance, LedgerError> {
        validate_user(user_id)
            .and_then(|()| validate_amount(amount, MIN_USE, MAX_USE))
            .and_then(|()| {
                self.apply(user_id, amount, TransactionType::Use, |current| {
                    if amount > current {
                        return Err(LedgerError::InsufficientBalance);
                    }
                    Ok(current - amount)
                })
            })
            .inspect_err(|e| debug!(%user_id, amount, error = %e, "use rejected"))
    }

    /// Returns the user's current balance, zero for unseen users.
    pub fn balance(&self, user_id: UserId) -> UserBalance {
        self.balances.get(user_id)
    }

    /// Returns the user's history in insertion order.
    pub fn history(&self, user_id: UserId) -> Vec<PointHistory> {
        self.history.list_by_user(user_id)
    }

    /// Returns every materialized balance ordered by user id.
    pub fn balances(&self) -> Vec<UserBalance> {
        let mut balances = self.balances.snapshot();
        balances.sort_by_key(|balance| balance.user_id);
        balances
    }

    pub fn balance_store(&self) -> &B {
        &self.balances
    }

    pub fn history_store(&self) -> &H {
        &self.history
    }

    /// Runs one read-modify-write for `user_id` while holding its guard.
    ///
    /// `next` maps the current point total to the new one or rejects the
    /// request; it runs before either store is written.
    fn apply<F>(
        &self,
        user_id: UserId,
        amount: Point,
        kind: TransactionType,
        next: F,
    ) -> Result<UserBalance, LedgerError>
    where
        F: FnOnce(Point) -> Result<Point, LedgerError>,
    {
        let lock = self.guards.lock_for(user_id);
        let _guard = lock.lock();

        let current = self.balances.get(user_id);
        let point = next(current.point)?;
        debug_assert!(
            point >= 0,
            "Invariant violated: balance for user {} went negative: {}",
            user_id,
            point
        );

        let updated = self.balances.put(user_id, point);
        let entry = self
            .history
            .append(user_id, amount, kind, updated.updated_at);

        debug!(
            %user_id,
            %kind,
            amount,
            point = updated.point,
            history_id = %entry.id,
            "points applied"
        );
        Ok(updated)
    }
}

fn validate_user(user_id: UserId) -> Result<(), LedgerError> {
    if user_id.is_valid() {
        Ok(())
    } else {
        Err(LedgerError::InvalidUser)
    }
}

fn validate_amount(amount: Point, min: Point, max: Point) -> Result<(), LedgerError> {
    if (min..=max).contains(&amount) {
        Ok(())
    } else {
        Err(LedgerError::InvalidAmount { min, max })
    }
}
