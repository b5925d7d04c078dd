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

//! # Point Ledger
//!
//! This library tracks a point balance per user together with an append-only
//! history of the charges and uses that produced it.
//!
//! ## Core Components
//!
//! - [`Ledger`]: Validates requests and applies them under a FIFO guard
//! - [`BalanceStore`]: Keyed balance storage with lazy zero-balance creation
//! - [`HistoryStore`]: Append-only transaction history queryable by user
//! - [`FairLock`]: Ticket lock admitting waiters in arrival order
//! - [`LedgerError`]: Reasons a request is rejected
//!
//! ## Example
//!
//! ```
//! use point_ledger::{Ledger, LedgerError, TransactionType, UserId};
//!
//! let ledger = Ledger::new();
//!
//! ledger.charge(UserId(1), 4_500).unwrap();
//! let balance = ledger.use_points(UserId(1), 1_000).unwrap();
//! assert_eq!(balance.point, 3_500);
//!
//! assert_eq!(
//!     ledger.use_points(UserId(1), 9_000),
//!     Err(LedgerError::InsufficientBalance)
//! );
//!
//! let history = ledger.history(UserId(1));
//! assert_eq!(history.len(), 2);
//! assert_eq!(history[1].kind, TransactionType::Use);
//! ```
//!
//! ## Thread Safety
//!
//! A [`Ledger`] is `Send + Sync` and meant to be shared behind an `Arc`.
//! Mutations on the same user are serialized in arrival order; with the
//! default [`LockScope::PerUser`] different users proceed in parallel.

mod balance;
mod base;
mod config;
pub mod error;
mod guard;
mod history;
mod ledger;

pub use balance::{BalanceStore, MemoryBalanceStore, UserBalance};
pub use base::{HistoryId, Point, UserId};
pub use config::{LedgerConfig, LockScope};
pub use error::LedgerError;
pub use guard::{FairLock, FairLockGuard, GuardTable};
pub use history::{HistoryStore, MemoryHistoryStore, PointHistory, TransactionType};
pub use ledger::{Ledger, MAX_CHARGE, MAX_USE, MIN_CHARGE, MIN_USE};
