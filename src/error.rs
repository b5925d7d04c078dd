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

//! Error types for ledger operations.

use thiserror::Error;

/// Reasons a charge or use request is rejected.
///
/// Every variant is detected before either store is written, so a rejected
/// request leaves balances and history untouched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// User id is zero or negative
    #[error("invalid user id (must be positive)")]
    InvalidUser,

    /// Amount is outside the accepted range for the operation
    #[error("invalid amount (must be between {min} and {max})")]
    InvalidAmount { min: i64, max: i64 },

    /// Use amount exceeds the current balance
    #[error("insufficient point balance")]
    InsufficientBalance,

    /// Resulting balance does not fit in the point range
    #[error("point balance overflow")]
    BalanceOverflow,
}
