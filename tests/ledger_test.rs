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

//! Ledger public API integration tests.

use point_ledger::{
    BalanceStore, HistoryStore, Ledger, LedgerError, MAX_CHARGE, MAX_USE, MIN_CHARGE, MIN_USE,
    TransactionType, UserId,
};

fn summary(ledger: &Ledger, user: i64) -> Vec<(TransactionType, i64)> {
    ledger
        .history(UserId(user))
        .iter()
        .map(|entry| (entry.kind, entry.amount))
        .collect()
}

#[test]
fn non_positive_user_is_rejected() {
    let ledger = Ledger::new();

    for user in [0, -1, -100, i64::MIN] {
        for amount in [0, 50, 1_000, 60_000] {
            assert_eq!(
                ledger.charge(UserId(user), amount),
                Err(LedgerError::InvalidUser)
            );
            assert_eq!(
                ledger.use_points(UserId(user), amount),
                Err(LedgerError::InvalidUser)
            );
        }
    }
    assert!(ledger.history_store().is_empty());
}

#[test]
fn out_of_range_amount_is_rejected() {
    let ledger = Ledger::new();
    ledger.charge(UserId(1), 10_000).unwrap();

    for amount in [i64::MIN, -100, 0, 99, 50_001, i64::MAX] {
        assert!(matches!(
            ledger.charge(UserId(1), amount),
            Err(LedgerError::InvalidAmount { .. })
        ));
        assert!(matches!(
            ledger.use_points(UserId(1), amount),
            Err(LedgerError::InvalidAmount { .. })
        ));
    }

    assert_eq!(ledger.balance(UserId(1)).point, 10_000);
    assert_eq!(ledger.history(UserId(1)).len(), 1);
}

#[test]
fn boundary_amounts_are_accepted() {
    let ledger = Ledger::new();

    ledger.charge(UserId(1), MIN_CHARGE).unwrap();
    ledger.charge(UserId(1), MAX_CHARGE).unwrap();
    ledger.use_points(UserId(1), MIN_USE).unwrap();
    ledger.use_points(UserId(1), MAX_USE).unwrap();

    assert_eq!(ledger.balance(UserId(1)).point, 0);
}

#[test]
fn unseen_user_has_zero_balance_and_no_history() {
    let ledger = Ledger::new();

    assert_eq!(ledger.balance(UserId(99)).point, 0);
    assert!(ledger.history(UserId(99)).is_empty());
}

#[test]
fn lazy_creation_is_idempotent() {
    let ledger = Ledger::new();

    let first = ledger.balance(UserId(5));
    let second = ledger.balance(UserId(5));

    assert_eq!(first, second);
    assert_eq!(ledger.balances().len(), 1);
}

#[test]
fn insufficient_balance_leaves_state_untouched() {
    let ledger = Ledger::new();
    ledger.charge(UserId(1), 8_000).unwrap();

    let result = ledger.use_points(UserId(1), 9_500);
    assert_eq!(result, Err(LedgerError::InsufficientBalance));

    assert_eq!(ledger.balance(UserId(1)).point, 8_000);
    assert_eq!(summary(&ledger, 1), vec![(TransactionType::Charge, 8_000)]);
}

#[test]
fn use_on_new_user_fails() {
    let ledger = Ledger::new();
    assert_eq!(
        ledger.use_points(UserId(1), 100),
        Err(LedgerError::InsufficientBalance)
    );
}

#[test]
fn use_of_entire_balance_succeeds() {
    let ledger = Ledger::new();
    ledger.charge(UserId(1), 3_000).unwrap();

    let balance = ledger.use_points(UserId(1), 3_000).unwrap();
    assert_eq!(balance.point, 0);
}

#[test]
fn sequential_charges_accumulate() {
    let ledger = Ledger::new();

    assert_eq!(ledger.charge(UserId(1), 4_500).unwrap().point, 4_500);
    assert_eq!(ledger.charge(UserId(1), 4_500).unwrap().point, 9_000);

    assert_eq!(
        summary(&ledger, 1),
        vec![
            (TransactionType::Charge, 4_500),
            (TransactionType::Charge, 4_500)
        ]
    );
}

#[test]
fn mixed_sequence() {
    let ledger = Ledger::new();
    ledger.charge(UserId(1), 4_500).unwrap();
    ledger.charge(UserId(1), 4_500).unwrap();
    let balance = ledger.use_points(UserId(1), 5_000).unwrap();

    assert_eq!(balance.point, 4_000);
    let history = summary(&ledger, 1);
    assert_eq!(history.len(), 3);
    assert_eq!(history.last(), Some(&(TransactionType::Use, 5_000)));
}

#[test]
fn accumulated_balance_may_exceed_charge_cap() {
    let ledger = Ledger::new();
    for _ in 0..10 {
        ledger.charge(UserId(1), MAX_CHARGE).unwrap();
    }
    assert_eq!(ledger.balance(UserId(1)).point, 10 * MAX_CHARGE);
}

#[test]
fn users_are_isolated() {
    let ledger = Ledger::new();
    ledger.charge(UserId(1), 1_000).unwrap();
    ledger.charge(UserId(2), 2_000).unwrap();
    ledger.use_points(UserId(2), 500).unwrap();

    assert_eq!(ledger.balance(UserId(1)).point, 1_000);
    assert_eq!(ledger.balance(UserId(2)).point, 1_500);
    assert_eq!(ledger.history(UserId(1)).len(), 1);
    assert_eq!(ledger.history(UserId(2)).len(), 2);
}

#[test]
fn history_ids_are_store_wide_and_increasing() {
    let ledger = Ledger::new();
    ledger.charge(UserId(1), 1_000).unwrap();
    ledger.charge(UserId(2), 1_000).unwrap();
    ledger.use_points(UserId(1), 100).unwrap();

    let ids: Vec<_> = ledger.history(UserId(1)).iter().map(|h| h.id.0).collect();
    assert_eq!(ids, vec![1, 3]);
    assert_eq!(ledger.history(UserId(2))[0].id.0, 2);
}

#[test]
fn every_history_entry_matches_its_balance_timestamp() {
    let ledger = Ledger::new();
    let mut stamps = Vec::new();
    stamps.push(ledger.charge(UserId(1), 1_000).unwrap().updated_at);
    stamps.push(ledger.use_points(UserId(1), 400).unwrap().updated_at);
    stamps.push(ledger.charge(UserId(1), 200).unwrap().updated_at);

    let recorded: Vec<_> = ledger
        .history(UserId(1))
        .iter()
        .map(|h| h.recorded_at)
        .collect();
    assert_eq!(recorded, stamps);
    assert!(stamps.windows(2).all(|w| w[0] <= w[1]));
}

#[test]
fn seeded_balance_is_used() {
    let ledger = Ledger::new();
    ledger.balance_store().put(UserId(3), 1_000);

    let balance = ledger.use_points(UserId(3), 100).unwrap();
    assert_eq!(balance.point, 900);
}

#[test]
fn charge_returns_stored_balance() {
    let ledger = Ledger::new();
    let returned = ledger.charge(UserId(1), 700).unwrap();
    assert_eq!(returned, ledger.balance(UserId(1)));
}

#[test]
fn balance_serializes_to_json() {
    let ledger = Ledger::new();
    ledger.charge(UserId(1), 700).unwrap();

    let json = serde_json::to_value(ledger.balance(UserId(1))).unwrap();
    assert_eq!(json["user_id"], 1);
    assert_eq!(json["point"], 700);
    assert!(json["updated_at"].is_string());

    let json = serde_json::to_value(ledger.history(UserId(1))).unwrap();
    assert_eq!(json[0]["id"], 1);
    assert_eq!(json[0]["type"], "CHARGE");
    assert_eq!(json[0]["amount"], 700);
}
