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

//! FIFO mutual exclusion for balance mutations.
//!
//! [`FairLock`] is a ticket lock: each caller draws a ticket on arrival and is
//! admitted only when the ticket is served, so waiters are admitted strictly
//! in the order they attempted acquisition and none can be overtaken.
//!
//! [`GuardTable`] owns the locks a [`Ledger`](crate::Ledger) needs, either a
//! single process-wide lock or one lock per user created on first use.

use crate::base::UserId;
use crate::config::LockScope;
use dashmap::DashMap;
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;

#[derive(Debug, Default)]
struct Tickets {
    /// Next ticket handed to an arriving caller.
    next: u64,
    /// Ticket currently allowed inside the critical section.
    serving: u64,
}

/// Waiters park on `turns[ticket % TURN_SLOTS]`.
const TURN_SLOTS: usize = 32;

/// First-in-first-out mutual exclusion lock.
///
/// A release wakes only the waiters sharing the next ticket's slot instead of
/// every waiter.
#[derive(Debug, Default)]
pub struct FairLock {
    tickets: Mutex<Tickets>,
    turns: [Condvar; TURN_SLOTS],
}

impl FairLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Blocks until every earlier caller has released the lock.
    pub fn lock(&self) -> FairLockGuard<'_> {
        let mut tickets = self.tickets.lock();
        let ticket = tickets.next;
        tickets.next = tickets.next.wrapping_add(1);
        let turn = &self.turns[slot(ticket)];
        while tickets.serving != ticket {
            turn.wait(&mut tickets);
        }
        FairLockGuard { lock: self }
    }

    /// Number of callers holding or waiting for the lock.
    pub fn queued(&self) -> u64 {
        let tickets = self.tickets.lock();
        tickets.next.wrapping_sub(tickets.serving)
    }

    fn unlock(&self) {
        let mut tickets = self.tickets.lock();
        tickets.serving = tickets.serving.wrapping_add(1);
        let next = tickets.serving;
        drop(tickets);
        self.turns[slot(next)].notify_all();
    }
}

fn slot(ticket: u64) -> usize {
    (ticket % TURN_SLOTS as u64) as usize
}

/// Releases its [`FairLock`] on drop, including during unwinding.
#[must_use = "the lock is released as soon as the guard is dropped"]
#[derive(Debug)]
pub struct FairLockGuard<'a> {
    lock: &'a FairLock,
}

impl Drop for FairLockGuard<'_> {
    fn drop(&mut self) {
        self.lock.unlock();
    }
}

/// Owner of the locks guarding balance mutations.
#[derive(Debug)]
pub enum GuardTable {
    /// One lock serializes every mutation in the process.
    Global(Arc<FairLock>),
    /// One lock per user, created lazily.
    PerUser(DashMap<UserId, Arc<FairLock>>),
}

impl GuardTable {
    pub fn new(scope: LockScope) -> Self {
        match scope {
            LockScope::Global => Self::Global(Arc::new(FairLock::new())),
            LockScope::PerUser => Self::PerUser(DashMap::new()),
        }
    }

    pub fn scope(&self) -> LockScope {
        match self {
            Self::Global(_) => LockScope::Global,
            Self::PerUser(_) => LockScope::PerUser,
        }
    }

    /// Returns the lock that guards `user_id`.
    ///
    /// The `Arc` is cloned out of the map so no shard lock is held while the
    /// caller blocks on the returned lock.
    pub fn lock_for(&self, user_id: UserId) -> Arc<FairLock> {
        match self {
            Self::Global(lock) => Arc::clone(lock),
            Self::PerUser(locks) => Arc::clone(
                locks
                    .entry(user_id)
                    .or_insert_with(|| Arc::new(FairLock::new()))
                    .value(),
            ),
        }
    }

    /// Number of distinct locks materialized so far.
    pub fn len(&self) -> usize {
        match self {
            Self::Global(_) => 1,
            Self::PerUser(locks) => locks.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn guard_releases_on_drop() {
        let lock = FairLock::new();
        {
            let _guard = lock.lock();
            assert_eq!(lock.queued(), 1);
        }
        assert_eq!(lock.queued(), 0);
        let _again = lock.lock();
    }

    #[test]
    fn guard_releases_on_panic() {
        let lock = Arc::new(FairLock::new());
        let inner = Arc::clone(&lock);

        let result = thread::spawn(move || {
            let _guard = inner.lock();
            panic!("boom");
        })
        .join();

        assert!(result.is_err());
        assert_eq!(lock.queued(), 0);
        let _guard = lock.lock();
    }

    #[test]
    fn waiter_blocks_until_release() {
        let lock = Arc::new(FairLock::new());
        let entered = Arc::new(AtomicBool::new(false));

        let guard = lock.lock();
        let handle = {
            let lock = Arc::clone(&lock);
            let entered = Arc::clone(&entered);
            thread::spawn(move || {
                let _guard = lock.lock();
                entered.store(true, Ordering::SeqCst);
            })
        };

        thread::sleep(Duration::from_millis(50));
        assert!(!entered.load(Ordering::SeqCst));

        drop(guard);
        handle.join().unwrap();
        assert!(entered.load(Ordering::SeqCst));
    }

    #[test]
    fn waiters_are_admitted_in_arrival_order() {
        let lock = Arc::new(FairLock::new());
        let order = Arc::new(Mutex::new(Vec::new()));

        let guard = lock.lock();
        let mut handles = Vec::new();
        for i in 0..8u64 {
            let waiter = Arc::clone(&lock);
            let order = Arc::clone(&order);
            handles.push(thread::spawn(move || {
                let _guard = waiter.lock();
                order.lock().push(i);
            }));
            // Wait until this thread holds a ticket before starting the next.
            while lock.queued() < i + 2 {
                thread::yield_now();
            }
        }

        drop(guard);
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(*order.lock(), (0..8).collect::<Vec<_>>());
    }

    #[test]
    fn order_holds_when_waiters_share_turn_slots() {
        const WAITERS: u64 = TURN_SLOTS as u64 * 2 + 5;
        let lock = Arc::new(FairLock::new());
        let order = Arc::new(Mutex::new(Vec::new()));

        let guard = lock.lock();
        let mut handles = Vec::new();
        for i in 0..WAITERS {
            let waiter = Arc::clone(&lock);
            let order = Arc::clone(&order);
            handles.push(thread::spawn(move || {
                let _guard = waiter.lock();
                order.lock().push(i);
            }));
            while lock.queued() < i + 2 {
                thread::yield_now();
            }
        }

        drop(guard);
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(*order.lock(), (0..WAITERS).collect::<Vec<_>>());
        assert_eq!(lock.queued(), 0);
    }

    #[test]
    fn slots_wrap_around() {
        assert_eq!(slot(0), 0);
        assert_eq!(slot(TURN_SLOTS as u64), 0);
        assert_eq!(slot(TURN_SLOTS as u64 + 3), 3);
        assert_eq!(slot(u64::MAX), (u64::MAX % TURN_SLOTS as u64) as usize);
    }

    #[test]
    fn global_table_shares_one_lock() {
        let table = GuardTable::new(LockScope::Global);
        let a = table.lock_for(UserId(1));
        let b = table.lock_for(UserId(2));

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(table.scope(), LockScope::Global);
    }

    #[test]
    fn per_user_table_creates_locks_lazily() {
        let table = GuardTable::new(LockScope::PerUser);
        assert!(table.is_empty());

        let a = table.lock_for(UserId(1));
        let again = table.lock_for(UserId(1));
        let b = table.lock_for(UserId(2));

        assert!(Arc::ptr_eq(&a, &again));
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn per_user_locks_do_not_block_each_other() {
        let table = GuardTable::new(LockScope::PerUser);
        let first = table.lock_for(UserId(1));
        let _held = first.lock();

        let other = table.lock_for(UserId(2));
        let _also_held = other.lock();
        assert_eq!(first.queued(), 1);
        assert_eq!(other.queued(), 1);
    }
}
