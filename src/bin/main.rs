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

use clap::{Parser, ValueEnum};
use crossbeam::channel::{self, Sender};
use csv::{ReaderBuilder, Trim, Writer};
use point_ledger::{Ledger, LedgerConfig, LockScope, Point, UserId};
use serde::Deserialize;
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::PathBuf;
use std::process;
use std::sync::atomic::{AtomicUsize, Ordering};
use thiserror::Error;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Point Ledger - Replay charge/use CSV files
///
/// Applies every row of the input file to an in-memory ledger and writes the
/// resulting balances (or the full history) to stdout.
#[derive(Parser, Debug)]
#[command(name = "point-ledger")]
#[command(about = "Replays point charge/use CSVs against an in-memory ledger", long_about = None)]
struct Args {
    /// Path to CSV file with operations
    ///
    /// Expected format: type,user_id,amount
    /// Example: cargo run -- operations.csv > balances.csv
    #[arg(value_name = "FILE")]
    input: PathBuf,

    /// Worker threads; rows are sharded by user so per-user order is kept
    #[arg(short, long, default_value_t = 4, value_parser = clap::value_parser!(u16).range(1..))]
    workers: u16,

    /// Granularity of the mutation guard
    #[arg(long, value_enum, default_value_t = ScopeArg::PerUser)]
    lock_scope: ScopeArg,

    /// Write the full history instead of balances
    #[arg(long)]
    history: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ScopeArg {
    Global,
    PerUser,
}

impl From<ScopeArg> for LockScope {
    fn from(arg: ScopeArg) -> Self {
        match arg {
            ScopeArg::Global => LockScope::Global,
            ScopeArg::PerUser => LockScope::PerUser,
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let file = match File::open(&args.input) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Error opening file '{}': {}", args.input.display(), e);
            process::exit(1);
        }
    };

    let config = LedgerConfig::new().with_lock_scope(args.lock_scope.into());
    let ledger = Ledger::with_config(config);

    match replay(BufReader::new(file), &ledger, usize::from(args.workers)) {
        Ok(summary) => info!(
            applied = summary.applied,
            rejected = summary.rejected,
            skipped = summary.skipped,
            "replay finished"
        ),
        Err(e) => {
            eprintln!("Error processing operations: {}", e);
            process::exit(1);
        }
    }

    let written = if args.history {
        write_history(&ledger, std::io::stdout())
    } else {
        write_balances(&ledger, std::io::stdout())
    };
    if let Err(e) = written {
        eprintln!("Error writing output: {}", e);
        process::exit(1);
    }
}

#[derive(Debug, Error)]
enum ReplayError {
    #[error("csv: {0}")]
    Csv(#[from] csv::Error),

    #[error("a replay worker panicked")]
    WorkerPanicked,
}

/// Outcome counts of a replay.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct ReplaySummary {
    applied: usize,
    rejected: usize,
    skipped: usize,
}

/// Raw CSV record matching the input format.
///
/// Fields: `type, user_id, amount`
#[derive(Debug, Deserialize)]
struct CsvRecord {
    #[serde(rename = "type")]
    op_type: String,
    user_id: i64,
    amount: Point,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operation {
    Charge { user_id: UserId, amount: Point },
    Use { user_id: UserId, amount: Point },
}

impl Operation {
    fn user_id(&self) -> UserId {
        match self {
            Self::Charge { user_id, .. } | Self::Use { user_id, .. } => *user_id,
        }
    }
}

impl CsvRecord {
    /// Returns `None` for unknown operation types.
    fn into_operation(self) -> Option<Operation> {
        let user_id = UserId(self.user_id);
        let amount = self.amount;

        match self.op_type.to_lowercase().as_str() {
            "charge" => Some(Operation::Charge { user_id, amount }),
            "use" => Some(Operation::Use { user_id, amount }),
            _ => None,
        }
    }
}

/// Replays operations from a CSV reader against `ledger`.
///
/// Rows are routed to `workers` threads by user id, so rows for one user are
/// applied in file order while different users run concurrently. Malformed
/// rows and rejected operations are logged and skipped.
///
/// # CSV Format
///
/// ```csv
/// type,user_id,amount
/// charge,1,4500
/// use,1,1000
/// ```
///
/// # Errors
///
/// Returns an error if the reader fails or a worker thread panics.
fn replay<R: Read>(reader: R, ledger: &Ledger, workers: usize) -> Result<ReplaySummary, ReplayError> {
    let workers = workers.max(1);
    let applied = AtomicUsize::new(0);
    let rejected = AtomicUsize::new(0);
    let mut skipped = 0;

    let mut rdr = ReaderBuilder::new()
        .trim(Trim::All)
        .has_headers(true)
        .from_reader(reader);

    let outcome = crossbeam::scope(|scope| {
        let mut shards: Vec<Sender<Operation>> = Vec::with_capacity(workers);

        for _ in 0..workers {
            let (tx, rx) = channel::bounded::<Operation>(1024);
            shards.push(tx);

            let applied = &applied;
            let rejected = &rejected;
            scope.spawn(move |_| {
                for op in rx {
                    let result = match op {
                        Operation::Charge { user_id, amount } => ledger.charge(user_id, amount),
                        Operation::Use { user_id, amount } => ledger.use_points(user_id, amount),
                    };
                    match result {
                        Ok(_) => applied.fetch_add(1, Ordering::Relaxed),
                        Err(_) => rejected.fetch_add(1, Ordering::Relaxed),
                    };
                }
            });
        }

        for result in rdr.deserialize::<CsvRecord>() {
            let op = match result.map(CsvRecord::into_operation) {
                Ok(Some(op)) => op,
                Ok(None) => {
                    debug!("Skipping unknown operation type");
                    skipped += 1;
                    continue;
                }
                Err(e) => {
                    debug!(error = %e, "Skipping malformed row");
                    skipped += 1;
                    continue;
                }
            };

            let shard = op.user_id().0.rem_euclid(workers as i64) as usize;
            // Workers only exit once their sender is dropped.
            let _ = shards[shard].send(op);
        }

        drop(shards);
    });

    outcome.map_err(|_| ReplayError::WorkerPanicked)?;

    Ok(ReplaySummary {
        applied: applied.into_inner(),
        rejected: rejected.into_inner(),
        skipped,
    })
}

/// Writes every balance to a CSV writer ordered by user id.
///
/// Columns: `user_id, point, updated_at`
fn write_balances<W: Write>(ledger: &Ledger, writer: W) -> Result<(), csv::Error> {
    let mut wtr = Writer::from_writer(writer);
    for balance in ledger.balances() {
        wtr.serialize(balance)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Writes the store-wide history to a CSV writer ordered by history id.
///
/// Columns: `id, user_id, amount, type, recorded_at`
fn write_history<W: Write>(ledger: &Ledger, writer: W) -> Result<(), csv::Error> {
    let mut wtr = Writer::from_writer(writer);
    for entry in ledger.history_store().all() {
        wtr.serialize(entry)?;
    }
    wtr.flush()?;
    Ok(())
}
