//! Storage manager: the shared buffer's durable-persistence consumer.
//!
//! Grounded in `sensor_db.c`'s `storagemgr_parse_sensor_data` drain loop
//! and its bounded-retry `init_connection`. Exhausting the retry budget
//! is the one path in this system that raises a global abort: every
//! other worker treats this as the signal to stop, per the error
//! handling design.

use crate::coordinator::{Context, ShutdownState};
use crate::logger::Source;
use crate::model::WorkerStatus;
use crate::sbuffer::{PopOutcome, STORAGE_MANAGER_READER};
use crate::storage::StorageSink;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{error, info, warn};

pub struct StorageManager {
    ctx: Arc<Context>,
    database_path: PathBuf,
    init_attempts: u32,
}

impl StorageManager {
    pub fn new(ctx: Arc<Context>, database_path: PathBuf, init_attempts: u32) -> Self {
        Self {
            ctx,
            database_path,
            init_attempts,
        }
    }

    pub fn run(self) -> WorkerStatus {
        let sink = match self.open_with_retries() {
            Some(sink) => sink,
            None => {
                error!("storage manager exhausted init attempts, aborting pipeline");
                self.ctx
                    .log
                    .log(Source::StorageManager, "could not open database, aborting");
                self.ctx.abort();
                return WorkerStatus::Failed;
            }
        };

        info!("storage manager started");
        self.ctx.log.log(Source::StorageManager, "started");

        loop {
            if self.ctx.state() == ShutdownState::Aborted {
                self.ctx.log.log(Source::StorageManager, "signalled to terminate");
                return WorkerStatus::Interrupted;
            }

            match self.ctx.buffer.pop(STORAGE_MANAGER_READER) {
                PopOutcome::Success(reading) => {
                    if let Err(e) = sink.insert(&reading) {
                        warn!(error = %e, "failed to insert reading");
                        self.ctx
                            .log
                            .log(Source::StorageManager, format!("insert failed: {e}"));
                    }
                }
                PopOutcome::AlreadyConsumed => continue,
                PopOutcome::NoData => {
                    if self.ctx.state() == ShutdownState::Open {
                        thread::yield_now();
                        continue;
                    } else {
                        break;
                    }
                }
            }
        }

        self.ctx.log.log(Source::StorageManager, "shut down");
        WorkerStatus::Success
    }

    fn open_with_retries(&self) -> Option<StorageSink> {
        for attempt in 1..=self.init_attempts {
            match StorageSink::open(&self.database_path) {
                Ok(sink) => return Some(sink),
                Err(e) => {
                    warn!(attempt, error = %e, "failed to open database");
                    self.ctx.log.log(
                        Source::StorageManager,
                        format!("database open attempt {attempt} failed: {e}"),
                    );
                    if attempt < self.init_attempts {
                        thread::sleep(Duration::from_millis(100));
                    }
                }
            }
        }
        None
    }
}
