//! Process-wide shared state and worker lifecycle.
//!
//! Replaces the original's two independent flags (`sbuffer_open`,
//! `*_fail_flag`) with one monotonic [`ShutdownState`] behind a single
//! lock, per the design notes' recommended resolution: a worker that
//! needs to know "should I keep running" takes one read lock instead of
//! two, and there is no window where the two flags disagree.

use crate::config::Config;
use crate::connmgr::ConnectionManager;
use crate::datamgr::DataManager;
use crate::error::GatewayError;
use crate::logger::{spawn_logger, LogSender};
use crate::model::WorkerStatus;
use crate::sbuffer::SharedBuffer;
use crate::storagemgr::StorageManager;
use std::sync::{Arc, Mutex, RwLock};
use std::thread;
use tracing::{info, warn};

/// The pipeline's single source of truth for "should producers/consumers
/// keep running".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownState {
    /// Normal operation; the connection manager may still produce readings.
    Open,
    /// The connection manager has shut down normally; no more readings
    /// will ever be inserted. Consumers drain what remains, then exit.
    Closed,
    /// A worker hit an unrecoverable condition (currently: storage manager
    /// exhausting its init retries). Every worker stops after its current
    /// iteration.
    Aborted,
}

/// Shared, `Arc`-wrapped bundle of everything workers need: no hidden
/// globals or statics, just an owned value passed into each worker's
/// constructor.
pub struct Context {
    pub buffer: Arc<SharedBuffer>,
    state: RwLock<ShutdownState>,
    /// Sensor id the data manager wants the connection manager to drop, or
    /// 0 for "nothing pending". Consumed (zeroed) by the connection
    /// manager exactly once per request.
    drop_sensor: Mutex<u16>,
    pub log: LogSender,
}

impl Context {
    pub fn state(&self) -> ShutdownState {
        *self.state.read().unwrap()
    }

    /// Monotonic: `Open -> Closed` and `Open -> Aborted` are the only
    /// legal transitions; once left, `Open` never returns.
    pub fn close(&self) {
        let mut state = self.state.write().unwrap();
        if *state == ShutdownState::Open {
            *state = ShutdownState::Closed;
        }
    }

    pub fn abort(&self) {
        let mut state = self.state.write().unwrap();
        *state = ShutdownState::Aborted;
    }

    pub fn request_drop(&self, sensor_id: u16) {
        *self.drop_sensor.lock().unwrap() = sensor_id;
    }

    /// Read-and-zero: returns the pending drop request, if any, clearing
    /// it so it's only acted on once.
    pub fn take_drop_request(&self) -> Option<u16> {
        let mut slot = self.drop_sensor.lock().unwrap();
        if *slot == 0 {
            None
        } else {
            let id = *slot;
            *slot = 0;
            Some(id)
        }
    }
}

#[cfg(test)]
impl Context {
    /// A bare `Context` for tests that need to drive a single worker
    /// directly, without going through `Coordinator::run`.
    pub(crate) fn for_test() -> Arc<Self> {
        Arc::new(Self {
            buffer: Arc::new(SharedBuffer::new()),
            state: RwLock::new(ShutdownState::Open),
            drop_sensor: Mutex::new(0),
            log: LogSender::for_test(),
        })
    }
}

/// Starts and joins the three worker threads plus the logger thread.
pub struct Coordinator {
    config: Config,
}

impl Coordinator {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub fn run(self) -> Result<(), GatewayError> {
        let (log, logger_handle) =
            spawn_logger(&self.config.log_path).map_err(GatewayError::Logger)?;

        let ctx = Arc::new(Context {
            buffer: Arc::new(SharedBuffer::new()),
            state: RwLock::new(ShutdownState::Open),
            drop_sensor: Mutex::new(0),
            log,
        });

        let dm_ctx = Arc::clone(&ctx);
        let dm_registry_path = self.config.registry_path.clone();
        let dm_min = self.config.min_temp;
        let dm_max = self.config.max_temp;
        let dm_handle = thread::Builder::new()
            .name("data-manager".into())
            .spawn(move || DataManager::new(dm_ctx, dm_registry_path, dm_min, dm_max).run())
            .expect("failed to spawn data manager thread");

        let sm_ctx = Arc::clone(&ctx);
        let sm_db_path = self.config.database_path.clone();
        let sm_attempts = self.config.storage_init_attempts;
        let sm_handle = thread::Builder::new()
            .name("storage-manager".into())
            .spawn(move || StorageManager::new(sm_ctx, sm_db_path, sm_attempts).run())
            .expect("failed to spawn storage manager thread");

        let cm_ctx = Arc::clone(&ctx);
        let cm_port = self.config.port;
        let cm_max_conn = self.config.max_connections;
        let cm_timeout = self.config.timeout;
        let cm_handle = thread::Builder::new()
            .name("connection-manager".into())
            .spawn(move || {
                ConnectionManager::new(cm_ctx, cm_port, cm_max_conn, cm_timeout).run()
            })
            .expect("failed to spawn connection manager thread");

        let cm_status = cm_handle.join().unwrap_or(WorkerStatus::Failed);
        let dm_status = dm_handle.join().unwrap_or(WorkerStatus::Failed);
        let sm_status = sm_handle.join().unwrap_or(WorkerStatus::Failed);

        info!(
            connection_manager = ?cm_status,
            data_manager = ?dm_status,
            storage_manager = ?sm_status,
            "workers finished"
        );

        // Dropping our own sender clone (`ctx` is the last owner once this
        // function returns) closes the channel so the logger thread
        // observes EOF; join it after every worker has had a chance to
        // flush its final message, matching the original's "close the
        // pipe write end only after joining the worker threads" ordering.
        drop(ctx);
        if logger_handle.join().is_err() {
            warn!("logger thread panicked");
        }

        if matches!(
            (cm_status, dm_status, sm_status),
            (WorkerStatus::Failed, ..) | (_, WorkerStatus::Failed, _) | (.., WorkerStatus::Failed)
        ) {
            return Err(GatewayError::WorkerFailed);
        }

        Ok(())
    }
}

#[cfg(test)]
mod pipeline_tests {
    use crate::model::Reading;
    use crate::sbuffer::{PopOutcome, SharedBuffer, DATA_MANAGER_READER, STORAGE_MANAGER_READER};
    use crate::storage::StorageSink;
    use std::thread;

    fn reading(sensor_id: u16, value: f64, timestamp: i64) -> Reading {
        Reading {
            sensor_id,
            value,
            timestamp,
        }
    }

    /// Drains one reader side to completion, treating `AlreadyConsumed` as
    /// "still active" and giving up after a run of plain misses once the
    /// producer side is known to be done.
    fn drain_reader(buf: &SharedBuffer, reader_idx: usize, expected: usize) -> Vec<Reading> {
        let mut out = Vec::new();
        let mut misses = 0;
        while out.len() < expected && misses < 1000 {
            match buf.pop(reader_idx) {
                PopOutcome::Success(r) => {
                    out.push(r);
                    misses = 0;
                }
                PopOutcome::AlreadyConsumed => continue,
                PopOutcome::NoData => {
                    misses += 1;
                    thread::yield_now();
                }
            }
        }
        out
    }

    #[test]
    fn both_readers_observe_every_reading_in_order() {
        let buf = SharedBuffer::new();
        for i in 0..5 {
            buf.insert(reading(21, 20.0 + i as f64, 100 + i as i64));
        }

        let dm = drain_reader(&buf, DATA_MANAGER_READER, 5);
        let sm = drain_reader(&buf, STORAGE_MANAGER_READER, 5);

        assert_eq!(dm.len(), 5);
        assert_eq!(sm.len(), 5);
        for i in 0..5 {
            assert_eq!(dm[i].timestamp, 100 + i as i64);
            assert_eq!(sm[i].timestamp, 100 + i as i64);
        }
    }

    #[test]
    fn two_sensors_interleaved_preserve_per_sensor_order() {
        let buf = SharedBuffer::new();
        for i in 0..10 {
            let sensor_id = if i % 2 == 0 { 15 } else { 16 };
            buf.insert(reading(sensor_id, i as f64, i as i64));
        }

        let dm = drain_reader(&buf, DATA_MANAGER_READER, 10);
        let sensor15: Vec<_> = dm.iter().filter(|r| r.sensor_id == 15).map(|r| r.timestamp).collect();
        let sensor16: Vec<_> = dm.iter().filter(|r| r.sensor_id == 16).map(|r| r.timestamp).collect();
        assert_eq!(sensor15, vec![0, 2, 4, 6, 8]);
        assert_eq!(sensor16, vec![1, 3, 5, 7, 9]);
    }

    #[test]
    fn storage_side_persists_every_reading_independently_of_data_side() {
        let buf = SharedBuffer::new();
        for i in 0..5 {
            buf.insert(reading(30, 18.0 + i as f64, i as i64));
        }

        // Drain the data-manager side first; the storage side must still
        // see every reading since the two readers track independent cursors.
        let dm = drain_reader(&buf, DATA_MANAGER_READER, 5);
        assert_eq!(dm.len(), 5);

        let sink = StorageSink::open_in_memory().unwrap();
        for reading in drain_reader(&buf, STORAGE_MANAGER_READER, 5) {
            sink.insert(&reading).unwrap();
        }
        assert_eq!(sink.rows_inserted(), 5);
    }
}
