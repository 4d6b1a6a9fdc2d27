//! Data manager: the shared buffer's analytics consumer.
//!
//! Grounded in the original's `datamgr.c`, which opens the registry file
//! itself (`main.c:260`) after the connection manager and storage manager
//! threads are already running. A registry parse error therefore only
//! takes down the data manager; the other two workers drain and exit
//! normally. Join each reading against the registry, maintain a running
//! average per sensor, and log a range alert. Unknown sensors are logged
//! and flagged for the connection manager to drop rather than rejected
//! inline, since the reading has already been produced into the shared
//! buffer by the time the data manager sees it.

use crate::coordinator::{Context, ShutdownState};
use crate::logger::Source;
use crate::model::WorkerStatus;
use crate::registry::{Observation, Registry};
use crate::sbuffer::{PopOutcome, DATA_MANAGER_READER};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use tracing::{error, info, warn};

pub struct DataManager {
    ctx: Arc<Context>,
    registry_path: PathBuf,
    min_temp: f64,
    max_temp: f64,
}

impl DataManager {
    pub fn new(ctx: Arc<Context>, registry_path: PathBuf, min_temp: f64, max_temp: f64) -> Self {
        Self {
            ctx,
            registry_path,
            min_temp,
            max_temp,
        }
    }

    pub fn run(self) -> WorkerStatus {
        let mut registry = match Registry::load(&self.registry_path) {
            Ok(registry) => registry,
            Err(e) => {
                error!(error = %e, "failed to load registry");
                self.ctx
                    .log
                    .log(Source::DataManager, format!("failed to load registry: {e}"));
                return WorkerStatus::Failed;
            }
        };

        info!("data manager started");
        self.ctx.log.log(Source::DataManager, "started");

        loop {
            if self.ctx.state() == ShutdownState::Aborted {
                self.ctx.log.log(Source::DataManager, "signalled to terminate");
                return WorkerStatus::Interrupted;
            }

            match self.ctx.buffer.pop(DATA_MANAGER_READER) {
                PopOutcome::Success(reading) => {
                    match registry.observe(
                        reading.sensor_id,
                        reading.value,
                        self.min_temp,
                        self.max_temp,
                    ) {
                        Observation::UnknownSensor => {
                            warn!(sensor_id = reading.sensor_id, "sensor does not exist");
                            self.ctx.log.log(
                                Source::DataManager,
                                format!("sensor {} does not exist", reading.sensor_id),
                            );
                            self.ctx.request_drop(reading.sensor_id);
                        }
                        Observation::Warming => {}
                        Observation::InRange(_) => {}
                        Observation::OutOfRange(avg) => {
                            warn!(sensor_id = reading.sensor_id, avg, "temperature out of range");
                            self.ctx.log.log(
                                Source::DataManager,
                                format!(
                                    "sensor {} running average {avg:.2} outside comfort range",
                                    reading.sensor_id
                                ),
                            );
                        }
                    }
                }
                PopOutcome::AlreadyConsumed => continue,
                PopOutcome::NoData => {
                    if self.ctx.state() == ShutdownState::Open {
                        thread::yield_now();
                        continue;
                    } else {
                        // Closed and drained: nothing more will ever arrive.
                        break;
                    }
                }
            }
        }

        self.ctx.log.log(Source::DataManager, "shut down");
        WorkerStatus::Success
    }
}
