//! Connection manager: the shared buffer's sole producer.
//!
//! Structurally this is the teacher's `runtime/mio_impl/event_loop.rs`
//! worker loop (one `mio::Poll`, a `Slab`-indexed connection table, accept
//! until `WouldBlock`) generalized from protocol-command processing to
//! the gateway's fixed-width reading frames, plus the original
//! `connmgr.c` domain behavior: a `MAX_CONN` bound, per-connection idle
//! timeout, and eviction on a data-manager-requested sensor drop.

use crate::coordinator::{Context, ShutdownState};
use crate::connection::ConnectionTable;
use crate::logger::Source;
use crate::model::WorkerStatus;
use crate::wire::{self, FRAME_LEN};
use mio::net::TcpListener;
use mio::{Events, Interest, Poll, Token};
use std::io::{self, Read};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

const LISTENER_TOKEN: Token = Token(usize::MAX);

pub struct ConnectionManager {
    ctx: Arc<Context>,
    port: u16,
    max_connections: usize,
    timeout: Duration,
}

impl ConnectionManager {
    pub fn new(ctx: Arc<Context>, port: u16, max_connections: usize, timeout: Duration) -> Self {
        Self {
            ctx,
            port,
            max_connections,
            timeout,
        }
    }

    pub fn run(self) -> WorkerStatus {
        if !(1024..=65535).contains(&self.port) {
            error!(port = self.port, "invalid port");
            self.ctx
                .log
                .log(Source::ConnectionManager, format!("invalid port {}", self.port));
            return WorkerStatus::Failed;
        }

        let addr: SocketAddr = match format!("0.0.0.0:{}", self.port).parse() {
            Ok(a) => a,
            Err(_) => return WorkerStatus::Failed,
        };

        let mut listener = match TcpListener::bind(addr) {
            Ok(l) => l,
            Err(e) => {
                error!(error = %e, "failed to bind listener");
                self.ctx
                    .log
                    .log(Source::ConnectionManager, format!("failed to bind port {}: {e}", self.port));
                return WorkerStatus::Failed;
            }
        };

        let mut poll = match Poll::new() {
            Ok(p) => p,
            Err(e) => {
                error!(error = %e, "failed to create poll");
                return WorkerStatus::Failed;
            }
        };

        if let Err(e) = poll
            .registry()
            .register(&mut listener, LISTENER_TOKEN, Interest::READABLE)
        {
            error!(error = %e, "failed to register listener");
            return WorkerStatus::Failed;
        }

        info!(port = self.port, "connection manager listening");
        self.ctx
            .log
            .log(Source::ConnectionManager, format!("listening on port {}", self.port));

        let mut events = Events::with_capacity(128);
        let mut table = ConnectionTable::new(self.max_connections);
        let mut status = WorkerStatus::Success;

        loop {
            if self.ctx.state() == ShutdownState::Aborted {
                info!("connection manager observed abort signal");
                self.ctx
                    .log
                    .log(Source::ConnectionManager, "signalled to terminate");
                status = WorkerStatus::Interrupted;
                break;
            }

            if let Err(e) = poll.poll(&mut events, Some(self.timeout)) {
                error!(error = %e, "poll failed");
                status = WorkerStatus::Failed;
                break;
            }

            if events.is_empty() && table.is_empty() {
                // No activity and nothing outstanding for a full TIMEOUT
                // window: normal shutdown.
                break;
            }

            for event in events.iter() {
                match event.token() {
                    LISTENER_TOKEN => self.accept_connections(&listener, &mut poll, &mut table),
                    Token(id) => {
                        if event.is_readable() {
                            self.handle_readable(id, &mut poll, &mut table);
                        }
                    }
                }
            }

            self.evict_idle(&mut poll, &mut table);
            self.evict_dropped(&mut poll, &mut table);
        }

        // Dropping the table and listener closes every socket, which
        // implicitly removes them from the poll registry; no explicit
        // per-connection deregister is needed on this final exit path.
        drop(table);
        drop(listener);
        drop(poll);
        self.ctx.close();

        self.ctx
            .log
            .log(Source::ConnectionManager, "shut down");
        status
    }

    fn accept_connections(&self, listener: &TcpListener, poll: &mut Poll, table: &mut ConnectionTable) {
        while table.len() < self.max_connections {
            match listener.accept() {
                Ok((stream, peer)) => {
                    let id = match table.insert(stream) {
                        Some(id) => id,
                        None => continue,
                    };
                    let record = table.get_mut(id).expect("just inserted");
                    if let Err(e) = poll
                        .registry()
                        .register(&mut record.stream, Token(id), Interest::READABLE)
                    {
                        warn!(error = %e, "failed to register connection");
                        table.remove(id);
                        continue;
                    }
                    debug!(id, %peer, "accepted connection");
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    warn!(error = %e, "accept failed");
                    break;
                }
            }
        }
    }

    fn handle_readable(&self, id: usize, poll: &mut Poll, table: &mut ConnectionTable) {
        let mut evict = false;
        if let Some(record) = table.get_mut(id) {
            let mut tmp = [0u8; FRAME_LEN];
            loop {
                let needed = FRAME_LEN - record.scratch.len();
                match record.stream.read(&mut tmp[..needed]) {
                    Ok(0) => {
                        // Clean close. A non-empty scratch buffer here is a
                        // partial frame and is discarded, not forwarded.
                        evict = true;
                        break;
                    }
                    Ok(n) => {
                        record.scratch.extend_from_slice(&tmp[..n]);
                        record.last_active = Instant::now();
                        if record.scratch.len() == FRAME_LEN {
                            let reading = wire::decode(&record.scratch);
                            record.scratch.clear();
                            if record.bound_sensor_id == 0 {
                                record.bound_sensor_id = reading.sensor_id;
                            }
                            self.ctx.buffer.insert(reading);
                        }
                    }
                    Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                    Err(e) => {
                        debug!(id, error = %e, "read error, evicting");
                        evict = true;
                        break;
                    }
                }
            }
        }

        if evict {
            self.close_connection(poll, table, id, "connection closed");
        }
    }

    fn evict_idle(&self, poll: &mut Poll, table: &mut ConnectionTable) {
        let now = Instant::now();
        let stale: Vec<usize> = table
            .iter()
            .filter(|(_, record)| now.duration_since(record.last_active) >= self.timeout)
            .map(|(id, _)| id)
            .collect();

        for id in stale {
            self.close_connection(poll, table, id, "idle timeout");
        }
    }

    fn evict_dropped(&self, poll: &mut Poll, table: &mut ConnectionTable) {
        let Some(sensor_id) = self.ctx.take_drop_request() else {
            return;
        };

        self.ctx.log.log(
            Source::ConnectionManager,
            format!("signalled to drop connection to {sensor_id}"),
        );

        let target = table
            .iter()
            .find(|(_, record)| record.bound_sensor_id == sensor_id)
            .map(|(id, _)| id);

        if let Some(id) = target {
            self.close_connection(poll, table, id, &format!("connection to {sensor_id} closed"));
        }
    }

    fn close_connection(&self, poll: &mut Poll, table: &mut ConnectionTable, id: usize, reason: &str) {
        if let Some(mut record) = table.remove(id) {
            let _ = poll.registry().deregister(&mut record.stream);
            debug!(id, reason, "connection evicted");
            self.ctx.log.log(Source::ConnectionManager, reason.to_string());
        }
    }
}
