//! Audit-log sink.
//!
//! The original forked a child process that drained a pipe and prefixed
//! each line with a sequence number. A forked child in a multi-threaded
//! process is its own hazard in Rust, and the design notes explicitly
//! allow swapping the IPC transport for an in-process thread; the line
//! format and sequence-number semantics are kept identical.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};

/// Which worker produced a given log line. Exactly the three workers that
/// write to the audit log; the coordinator reports through `tracing` only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    ConnectionManager,
    DataManager,
    StorageManager,
}

impl Source {
    fn label(self) -> &'static str {
        match self {
            Source::ConnectionManager => "Connection Manager",
            Source::DataManager => "Data Manager",
            Source::StorageManager => "Storage Manager",
        }
    }
}

#[derive(Debug)]
pub struct LogMessage {
    pub source: Source,
    pub text: String,
}

/// A cloneable handle workers use to submit audit-log lines.
#[derive(Clone)]
pub struct LogSender {
    inner: Sender<LogMessage>,
}

impl LogSender {
    pub fn log(&self, source: Source, text: impl Into<String>) {
        // The channel's own internals serialize concurrent sends; no
        // separate pipe mutex is needed, unlike the original's
        // `ipc_pipe_mutex`.
        let _ = self.inner.send(LogMessage {
            source,
            text: text.into(),
        });
    }
}

/// Spawns the logger thread and returns a sender handle plus its join
/// handle. The thread exits once every `LogSender` clone has been dropped.
pub fn spawn_logger(path: &Path) -> io::Result<(LogSender, JoinHandle<()>)> {
    let file = File::create(path)?;
    let (tx, rx): (Sender<LogMessage>, Receiver<LogMessage>) = mpsc::channel();

    let handle = thread::Builder::new()
        .name("logger".into())
        .spawn(move || run_logger(file, rx))
        .expect("failed to spawn logger thread");

    Ok((LogSender { inner: tx }, handle))
}

fn run_logger(file: File, rx: Receiver<LogMessage>) {
    let mut writer = BufWriter::new(file);
    let mut sequence: u64 = 0;

    while let Ok(msg) = rx.recv() {
        let unix_ts = chrono::Utc::now().timestamp();

        let line = format!(
            "{} {} {}: {}\n",
            sequence,
            unix_ts,
            msg.source.label(),
            msg.text
        );
        sequence += 1;

        if writer.write_all(line.as_bytes()).is_err() {
            break;
        }
        let _ = writer.flush();
    }
}

#[cfg(test)]
impl LogSender {
    /// A sender with no backing logger thread, for tests that only need
    /// something to plug into a `Context` and don't care about the lines.
    pub(crate) fn for_test() -> Self {
        let (tx, _rx) = mpsc::channel();
        LogSender { inner: tx }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_numbers_and_framing() {
        let dir = std::env::temp_dir();
        let path = dir.join(format!("gateway-logger-test-{}.log", std::process::id()));

        let (sender, handle) = spawn_logger(&path).unwrap();
        sender.log(Source::ConnectionManager, "started listening on 5000");
        sender.log(Source::DataManager, "registry loaded");
        drop(sender);
        handle.join().unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("0 "));
        assert!(lines[0].contains("Connection Manager: started listening on 5000"));
        assert!(lines[1].starts_with("1 "));
        assert!(lines[1].contains("Data Manager: registry loaded"));

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn logger_thread_exits_when_all_senders_dropped() {
        let dir = std::env::temp_dir();
        let path = dir.join(format!("gateway-logger-exit-{}.log", std::process::id()));

        let (sender, handle) = spawn_logger(&path).unwrap();
        let clone = sender.clone();
        drop(sender);
        drop(clone);

        handle.join().unwrap();
        std::fs::remove_file(&path).ok();
    }
}
