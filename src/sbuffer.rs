//! Multi-consumer shared buffer.
//!
//! Ported from the original's singly-linked-list-plus-read-marks design
//! (`sbuffer.c`): a FIFO of readings where each node carries one consumed
//! flag per reader, and is only removed once every reader has consumed it.
//! Nodes are addressed by a monotonically increasing id rather than a raw
//! pointer, so a reader's cursor can go stale (point at an id that's since
//! been removed by the other reader finishing it) without ever dangling.

use crate::model::Reading;
use std::collections::HashMap;
use std::sync::RwLock;

/// Number of distinct consumers draining the buffer: the data manager and
/// the storage manager. Fixed at compile time, matching `READER_THREADS`
/// in the original's `config.h`.
pub const READER_COUNT: usize = 2;

pub const DATA_MANAGER_READER: usize = 0;
pub const STORAGE_MANAGER_READER: usize = 1;

/// Outcome of a single `pop`.
#[derive(Debug, PartialEq)]
pub enum PopOutcome {
    /// A reading was consumed for the first time by this reader.
    Success(Reading),
    /// Nothing new for this reader right now.
    NoData,
    /// The node this reader's cursor pointed at turned out to already be
    /// fully consumed by every reader and was just reclaimed.
    AlreadyConsumed,
}

type NodeId = u64;

struct Node {
    reading: Reading,
    consumed: [bool; READER_COUNT],
    next: Option<NodeId>,
}

impl Node {
    fn fully_consumed(&self) -> bool {
        self.consumed.iter().all(|&c| c)
    }
}

struct Inner {
    nodes: HashMap<NodeId, Node>,
    head: Option<NodeId>,
    tail: Option<NodeId>,
    next_id: NodeId,
    cursors: [Option<NodeId>; READER_COUNT],
}

/// A FIFO of [`Reading`]s drained independently by [`READER_COUNT`] readers.
pub struct SharedBuffer {
    inner: RwLock<Inner>,
}

impl Default for SharedBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedBuffer {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                nodes: HashMap::new(),
                head: None,
                tail: None,
                next_id: 0,
                cursors: [None; READER_COUNT],
            }),
        }
    }

    /// Append a reading at the tail. Never refuses.
    pub fn insert(&self, reading: Reading) {
        let mut inner = self.inner.write().unwrap();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.nodes.insert(
            id,
            Node {
                reading,
                consumed: [false; READER_COUNT],
                next: None,
            },
        );
        if let Some(tail) = inner.tail {
            inner.nodes.get_mut(&tail).unwrap().next = Some(id);
        } else {
            inner.head = Some(id);
        }
        inner.tail = Some(id);
    }

    /// Non-blocking pop for `reader_idx`. See the module docs and the
    /// shared-buffer design notes for the branch-by-branch rationale.
    pub fn pop(&self, reader_idx: usize) -> PopOutcome {
        let mut inner = self.inner.write().unwrap();

        let head_id = match inner.head {
            Some(id) => id,
            None => {
                inner.cursors[reader_idx] = None;
                return PopOutcome::NoData;
            }
        };

        let cursor = inner.cursors[reader_idx];

        if cursor.is_some() && cursor == inner.tail && inner.nodes[&inner.tail.unwrap()].consumed[reader_idx] {
            return PopOutcome::NoData;
        }

        if cursor == Some(head_id) && inner.nodes[&head_id].fully_consumed() {
            let next = inner.nodes[&head_id].next;
            inner.nodes.remove(&head_id);
            inner.head = next;
            if inner.head.is_none() {
                inner.tail = None;
            }
            inner.cursors[reader_idx] = next;
            return PopOutcome::AlreadyConsumed;
        }

        let target = if !inner.nodes[&head_id].consumed[reader_idx] {
            head_id
        } else {
            match cursor.and_then(|c| inner.nodes.get(&c)).and_then(|n| n.next) {
                Some(next) => next,
                None => return PopOutcome::NoData,
            }
        };

        let reading = inner.nodes[&target].reading;
        inner.nodes.get_mut(&target).unwrap().consumed[reader_idx] = true;

        if inner.nodes[&target].fully_consumed() {
            let next = inner.nodes[&target].next;
            if inner.head == Some(target) {
                inner.nodes.remove(&target);
                inner.head = next;
                if inner.head.is_none() {
                    inner.tail = None;
                }
            }
            inner.cursors[reader_idx] = None;
        } else {
            inner.cursors[reader_idx] = Some(target);
        }

        PopOutcome::Success(reading)
    }

    /// Drop every outstanding node. Used by tests; ordinary shutdown relies
    /// on `SharedBuffer`'s own `Drop`.
    #[cfg(test)]
    fn clear(&self) {
        let mut inner = self.inner.write().unwrap();
        inner.nodes.clear();
        inner.head = None;
        inner.tail = None;
        inner.cursors = [None; READER_COUNT];
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.inner.read().unwrap().nodes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading(id: u16, v: f64) -> Reading {
        Reading {
            sensor_id: id,
            value: v,
            timestamp: 0,
        }
    }

    #[test]
    fn single_reader_drains_in_order() {
        let buf = SharedBuffer::new();
        buf.insert(reading(1, 10.0));
        buf.insert(reading(1, 11.0));

        assert_eq!(
            buf.pop(DATA_MANAGER_READER),
            PopOutcome::Success(reading(1, 10.0))
        );
        assert_eq!(
            buf.pop(DATA_MANAGER_READER),
            PopOutcome::Success(reading(1, 11.0))
        );
        assert_eq!(buf.pop(DATA_MANAGER_READER), PopOutcome::NoData);
    }

    #[test]
    fn node_survives_until_both_readers_consume() {
        let buf = SharedBuffer::new();
        buf.insert(reading(1, 10.0));

        assert_eq!(
            buf.pop(DATA_MANAGER_READER),
            PopOutcome::Success(reading(1, 10.0))
        );
        // storage manager hasn't read yet: node must still be present
        assert_eq!(buf.len(), 1);
        assert_eq!(buf.pop(DATA_MANAGER_READER), PopOutcome::NoData);

        assert_eq!(
            buf.pop(STORAGE_MANAGER_READER),
            PopOutcome::Success(reading(1, 10.0))
        );
        assert_eq!(buf.len(), 0);
    }

    #[test]
    fn independent_reader_progress() {
        let buf = SharedBuffer::new();
        buf.insert(reading(1, 1.0));
        buf.insert(reading(1, 2.0));
        buf.insert(reading(1, 3.0));

        // DM races ahead of SM.
        assert_eq!(
            buf.pop(DATA_MANAGER_READER),
            PopOutcome::Success(reading(1, 1.0))
        );
        assert_eq!(
            buf.pop(DATA_MANAGER_READER),
            PopOutcome::Success(reading(1, 2.0))
        );
        assert_eq!(buf.len(), 3);

        assert_eq!(
            buf.pop(STORAGE_MANAGER_READER),
            PopOutcome::Success(reading(1, 1.0))
        );
        assert_eq!(buf.len(), 2);

        assert_eq!(
            buf.pop(DATA_MANAGER_READER),
            PopOutcome::Success(reading(1, 3.0))
        );
        assert_eq!(
            buf.pop(STORAGE_MANAGER_READER),
            PopOutcome::Success(reading(1, 2.0))
        );
        assert_eq!(buf.len(), 1);
        assert_eq!(
            buf.pop(STORAGE_MANAGER_READER),
            PopOutcome::Success(reading(1, 3.0))
        );
        assert_eq!(buf.len(), 0);
    }

    #[test]
    fn empty_buffer_reports_no_data() {
        let buf = SharedBuffer::new();
        assert_eq!(buf.pop(DATA_MANAGER_READER), PopOutcome::NoData);
        assert_eq!(buf.pop(STORAGE_MANAGER_READER), PopOutcome::NoData);
    }

    #[test]
    fn clear_resets_state() {
        let buf = SharedBuffer::new();
        buf.insert(reading(1, 1.0));
        buf.pop(DATA_MANAGER_READER);
        buf.clear();
        assert_eq!(buf.len(), 0);
        assert_eq!(buf.pop(DATA_MANAGER_READER), PopOutcome::NoData);
    }
}
