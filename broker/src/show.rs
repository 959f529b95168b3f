use std::fmt;

use crate::broker::RouteBroker;
use crate::object::BrokerObject;
use crate::queue::NodeKind;
use crate::types::SequenceId;

/// One row of the queue walk, in display order (each priority newest
/// first). Records carry their tombstone state; cursors carry the owning
/// client's counters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueEntry {
    Record {
        priority: usize,
        id: SequenceId,
        topic: String,
        deleted: bool,
    },
    Cursor {
        priority: usize,
        id: SequenceId,
        name: String,
        consumed: u64,
        behind: u64,
    },
}

impl<T: BrokerObject> RouteBroker<T> {
    /// Snapshot of every node in every priority queue. The broker lock is
    /// held only while the snapshot is built.
    pub fn entries(&self) -> Vec<QueueEntry> {
        let state = self.shared().lock();
        let mut entries = Vec::new();
        for (priority, queue) in state.queues().iter().enumerate() {
            for node in queue.iter_newest_first() {
                entries.push(match node.kind {
                    NodeKind::Record(key) => {
                        let record = state.record(key);
                        QueueEntry::Record {
                            priority,
                            id: node.id,
                            topic: record.topic.clone(),
                            deleted: record.deleted,
                        }
                    }
                    NodeKind::Cursor(key) => {
                        let client = &state.clients()[key.0];
                        QueueEntry::Cursor {
                            priority,
                            id: node.id,
                            name: client.name.clone(),
                            consumed: client.consumed,
                            behind: queue.top_id() - node.id,
                        }
                    }
                });
            }
        }
        entries
    }

    /// Emit full status: counters, per-client errors, and every queue node.
    pub fn show(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        self.show_internal(out, true)
    }

    /// Emit status without per-record rows.
    pub fn show_summary(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        self.show_internal(out, false)
    }

    fn show_internal(&self, out: &mut dyn fmt::Write, detail: bool) -> fmt::Result {
        let state = self.shared().lock();

        writeln!(out, "processed {}", state.processed)?;
        if state.ignored != 0 {
            writeln!(out, "ignored {}", state.ignored)?;
        }
        if state.dropped != 0 {
            writeln!(out, "dropped {}", state.dropped)?;
        }
        for (_, client) in state.clients().iter() {
            if client.errors != 0 {
                writeln!(out, "Client {}: errors:{}", client.name, client.errors)?;
            }
        }

        let mut total = 0u64;
        for (priority, queue) in state.queues().iter().enumerate() {
            writeln!(out, "\nPriority {priority}, top: {}", queue.top_id())?;
            for node in queue.iter_newest_first() {
                total += 1;
                match node.kind {
                    NodeKind::Record(key) => {
                        if detail {
                            let record = state.record(key);
                            writeln!(
                                out,
                                "ID:{:<10} {} {}",
                                node.id,
                                if record.deleted { "D" } else { " " },
                                record.topic
                            )?;
                        }
                    }
                    NodeKind::Cursor(key) => {
                        let client = &state.clients()[key.0];
                        writeln!(
                            out,
                            "ID:{:<10}   {} consumed:{} behind:{}",
                            node.id,
                            client.name,
                            client.consumed,
                            queue.top_id() - node.id
                        )?;
                    }
                }
            }
        }
        writeln!(out, "Total objects {total}")
    }
}
