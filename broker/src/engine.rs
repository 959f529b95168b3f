use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex};

use log::warn;
use slab::Slab;

use crate::client::Notice;
use crate::config::BrokerConfig;
use crate::object::BrokerObject;
use crate::queue::{BrokerQueue, NodeIndex, NodeKind};
use crate::record::ObjectRecord;
use crate::types::{ClientKey, RecordKey, SequenceId};

/// Everything the broker mutates lives behind this one mutex; publish,
/// cursor advance, client lifecycle and the show walk all serialize here.
pub(crate) struct BrokerShared<T> {
    pub state: Mutex<EngineState<T>>,
}

impl<T: BrokerObject> BrokerShared<T> {
    pub fn new(config: &BrokerConfig) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(EngineState::new(config)),
        })
    }

    pub fn lock(&self) -> std::sync::MutexGuard<'_, EngineState<T>> {
        let Ok(guard) = self.state.lock() else {
            panic!("broker mutex poisoned");
        };
        guard
    }
}

pub(crate) struct ClientState {
    pub name: String,
    /// One cursor node per priority queue, index-aligned with `queues`.
    pub cursors: Vec<NodeIndex>,
    pub wake: Arc<Condvar>,
    pub consumed: u64,
    pub errors: u64,
}

/// Outcome of one cursor advance at a given priority.
pub(crate) enum Advanced<T> {
    /// A payload copy to hand to the consumer.
    Data(Notice<T>),
    /// Nothing ahead of the cursor; its id was stamped up to the tail so
    /// this level stops claiming work.
    Drained,
    /// The payload copy failed; the cursor moved past the record anyway and
    /// the client error counter was bumped.
    CopyFailed,
}

pub(crate) struct EngineState<T> {
    queues: Vec<BrokerQueue>,
    records: Slab<ObjectRecord<T>>,
    index: HashMap<String, RecordKey>,
    clients: Slab<ClientState>,
    max_topic_len: usize,
    pub processed: u64,
    pub ignored: u64,
    pub dropped: u64,
}

impl<T: BrokerObject> EngineState<T> {
    fn new(config: &BrokerConfig) -> Self {
        let queues = (0..config.priority_levels)
            .map(|_| BrokerQueue::new())
            .collect();
        Self {
            queues,
            records: Slab::new(),
            index: HashMap::new(),
            clients: Slab::new(),
            max_topic_len: config.max_topic_len,
            processed: 0,
            ignored: 0,
            dropped: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty() && self.records.is_empty()
    }

    /// Insert or update the record for `key` with the behavior matrix:
    /// new keys insert at the tail of their priority queue; existing keys
    /// coalesce onto the same record, migrating to a more urgent queue when
    /// the new priority is higher and re-tailing in place otherwise.
    /// Deletes tombstone the record (or drop it outright when the key is
    /// unknown, or remove it synchronously when there are no clients).
    pub fn publish(&mut self, mut key: String, data: T, priority: usize, delete: bool) {
        key.truncate(self.max_topic_len);

        match self.index.get(&key).copied() {
            None if delete => {
                // delete of an unknown key is a no-op
            }
            None => {
                let entry = self.records.vacant_entry();
                let record_key = RecordKey(entry.key());
                let node = self.queues[priority].push_tail(NodeKind::Record(record_key));
                entry.insert(ObjectRecord {
                    topic: key.clone(),
                    data,
                    priority,
                    deleted: false,
                    node,
                });
                self.index.insert(key, record_key);
            }
            Some(record_key) => {
                let current = self.records[record_key.0].priority;
                if priority < current {
                    // The old position is stale: any cursor still behind it
                    // there must not emit it, because the same record is
                    // about to be observed at the higher priority.
                    let node = self.records[record_key.0].node;
                    self.queues[current].remove(node);

                    let node = self.queues[priority].push_tail(NodeKind::Record(record_key));
                    let record = &mut self.records[record_key.0];
                    record.data = data;
                    record.priority = priority;
                    record.deleted = false;
                    record.node = node;
                    if delete {
                        record.deleted = true;
                        self.queues[priority].retail(node);
                    }
                } else {
                    // Same or lower urgency: leave the record where it is
                    // flowing and swap in the latest payload. If it gets
                    // deleted it will come back at the correct priority.
                    let record = &mut self.records[record_key.0];
                    record.data = data;
                    record.deleted = delete;
                    let node = record.node;
                    self.queues[current].retail(node);
                }

                if delete && self.clients.is_empty() {
                    self.remove_record(record_key);
                }
            }
        }
    }

    fn remove_record(&mut self, record_key: RecordKey) {
        let record = self.records.remove(record_key.0);
        self.queues[record.priority].remove(record.node);
        self.index.remove(&record.topic);
    }

    /// True when no client's cursor at this priority is still behind `id`,
    /// or when there are no clients at all. Valid for a tombstoned record
    /// that a cursor has just passed or that a deleted client trailed; a
    /// freshly tombstoned record can only be reclaimed immediately when the
    /// client set is empty, since a trailing cursor may still owe its
    /// consumer a deletion notice.
    fn no_client_needs(&self, priority: usize, id: SequenceId) -> bool {
        if self.clients.is_empty() {
            return true;
        }
        self.clients
            .iter()
            .all(|(_, client)| self.queues[priority].id_of(client.cursors[priority]) >= id)
    }

    /// The most urgent priority level with work for this client, if any.
    pub fn ready_level(&self, client_key: ClientKey) -> Option<usize> {
        let client = &self.clients[client_key.0];
        (0..self.queues.len()).find(|&level| {
            self.queues[level].id_of(client.cursors[level]) < self.queues[level].top_id()
        })
    }

    /// Consume the next record ahead of the client's cursor at `priority`:
    /// copy the payload, relink the cursor immediately tail-ward of the
    /// record, and reclaim the record if it was a tombstone no one else
    /// still needs.
    pub fn advance(&mut self, client_key: ClientKey, priority: usize) -> Advanced<T> {
        let cursor = self.clients[client_key.0].cursors[priority];
        let queue = &mut self.queues[priority];

        let Some((record_node, record_key)) = queue.next_record(cursor) else {
            // No more data; stamp the id up to the tail so this client does
            // not keep asking.
            let top = queue.top_id();
            queue.set_id(cursor, top);
            return Advanced::Drained;
        };

        let record_id = queue.id_of(record_node);
        queue.move_after(cursor, record_node);
        queue.set_id(cursor, record_id);

        let record = &self.records[record_key.0];
        let deleted = record.deleted;
        let copied = record.data.try_copy();

        if deleted && self.no_client_needs(priority, record_id) {
            self.remove_record(record_key);
        }

        match copied {
            Ok(data) => {
                self.clients[client_key.0].consumed += 1;
                if deleted {
                    Advanced::Data(Notice::Delete(data))
                } else {
                    Advanced::Data(Notice::Update(data))
                }
            }
            Err(err) => {
                let client = &mut self.clients[client_key.0];
                client.errors += 1;
                warn!(
                    "client {}: payload copy failed at priority {priority}: {err}",
                    client.name
                );
                Advanced::CopyFailed
            }
        }
    }

    /// Install a client with one cursor at the head of every queue. A
    /// cursor starts behind everything; where the queue holds no records it
    /// is stamped with the tail id immediately, otherwise a non-zero tail id
    /// would make the broker think there is data for it.
    pub fn client_create(&mut self, name: &str, wake: Arc<Condvar>) -> ClientKey {
        let entry = self.clients.vacant_entry();
        let client_key = ClientKey(entry.key());

        let mut cursors = Vec::with_capacity(self.queues.len());
        for queue in &mut self.queues {
            let cursor = queue.push_head(NodeKind::Cursor(client_key), 0);
            if queue.next_record(cursor).is_none() {
                let top = queue.top_id();
                queue.set_id(cursor, top);
            }
            cursors.push(cursor);
        }

        entry.insert(ClientState {
            name: name.to_owned(),
            cursors,
            wake,
            consumed: 0,
            errors: 0,
        });
        client_key
    }

    /// Unlink the client's cursors and reclaim any tombstoned records it
    /// was the last one trailing.
    pub fn client_delete(&mut self, client_key: ClientKey) {
        let client = self.clients.remove(client_key.0);
        for (priority, cursor) in client.cursors.into_iter().enumerate() {
            self.queues[priority].remove(cursor);
        }

        for priority in 0..self.queues.len() {
            let reclaimable: Vec<RecordKey> = self.queues[priority]
                .iter_newest_first()
                .filter_map(|node| match node.kind {
                    NodeKind::Record(key) if self.records[key.0].deleted => {
                        self.no_client_needs(priority, node.id).then_some(key)
                    }
                    _ => None,
                })
                .collect();
            for record_key in reclaimable {
                self.remove_record(record_key);
            }
        }
    }

    pub fn client_record_error(&mut self, client_key: ClientKey) {
        self.clients[client_key.0].errors += 1;
    }

    pub fn client(&self, client_key: ClientKey) -> &ClientState {
        &self.clients[client_key.0]
    }

    /// Signal every client that now has a cursor behind some tail. Signals
    /// are edge-triggered; a client already awake will simply find the work
    /// on its next scan.
    pub fn wake_clients(&self) {
        for (key, client) in self.clients.iter() {
            if self.ready_level(ClientKey(key)).is_some() {
                client.wake.notify_one();
            }
        }
    }

    pub(crate) fn queues(&self) -> &[BrokerQueue] {
        &self.queues
    }

    pub(crate) fn record(&self, record_key: RecordKey) -> &ObjectRecord<T> {
        &self.records[record_key.0]
    }

    pub(crate) fn clients(&self) -> &Slab<ClientState> {
        &self.clients
    }
}
