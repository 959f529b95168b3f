use std::sync::{Arc, Condvar};
use std::time::{Duration, Instant};

use crate::engine::{Advanced, BrokerShared};
use crate::object::BrokerObject;
use crate::types::{ClientKey, SequenceId};

/// What a consumer is handed for one observed record: the latest payload
/// for a topic, or a deletion notice carrying the payload that announced
/// the removal. The consumer owns the payload either way.
#[derive(Debug, PartialEq, Eq)]
pub enum Notice<T> {
    Update(T),
    Delete(T),
}

impl<T> Notice<T> {
    pub fn payload(&self) -> &T {
        match self {
            Notice::Update(data) | Notice::Delete(data) => data,
        }
    }

    pub fn is_delete(&self) -> bool {
        matches!(self, Notice::Delete(_))
    }
}

/// Per-client counters, plus how far behind each priority queue's tail the
/// client's cursor sits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientStats {
    pub consumed: u64,
    pub errors: u64,
    pub behind: Vec<SequenceId>,
}

/// A registered consumer of the broker, reading at its own speed.
///
/// Exactly one thread may drive a client; `get_next_data` takes `&mut self`
/// to enforce that. Dropping the handle unregisters the client and lets the
/// broker reclaim any tombstoned records it alone was still trailing.
pub struct RouteBrokerClient<T: BrokerObject> {
    shared: Arc<BrokerShared<T>>,
    key: ClientKey,
    wake: Arc<Condvar>,
    deleted: bool,
}

impl<T: BrokerObject> RouteBrokerClient<T> {
    pub(crate) fn new(shared: Arc<BrokerShared<T>>, key: ClientKey, wake: Arc<Condvar>) -> Self {
        Self {
            shared,
            key,
            wake,
            deleted: false,
        }
    }

    /// Block until a record is available on some priority queue, scanning
    /// level 0 first, and return a copy of its payload. Returns `None` once
    /// `timeout` expires with no data, so callers can check for shutdown
    /// and ask again.
    pub fn get_next_data(&mut self, timeout: Duration) -> Option<Notice<T>> {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.lock();

        loop {
            while let Some(level) = state.ready_level(self.key) {
                match state.advance(self.key, level) {
                    Advanced::Data(notice) => return Some(notice),
                    // Either the level only looked ready (records migrated
                    // away) or the copy failed; rescan from level 0.
                    Advanced::Drained | Advanced::CopyFailed => continue,
                }
            }

            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            let Ok((guard, _)) = self.wake.wait_timeout(state, deadline - now) else {
                panic!("broker mutex poisoned");
            };
            state = guard;
        }
    }

    /// Count a downstream publish failure against this client. The show
    /// output surfaces the counter.
    pub fn record_error(&mut self) {
        self.shared.lock().client_record_error(self.key);
    }

    pub fn stats(&self) -> ClientStats {
        let state = self.shared.lock();
        let client = state.client(self.key);
        let behind = state
            .queues()
            .iter()
            .zip(&client.cursors)
            .map(|(queue, &cursor)| queue.top_id() - queue.id_of(cursor))
            .collect();
        ClientStats {
            consumed: client.consumed,
            errors: client.errors,
            behind,
        }
    }

    /// Unregister the client. Equivalent to dropping the handle; provided
    /// so teardown order can be made explicit. Must not be called from
    /// within the client's own dispatcher.
    pub fn delete(mut self) {
        self.delete_inner();
    }

    fn delete_inner(&mut self) {
        if self.deleted {
            return;
        }
        self.deleted = true;
        self.shared.lock().client_delete(self.key);
    }
}

impl<T: BrokerObject> Drop for RouteBrokerClient<T> {
    fn drop(&mut self) {
        self.delete_inner();
    }
}
