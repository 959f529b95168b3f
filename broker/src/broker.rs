use std::sync::{Arc, Condvar};

use log::debug;

use crate::client::RouteBrokerClient;
use crate::config::BrokerConfig;
use crate::engine::BrokerShared;
use crate::error::BrokerError;
use crate::object::{BrokerObject, TopicVerdict};

/// Producer-side counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BrokerStats {
    /// Publish calls accepted for processing.
    pub processed: u64,
    /// Payloads the topic generator declined.
    pub ignored: u64,
    /// Payloads lost to a copy failure at publish time.
    pub dropped: u64,
}

/// The route distribution broker: ingests keyed updates and deletes from a
/// producer, coalesces them per topic, and fans the latest state out to
/// registered clients through per-priority queues.
///
/// All operations go through a handle; clones share the same engine. There
/// is no process-global state.
pub struct RouteBroker<T: BrokerObject> {
    shared: Arc<BrokerShared<T>>,
    levels: usize,
}

impl<T: BrokerObject> Clone for RouteBroker<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
            levels: self.levels,
        }
    }
}

impl<T: BrokerObject> RouteBroker<T> {
    pub fn new(config: BrokerConfig) -> Result<Self, BrokerError> {
        if config.priority_levels == 0 {
            return Err(BrokerError::NoPriorityLevels);
        }
        Ok(Self {
            shared: BrokerShared::new(&config),
            levels: config.priority_levels,
        })
    }

    /// The single producer entrypoint. Derives the topic for the payload,
    /// copies it, and applies the insert/coalesce/tombstone matrix at the
    /// given priority (0 is most urgent; out-of-range priorities are
    /// clamped to the least urgent level). Never blocks beyond the broker
    /// mutex.
    pub fn publish(&self, object: &T, priority: usize) {
        let level = if priority >= self.levels {
            debug!("publish at priority {priority} clamped to {}", self.levels - 1);
            self.levels - 1
        } else {
            priority
        };

        let mut state = self.shared.lock();
        state.processed += 1;

        let Ok(owned) = object.try_copy() else {
            state.dropped += 1;
            return;
        };

        match owned.topic() {
            TopicVerdict::Ignore => {
                state.ignored += 1;
            }
            TopicVerdict::Publish { key, delete } => {
                state.publish(key, owned, level, delete);
                state.wake_clients();
            }
        }
    }

    /// Register a consumer. Its cursors start at the head of every queue,
    /// so every record already present will be observed exactly once.
    pub fn client_create(&self, name: &str) -> Result<RouteBrokerClient<T>, BrokerError> {
        if name.is_empty() {
            return Err(BrokerError::InvalidName);
        }
        let wake = Arc::new(Condvar::new());
        let key = self.shared.lock().client_create(name, wake.clone());
        debug!("broker client {name} created");
        Ok(RouteBrokerClient::new(self.shared.clone(), key, wake))
    }

    pub fn stats(&self) -> BrokerStats {
        let state = self.shared.lock();
        BrokerStats {
            processed: state.processed,
            ignored: state.ignored,
            dropped: state.dropped,
        }
    }

    /// Tear the broker down. Refuses while clients or records remain;
    /// delete clients and drain deletions first.
    pub fn destroy(self) -> Result<(), BrokerError> {
        if !self.shared.lock().is_empty() {
            return Err(BrokerError::NotEmpty);
        }
        Ok(())
    }

    pub(crate) fn shared(&self) -> &Arc<BrokerShared<T>> {
        &self.shared
    }
}
