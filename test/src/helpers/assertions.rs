use std::time::Duration;

use route_broker::{Notice, QueueEntry, RouteBroker, RouteBrokerClient};

use super::TestRoute;

/// Render the broker's queue walk as compact rows (per priority, newest
/// first) for order assertions: `"0|k1"` is a live record, `"0|D k1"` a
/// tombstoned one, `"0|C name"` a client cursor.
pub fn walk_rows(broker: &RouteBroker<TestRoute>) -> Vec<String> {
    broker
        .entries()
        .iter()
        .map(|entry| match entry {
            QueueEntry::Record {
                priority,
                topic,
                deleted,
                ..
            } => {
                if *deleted {
                    format!("{priority}|D {topic}")
                } else {
                    format!("{priority}|{topic}")
                }
            }
            QueueEntry::Cursor { priority, name, .. } => format!("{priority}|C {name}"),
        })
        .collect()
}

/// Consume until the client reports no more data, returning every notice
/// in observation order.
pub fn drain(client: &mut RouteBrokerClient<TestRoute>) -> Vec<Notice<TestRoute>> {
    std::iter::from_fn(|| client.get_next_data(Duration::ZERO)).collect()
}
