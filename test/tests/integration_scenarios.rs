//! End-to-end runs of the broker's defining behaviors: coalescing,
//! tombstone retention, priority escalation in both directions, and
//! mid-stream client creation.

use std::time::Duration;

use route_broker::{BrokerConfig, Notice, RouteBroker};
use route_broker_test::{drain, walk_rows, TestRoute};

const NOW: Duration = Duration::ZERO;

fn broker() -> RouteBroker<TestRoute> {
    RouteBroker::new(BrokerConfig::default()).expect("broker")
}

#[test]
fn repeated_adds_coalesce_to_one_observation() {
    let broker = broker();
    broker.publish(&TestRoute::add("1.1.1.0/24", 1), 1);
    broker.publish(&TestRoute::add("1.1.1.0/24", 2), 1);
    broker.publish(&TestRoute::add("1.1.1.0/24", 3), 1);
    assert_eq!(walk_rows(&broker), vec!["1|1.1.1.0/24"]);

    let mut client = broker.client_create("dp").expect("client");
    let seen = drain(&mut client);
    assert_eq!(seen, vec![Notice::Update(TestRoute::add("1.1.1.0/24", 3))]);
    assert!(client.get_next_data(NOW).is_none());
}

#[test]
fn tombstone_is_retained_for_every_trailing_client() {
    let broker = broker();
    let mut client_a = broker.client_create("A").expect("A");
    let mut client_b = broker.client_create("B").expect("B");

    broker.publish(&TestRoute::add("K1", 1), 0);
    assert_eq!(
        drain(&mut client_a),
        vec![Notice::Update(TestRoute::add("K1", 1))]
    );

    broker.publish(&TestRoute::del("K1"), 0);
    assert!(walk_rows(&broker).contains(&"0|D K1".to_owned()));

    // A saw the add and now emits the delete; B emits the delete as its
    // first and only observation
    assert_eq!(drain(&mut client_a), vec![Notice::Delete(TestRoute::del("K1"))]);
    assert!(walk_rows(&broker).contains(&"0|D K1".to_owned()));
    assert_eq!(drain(&mut client_b), vec![Notice::Delete(TestRoute::del("K1"))]);

    // both cursors passed it: physically removed
    assert!(!walk_rows(&broker).iter().any(|row| row.contains("K1")));
}

#[test]
fn escalating_update_abandons_the_stale_position() {
    let broker = broker();
    let mut client = broker.client_create("dp").expect("client");
    broker.publish(&TestRoute::add("K1", 1), 2);
    broker.publish(&TestRoute::add("K1", 2), 0);

    assert_eq!(
        walk_rows(&broker),
        vec!["0|K1", "0|C dp", "1|C dp", "2|C dp"]
    );

    let seen = drain(&mut client);
    assert_eq!(seen, vec![Notice::Update(TestRoute::add("K1", 2))]);
    // the abandoned level reads as fully drained
    assert_eq!(client.stats().behind, vec![0, 0, 0]);
}

#[test]
fn escalating_delete_notifies_at_the_higher_priority_only() {
    let broker = broker();
    let mut slow = broker.client_create("slow").expect("client");
    broker.publish(&TestRoute::add("K1", 1), 2);
    // cursor[2] is behind K1 when the higher-priority delete arrives
    broker.publish(&TestRoute::del("K1"), 0);

    assert_eq!(
        walk_rows(&broker),
        vec!["0|D K1", "0|C slow", "1|C slow", "2|C slow"]
    );

    let seen = drain(&mut slow);
    assert_eq!(seen, vec![Notice::Delete(TestRoute::del("K1"))]);
    assert!(!walk_rows(&broker).iter().any(|row| row.contains("K1")));
}

#[test]
fn deescalating_update_stays_in_the_urgent_queue() {
    let broker = broker();
    let mut client = broker.client_create("dp").expect("client");
    broker.publish(&TestRoute::add("K1", 1), 0);
    assert_eq!(drain(&mut client).len(), 1);

    broker.publish(&TestRoute::add("K1", 2), 2);
    assert_eq!(
        walk_rows(&broker),
        vec!["0|K1", "0|C dp", "1|C dp", "2|C dp"]
    );
    assert_eq!(
        drain(&mut client),
        vec![Notice::Update(TestRoute::add("K1", 2))]
    );
}

#[test]
fn late_client_observes_the_backlog_exactly_once() {
    let broker = broker();
    for n in 1..=10 {
        broker.publish(&TestRoute::add(&format!("K{n}"), n), 1);
    }

    let mut late = broker.client_create("late").expect("client");
    assert_eq!(late.stats().behind, vec![0, 10, 0]);

    let seen = drain(&mut late);
    let keys: Vec<&str> = seen
        .iter()
        .map(|notice| notice.payload().key.as_str())
        .collect();
    assert_eq!(
        keys,
        vec!["K1", "K2", "K3", "K4", "K5", "K6", "K7", "K8", "K9", "K10"]
    );
    assert!(seen.iter().all(|notice| !notice.is_delete()));
}
