//! Property tests: arbitrary interleavings of publishes, deletes and
//! consumer progress must preserve the broker's structural invariants and
//! leave every consumer holding the producer's final state.

use std::collections::HashMap;
use std::time::Duration;

use proptest::prelude::*;
use route_broker::{BrokerConfig, QueueEntry, RouteBroker, RouteBrokerClient};
use route_broker_test::TestRoute;

const KEYS: &[&str] = &["K0", "K1", "K2", "K3", "K4"];

#[derive(Debug, Clone)]
enum Op {
    Add { key: usize, priority: usize },
    Del { key: usize, priority: usize },
    Consume { client: usize, count: usize },
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..KEYS.len(), 0..3usize).prop_map(|(key, priority)| Op::Add { key, priority }),
        (0..KEYS.len(), 0..3usize).prop_map(|(key, priority)| Op::Del { key, priority }),
        (0..2usize, 1..4usize).prop_map(|(client, count)| Op::Consume { client, count }),
    ]
}

/// Last observation per topic: (was it a delete, version carried).
type Observations = HashMap<String, (bool, u32)>;

fn consume(
    client: &mut RouteBrokerClient<TestRoute>,
    seen: &mut Observations,
    count: usize,
) {
    for _ in 0..count {
        let Some(notice) = client.get_next_data(Duration::ZERO) else {
            break;
        };
        let route = notice.payload();
        seen.insert(route.key.clone(), (notice.is_delete(), route.version));
    }
}

fn check_structure(broker: &RouteBroker<TestRoute>) {
    let mut seen_topics = Vec::new();
    let mut last_ids: HashMap<usize, u64> = HashMap::new();

    for entry in broker.entries() {
        match entry {
            QueueEntry::Record {
                priority,
                id,
                topic,
                ..
            } => {
                // a topic is linked in exactly one queue at a time
                assert!(!seen_topics.contains(&topic), "topic {topic} linked twice");
                seen_topics.push(topic);

                // ids strictly decrease along the newest-first walk
                if let Some(prev) = last_ids.get(&priority) {
                    assert!(id < *prev, "ids not strictly ordered at {priority}");
                }
                last_ids.insert(priority, id);
            }
            QueueEntry::Cursor { .. } => {}
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn consumers_always_converge_on_the_producers_final_state(
        ops in proptest::collection::vec(op_strategy(), 1..120)
    ) {
        let broker = RouteBroker::new(BrokerConfig::default()).expect("broker");
        let mut clients = vec![
            broker.client_create("c0").expect("c0"),
            broker.client_create("c1").expect("c1"),
        ];
        let mut observed: Vec<Observations> = vec![HashMap::new(), HashMap::new()];

        // producer's view of the end state: key -> (latest version, alive)
        let mut model: HashMap<usize, (u32, bool)> = HashMap::new();
        let mut version = 0;

        for op in &ops {
            match *op {
                Op::Add { key, priority } => {
                    version += 1;
                    broker.publish(&TestRoute::add(KEYS[key], version), priority);
                    model.insert(key, (version, true));
                }
                Op::Del { key, priority } => {
                    broker.publish(&TestRoute::del(KEYS[key]), priority);
                    if let Some(entry) = model.get_mut(&key) {
                        entry.1 = false;
                    }
                }
                Op::Consume { client, count } => {
                    consume(&mut clients[client], &mut observed[client], count);
                }
            }
            check_structure(&broker);
        }

        // drain both clients completely
        for (client, seen) in clients.iter_mut().zip(&mut observed) {
            consume(client, seen, usize::MAX);
        }

        for seen in &observed {
            for (key, (latest, alive)) in &model {
                let topic = KEYS[*key];
                // every key the producer ever added was observed: records
                // are only reclaimed once every cursor has passed them
                let (deleted, observed_version) = seen
                    .get(topic)
                    .unwrap_or_else(|| panic!("{topic} never observed"));
                if *alive {
                    prop_assert!(!deleted, "{topic} should end as an update");
                    prop_assert_eq!(*observed_version, *latest, "{}", topic);
                } else {
                    prop_assert!(*deleted, "{topic} should end as a delete");
                }
            }
        }

        // drain-to-empty: no records survive once every client has passed
        let records = broker
            .entries()
            .into_iter()
            .filter(|entry| matches!(entry, QueueEntry::Record { .. }))
            .count();
        prop_assert_eq!(records, 0);

        for client in clients {
            client.delete();
        }
        prop_assert!(broker.destroy().is_ok());
    }
}
