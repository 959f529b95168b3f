//! The broker under real thread interleavings: a producer hammering
//! publish while consumers at different speeds drain their own clients,
//! plus the condition-variable wake and timeout paths.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use log::debug;
use route_broker::{BrokerConfig, Notice, RouteBroker, RouteBrokerClient};
use route_broker_test::{walk_rows, TestRoute};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn blocked_consumer_wakes_on_publish() {
    init_logging();
    let broker = RouteBroker::new(BrokerConfig::default()).expect("broker");
    let mut client = broker.client_create("dp").expect("client");

    let producer = {
        let broker = broker.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            broker.publish(&TestRoute::add("K1", 1), 0);
        })
    };

    let started = Instant::now();
    let notice = client.get_next_data(Duration::from_secs(30));
    let waited = started.elapsed();

    producer.join().expect("producer");
    assert_eq!(notice, Some(Notice::Update(TestRoute::add("K1", 1))));
    // woken by the publish, not by the deadline
    assert!(waited < Duration::from_secs(10), "waited {waited:?}");
}

#[test]
fn idle_consumer_times_out_without_data() {
    init_logging();
    let broker = RouteBroker::<TestRoute>::new(BrokerConfig::default()).expect("broker");
    let mut client = broker.client_create("dp").expect("client");

    let started = Instant::now();
    assert!(client.get_next_data(Duration::from_millis(50)).is_none());
    assert!(started.elapsed() >= Duration::from_millis(50));
}

/// What one consumer thread saw, keyed by topic: the last notice kind and
/// the sequence of versions it observed.
type Observations = HashMap<String, (bool, Vec<u32>)>;

fn consumer_loop(
    mut client: RouteBrokerClient<TestRoute>,
    producer_done: Arc<AtomicBool>,
    delay: Duration,
) -> (Observations, RouteBrokerClient<TestRoute>) {
    let mut seen: Observations = HashMap::new();
    loop {
        match client.get_next_data(Duration::from_millis(20)) {
            Some(notice) => {
                let route = notice.payload();
                let entry = seen.entry(route.key.clone()).or_default();
                entry.0 = notice.is_delete();
                if !notice.is_delete() {
                    entry.1.push(route.version);
                }
                if !delay.is_zero() {
                    thread::sleep(delay);
                }
            }
            None => {
                if producer_done.load(Ordering::Relaxed) {
                    // one final empty read confirms the drain
                    if client.get_next_data(Duration::ZERO).is_none() {
                        debug!("consumer drained after {} topics", seen.len());
                        return (seen, client);
                    }
                }
            }
        }
    }
}

#[test]
fn fast_and_slow_consumers_both_converge_on_final_state() {
    const KEYS: usize = 10;
    const ROUNDS: u32 = 30;

    init_logging();
    let broker = RouteBroker::new(BrokerConfig::default()).expect("broker");
    let producer_done = Arc::new(AtomicBool::new(false));

    let fast_client = broker.client_create("fast").expect("fast");
    let slow_client = broker.client_create("slow").expect("slow");

    let fast = {
        let done = producer_done.clone();
        thread::spawn(move || consumer_loop(fast_client, done, Duration::ZERO))
    };
    let slow = {
        let done = producer_done.clone();
        thread::spawn(move || consumer_loop(slow_client, done, Duration::from_millis(1)))
    };

    // churn every key through rising versions at varying priorities, then
    // delete the odd ones
    for round in 1..=ROUNDS {
        for key in 0..KEYS {
            let topic = format!("K{key}");
            broker.publish(&TestRoute::add(&topic, round), key % 3);
        }
    }
    for key in (1..KEYS).step_by(2) {
        broker.publish(&TestRoute::del(&format!("K{key}")), 0);
    }
    producer_done.store(true, Ordering::Relaxed);

    let (fast_seen, fast_client) = fast.join().expect("fast consumer");
    let (slow_seen, slow_client) = slow.join().expect("slow consumer");

    for seen in [&fast_seen, &slow_seen] {
        for key in 0..KEYS {
            let topic = format!("K{key}");
            let (deleted, versions) = seen
                .get(&topic)
                .unwrap_or_else(|| panic!("{topic} never observed"));

            // coalescing delivers the current truth, never stale history:
            // versions only rise, and the last word matches the producer
            assert!(
                versions.windows(2).all(|pair| pair[0] <= pair[1]),
                "{topic} versions went backwards: {versions:?}"
            );
            if key % 2 == 1 {
                assert!(*deleted, "{topic} should end deleted");
            } else {
                assert!(!*deleted, "{topic} should end live");
                assert_eq!(versions.last(), Some(&ROUNDS), "{topic} final version");
            }
        }
    }

    // drain-to-empty: with the producer halted and every client drained,
    // no tombstones remain
    fast_client.delete();
    slow_client.delete();
    assert!(walk_rows(&broker).is_empty());
    assert!(broker.destroy().is_ok());
}
