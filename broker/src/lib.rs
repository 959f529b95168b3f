//! # Route Broker
//! A multi-priority publish/subscribe engine with per-client cursors.
//!
//! The broker absorbs a high-rate stream of keyed route change events,
//! coalesces redundant updates so each topic holds only its latest payload,
//! and lets every registered client drain the priority queues at its own
//! pace: slow consumers never block the producer, fast consumers suspend on
//! their own condition variable instead of spinning. Deletions are retained
//! as tombstones until the slowest interested cursor has emitted them, and
//! an update at a more urgent priority migrates its record ahead of any
//! stale lower-priority position.

#![deny(trivial_numeric_casts, unstable_features, unused_import_braces)]

mod broker;
mod client;
mod config;
mod engine;
mod error;
mod object;
mod queue;
mod record;
mod show;
mod types;


pub use broker::{BrokerStats, RouteBroker};
pub use client::{ClientStats, Notice, RouteBrokerClient};
pub use config::BrokerConfig;
pub use error::{BrokerError, CopyError};
pub use object::{BrokerObject, TopicVerdict};
pub use show::QueueEntry;
pub use types::{RoutePriority, SequenceId};
