use crate::error::CopyError;

/// What the topic generator made of a payload.
pub enum TopicVerdict {
    /// Insert or update the record stored under `key`, or tombstone it when
    /// `delete` is set.
    Publish { key: String, delete: bool },
    /// The payload is of no interest (e.g. a broadcast route); it is counted
    /// and discarded without touching any queue.
    Ignore,
}

/// A payload the broker can store and fan out.
///
/// The broker never hands out its internal payload; every consumer delivery
/// and every record insert goes through `try_copy`, so the producer keeps
/// its buffer and each consumer owns its own bytes. Release is `Drop`.
pub trait BrokerObject: Send + Sized + 'static {
    /// Derive the topic key for this payload, and whether it represents a
    /// removal. Called once per publish, before any queue is touched.
    fn topic(&self) -> TopicVerdict;

    /// Produce an owned copy. Called with the broker lock held; must not
    /// block.
    fn try_copy(&self) -> Result<Self, CopyError>;
}
