use crate::queue::NodeIndex;

/// One record per distinct topic key currently known to the broker.
///
/// The topic index holds the single strong reference; the priority queue
/// node refers back here by arena key only. A record is destroyed when it
/// is unlinked from its queue and removed from the index together, which
/// happens on tombstone reclaim or on a no-client delete.
pub(crate) struct ObjectRecord<T> {
    /// Topic key, already truncated to the configured maximum.
    pub topic: String,
    /// The latest payload published under this topic.
    pub data: T,
    /// Which priority queue currently links this record.
    pub priority: usize,
    /// Set once the producer has deleted the topic while some cursor still
    /// trails; the record stays queued so trailing cursors emit a deletion
    /// notice before it is reclaimed.
    pub deleted: bool,
    /// Linkage slot in `queues[priority]`.
    pub node: NodeIndex,
}
