use crate::types::RoutePriority;

/// Contains Config properties which will be used by a broker instance.
#[derive(Clone, Debug)]
pub struct BrokerConfig {
    /// Number of priority levels. Level 0 is most urgent.
    pub priority_levels: usize,
    /// Maximum length of a topic key in bytes; longer keys are truncated.
    pub max_topic_len: usize,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            priority_levels: RoutePriority::COUNT,
            max_topic_len: 200,
        }
    }
}
