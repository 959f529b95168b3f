use route_broker::{BrokerObject, CopyError, TopicVerdict};

/// The payload used across the integration suite: a topic key, a delete
/// flag, and a version number so tests can tell which publish a consumer
/// actually observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestRoute {
    pub key: String,
    pub delete: bool,
    pub version: u32,
}

impl TestRoute {
    pub fn add(key: &str, version: u32) -> Self {
        Self {
            key: key.to_owned(),
            delete: false,
            version,
        }
    }

    pub fn del(key: &str) -> Self {
        Self {
            key: key.to_owned(),
            delete: true,
            version: 0,
        }
    }
}

impl BrokerObject for TestRoute {
    fn topic(&self) -> TopicVerdict {
        if self.key.is_empty() {
            TopicVerdict::Ignore
        } else {
            TopicVerdict::Publish {
                key: self.key.clone(),
                delete: self.delete,
            }
        }
    }

    fn try_copy(&self) -> Result<Self, CopyError> {
        Ok(self.clone())
    }
}
