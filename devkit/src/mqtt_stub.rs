/*!
Mock MQTT client for running the gateway without a broker.

Records every publish and can be switched into failure mode to exercise the
publish-error paths. Publishes on one topic can also be held back until
released, to line up concurrent commands.
*/

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

use tomato_gateway::{Publisher, PublishError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

impl MockMessage {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}

#[derive(Clone, Default)]
pub struct MockMqttClient {
    published_messages: Arc<Mutex<Vec<MockMessage>>>,
    failing: Arc<AtomicBool>,
    fail_next: Arc<AtomicUsize>,
    held_topic: Arc<Mutex<Option<String>>>,
    held_waiting: Arc<AtomicUsize>,
    release: Arc<Notify>,
}

impl MockMqttClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every publish fails while set.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// The next `count` publishes fail, then delivery resumes.
    pub fn fail_next(&self, count: usize) {
        self.fail_next.store(count, Ordering::SeqCst);
    }

    /// The next publish on `topic` waits until `release` is called.
    pub fn hold(&self, topic: &str) {
        *self.held_topic.lock() = Some(topic.to_string());
    }

    pub fn release(&self) {
        *self.held_topic.lock() = None;
        self.release.notify_one();
    }

    /// Publishes currently parked by `hold`.
    pub fn held_count(&self) -> usize {
        self.held_waiting.load(Ordering::SeqCst)
    }

    pub fn get_published_messages(&self) -> Vec<MockMessage> {
        self.published_messages.lock().clone()
    }

    pub fn find_messages_by_topic(&self, topic: &str) -> Vec<MockMessage> {
        self.published_messages.lock().iter().filter(|msg| msg.topic == topic).cloned().collect()
    }

    /// Text payloads published on `topic`, oldest first.
    pub fn payloads_on(&self, topic: &str) -> Vec<String> {
        self.find_messages_by_topic(topic).iter().map(MockMessage::text).collect()
    }

    pub fn json_messages_on(&self, topic: &str) -> Vec<Value> {
        self.find_messages_by_topic(topic)
            .iter()
            .filter_map(|msg| serde_json::from_slice(&msg.payload).ok())
            .collect()
    }

    pub fn clear(&self) {
        self.published_messages.lock().clear();
    }

    fn should_fail(&self) -> bool {
        if self.failing.load(Ordering::SeqCst) {
            return true;
        }
        self.fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl Publisher for MockMqttClient {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), PublishError> {
        let held = self.held_topic.lock().as_deref() == Some(topic);
        if held {
            self.held_waiting.fetch_add(1, Ordering::SeqCst);
            self.release.notified().await;
            self.held_waiting.fetch_sub(1, Ordering::SeqCst);
        }
        if self.should_fail() {
            tracing::debug!(topic, "[MOCK] publish refused");
            return Err(PublishError::Transport("mock broker unavailable".into()));
        }
        tracing::debug!(topic, bytes = payload.len(), "[MOCK] published");
        self.published_messages.lock().push(MockMessage { topic: topic.to_string(), payload });
        Ok(())
    }
}
