/*!
# Tomato DevKit - test doubles and fixtures for the gateway

- `MockMqttClient`: a `Publisher` that records every message and can be told
  to fail, so the engine runs without a broker
- sensor payload builder, image fixture and a fixed-result `Detector`
- `TestHarness`: a full `Gateway` wired to the mock, with helpers to feed
  messages and inspect the commands that went out
*/

pub mod mqtt_stub;
pub mod payloads;
pub mod test_utils;

pub use mqtt_stub::MockMqttClient;
pub use payloads::{FixedDetector, SensorPayloadBuilder};
pub use test_utils::TestHarness;
