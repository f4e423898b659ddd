//! End-to-end automation scenarios: inbound message -> store -> policy worker
//! -> dispatcher -> mock broker. The clock is paused so cooldown and watering
//! timers run deterministically.

use std::time::Duration;

use tomato_devkit::{SensorPayloadBuilder, TestHarness};
use tomato_gateway::control::ManualCommand;
use tomato_gateway::{Actuator, Mode};

fn dry_soil() -> SensorPayloadBuilder {
    SensorPayloadBuilder::new().temp(25.0).moisture(20.0)
}

#[tokio::test(start_paused = true)]
async fn dry_soil_waters_then_stops_after_duration() {
    let harness = TestHarness::new();

    harness.send_sensors(dry_soil()).await.unwrap();
    harness.settle().await;

    assert_eq!(harness.commands_for(Actuator::Pump), vec!["on"]);
    let state = harness.state();
    assert!(state.actuators.pump);
    assert!(state.cooldowns.pump.is_some());
    assert!(harness.gateway.policy().watering().is_armed());

    harness.advance(Duration::from_millis(2000)).await;

    assert_eq!(harness.commands_for(Actuator::Pump), vec!["on", "off"]);
    assert!(!harness.state().actuators.pump);
    assert!(!harness.gateway.policy().watering().is_armed());
}

#[tokio::test(start_paused = true)]
async fn watering_respects_cooldown_from_activation() {
    let harness = TestHarness::new();

    harness.send_sensors(dry_soil()).await.unwrap();
    harness.settle().await;
    let activated_at = harness.state().cooldowns.pump;

    // readings keep coming while the soil stays dry
    for _ in 0..5 {
        harness.advance(Duration::from_secs(5)).await;
        harness.send_sensors(dry_soil()).await.unwrap();
        harness.settle().await;
    }
    let pump = harness.commands_for(Actuator::Pump);
    assert_eq!(pump.iter().filter(|c| *c == "on").count(), 1, "watered again inside cooldown: {pump:?}");
    assert_eq!(harness.state().cooldowns.pump, activated_at);

    harness.advance(Duration::from_secs(5)).await;
    harness.send_sensors(dry_soil()).await.unwrap();
    harness.settle().await;

    let pump = harness.commands_for(Actuator::Pump);
    assert_eq!(pump.iter().filter(|c| *c == "on").count(), 2);
}

#[tokio::test(start_paused = true)]
async fn bright_light_turns_grow_light_off() {
    let harness = TestHarness::new();

    harness.send_sensors(SensorPayloadBuilder::new().temp(25.0).moisture(50.0).light(10.0)).await.unwrap();
    harness.settle().await;
    assert!(harness.state().actuators.light);

    harness.send_sensors(SensorPayloadBuilder::new().light(60.0)).await.unwrap();
    harness.settle().await;

    assert_eq!(harness.commands_for(Actuator::Light), vec!["on", "off"]);
    assert!(!harness.state().actuators.light);
}

#[tokio::test(start_paused = true)]
async fn identical_readings_send_no_redundant_commands() {
    let harness = TestHarness::new();
    let hot_and_dark = || SensorPayloadBuilder::new().temp(35.0).moisture(50.0).light(5.0);

    for _ in 0..4 {
        harness.send_sensors(hot_and_dark()).await.unwrap();
        harness.settle().await;
    }

    assert_eq!(harness.commands_for(Actuator::Fan), vec!["on"]);
    assert_eq!(harness.commands_for(Actuator::Light), vec!["on"]);
    assert!(harness.commands_for(Actuator::Pump).is_empty());
}

#[tokio::test(start_paused = true)]
async fn no_decision_without_temperature_and_moisture() {
    let harness = TestHarness::new();

    harness.send_sensors(SensorPayloadBuilder::new().light(5.0).moisture(10.0)).await.unwrap();
    harness.settle().await;

    assert!(harness.mqtt_client.get_published_messages().is_empty());
}

#[tokio::test(start_paused = true)]
async fn manual_mode_skips_automation() {
    let harness = TestHarness::with_mode(Mode::Manual);

    harness.send_sensors(SensorPayloadBuilder::new().temp(40.0).moisture(5.0).light(5.0)).await.unwrap();
    harness.settle().await;

    assert!(harness.mqtt_client.get_published_messages().is_empty());
    assert!(!harness.state().actuators.any());
}

#[tokio::test(start_paused = true)]
async fn hybrid_override_pins_fan_until_mode_change() {
    let harness = TestHarness::with_mode(Mode::Hybrid);

    let command = ManualCommand { fan: Some(true), ..Default::default() };
    harness.gateway.control().manual_command(&command).await.unwrap();
    assert!(harness.state().overrides.fan);
    assert!(harness.state().actuators.fan);

    // cool air would normally switch the fan off
    harness.send_sensors(SensorPayloadBuilder::new().temp(20.0).moisture(50.0)).await.unwrap();
    harness.settle().await;
    assert_eq!(harness.commands_for(Actuator::Fan), vec!["on"]);
    assert!(harness.state().actuators.fan);

    harness.send_mode("auto").await.unwrap();
    assert!(!harness.state().overrides.fan);

    harness.send_sensors(SensorPayloadBuilder::new().temp(20.0).moisture(50.0)).await.unwrap();
    harness.settle().await;
    assert_eq!(harness.commands_for(Actuator::Fan), vec!["on", "off"]);
    assert!(!harness.state().actuators.fan);
}

#[tokio::test(start_paused = true)]
async fn mode_change_before_evaluation_discards_decision() {
    let harness = TestHarness::new();

    harness.send_sensors(SensorPayloadBuilder::new().temp(40.0).moisture(50.0)).await.unwrap();
    // the worker has not run yet; the snapshot it holds is from the old epoch
    harness.send_mode("manual").await.unwrap();
    harness.settle().await;

    assert!(harness.commands_for(Actuator::Fan).is_empty());
    assert!(!harness.state().actuators.fan);
}

#[tokio::test(start_paused = true)]
async fn failed_command_is_retried_on_next_cycle() {
    let harness = TestHarness::new();
    harness.mqtt_client.set_failing(true);

    harness.send_sensors(SensorPayloadBuilder::new().temp(35.0).moisture(50.0)).await.unwrap();
    harness.settle().await;
    assert!(!harness.state().actuators.fan);

    harness.mqtt_client.set_failing(false);
    harness.send_sensors(SensorPayloadBuilder::new().temp(35.0).moisture(50.0)).await.unwrap();
    harness.settle().await;

    assert_eq!(harness.commands_for(Actuator::Fan), vec!["on"]);
    assert!(harness.state().actuators.fan);
}

#[tokio::test(start_paused = true)]
async fn failed_pump_on_releases_cooldown() {
    let harness = TestHarness::new();
    harness.mqtt_client.fail_next(1);

    harness.send_sensors(dry_soil()).await.unwrap();
    harness.settle().await;
    assert!(harness.commands_for(Actuator::Pump).is_empty());
    assert!(harness.state().cooldowns.pump.is_none());
    assert!(!harness.gateway.policy().watering().is_armed());

    harness.send_sensors(dry_soil()).await.unwrap();
    harness.settle().await;
    assert_eq!(harness.commands_for(Actuator::Pump), vec!["on"]);
}

#[tokio::test(start_paused = true)]
async fn pump_off_fires_even_when_pinned_during_watering() {
    let harness = TestHarness::with_mode(Mode::Hybrid);

    harness.send_sensors(dry_soil()).await.unwrap();
    harness.settle().await;
    assert_eq!(harness.commands_for(Actuator::Pump), vec!["on"]);
    let activated_at = harness.state().cooldowns.pump;

    let command = ManualCommand { pump: Some(true), ..Default::default() };
    harness.gateway.control().manual_command(&command).await.unwrap();
    assert!(harness.state().overrides.pump);

    harness.advance(Duration::from_millis(2000)).await;

    assert_eq!(harness.commands_for(Actuator::Pump), vec!["on", "on", "off"]);
    assert_eq!(harness.state().cooldowns.pump, activated_at);
}

#[tokio::test(start_paused = true)]
async fn pump_off_is_retried_after_publish_failure() {
    let harness = TestHarness::new();

    harness.send_sensors(dry_soil()).await.unwrap();
    harness.settle().await;

    harness.mqtt_client.fail_next(1);
    harness.advance(Duration::from_millis(2000)).await;
    assert!(harness.state().actuators.pump);

    harness.advance(Duration::from_secs(1)).await;
    assert_eq!(harness.commands_for(Actuator::Pump), vec!["on", "off"]);
    assert!(!harness.state().actuators.pump);
}

#[tokio::test(start_paused = true)]
async fn malformed_and_unknown_messages_change_nothing() {
    let harness = TestHarness::new();
    let before = harness.state();

    assert!(harness.deliver("tomato/sensors/data", b"{broken").await.is_err());
    assert!(harness.deliver("tomato/sensors/data", b"[1,2,3]").await.is_err());
    assert!(harness.send_mode("turbo").await.is_err());
    assert!(harness.deliver("tomato/unknown", b"x").await.is_err());
    harness.settle().await;

    let after = harness.state();
    assert_eq!(after.mode, before.mode);
    assert_eq!(after.sensors, before.sensors);
    assert_eq!(after.liveness, before.liveness);
    assert!(harness.mqtt_client.get_published_messages().is_empty());
}

#[tokio::test(start_paused = true)]
async fn node_status_drives_liveness() {
    let harness = TestHarness::new();

    harness.deliver("tomato/esp32/status", b"online").await.unwrap();
    harness.deliver("tomato/camera/status", b"online").await.unwrap();
    assert!(harness.state().liveness.sensor_node && harness.state().liveness.camera_node);

    harness.deliver("tomato/camera/status", b"rebooting").await.unwrap();
    assert!(!harness.state().liveness.camera_node);
}

#[tokio::test(start_paused = true)]
async fn shutdown_switches_everything_off() {
    let harness = TestHarness::new();

    harness.send_sensors(SensorPayloadBuilder::new().temp(35.0).moisture(20.0).light(5.0)).await.unwrap();
    harness.settle().await;
    assert!(harness.state().actuators.any());

    harness.gateway.shutdown().await;

    assert!(!harness.state().actuators.any());
    assert!(!harness.gateway.policy().watering().is_armed());
    assert_eq!(harness.mqtt_client.payloads_on("tomato/raspi/status"), vec!["offline"]);

    // the cancelled watering timer must not fire later
    harness.advance(Duration::from_secs(5)).await;
    assert_eq!(harness.commands_for(Actuator::Pump), vec!["on", "off"]);
}

#[tokio::test(start_paused = true)]
async fn manual_pin_waits_for_policy_command_in_flight() {
    let harness = TestHarness::with_mode(Mode::Hybrid);
    harness.gateway.store().update(|s| s.actuators.fan = true);
    harness.mqtt_client.hold("tomato/fan/control");

    // cool air: the policy sends fan off and the publish stalls
    harness.send_sensors(SensorPayloadBuilder::new().temp(20.0).moisture(50.0)).await.unwrap();
    harness.settle().await;
    assert_eq!(harness.mqtt_client.held_count(), 1);

    let control = harness.gateway.control().clone();
    let manual = tokio::spawn(async move {
        let command = ManualCommand { fan: Some(true), ..Default::default() };
        control.manual_command(&command).await
    });
    harness.settle().await;
    assert!(!harness.state().overrides.fan, "pin taken while a fan command was in flight");

    harness.mqtt_client.release();
    manual.await.unwrap().unwrap();
    harness.settle().await;

    let state = harness.state();
    assert!(state.overrides.fan);
    assert!(state.actuators.fan);
    assert_eq!(harness.commands_for(Actuator::Fan), vec!["off", "on"]);
}

#[tokio::test(start_paused = true)]
async fn mode_change_waits_for_policy_command_in_flight() {
    let harness = TestHarness::new();
    harness.mqtt_client.hold("tomato/fan/control");

    harness.send_sensors(SensorPayloadBuilder::new().temp(35.0).moisture(50.0)).await.unwrap();
    harness.settle().await;
    assert_eq!(harness.mqtt_client.held_count(), 1);

    let ingest = harness.gateway.ingest().clone();
    let switch = tokio::spawn(async move { ingest.handle("tomato/system/mode", b"manual").await });
    harness.settle().await;
    assert_eq!(harness.state().mode, Mode::Auto);

    harness.mqtt_client.release();
    switch.await.unwrap().unwrap();
    assert_eq!(harness.state().mode, Mode::Manual);
    assert!(harness.state().actuators.fan);

    harness.send_sensors(SensorPayloadBuilder::new().temp(20.0).moisture(50.0)).await.unwrap();
    harness.settle().await;
    assert_eq!(harness.commands_for(Actuator::Fan), vec!["on"]);
}

#[tokio::test(start_paused = true)]
async fn readings_after_shutdown_are_not_acted_on() {
    let harness = TestHarness::new();
    harness.gateway.shutdown().await;

    harness.send_sensors(SensorPayloadBuilder::new().temp(40.0).moisture(10.0).light(5.0)).await.unwrap();
    harness.advance(Duration::from_secs(5)).await;

    let state = harness.state();
    assert_eq!(state.sensors.air_temperature, Some(40.0));
    assert!(!state.actuators.any());
    for actuator in Actuator::ALL {
        assert_eq!(harness.commands_for(actuator), vec!["off"], "{actuator} switched after shutdown");
    }
}

#[tokio::test(start_paused = true)]
async fn own_mode_announcement_does_not_clear_new_pins() {
    let harness = TestHarness::new();
    harness.gateway.control().change_mode(Some("hybrid")).await.unwrap();

    let command = ManualCommand { fan: Some(true), ..Default::default() };
    harness.gateway.control().manual_command(&command).await.unwrap();

    // the broker loops the announcement back to the gateway
    harness.send_mode("hybrid").await.unwrap();
    assert!(harness.state().overrides.fan);

    // any further mode message is a real request
    harness.send_mode("hybrid").await.unwrap();
    assert!(!harness.state().overrides.fan);
}
