use canbus_sim::control::{ControlReply, ServerMessage};
use canbus_sim::core::{Frame, FrameSource, Sequence, SequenceStep};
use canbus_sim::storage::{MemoryLabelStore, MemorySequenceStore, SequenceStore};
use canbus_sim::{Simulator, SimulatorConfig};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

struct Harness {
    simulator: Simulator,
    sequences: Arc<MemorySequenceStore>,
    labels: Arc<MemoryLabelStore>,
}

fn harness() -> Harness {
    let mut config = SimulatorConfig::default();
    config.autostart_generator = false;
    let sequences = Arc::new(MemorySequenceStore::new());
    let labels = Arc::new(MemoryLabelStore::new());
    let simulator = Simulator::new(config, sequences.clone(), labels.clone()).unwrap();
    Harness {
        simulator,
        sequences,
        labels,
    }
}

fn publish(simulator: &Simulator, id: &str, data: &str) {
    let now = simulator.bus().clock().now();
    simulator
        .bus()
        .publish(Frame::parse(id, data, now, FrameSource::Live).unwrap());
}

fn assert_error(reply: &ControlReply, kind: &str) {
    assert!(!reply.success, "expected {} but call succeeded", kind);
    assert_eq!(reply.error.as_deref(), Some(kind));
    assert!(reply.message.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_malformed_and_unknown_messages() {
    let h = harness();

    let reply = h.simulator.handle_json("{not json").await;
    assert_error(&reply, "InvalidRequest");

    let reply = h.simulator.handle_json(r#"{"type": "self_destruct"}"#).await;
    assert_error(&reply, "InvalidRequest");

    let reply = h.simulator.handle_json(r#"{"type": "start_calibration"}"#).await;
    assert_error(&reply, "InvalidRequest");
}

#[tokio::test(start_paused = true)]
async fn test_error_kinds_reach_the_reply() {
    let h = harness();

    let reply = h
        .simulator
        .handle_json(r#"{"type": "playback.start", "name": "Ghost"}"#)
        .await;
    assert_error(&reply, "SequenceNotFound");

    let confirm = json!({
        "type": "confirm_calibration",
        "event_name": "Horn",
        "can_id": "0x1A2",
        "data": "AA",
    });
    let reply = h.simulator.handle_json(&confirm.to_string()).await;
    assert_error(&reply, "NoActiveResults");

    let inject = json!({"type": "calibration_message", "id": "0xZZZ", "data": "00"});
    let reply = h.simulator.handle_json(&inject.to_string()).await;
    assert_error(&reply, "InvalidFrame");

    let inject = json!({"type": "calibration_message", "id": "0x100", "data": "00"});
    let reply = h.simulator.handle_json(&inject.to_string()).await;
    assert_error(&reply, "NotObserving");

    let configure = json!({"type": "generator.configure", "rate": 0.0, "jitter": 0.1, "sender_count": 3});
    let reply = h.simulator.handle_json(&configure.to_string()).await;
    assert_error(&reply, "InvalidConfig");

    let reply = h
        .simulator
        .handle_json(r#"{"type": "event.activate", "name": "Warp Drive"}"#)
        .await;
    assert_error(&reply, "UnknownEvent");

    h.simulator
        .handle_json(r#"{"type": "start_calibration", "event_name": "Horn"}"#)
        .await;
    let reply = h
        .simulator
        .handle_json(r#"{"type": "start_calibration", "event_name": "Brake"}"#)
        .await;
    assert_error(&reply, "SessionConflict");
}

#[tokio::test(start_paused = true)]
async fn test_calibration_flow_over_json() {
    let h = harness();
    let mut status = h.simulator.subscribe_status();

    publish(&h.simulator, "0x100", "00");
    publish(&h.simulator, "0x1A2", "00FFBBCC");
    sleep(Duration::from_millis(10)).await;

    let reply = h
        .simulator
        .handle_json(r#"{"type": "start_calibration", "event_name": "Horn"}"#)
        .await;
    assert!(reply.success);
    assert_eq!(reply.data.as_ref().unwrap()["event_name"], "Horn");

    sleep(Duration::from_millis(500)).await;
    publish(&h.simulator, "0x100", "00");
    publish(&h.simulator, "0x1A2", "AAFFBBCC");
    let inject = json!({"type": "calibration_message", "id": "0x1A2", "data": "AAFFBBCC"});
    assert!(h.simulator.handle_json(&inject.to_string()).await.success);
    sleep(Duration::from_millis(10)).await;

    let reply = h.simulator.handle_json(r#"{"type": "stop_calibration"}"#).await;
    assert!(reply.success);
    let data = reply.data.unwrap();
    assert_eq!(data["ended_by"], "stopped");
    let candidates = data["candidates"].as_array().unwrap();
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0]["id"], "0x1A2");
    assert_eq!(candidates[0]["data"], "AAFFBBCC");
    assert_eq!(candidates[0]["count"], 2);

    assert!(matches!(
        status.try_recv().unwrap(),
        ServerMessage::CalibrationResults(_)
    ));

    let confirm = json!({
        "type": "confirm_calibration",
        "event_name": "Horn",
        "can_id": "0x1A2",
        "data": "AAFFBBCC",
        "vehicle_id": "demo-car",
    });
    assert!(h.simulator.handle_json(&confirm.to_string()).await.success);
    let labels = h.labels.labels().await;
    assert_eq!(labels.len(), 1);
    assert_eq!(labels[0].event_name, "Horn");

    let reply = h.simulator.handle_json(&confirm.to_string()).await;
    assert_error(&reply, "NoActiveResults");
}

#[tokio::test(start_paused = true)]
async fn test_feed_labels_and_change_detection() {
    let h = harness();
    let mut feed = h.simulator.frame_feed();

    h.simulator.calibration().start("Horn").unwrap();
    h.simulator
        .calibration()
        .inject("0x1A2".parse().unwrap(), "AAFF".parse().unwrap())
        .unwrap();
    h.simulator.calibration().stop().unwrap();
    let confirm = json!({
        "type": "confirm_calibration",
        "event_name": "Horn",
        "can_id": "0x1A2",
        "data": "AAFF",
    });
    assert!(h.simulator.handle_json(&confirm.to_string()).await.success);

    publish(&h.simulator, "0x100", "00");
    publish(&h.simulator, "0x100", "01");
    publish(&h.simulator, "0x100", "01");
    publish(&h.simulator, "0x1A2", "AAFF");

    let mut seen = Vec::new();
    while let Some(message) = feed.try_next().await {
        if let ServerMessage::CanMessage(wire) = message {
            seen.push(wire);
        }
    }
    assert_eq!(seen.len(), 4);
    let changes: Vec<bool> = seen.iter().map(|w| w.change_detected).collect();
    assert_eq!(changes, vec![false, true, false, false]);
    assert!(seen[..3].iter().all(|w| w.label.is_none()));
    assert_eq!(seen[3].label.as_deref(), Some("Horn"));
    assert_eq!(seen[3].id, "0x1A2");
}

#[tokio::test(start_paused = true)]
async fn test_playback_controls_over_json() {
    let h = harness();
    let steps = vec![
        SequenceStep::new("0x1A2".parse().unwrap(), "AA".parse().unwrap(), 0.0).unwrap(),
        SequenceStep::new("0x1A2".parse().unwrap(), "00".parse().unwrap(), 1.0).unwrap(),
    ];
    h.sequences
        .save(Sequence::new("Horn Test", steps).unwrap())
        .await
        .unwrap();

    let reply = h
        .simulator
        .handle_json(r#"{"type": "playback.start", "name": "Horn Test", "loop": false}"#)
        .await;
    assert!(reply.success);
    let data = reply.data.unwrap();
    assert_eq!(data["state"], "playing");
    assert_eq!(data["total"], 2);

    sleep(Duration::from_millis(200)).await;
    let reply = h.simulator.handle_json(r#"{"type": "playback.pause"}"#).await;
    assert_eq!(reply.data.unwrap()["changed"], true);

    let reply = h.simulator.handle_json(r#"{"type": "playback.progress"}"#).await;
    let data = reply.data.unwrap();
    assert_eq!(data["state"], "paused");
    assert_eq!(data["current_index"], 1);

    let reply = h.simulator.handle_json(r#"{"type": "playback.stop"}"#).await;
    assert_eq!(reply.data.unwrap()["stopped"], true);
    let reply = h.simulator.handle_json(r#"{"type": "playback.stop"}"#).await;
    assert!(reply.success);
    assert_eq!(reply.data.unwrap()["stopped"], false);
}

#[tokio::test(start_paused = true)]
async fn test_generator_and_event_controls() {
    let h = harness();
    let mut feed = h.simulator.frame_feed();

    let reply = h
        .simulator
        .handle_json(r#"{"type": "event.activate", "name": "Horn"}"#)
        .await;
    assert!(reply.success);
    assert_eq!(reply.data.unwrap()["id"], "0x1A2");

    let configure = json!({"type": "generator.configure", "rate": 20.0, "jitter": 0.0, "sender_count": 4});
    let reply = h.simulator.handle_json(&configure.to_string()).await;
    assert!(reply.success);
    assert_eq!(reply.data.unwrap()["seed"], h.simulator.config().generator.seed);

    let reply = h.simulator.handle_json(r#"{"type": "generator.start"}"#).await;
    assert_eq!(reply.data.unwrap()["changed"], true);
    sleep(Duration::from_millis(500)).await;
    let reply = h.simulator.handle_json(r#"{"type": "generator.stop"}"#).await;
    assert_eq!(reply.data.unwrap()["changed"], true);

    let mut frames = 0;
    while let Some(message) = feed.try_next().await {
        if matches!(message, ServerMessage::CanMessage(_)) {
            frames += 1;
        }
    }
    assert!(frames > 5, "only {} frames", frames);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_is_idempotent_and_ends_feeds() {
    let h = harness();
    let mut feed = h.simulator.frame_feed();

    h.simulator.generator().start();
    h.simulator.calibration().start("Horn").unwrap();
    sleep(Duration::from_millis(100)).await;

    h.simulator.shutdown().await;
    h.simulator.shutdown().await;

    assert!(!h.simulator.generator().is_running());
    assert!(h.simulator.bus().is_closed());
    assert!(feed.next().await.is_none());
}
