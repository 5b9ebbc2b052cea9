use anyhow::{Context, Result};
use canbus_sim::control::ServerMessage;
use canbus_sim::core::{Sequence, SequenceStep};
use canbus_sim::playback::PlaybackPhase;
use canbus_sim::storage::{MemoryLabelStore, MemorySequenceStore, SequenceStore};
use canbus_sim::{Simulator, SimulatorConfig};
use serde_json::json;
use std::sync::Arc;
use tokio::time::{sleep, Duration};

#[tokio::main]
async fn main() -> Result<()> {
    println!("CAN Bus Simulator - Calibration & Playback Demo");
    println!("===============================================\n");

    let mut config = SimulatorConfig::default();
    config.generator.rate = 50.0;
    config.calibration.window_secs = 2.0;

    let sequences = Arc::new(MemorySequenceStore::new());
    let labels = Arc::new(MemoryLabelStore::new());
    let simulator = Simulator::new(config, sequences.clone(), labels.clone())
        .context("Failed to build simulator")?;
    let mut status = simulator.subscribe_status();

    // Demo 1: calibrate the horn
    println!("=== Demo 1: Calibration ===");
    println!("Collecting baseline traffic for 1s...");
    sleep(Duration::from_secs(1)).await;

    let reply = simulator
        .handle_json(r#"{"type": "start_calibration", "event_name": "Horn"}"#)
        .await;
    println!("start_calibration -> success={}", reply.success);

    simulator.generator().activate_event("Horn")?;
    sleep(Duration::from_millis(800)).await;
    simulator.generator().deactivate_event("Horn")?;

    let Some(results) = simulator.calibration().stop() else {
        println!("Calibration window closed before stop");
        return Ok(());
    };

    println!("\nCandidates for {:?}:", results.event_name);
    for candidate in &results.candidates {
        println!(
            "  {:>8}  {:<16}  count={:<3} score={:.2}",
            candidate.id.to_string(),
            candidate.data.to_hex(),
            candidate.count,
            candidate.score
        );
    }

    if let Some(top) = results.candidates.first() {
        let confirm = json!({
            "type": "confirm_calibration",
            "event_name": results.event_name,
            "can_id": top.id.to_string(),
            "data": top.data.to_hex(),
        });
        let reply = simulator.handle_json(&confirm.to_string()).await;
        println!("\nconfirm_calibration -> success={}", reply.success);
        println!("Labels stored: {}", labels.labels().await.len());
    }

    // Demo 2: replay a short sequence
    println!("\n=== Demo 2: Playback ===");
    simulator.generator().stop();
    let steps = vec![
        SequenceStep::new("0x1A2".parse()?, "AAFFBBCC00000000".parse()?, 0.0)?,
        SequenceStep::new("0x1A2".parse()?, "00FFBBCC00000000".parse()?, 0.5)?,
        SequenceStep::new("0x4D7".parse()?, "FFAA000000000000".parse()?, 0.5)?,
    ];
    sequences.save(Sequence::new("Horn Then Brake", steps)?).await?;

    let reply = simulator
        .handle_json(r#"{"type": "playback.start", "name": "Horn Then Brake"}"#)
        .await;
    println!("playback.start -> success={}", reply.success);

    loop {
        match status.recv().await? {
            ServerMessage::PlaybackStatus(progress) => {
                println!(
                    "  [{:?}] step {}/{} elapsed={:.2}s",
                    progress.state, progress.current_index, progress.total, progress.elapsed
                );
                if matches!(progress.state, PlaybackPhase::Completed | PlaybackPhase::Stopped) {
                    break;
                }
            }
            ServerMessage::CalibrationResults(_) => {}
            other => println!("  {:?}", other),
        }
    }

    let reply = simulator
        .handle_json(r#"{"type": "playback.start", "name": "No Such Sequence"}"#)
        .await;
    println!(
        "\nplayback.start (unknown) -> success={} error={:?}",
        reply.success, reply.error
    );

    simulator.shutdown().await;
    println!("\n{}", simulator.bus().report());
    Ok(())
}
