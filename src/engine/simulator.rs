use super::ClientFeed;
use crate::bus::FrameBus;
use crate::calibration::CalibrationController;
use crate::config::SimulatorConfig;
use crate::control::{ControlMessage, ControlReply, FrameWire, ServerMessage};
use crate::core::{CanId, Payload, SimResult};
use crate::generator::{GeneratorPlan, TrafficGenerator};
use crate::monitor::TrafficMonitor;
use crate::playback::PlaybackScheduler;
use crate::storage::{LabelStore, SequenceStore};
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

const STATUS_CHANNEL_CAPACITY: usize = 256;

/// Owns every simulator component and routes control messages to them.
///
/// Must be constructed inside a tokio runtime.
pub struct Simulator {
    config: SimulatorConfig,
    bus: FrameBus,
    monitor: TrafficMonitor,
    generator: TrafficGenerator,
    calibration: CalibrationController,
    playback: PlaybackScheduler,
    sequences: Arc<dyn SequenceStore>,
    labels: Arc<dyn LabelStore>,
    status_tx: broadcast::Sender<ServerMessage>,
    shut_down: AtomicBool,
}

impl Simulator {
    pub fn new(
        config: SimulatorConfig,
        sequences: Arc<dyn SequenceStore>,
        labels: Arc<dyn LabelStore>,
    ) -> SimResult<Self> {
        config.validate()?;

        let (status_tx, _) = broadcast::channel(STATUS_CHANNEL_CAPACITY);
        let bus = FrameBus::new(config.bus_capacity);

        let monitor = TrafficMonitor::with_capacity(
            bus.clone(),
            config.monitor.history_per_id,
            config.monitor.recent_capacity,
        );
        monitor.start();

        let generator = TrafficGenerator::new(bus.clone(), config.generator.clone())?;
        let calibration = CalibrationController::new(
            bus.clone(),
            monitor.clone(),
            labels.clone(),
            config.calibration.clone(),
            status_tx.clone(),
        );
        let playback = PlaybackScheduler::new(
            bus.clone(),
            sequences.clone(),
            config.playback.clone(),
            status_tx.clone(),
        );

        if config.autostart_generator {
            generator.start();
        }

        tracing::info!(
            bus_capacity = config.bus_capacity,
            rate = config.generator.rate,
            senders = config.generator.sender_count,
            generator = config.autostart_generator,
            "simulator ready"
        );

        Ok(Self {
            config,
            bus,
            monitor,
            generator,
            calibration,
            playback,
            sequences,
            labels,
            status_tx,
            shut_down: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &SimulatorConfig {
        &self.config
    }

    pub fn bus(&self) -> &FrameBus {
        &self.bus
    }

    pub fn monitor(&self) -> &TrafficMonitor {
        &self.monitor
    }

    pub fn generator(&self) -> &TrafficGenerator {
        &self.generator
    }

    pub fn calibration(&self) -> &CalibrationController {
        &self.calibration
    }

    pub fn playback(&self) -> &PlaybackScheduler {
        &self.playback
    }

    pub fn sequences(&self) -> &Arc<dyn SequenceStore> {
        &self.sequences
    }

    pub fn labels(&self) -> &Arc<dyn LabelStore> {
        &self.labels
    }

    /// Pushed `playback_status` and `calibration_results` messages
    pub fn subscribe_status(&self) -> broadcast::Receiver<ServerMessage> {
        self.status_tx.subscribe()
    }

    /// A new client view of live and replayed frames
    pub fn frame_feed(&self) -> ClientFeed {
        ClientFeed::new(self.bus.subscribe_named("client"), self.labels.clone())
    }

    /// Decode and dispatch one JSON control message
    pub async fn handle_json(&self, json: &str) -> ControlReply {
        match ControlMessage::parse(json) {
            Ok(message) => self.handle(message).await,
            Err(e) => {
                tracing::warn!(error = %e, "rejected control message");
                ControlReply::error(&e)
            }
        }
    }

    pub async fn handle(&self, message: ControlMessage) -> ControlReply {
        let kind = message.kind();
        tracing::debug!(message = kind, "control message received");

        let reply = self.dispatch(message).await;
        if let Err(e) = &reply {
            tracing::warn!(message = kind, error = %e, "control message failed");
        }
        reply.into()
    }

    async fn dispatch(&self, message: ControlMessage) -> SimResult<ControlReply> {
        match message {
            ControlMessage::StartCalibration { event_name } => {
                self.calibration.start(&event_name)?;
                Ok(ControlReply::with_data(self.calibration.session_summary()))
            }
            ControlMessage::StopCalibration => Ok(match self.calibration.stop() {
                Some(results) => ControlReply::with_data(results),
                None => ControlReply::ok(),
            }),
            ControlMessage::CancelCalibration => {
                let cancelled = self.calibration.cancel();
                Ok(ControlReply::with_data(json!({ "cancelled": cancelled })))
            }
            ControlMessage::ConfirmCalibration {
                event_name,
                can_id,
                data,
                vehicle_id,
            } => {
                let id: CanId = can_id.parse()?;
                let data: Payload = data.parse()?;
                self.calibration
                    .confirm(&event_name, id, data, vehicle_id.as_deref())
                    .await?;
                self.generator.add_event(&event_name, id, data, None);
                Ok(ControlReply::ok())
            }
            ControlMessage::CalibrationMessage { id, data } => {
                self.calibration.inject(id.parse()?, data.parse()?)?;
                Ok(ControlReply::ok())
            }
            ControlMessage::PlaybackStart { name, looping } => {
                let progress = self.playback.start(&name, looping).await?;
                Ok(ControlReply::with_data(progress))
            }
            ControlMessage::PlaybackStop => {
                let stopped = self.playback.stop();
                Ok(ControlReply::with_data(json!({ "stopped": stopped })))
            }
            ControlMessage::PlaybackPause => {
                let changed = self.playback.pause();
                Ok(ControlReply::with_data(json!({ "changed": changed })))
            }
            ControlMessage::PlaybackResume => {
                let changed = self.playback.resume();
                Ok(ControlReply::with_data(json!({ "changed": changed })))
            }
            ControlMessage::PlaybackProgress => Ok(ControlReply::with_data(self.playback.progress())),
            ControlMessage::GeneratorStart => {
                let started = self.generator.start();
                Ok(ControlReply::with_data(json!({ "changed": started })))
            }
            ControlMessage::GeneratorStop => {
                let stopped = self.generator.stop();
                Ok(ControlReply::with_data(json!({ "changed": stopped })))
            }
            ControlMessage::GeneratorConfigure {
                rate,
                jitter,
                sender_count,
                seed,
            } => {
                let plan = GeneratorPlan {
                    rate,
                    jitter,
                    sender_count,
                    seed: seed.unwrap_or(self.generator.plan().seed),
                };
                self.generator.configure(plan.clone())?;
                Ok(ControlReply::with_data(plan))
            }
            ControlMessage::EventActivate { name } => {
                let frame = self.generator.activate_event(&name)?;
                Ok(ControlReply::with_data(FrameWire::from(&frame)))
            }
            ControlMessage::EventDeactivate { name } => {
                let frame = self.generator.deactivate_event(&name)?;
                Ok(ControlReply::with_data(frame.as_ref().map(FrameWire::from)))
            }
        }
    }

    /// Stop every task and close the bus. Safe to call more than once.
    pub async fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        self.generator.shutdown().await;
        self.playback.stop();
        self.calibration.cancel();
        self.monitor.stop();
        self.bus.close();
        tracing::info!("simulator shut down");
    }
}
