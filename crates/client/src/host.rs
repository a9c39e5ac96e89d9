//! The host loop glue between the stage machine and the telemetry bus.
//!
//! After every machine call the host drains the effect queue and applies
//! it: events and frames go to the bus, advance requests go back to the
//! machine (whose enter effects are drained in the same pass). Telemetry
//! failures are the bus's business and never stop the level.

use chrono::Utc;
use posematch_stage::{AdvanceOutcome, Command, Effect, StageError, StageMachine, TickInfo};

use crate::error::ClientError;
use crate::pose_source::PoseSource;
use crate::telemetry::TelemetryBus;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostStatus {
    Running,
    Complete,
}

pub struct SessionHost {
    machine: StageMachine,
    bus: TelemetryBus,
    source: Box<dyn PoseSource>,
}

impl SessionHost {
    pub fn new(machine: StageMachine, bus: TelemetryBus, source: Box<dyn PoseSource>) -> Self {
        Self {
            machine,
            bus,
            source,
        }
    }

    pub fn machine(&self) -> &StageMachine {
        &self.machine
    }

    pub fn bus(&self) -> &TelemetryBus {
        &self.bus
    }

    pub fn status(&self) -> HostStatus {
        if self.machine.is_complete() {
            HostStatus::Complete
        } else {
            HostStatus::Running
        }
    }

    pub fn start(&mut self) -> Result<HostStatus, ClientError> {
        let started = self.machine.start();
        // Effects recorded before a failure still reach telemetry.
        let pumped = self.pump();
        started?;
        pumped
    }

    /// Poll the pose source and run one machine update.
    pub fn tick(&mut self, dt_ms: u64) -> Result<HostStatus, ClientError> {
        if self.machine.is_complete() {
            return Ok(HostStatus::Complete);
        }
        let now_ms = Utc::now().timestamp_millis();
        let tick = TickInfo {
            dt_ms,
            now_ms,
            pose: self.source.latest(now_ms),
        };
        self.machine.update(&tick)?;
        self.pump()
    }

    pub fn command(&mut self, command: Command) -> Result<HostStatus, ClientError> {
        if self.machine.is_complete() {
            return Ok(HostStatus::Complete);
        }
        self.machine.handle_command(command)?;
        self.pump()
    }

    /// Apply queued effects until the machine stops producing them.
    ///
    /// Every effect of a drain is applied even if an advance in it fails;
    /// the first failure is returned afterwards.
    fn pump(&mut self) -> Result<HostStatus, ClientError> {
        let mut failure: Option<StageError> = None;

        loop {
            let effects = self.machine.drain_effects();
            if effects.is_empty() {
                break;
            }
            for effect in effects {
                match effect {
                    Effect::EmitEvent {
                        event_type,
                        payload,
                    } => self.bus.emit_event(event_type, payload, None),
                    Effect::RecordFrame(frame) => {
                        self.bus.record_pose_frame(frame);
                    }
                    Effect::Advance { from_index } => match self.machine.advance_from(from_index) {
                        Ok(AdvanceOutcome::Entered(index)) => {
                            tracing::debug!(node_index = index, "Advanced");
                        }
                        Ok(AdvanceOutcome::Completed | AdvanceOutcome::Stale) => {}
                        Err(e) => {
                            tracing::error!(error = %e, "Failed to enter next stage");
                            failure.get_or_insert(e);
                        }
                    },
                    Effect::LevelComplete => {
                        tracing::info!(
                            play_id = %self.bus.play_id(),
                            level_index = self.machine.session().level_index,
                            "Level complete"
                        );
                    }
                }
            }
        }

        match failure {
            Some(e) => Err(e.into()),
            None => Ok(self.status()),
        }
    }
}
