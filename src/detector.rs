use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::analyzer::{ImpactAnalysis, ImpactAnalyzer, Severity};
use crate::config::DetectorConfig;
use crate::effects::{Effect, HapticPattern, NoticeLevel};
use crate::escalation::{EscalationStateMachine, SessionState, Step};
use crate::event::CrashEvent;
use crate::event_log::CrashEventLog;
use crate::types::{LocationProvider, SensorSample};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SuppressReason {
    /// Within the cooldown window of the previous detection
    Cooldown,
    /// An escalation countdown is already running
    ActiveSession,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DetectionOutcome {
    Safe,
    Suppressed(SuppressReason),
    /// Minor bump written straight to history
    MinorLogged(CrashEvent),
    /// Countdown started for this event
    Escalated(CrashEvent),
}

/// What happened to one sample
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub analysis: ImpactAnalysis,
    pub outcome: DetectionOutcome,
    pub effects: Vec<Effect>,
}

impl Detection {
    pub fn event(&self) -> Option<&CrashEvent> {
        match &self.outcome {
            DetectionOutcome::MinorLogged(e) | DetectionOutcome::Escalated(e) => Some(e),
            _ => None,
        }
    }
}

/// Running counters, serialized into run summaries
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectorStats {
    pub samples_processed: u64,
    pub safe_samples: u64,
    pub suppressed_cooldown: u64,
    pub suppressed_active_session: u64,
    pub minor_bumps: u64,
    pub escalations: u64,
    pub cancelled: u64,
    pub triggered: u64,
}

/// Owns all mutable detection state: cooldown, the one escalation
/// session and the crash history. Not shared across threads; wrap in a
/// mutex if samples arrive from more than one thread.
pub struct CollisionDetector {
    analyzer: ImpactAnalyzer,
    cooldown_ms: i64,
    last_crash_timestamp: Option<i64>,
    escalation: EscalationStateMachine,
    history: CrashEventLog,
    stats: DetectorStats,
}

impl CollisionDetector {
    pub fn new(config: &DetectorConfig) -> Self {
        CollisionDetector {
            analyzer: ImpactAnalyzer::new(config.thresholds),
            cooldown_ms: config.cooldown_ms,
            last_crash_timestamp: None,
            escalation: EscalationStateMachine::new(config),
            history: CrashEventLog::new(config.history_capacity),
            stats: DetectorStats::default(),
        }
    }

    /// Run one sample through analysis, the cooldown guard and the
    /// severity branch. `location` is only queried when an event is built.
    pub fn process<L>(&mut self, sample: &SensorSample, location: &L) -> Detection
    where
        L: LocationProvider + ?Sized,
    {
        self.stats.samples_processed += 1;
        let analysis = self.analyzer.analyze(&sample.acceleration, &sample.gyroscope);

        if analysis.severity == Severity::Safe {
            self.stats.safe_samples += 1;
            return Detection {
                analysis,
                outcome: DetectionOutcome::Safe,
                effects: Vec::new(),
            };
        }

        if let Some(reason) = self.suppression(sample.timestamp) {
            match reason {
                SuppressReason::Cooldown => self.stats.suppressed_cooldown += 1,
                SuppressReason::ActiveSession => self.stats.suppressed_active_session += 1,
            }
            debug!(
                "[DETECT] {} impact {:.1} m/s² suppressed ({:?})",
                analysis.severity.as_str(),
                analysis.g_force,
                reason
            );
            return Detection {
                analysis,
                outcome: DetectionOutcome::Suppressed(reason),
                effects: Vec::new(),
            };
        }

        self.last_crash_timestamp = Some(sample.timestamp);
        let Some(event) = CrashEvent::from_analysis(
            &analysis,
            sample.timestamp,
            sample.gyroscope,
            location.current_location(),
        ) else {
            return Detection {
                analysis,
                outcome: DetectionOutcome::Safe,
                effects: Vec::new(),
            };
        };

        if analysis.severity.escalates() {
            self.stats.escalations += 1;
            let step = self.escalation.start(event.clone(), analysis.severity);
            Detection {
                analysis,
                outcome: DetectionOutcome::Escalated(event),
                effects: step.effects,
            }
        } else {
            self.stats.minor_bumps += 1;
            info!(
                "[DETECT] minor bump {:.1} m/s² ({:?}), logged",
                analysis.g_force, analysis.impact_direction
            );
            self.history.append(event.clone());
            Detection {
                analysis,
                outcome: DetectionOutcome::MinorLogged(event),
                effects: vec![
                    Effect::Haptic(HapticPattern::Warning),
                    Effect::Notify {
                        level: NoticeLevel::Warning,
                        message: format!("Minor bump detected ({:.1} m/s²)", analysis.g_force),
                    },
                ],
            }
        }
    }

    fn suppression(&self, now: i64) -> Option<SuppressReason> {
        if self.escalation.is_armed() {
            return Some(SuppressReason::ActiveSession);
        }
        match self.last_crash_timestamp {
            Some(last) if now.saturating_sub(last) <= self.cooldown_ms => Some(SuppressReason::Cooldown),
            _ => None,
        }
    }

    /// One-second countdown step
    pub fn tick(&mut self) -> Step {
        let step = self.escalation.tick(&mut self.history);
        self.record(&step);
        step
    }

    pub fn cancel(&mut self) -> Step {
        let step = self.escalation.cancel(&mut self.history);
        self.record(&step);
        step
    }

    /// Manual SOS confirmation. Ignored when nothing is armed.
    pub fn trigger_emergency(&mut self) -> Step {
        let step = self.escalation.trigger_emergency(&mut self.history);
        self.record(&step);
        step
    }

    fn record(&mut self, step: &Step) {
        match step.state {
            SessionState::Cancelled => self.stats.cancelled += 1,
            SessionState::Triggered => self.stats.triggered += 1,
            SessionState::Idle | SessionState::Armed { .. } => {}
        }
    }

    pub fn state(&self) -> SessionState {
        self.escalation.state()
    }

    pub fn escalation(&self) -> &EscalationStateMachine {
        &self.escalation
    }

    pub fn history(&self) -> &CrashEventLog {
        &self.history
    }

    pub fn stats(&self) -> &DetectorStats {
        &self.stats
    }

    pub fn last_crash_timestamp(&self) -> Option<i64> {
        self.last_crash_timestamp
    }
}

impl Default for CollisionDetector {
    fn default() -> Self {
        Self::new(&DetectorConfig::default())
    }
}
