use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::analyzer::Severity;
use crate::config::DetectorConfig;
use crate::effects::{Effect, HapticPattern, NoticeLevel};
use crate::event::CrashEvent;
use crate::event_log::CrashEventLog;
use crate::report::{CrashReport, CrashReportBuilder};

/// How an escalation session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Resolution {
    Pending,
    Cancelled,
    Triggered,
}

/// State reported after each state machine call.
///
/// `Cancelled` and `Triggered` are transient: the machine is already back
/// in `Idle` when they are returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    Idle,
    Armed { remaining: u32 },
    Cancelled,
    Triggered,
}

/// The single active countdown
#[derive(Debug, Clone, PartialEq)]
pub struct EscalationSession {
    pub active_crash: CrashEvent,
    pub severity: Severity,
    pub countdown_seconds: u32,
    pub resolved: Resolution,
}

/// Result of a state machine call: new state plus requested side effects
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub state: SessionState,
    pub effects: Vec<Effect>,
    /// Session closed by this call, carrying its final resolution
    pub resolved: Option<EscalationSession>,
}

impl Step {
    fn idle() -> Self {
        Step {
            state: SessionState::Idle,
            effects: Vec::new(),
            resolved: None,
        }
    }

    /// Report produced by a trigger, if any
    pub fn report(&self) -> Option<&CrashReport> {
        self.effects.iter().find_map(|e| match e {
            Effect::Dispatch(report) => Some(&**report),
            _ => None,
        })
    }
}

/// Countdown-and-confirm workflow: Idle → Armed → {Cancelled, Triggered} → Idle.
///
/// Driven by explicit `tick()` calls, one per second, from any scheduler.
/// The caller must not `start()` while a session is armed.
pub struct EscalationStateMachine {
    session: Option<EscalationSession>,
    critical_countdown_secs: u32,
    default_countdown_secs: u32,
    urgent_from_secs: u32,
    locale: String,
    reports: CrashReportBuilder,
}

impl EscalationStateMachine {
    pub fn new(config: &DetectorConfig) -> Self {
        EscalationStateMachine {
            session: None,
            critical_countdown_secs: config.critical_countdown_secs,
            default_countdown_secs: config.default_countdown_secs,
            urgent_from_secs: config.urgent_from_secs,
            locale: config.locale.clone(),
            reports: CrashReportBuilder::new(config.map_host.clone(), config.device_info.clone()),
        }
    }

    pub fn session(&self) -> Option<&EscalationSession> {
        self.session.as_ref()
    }

    pub fn is_armed(&self) -> bool {
        self.session.is_some()
    }

    pub fn state(&self) -> SessionState {
        match &self.session {
            Some(s) => SessionState::Armed {
                remaining: s.countdown_seconds,
            },
            None => SessionState::Idle,
        }
    }

    fn countdown_for(&self, severity: Severity) -> u32 {
        if severity == Severity::Critical {
            self.critical_countdown_secs
        } else {
            self.default_countdown_secs
        }
    }

    /// Arm a countdown for `event`
    pub fn start(&mut self, event: CrashEvent, severity: Severity) -> Step {
        if let Some(active) = &self.session {
            warn!(
                "[ESCALATION] start({}) refused, {} still armed",
                event.id, active.active_crash.id
            );
            return Step {
                state: self.state(),
                effects: Vec::new(),
                resolved: None,
            };
        }

        let countdown = self.countdown_for(severity);
        let word = capitalize(severity.as_str());
        info!(
            "[ESCALATION] {} armed: {} impact {:.1} m/s², {}s countdown",
            event.id,
            severity.as_str(),
            event.g_force,
            countdown
        );

        let effects = vec![
            Effect::Haptic(HapticPattern::Collision),
            Effect::Announce {
                text: format!(
                    "{} impact detected! Emergency alert will be sent in {} seconds. Say cancel or tap cancel if you are okay.",
                    word, countdown
                ),
                locale: self.locale.clone(),
            },
            Effect::Notify {
                level: NoticeLevel::Critical,
                message: format!(
                    "{} crash detected ({:.1} m/s²). Sending SOS in {}s",
                    word, event.g_force, countdown
                ),
            },
        ];

        self.session = Some(EscalationSession {
            active_crash: event,
            severity,
            countdown_seconds: countdown,
            resolved: Resolution::Pending,
        });

        Step {
            state: SessionState::Armed { remaining: countdown },
            effects,
            resolved: None,
        }
    }

    /// Advance the countdown by one second. Reaching zero triggers.
    pub fn tick(&mut self, log: &mut CrashEventLog) -> Step {
        let remaining = match self.session.as_mut() {
            Some(session) => {
                session.countdown_seconds = session.countdown_seconds.saturating_sub(1);
                session.countdown_seconds
            }
            None => return Step::idle(),
        };

        if remaining == 0 {
            debug!("[ESCALATION] countdown elapsed");
            return self.trigger_emergency(log);
        }

        debug!("[ESCALATION] {}s remaining", remaining);
        let mut effects = Vec::new();
        if remaining <= self.urgent_from_secs {
            effects.push(Effect::Haptic(HapticPattern::Urgent));
        }

        Step {
            state: SessionState::Armed { remaining },
            effects,
            resolved: None,
        }
    }

    /// Rider is okay: abort without dispatching. No-op when idle.
    pub fn cancel(&mut self, log: &mut CrashEventLog) -> Step {
        let Some(mut session) = self.session.take() else {
            debug!("[ESCALATION] cancel ignored, nothing armed");
            return Step::idle();
        };

        session.resolved = Resolution::Cancelled;
        session.active_crash.reported = false;
        info!(
            "[ESCALATION] {} cancelled with {}s left",
            session.active_crash.id, session.countdown_seconds
        );
        log.append(session.active_crash.clone());

        Step {
            state: SessionState::Cancelled,
            effects: vec![
                Effect::StopHaptics,
                Effect::Announce {
                    text: "Emergency alert cancelled. Glad you are safe.".to_string(),
                    locale: self.locale.clone(),
                },
                Effect::Notify {
                    level: NoticeLevel::Info,
                    message: "Emergency alert cancelled".to_string(),
                },
            ],
            resolved: Some(session),
        }
    }

    /// Send the emergency. Safe to call from both the zero-countdown path
    /// and a manual tap: only the first call for a session acts.
    pub fn trigger_emergency(&mut self, log: &mut CrashEventLog) -> Step {
        let Some(mut session) = self.session.take() else {
            debug!("[ESCALATION] trigger ignored, nothing armed");
            return Step::idle();
        };

        session.resolved = Resolution::Triggered;
        session.active_crash.reported = true;
        let report = self.reports.build(&session.active_crash);
        warn!(
            "[ESCALATION] {} triggered ({} at {})",
            session.active_crash.id, report.severity, report.location
        );

        let event = session.active_crash.clone();
        log.append(event.clone());

        Step {
            state: SessionState::Triggered,
            effects: vec![
                Effect::StopHaptics,
                Effect::Announce {
                    text: "Emergency alert sent. Help is on the way.".to_string(),
                    locale: self.locale.clone(),
                },
                Effect::Notify {
                    level: NoticeLevel::Critical,
                    message: "Emergency contacts notified".to_string(),
                },
                Effect::Dispatch(Box::new(report)),
                Effect::EmergencyTriggered(Box::new(event)),
            ],
            resolved: Some(session),
        }
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
