//! Side-effect intents returned by the detector and state machine, plus the
//! thin executor that hands them to the outside world.
//!
//! The decision code never talks to hardware or the network directly. It
//! returns a list of [`Effect`]s; an [`EffectExecutor`] applies them in order.
//! Collaborator failures are logged and swallowed so they can never stall
//! the countdown.

use anyhow::Result;
use log::{info, warn};
use serde::Serialize;

use crate::event::CrashEvent;
use crate::report::CrashReport;

/// Named vibration patterns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HapticPattern {
    /// Short buzz for a minor bump
    Warning,
    /// Long alarm when an escalation starts
    Collision,
    /// Escalating pulse in the last seconds of a countdown
    Urgent,
}

impl HapticPattern {
    /// Vibration on/off durations in milliseconds
    pub fn durations_ms(&self) -> &'static [u32] {
        match self {
            HapticPattern::Warning => &[100, 50, 100],
            HapticPattern::Collision => &[500, 200, 500, 200, 500],
            HapticPattern::Urgent => &[200, 100, 200],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Info,
    Warning,
    Critical,
}

/// One side effect requested by the core
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Haptic(HapticPattern),
    StopHaptics,
    Announce { text: String, locale: String },
    Notify { level: NoticeLevel, message: String },
    Dispatch(Box<CrashReport>),
    EmergencyTriggered(Box<CrashEvent>),
}

pub trait HapticNotifier {
    fn vibrate(&self, pattern: HapticPattern) -> Result<()>;
    fn stop(&self) -> Result<()>;
}

pub trait VoiceAnnouncer {
    fn announce(&self, text: &str, locale: &str) -> Result<()>;
}

/// Receives finished reports and the emergency callback.
/// Delivery (SMS, contacts, API) happens behind this trait.
pub trait Dispatcher {
    fn dispatch(&self, report: &CrashReport) -> Result<()>;

    fn on_emergency_trigger(&self, _event: &CrashEvent) -> Result<()> {
        Ok(())
    }
}

/// Toast / banner surface
pub trait Notifier {
    fn notify(&self, level: NoticeLevel, message: &str) -> Result<()>;
}

/// Applies effects to collaborators, best effort
pub struct EffectExecutor {
    haptics: Box<dyn HapticNotifier + Send + Sync>,
    voice: Box<dyn VoiceAnnouncer + Send + Sync>,
    dispatcher: Box<dyn Dispatcher + Send + Sync>,
    notifier: Box<dyn Notifier + Send + Sync>,
    failures: u64,
}

impl EffectExecutor {
    pub fn new(
        haptics: Box<dyn HapticNotifier + Send + Sync>,
        voice: Box<dyn VoiceAnnouncer + Send + Sync>,
        dispatcher: Box<dyn Dispatcher + Send + Sync>,
        notifier: Box<dyn Notifier + Send + Sync>,
    ) -> Self {
        EffectExecutor {
            haptics,
            voice,
            dispatcher,
            notifier,
            failures: 0,
        }
    }

    /// Executor that renders everything to the log
    pub fn logging() -> Self {
        Self::new(
            Box::new(LoggingHaptics),
            Box::new(LoggingVoice),
            Box::new(LoggingDispatcher),
            Box::new(LoggingNotifier),
        )
    }

    /// Number of collaborator calls that failed and were swallowed
    pub fn failures(&self) -> u64 {
        self.failures
    }

    pub fn apply(&mut self, effects: &[Effect]) {
        for effect in effects {
            let (what, result) = match effect {
                Effect::Haptic(pattern) => ("haptic", self.haptics.vibrate(*pattern)),
                Effect::StopHaptics => ("haptic stop", self.haptics.stop()),
                Effect::Announce { text, locale } => ("voice", self.voice.announce(text, locale)),
                Effect::Notify { level, message } => ("notify", self.notifier.notify(*level, message)),
                Effect::Dispatch(report) => ("dispatch", self.dispatcher.dispatch(report)),
                Effect::EmergencyTriggered(event) => {
                    ("emergency callback", self.dispatcher.on_emergency_trigger(event))
                }
            };

            if let Err(e) = result {
                self.failures += 1;
                warn!("[EFFECT] {} failed, continuing: {:#}", what, e);
            }
        }
    }
}

pub struct LoggingHaptics;

impl HapticNotifier for LoggingHaptics {
    fn vibrate(&self, pattern: HapticPattern) -> Result<()> {
        info!("[HAPTIC] {:?} {:?}", pattern, pattern.durations_ms());
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        info!("[HAPTIC] stop");
        Ok(())
    }
}

pub struct LoggingVoice;

impl VoiceAnnouncer for LoggingVoice {
    fn announce(&self, text: &str, locale: &str) -> Result<()> {
        info!("[VOICE:{}] {}", locale, text);
        Ok(())
    }
}

/// Dispatch is log-only; no SMS or calls are placed
pub struct LoggingDispatcher;

impl Dispatcher for LoggingDispatcher {
    fn dispatch(&self, report: &CrashReport) -> Result<()> {
        warn!("[DISPATCH] emergency report:\n{}", report.to_json()?);
        Ok(())
    }

    fn on_emergency_trigger(&self, event: &CrashEvent) -> Result<()> {
        warn!(
            "[DISPATCH] emergency triggered for {} ({}, {:.1} m/s²)",
            event.id,
            event.crash_type.as_str(),
            event.g_force
        );
        Ok(())
    }
}

pub struct LoggingNotifier;

impl Notifier for LoggingNotifier {
    fn notify(&self, level: NoticeLevel, message: &str) -> Result<()> {
        match level {
            NoticeLevel::Info => info!("[NOTICE] {}", message),
            NoticeLevel::Warning | NoticeLevel::Critical => warn!("[NOTICE] {}", message),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::CrashReportBuilder;
    use crate::event::CrashType;
    use crate::types::Gyroscope;
    use anyhow::anyhow;
    use std::sync::{Arc, Mutex};

    struct FailingVoice;

    impl VoiceAnnouncer for FailingVoice {
        fn announce(&self, _text: &str, _locale: &str) -> Result<()> {
            Err(anyhow!("speech synthesis unsupported"))
        }
    }

    #[derive(Clone, Default)]
    struct RecordingDispatcher {
        reports: Arc<Mutex<Vec<String>>>,
    }

    impl Dispatcher for RecordingDispatcher {
        fn dispatch(&self, report: &CrashReport) -> Result<()> {
            self.reports.lock().unwrap().push(report.report_id.clone());
            Ok(())
        }
    }

    fn report() -> CrashReport {
        let event = CrashEvent {
            id: "crash_1".to_string(),
            timestamp: 1,
            g_force: 45.0,
            crash_type: CrashType::Severe,
            location: None,
            speed: None,
            gyro_data: Gyroscope::default(),
            reported: true,
        };
        CrashReportBuilder::default().build(&event)
    }

    #[test]
    fn test_failing_collaborator_is_swallowed() {
        let dispatcher = RecordingDispatcher::default();
        let mut executor = EffectExecutor::new(
            Box::new(LoggingHaptics),
            Box::new(FailingVoice),
            Box::new(dispatcher.clone()),
            Box::new(LoggingNotifier),
        );

        executor.apply(&[
            Effect::Announce {
                text: "Help is on the way".to_string(),
                locale: "en-US".to_string(),
            },
            Effect::Dispatch(Box::new(report())),
        ]);

        assert_eq!(executor.failures(), 1);
        assert_eq!(*dispatcher.reports.lock().unwrap(), vec!["crash_1".to_string()]);
    }

    #[test]
    fn test_logging_executor_accepts_everything() {
        let mut executor = EffectExecutor::logging();
        executor.apply(&[
            Effect::Haptic(HapticPattern::Collision),
            Effect::Haptic(HapticPattern::Urgent),
            Effect::StopHaptics,
            Effect::Notify {
                level: NoticeLevel::Info,
                message: "Minor bump detected".to_string(),
            },
            Effect::Dispatch(Box::new(report())),
        ]);
        assert_eq!(executor.failures(), 0);
    }

    #[test]
    fn test_patterns_are_distinct() {
        assert_ne!(
            HapticPattern::Collision.durations_ms(),
            HapticPattern::Warning.durations_ms()
        );
        assert_ne!(
            HapticPattern::Urgent.durations_ms(),
            HapticPattern::Collision.durations_ms()
        );
    }
}
