// Crash Guard: collision detection and SOS escalation core
// Consumes parsed accelerometer/gyroscope samples, classifies impacts and
// runs the countdown-and-confirm workflow before an emergency dispatch.

pub mod analyzer;
pub mod config;
pub mod detector;
pub mod effects;
pub mod error;
pub mod escalation;
pub mod event;
pub mod event_log;
pub mod replay;
pub mod report;
pub mod runtime;
pub mod types;

pub use analyzer::{ImpactAnalysis, ImpactAnalyzer, ImpactDirection, Severity, SeverityThresholds};
pub use config::DetectorConfig;
pub use detector::{CollisionDetector, Detection, DetectionOutcome, DetectorStats, SuppressReason};
pub use effects::{Dispatcher, Effect, EffectExecutor, HapticNotifier, HapticPattern, Notifier, VoiceAnnouncer};
pub use error::{CrashGuardError, Result};
pub use escalation::{EscalationSession, EscalationStateMachine, Resolution, SessionState, Step};
pub use event::{CrashEvent, CrashType};
pub use event_log::{CrashEventLog, HistorySummary};
pub use report::{CrashReport, CrashReportBuilder};
pub use runtime::{RiderCommand, RunSummary, Runtime, RuntimeStatus};
pub use types::{Acceleration, Gyroscope, LocationProvider, LocationSnapshot, SensorSample};
