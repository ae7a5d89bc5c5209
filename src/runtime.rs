//! Single-task event loop around [`CollisionDetector`].
//!
//! Samples, rider commands and countdown ticks are all handled inside one
//! `select!` loop, one at a time, so detection and escalation never
//! interleave. The countdown timer is one `Option<Interval>`: it exists
//! only while a session is armed and is dropped on cancel or trigger.

use log::{info, warn};
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval_at, sleep, Duration, Instant, Interval};

use crate::detector::{CollisionDetector, DetectionOutcome, DetectorStats};
use crate::effects::EffectExecutor;
use crate::escalation::{SessionState, Step};
use crate::event::CrashEvent;
use crate::event_log::HistorySummary;
use crate::report::CrashReport;
use crate::types::{LocationProvider, SensorSample};

const TICK: Duration = Duration::from_secs(1);

/// Input from the rider during a countdown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RiderCommand {
    /// "I'm okay"
    Cancel,
    /// Send the SOS now without waiting
    TriggerNow,
}

/// Published after every handled input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeStatus {
    pub state: SessionState,
    pub samples_processed: u64,
}

impl RuntimeStatus {
    fn of(detector: &CollisionDetector) -> Self {
        RuntimeStatus {
            state: detector.state(),
            samples_processed: detector.stats().samples_processed,
        }
    }

    /// Every sample up to `sent` handled and no countdown running
    pub fn settled(&self, sent: u64) -> bool {
        self.samples_processed >= sent && !matches!(self.state, SessionState::Armed { .. })
    }
}

/// Outcome of a full run
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub stats: DetectorStats,
    pub history_summary: HistorySummary,
    pub history: Vec<CrashEvent>,
    pub reports: Vec<CrashReport>,
    pub effect_failures: u64,
}

pub struct Runtime<L> {
    detector: CollisionDetector,
    executor: EffectExecutor,
    location: L,
    state_tx: watch::Sender<RuntimeStatus>,
}

impl<L> Runtime<L>
where
    L: LocationProvider + Send,
{
    pub fn new(detector: CollisionDetector, executor: EffectExecutor, location: L) -> Self {
        let (state_tx, _) = watch::channel(RuntimeStatus::of(&detector));
        Runtime {
            detector,
            executor,
            location,
            state_tx,
        }
    }

    /// Observe escalation state and progress (one update per handled input)
    pub fn subscribe(&self) -> watch::Receiver<RuntimeStatus> {
        self.state_tx.subscribe()
    }

    /// Run until the sample feed closes and no escalation is pending
    pub async fn run(
        self,
        mut samples: mpsc::Receiver<SensorSample>,
        mut commands: mpsc::Receiver<RiderCommand>,
    ) -> RunSummary {
        let Runtime {
            mut detector,
            mut executor,
            location,
            state_tx,
        } = self;

        let mut ticker: Option<Interval> = None;
        let mut reports = Vec::new();
        let mut feed_open = true;
        let mut commands_open = true;

        loop {
            if !feed_open && !detector.escalation().is_armed() {
                break;
            }

            tokio::select! {
                sample = samples.recv(), if feed_open => match sample {
                    Some(sample) => {
                        let detection = detector.process(&sample, &location);
                        executor.apply(&detection.effects);
                        if matches!(detection.outcome, DetectionOutcome::Escalated(_)) {
                            ticker = Some(interval_at(Instant::now() + TICK, TICK));
                        }
                    }
                    None => {
                        feed_open = false;
                        if detector.escalation().is_armed() {
                            info!("[RUNTIME] feed closed, waiting for active escalation to resolve");
                        }
                    }
                },
                command = commands.recv(), if commands_open => match command {
                    Some(RiderCommand::Cancel) => {
                        let step = detector.cancel();
                        resolve(step, &mut executor, &mut ticker, &mut reports);
                    }
                    Some(RiderCommand::TriggerNow) => {
                        let step = detector.trigger_emergency();
                        resolve(step, &mut executor, &mut ticker, &mut reports);
                    }
                    None => commands_open = false,
                },
                _ = next_tick(&mut ticker) => {
                    let step = detector.tick();
                    resolve(step, &mut executor, &mut ticker, &mut reports);
                }
            }

            let _ = state_tx.send(RuntimeStatus::of(&detector));
        }

        info!(
            "[RUNTIME] stopped: {} samples, {} escalations, {} triggered, {} cancelled",
            detector.stats().samples_processed,
            detector.stats().escalations,
            detector.stats().triggered,
            detector.stats().cancelled
        );

        RunSummary {
            stats: detector.stats().clone(),
            history_summary: detector.history().summary(),
            history: detector.history().to_vec(),
            reports,
            effect_failures: executor.failures(),
        }
    }
}

fn resolve(
    step: Step,
    executor: &mut EffectExecutor,
    ticker: &mut Option<Interval>,
    reports: &mut Vec<CrashReport>,
) {
    if matches!(step.state, SessionState::Cancelled | SessionState::Triggered) {
        *ticker = None;
    }
    if let Some(report) = step.report() {
        reports.push(report.clone());
    }
    executor.apply(&step.effects);
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(t) => {
            t.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

/// Simulated rider who cancels every escalation `after` it starts
pub async fn auto_cancel(
    mut state: watch::Receiver<RuntimeStatus>,
    commands: mpsc::Sender<RiderCommand>,
    after: Duration,
) {
    loop {
        if state.changed().await.is_err() {
            return;
        }
        if !matches!(state.borrow_and_update().state, SessionState::Armed { .. }) {
            continue;
        }

        sleep(after).await;
        info!("[RIDER] cancelling after {:.1}s", after.as_secs_f64());
        if commands.send(RiderCommand::Cancel).await.is_err() {
            warn!("[RIDER] runtime gone, cancel not delivered");
            return;
        }

        while matches!(state.borrow_and_update().state, SessionState::Armed { .. }) {
            if state.changed().await.is_err() {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DetectorConfig;
    use crate::effects::{Dispatcher, LoggingHaptics, LoggingNotifier, LoggingVoice};
    use crate::replay::{replay_feed, LatestFix, Pacing, ReplayRecord};
    use crate::types::{Acceleration, Gyroscope, LocationSnapshot, NoLocation};
    use anyhow::Result;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct CountingDispatcher {
        dispatched: Arc<Mutex<Vec<String>>>,
        callbacks: Arc<Mutex<u32>>,
    }

    impl Dispatcher for CountingDispatcher {
        fn dispatch(&self, report: &CrashReport) -> Result<()> {
            self.dispatched.lock().unwrap().push(report.report_id.clone());
            Ok(())
        }

        fn on_emergency_trigger(&self, _event: &CrashEvent) -> Result<()> {
            *self.callbacks.lock().unwrap() += 1;
            Ok(())
        }
    }

    fn executor(dispatcher: &CountingDispatcher) -> EffectExecutor {
        EffectExecutor::new(
            Box::new(LoggingHaptics),
            Box::new(LoggingVoice),
            Box::new(dispatcher.clone()),
            Box::new(LoggingNotifier),
        )
    }

    fn sample(t_ms: i64, g: f64) -> SensorSample {
        SensorSample::new(t_ms, Acceleration::new(g, 0.0, 0.0), Gyroscope::default())
    }

    #[tokio::test(start_paused = true)]
    async fn test_countdown_expires_and_dispatches_once() {
        let dispatcher = CountingDispatcher::default();
        let fix = Some(LocationSnapshot::new(35.689487, 139.691711, Some(48.0)));
        let runtime = Runtime::new(CollisionDetector::default(), executor(&dispatcher), fix);

        let (sample_tx, sample_rx) = mpsc::channel(16);
        let (_command_tx, command_rx) = mpsc::channel(4);
        sample_tx.send(sample(0, 9.8)).await.unwrap();
        sample_tx.send(sample(20, 45.0)).await.unwrap();
        drop(sample_tx);

        let started = Instant::now();
        let summary = runtime.run(sample_rx, command_rx).await;

        assert!(started.elapsed() >= Duration::from_secs(15));
        assert_eq!(summary.stats.triggered, 1);
        assert_eq!(summary.reports.len(), 1);
        assert_eq!(summary.reports[0].location, "35.689487, 139.691711");
        assert_eq!(*dispatcher.dispatched.lock().unwrap(), vec!["crash_20".to_string()]);
        assert_eq!(*dispatcher.callbacks.lock().unwrap(), 1);
        assert!(summary.history[0].reported);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rider_cancel_stops_countdown() {
        let dispatcher = CountingDispatcher::default();
        let runtime = Runtime::new(CollisionDetector::default(), executor(&dispatcher), NoLocation);
        let state_rx = runtime.subscribe();

        let (sample_tx, sample_rx) = mpsc::channel(16);
        let (command_tx, command_rx) = mpsc::channel(4);
        let rider = tokio::spawn(auto_cancel(state_rx, command_tx, Duration::from_secs(3)));

        sample_tx.send(sample(0, 30.0)).await.unwrap();
        drop(sample_tx);

        let summary = runtime.run(sample_rx, command_rx).await;
        rider.await.unwrap();

        assert_eq!(summary.stats.cancelled, 1);
        assert_eq!(summary.stats.triggered, 0);
        assert!(summary.reports.is_empty());
        assert!(dispatcher.dispatched.lock().unwrap().is_empty());
        assert_eq!(summary.history.len(), 1);
        assert!(!summary.history[0].reported);
        assert_eq!(summary.history_summary.cancelled, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_trigger_and_timer_do_not_double_dispatch() {
        let dispatcher = CountingDispatcher::default();
        let runtime = Runtime::new(CollisionDetector::default(), executor(&dispatcher), NoLocation);
        let mut state_rx = runtime.subscribe();

        let (sample_tx, sample_rx) = mpsc::channel(16);
        let (command_tx, command_rx) = mpsc::channel(4);
        sample_tx.send(sample(0, 70.0)).await.unwrap();
        drop(sample_tx);

        let handle = tokio::spawn(runtime.run(sample_rx, command_rx));

        loop {
            if matches!(state_rx.borrow_and_update().state, SessionState::Armed { .. }) {
                break;
            }
            state_rx.changed().await.unwrap();
        }
        command_tx.send(RiderCommand::TriggerNow).await.unwrap();
        // The runtime may already have exited after the first trigger
        let _ = command_tx.send(RiderCommand::TriggerNow).await;
        drop(command_tx);

        let summary = handle.await.unwrap();
        assert_eq!(summary.stats.triggered, 1);
        assert_eq!(dispatcher.dispatched.lock().unwrap().len(), 1);
        assert_eq!(*dispatcher.callbacks.lock().unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_impact_during_countdown_is_suppressed() {
        let dispatcher = CountingDispatcher::default();
        let config = DetectorConfig {
            cooldown_ms: 1_000,
            ..DetectorConfig::default()
        };
        let runtime = Runtime::new(CollisionDetector::new(&config), executor(&dispatcher), NoLocation);

        let (sample_tx, sample_rx) = mpsc::channel(16);
        let (_command_tx, command_rx) = mpsc::channel(4);
        sample_tx.send(sample(0, 30.0)).await.unwrap();
        sample_tx.send(sample(2_000, 45.0)).await.unwrap();
        drop(sample_tx);

        let summary = runtime.run(sample_rx, command_rx).await;
        assert_eq!(summary.stats.escalations, 1);
        assert_eq!(summary.stats.suppressed_active_session, 1);
        assert_eq!(summary.reports.len(), 1);
        assert_eq!(summary.reports[0].report_id, "crash_0");
    }

    #[tokio::test(start_paused = true)]
    async fn test_unpaced_replay_resolves_each_countdown_before_next_sample() {
        let fix = LatestFix::new();
        let runtime = Runtime::new(CollisionDetector::default(), EffectExecutor::logging(), fix.clone());
        let pacing = Pacing::Lockstep(runtime.subscribe());

        let records = vec![
            ReplayRecord {
                sample: sample(0, 30.0),
                location: None,
            },
            ReplayRecord {
                sample: sample(300_000, 30.0),
                location: Some(LocationSnapshot::new(51.507351, -0.127758, None)),
            },
        ];
        let (sample_tx, sample_rx) = mpsc::channel(16);
        let (_command_tx, command_rx) = mpsc::channel(4);
        let feed = tokio::spawn(replay_feed(records, sample_tx, fix, pacing));

        let summary = runtime.run(sample_rx, command_rx).await;
        assert_eq!(feed.await.unwrap().unwrap(), 2);
        assert_eq!(summary.stats.escalations, 2);
        assert_eq!(summary.stats.suppressed_active_session, 0);
        assert_eq!(summary.stats.triggered, 2);
        assert_eq!(summary.reports[1].report_id, "crash_300000");
        assert_eq!(summary.reports[1].location, "51.507351, -0.127758");
    }

    #[test]
    fn test_status_settled() {
        let armed = RuntimeStatus {
            state: SessionState::Armed { remaining: 3 },
            samples_processed: 4,
        };
        assert!(!armed.settled(4));

        let idle = RuntimeStatus {
            state: SessionState::Idle,
            samples_processed: 4,
        };
        assert!(idle.settled(4));
        assert!(!idle.settled(5));
    }

    #[tokio::test]
    async fn test_quiet_feed_finishes_immediately() {
        let runtime = Runtime::new(CollisionDetector::default(), EffectExecutor::logging(), NoLocation);
        let (sample_tx, sample_rx) = mpsc::channel(64);
        let (_command_tx, command_rx) = mpsc::channel(4);
        for t in 0..50 {
            sample_tx.send(sample(t * 20, 9.81)).await.unwrap();
        }
        drop(sample_tx);

        let summary = runtime.run(sample_rx, command_rx).await;
        assert_eq!(summary.stats.samples_processed, 50);
        assert_eq!(summary.stats.safe_samples, 50);
        assert!(summary.history.is_empty());
    }
}
