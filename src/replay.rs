use flate2::read::GzDecoder;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::Sender;
use tokio::sync::watch;
use tokio::time::{sleep, Duration};

use crate::error::{CrashGuardError, Result};
use crate::runtime::RuntimeStatus;
use crate::types::{LocationProvider, LocationSnapshot, SensorSample};

/// One recorded sample, optionally carrying the GPS fix seen at that time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayRecord {
    #[serde(flatten)]
    pub sample: SensorSample,
    #[serde(default)]
    pub location: Option<LocationSnapshot>,
}

/// Load a recording (JSON array, gzip-compressed when the path ends in `.gz`)
pub fn load_records(path: &Path) -> Result<Vec<ReplayRecord>> {
    let file = File::open(path)?;
    let records: Vec<ReplayRecord> = if path.extension().map(|e| e == "gz").unwrap_or(false) {
        let gz = GzDecoder::new(file);
        serde_json::from_reader(BufReader::new(gz))?
    } else {
        serde_json::from_reader(BufReader::new(file))?
    };
    info!("[REPLAY] loaded {} records from {}", records.len(), path.display());
    Ok(records)
}

/// Most recent GPS fix, shared between the feed and the detector
#[derive(Clone, Default)]
pub struct LatestFix {
    inner: Arc<Mutex<Option<LocationSnapshot>>>,
}

impl LatestFix {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&self, fix: LocationSnapshot) {
        if let Ok(mut latest) = self.inner.lock() {
            *latest = Some(fix);
        }
    }
}

impl LocationProvider for LatestFix {
    fn current_location(&self) -> Option<LocationSnapshot> {
        self.inner.lock().ok().and_then(|latest| *latest)
    }
}

/// How the feed spaces out samples
pub enum Pacing {
    /// Sleep for the recorded gap divided by the factor (2.0 = twice as fast)
    Recorded(f64),
    /// No sleeps. Each sample waits until the runtime has handled the previous
    /// one and any countdown it started has resolved, so countdowns still
    /// separate crashes the way they do in real time.
    Lockstep(watch::Receiver<RuntimeStatus>),
}

/// Push recorded samples into the runtime. Returns the number of samples sent.
pub async fn replay_feed(
    records: Vec<ReplayRecord>,
    tx: Sender<SensorSample>,
    fix: LatestFix,
    mut pacing: Pacing,
) -> Result<u64> {
    let mut sent = 0u64;
    let mut previous: Option<i64> = None;

    for record in records {
        match &mut pacing {
            Pacing::Recorded(speed) if *speed > 0.0 => {
                if let Some(prev) = previous {
                    let gap_ms = record.sample.timestamp.saturating_sub(prev).max(0) as f64 / *speed;
                    if gap_ms > 0.0 {
                        sleep(Duration::from_secs_f64(gap_ms / 1000.0)).await;
                    }
                }
            }
            Pacing::Recorded(_) => {}
            Pacing::Lockstep(status) => {
                status.wait_for(|s| s.settled(sent)).await.map_err(|_| {
                    CrashGuardError::ChannelClosed(format!("runtime stopped after {} samples", sent))
                })?;
            }
        }
        previous = Some(record.sample.timestamp);

        if let Some(location) = record.location {
            fix.update(location);
        }

        tx.send(record.sample).await.map_err(|_| {
            CrashGuardError::ChannelClosed(format!("sample feed closed after {} samples", sent))
        })?;
        sent += 1;

        if sent % 500 == 0 {
            debug!("[REPLAY] {} samples", sent);
        }
    }

    info!("[REPLAY] feed finished, {} samples", sent);
    Ok(sent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;
    use tokio::sync::mpsc;

    const RECORDING: &str = r#"[
        {"timestamp": 0, "acceleration": {"x": 0.1, "y": 0.2, "z": 9.8}},
        {"timestamp": 20, "acceleration": {"x": 0.0, "y": 31.0, "z": 9.8},
         "gyroscope": {"alpha": 120.0},
         "location": {"latitude": 48.8566, "longitude": 2.3522, "speedKmh": 35.0}}
    ]"#;

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("crash_guard_{}_{}", std::process::id(), name))
    }

    #[test]
    fn test_load_plain_json() {
        let path = temp_path("plain.json");
        std::fs::write(&path, RECORDING).unwrap();

        let records = load_records(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].sample.gyroscope.alpha, 120.0);
        assert_eq!(records[1].location.unwrap().speed_kmh, Some(35.0));
        assert!(records[0].location.is_none());

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_load_gzip_json() {
        let path = temp_path("recording.json.gz");
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(RECORDING.as_bytes()).unwrap();
        std::fs::write(&path, encoder.finish().unwrap()).unwrap();

        let records = load_records(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].sample.timestamp, 20);

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_malformed_recording() {
        let path = temp_path("broken.json");
        std::fs::write(&path, "{ not a recording").unwrap();

        assert!(matches!(load_records(&path), Err(CrashGuardError::Parse(_))));
        std::fs::remove_file(&path).ok();
    }

    #[tokio::test(start_paused = true)]
    async fn test_feed_updates_fix_and_sends_all() {
        let records: Vec<ReplayRecord> = serde_json::from_str(RECORDING).unwrap();
        let (tx, mut rx) = mpsc::channel(8);
        let fix = LatestFix::new();

        let sent = replay_feed(records, tx, fix.clone(), Pacing::Recorded(1.0)).await.unwrap();
        assert_eq!(sent, 2);
        assert_eq!(rx.recv().await.unwrap().timestamp, 0);
        assert_eq!(rx.recv().await.unwrap().timestamp, 20);
        assert_eq!(fix.current_location().unwrap().latitude, 48.8566);
    }

    #[tokio::test]
    async fn test_feed_reports_closed_channel() {
        let records: Vec<ReplayRecord> = serde_json::from_str(RECORDING).unwrap();
        let (tx, rx) = mpsc::channel(8);
        drop(rx);

        let err = replay_feed(records, tx, LatestFix::new(), Pacing::Recorded(0.0))
            .await
            .unwrap_err();
        assert!(matches!(err, CrashGuardError::ChannelClosed(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_backwards_timestamps_do_not_stall_feed() {
        let records: Vec<ReplayRecord> = serde_json::from_str(
            r#"[{"timestamp": 9223372036854775807}, {"timestamp": -10}, {"timestamp": 0}]"#,
        )
        .unwrap();
        let (tx, mut rx) = mpsc::channel(8);

        let sent = replay_feed(records, tx, LatestFix::new(), Pacing::Recorded(1.0)).await.unwrap();
        assert_eq!(sent, 3);
        assert_eq!(rx.recv().await.unwrap().timestamp, i64::MAX);
        assert_eq!(rx.recv().await.unwrap().timestamp, -10);
    }

    #[tokio::test]
    async fn test_lockstep_fails_when_runtime_gone() {
        let records: Vec<ReplayRecord> = serde_json::from_str(RECORDING).unwrap();
        let (tx, _rx) = mpsc::channel(8);
        let (status_tx, status_rx) = watch::channel(RuntimeStatus {
            state: crate::escalation::SessionState::Idle,
            samples_processed: 0,
        });
        drop(status_tx);

        let err = replay_feed(records, tx, LatestFix::new(), Pacing::Lockstep(status_rx))
            .await
            .unwrap_err();
        assert!(matches!(err, CrashGuardError::ChannelClosed(_)));
    }
}
