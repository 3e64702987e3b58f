use std::fs::OpenOptions;
use std::future::Future;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::constants::{EVENT_MAX_RETRIES, EVENT_RETRY_DELAY_MS, EVENT_TIMEOUT_SECS};
use crate::dependencies::PoolEvent;
use crate::errors::{AuctioneerError, Result};

/// Work delivered to the worker process. Pool validation is excluded from
/// retry handling: its failure is fatal and handled at the process root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WorkerEvent {
    ValidatePools,
    PriceUpdate,
    OracleScan { pool: String },
    LiqScan { pool: String },
    UserRefresh { cutoff_ledger: u32 },
    CheckUser { pool: String, user: String },
    Chain { event: PoolEvent },
}

/// Append-only NDJSON log of events that exhausted their retries.
pub struct DeadLetterLog {
    path: PathBuf,
}

impl DeadLetterLog {
    pub fn new(path: PathBuf) -> Self {
        DeadLetterLog { path }
    }

    pub fn default_path() -> Self {
        DeadLetterLog::new(PathBuf::from("./data/deadletter.txt"))
    }

    pub fn append(&self, event: &WorkerEvent) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let line = serde_json::to_string(event)?;
        writeln!(file, "{}", line)?;
        Ok(())
    }
}

/// Run an event handler with the standard retry policy: a wall-clock timeout
/// per attempt, a constant delay between attempts, and a dead-letter record
/// once the budget is spent.
pub async fn dispatch_with_retry<F, Fut>(
    event: &WorkerEvent,
    dead_letter: &DeadLetterLog,
    mut attempt: F,
) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let mut tries: u32 = 0;
    loop {
        let outcome =
            tokio::time::timeout(Duration::from_secs(EVENT_TIMEOUT_SECS), attempt()).await;
        let error = match outcome {
            Ok(Ok(())) => return Ok(()),
            Ok(Err(error)) => error,
            Err(_) => AuctioneerError::Timeout(format!("{:?}", event)),
        };
        tries += 1;
        if tries > EVENT_MAX_RETRIES {
            if let Err(dl_error) = dead_letter.append(event) {
                warn!(?dl_error, "failed to dead-letter event");
            }
            return Err(error);
        }
        warn!(?event, %error, "event handler failed, retrying");
        tokio::time::sleep(Duration::from_millis(EVENT_RETRY_DELAY_MS)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn temp_log() -> (tempfile::TempDir, DeadLetterLog) {
        let dir = tempfile::tempdir().unwrap();
        let log = DeadLetterLog::new(dir.path().join("deadletter.txt"));
        (dir, log)
    }

    #[tokio::test]
    async fn test_success_first_try() {
        let (_dir, log) = temp_log();
        let calls = AtomicU32::new(0);
        let result = dispatch_with_retry(&WorkerEvent::PriceUpdate, &log, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(()) }
        })
        .await;
        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retries_then_dead_letters() {
        let (dir, log) = temp_log();
        let calls = AtomicU32::new(0);
        let event = WorkerEvent::OracleScan {
            pool: "CPOOL".to_string(),
        };
        let result = dispatch_with_retry(&event, &log, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(AuctioneerError::Rpc("down".to_string())) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1 + EVENT_MAX_RETRIES);

        let contents = std::fs::read_to_string(dir.path().join("deadletter.txt")).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 1);
        let parsed: WorkerEvent = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(parsed, event);
    }

    #[tokio::test]
    async fn test_recovers_on_second_attempt() {
        let (_dir, log) = temp_log();
        let calls = AtomicU32::new(0);
        let result = dispatch_with_retry(&WorkerEvent::PriceUpdate, &log, || {
            let attempt = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt == 0 {
                    Err(AuctioneerError::Rpc("flake".to_string()))
                } else {
                    Ok(())
                }
            }
        })
        .await;
        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
