//! Background execution of exports and imports.
//!
//! Key derivation dominates the cost of every operation, so callers with an
//! interactive thread hand the whole operation to a dedicated worker thread.
//! Everything crosses the boundary by value: the engine is cloned, records,
//! bytes and the password are moved in, and the result comes back over a
//! one-shot channel.

use std::thread;

use tokio::sync::oneshot;
use zeroize::Zeroizing;

use crate::backup::{BackupEngine, ImportDiff};
use crate::error::{BackupError, ErrorCategory, ErrorKind, Result};
use crate::kdf::KeyDerivation;
use crate::record::{ActiveIds, InstanceRecord};

const WORKER_NAME: &str = "arrvault-crypto";

/// An operation to run off the caller's thread, with owned inputs.
pub enum Job {
    Export {
        records: Vec<InstanceRecord>,
        active: ActiveIds,
        password: Zeroizing<String>,
    },
    Import {
        bytes: Vec<u8>,
        password: Zeroizing<String>,
        existing: Vec<InstanceRecord>,
    },
}

#[derive(Debug)]
pub enum JobOutput {
    Exported(Vec<u8>),
    Imported(ImportDiff),
}

/// Result of an operation that is still running on the worker thread.
///
/// Dropping a `Pending` discards the result once it arrives; the worker runs
/// to completion either way.
#[derive(Debug)]
pub struct Pending<T> {
    rx: oneshot::Receiver<Result<T>>,
}

impl<T> Pending<T> {
    /// Wait for the result without blocking the executor.
    pub async fn wait(self) -> Result<T> {
        self.rx.await.unwrap_or_else(|_| Err(worker_vanished()))
    }

    /// Take the result if it is ready. Never blocks.
    ///
    /// Returns `None` while the worker is still busy. Once a result has been
    /// returned, later calls report `OffloadFailed`.
    pub fn try_take(&mut self) -> Option<Result<T>> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(worker_vanished())),
        }
    }

    /// Block the current thread until the result arrives.
    ///
    /// Must not be called from within an async runtime.
    pub fn blocking_wait(self) -> Result<T> {
        match self.rx.blocking_recv() {
            Ok(result) => result,
            Err(_) => Err(worker_vanished()),
        }
    }
}

/// Run `job` with a clone of `engine` on a new worker thread.
pub fn run_off_main_path<K>(engine: &BackupEngine<K>, job: Job) -> Result<Pending<JobOutput>>
where
    K: KeyDerivation + Clone + 'static,
{
    let engine = engine.clone();
    spawn(move || match job {
        Job::Export {
            records,
            active,
            password,
        } => engine
            .export_backup(&records, &active, &password)
            .map(JobOutput::Exported),
        Job::Import {
            bytes,
            password,
            existing,
        } => engine
            .import_backup(&bytes, &password, &existing)
            .map(JobOutput::Imported),
    })
}

/// Export on a worker thread.
pub fn export_in_background<K>(
    engine: &BackupEngine<K>,
    records: Vec<InstanceRecord>,
    active: ActiveIds,
    password: Zeroizing<String>,
) -> Result<Pending<Vec<u8>>>
where
    K: KeyDerivation + Clone + 'static,
{
    let engine = engine.clone();
    spawn(move || engine.export_backup(&records, &active, &password))
}

/// Import on a worker thread.
pub fn import_in_background<K>(
    engine: &BackupEngine<K>,
    bytes: Vec<u8>,
    password: Zeroizing<String>,
    existing: Vec<InstanceRecord>,
) -> Result<Pending<ImportDiff>>
where
    K: KeyDerivation + Clone + 'static,
{
    let engine = engine.clone();
    spawn(move || engine.import_backup(&bytes, &password, &existing))
}

fn spawn<T, F>(work: F) -> Result<Pending<T>>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    let (tx, rx) = oneshot::channel();
    thread::Builder::new()
        .name(WORKER_NAME.to_string())
        .spawn(move || {
            // The receiver may be gone if the caller lost interest.
            if tx.send(work()).is_err() {
                tracing::debug!("discarding result of abandoned background operation");
            }
        })
        .map_err(|e| {
            BackupError::with_source(
                ErrorCategory::Internal,
                ErrorKind::OffloadFailed,
                "failed to start background worker",
                e,
            )
        })?;
    Ok(Pending { rx })
}

fn worker_vanished() -> BackupError {
    BackupError::new(
        ErrorCategory::Internal,
        ErrorKind::OffloadFailed,
        "background operation ended without a result",
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackupConfig;
    use crate::record::InstanceRole;
    use std::time::Duration;

    const PASSWORD: &str = "correct-horse-battery";

    fn engine() -> BackupEngine {
        BackupEngine::new(
            BackupConfig::default()
                .with_kdf_iterations(1_000)
                .with_min_export_kdf_iterations(1_000),
        )
    }

    fn records() -> Vec<InstanceRecord> {
        vec![
            InstanceRecord::new(
                "a",
                InstanceRole::Sonarr,
                "Sonarr",
                "http://sonarr:8989",
                "key-a",
            ),
            InstanceRecord::new(
                "b",
                InstanceRole::Radarr,
                "Radarr",
                "http://radarr:7878",
                "key-b",
            ),
        ]
    }

    fn password() -> Zeroizing<String> {
        Zeroizing::new(PASSWORD.to_string())
    }

    #[tokio::test]
    async fn test_export_then_import_async() {
        let engine = engine();
        let bytes = export_in_background(&engine, records(), ActiveIds::default(), password())
            .unwrap()
            .wait()
            .await
            .unwrap();

        let diff = import_in_background(&engine, bytes, password(), vec![records()[1].clone()])
            .unwrap()
            .wait()
            .await
            .unwrap();

        assert_eq!(diff.to_create, vec![records()[0].clone()]);
        assert_eq!(diff.to_overwrite, vec![records()[1].clone()]);
    }

    #[tokio::test]
    async fn test_errors_cross_the_boundary() {
        let err = export_in_background(
            &engine(),
            records(),
            ActiveIds::default(),
            Zeroizing::new("short".to_string()),
        )
        .unwrap()
        .wait()
        .await
        .unwrap_err();
        assert_eq!(err.kind, ErrorKind::WeakPassword);
    }

    #[tokio::test]
    async fn test_job_dispatch() {
        let engine = engine();
        let exported = run_off_main_path(
            &engine,
            Job::Export {
                records: records(),
                active: ActiveIds::default(),
                password: password(),
            },
        )
        .unwrap()
        .wait()
        .await
        .unwrap();
        let JobOutput::Exported(bytes) = exported else {
            panic!("expected export output");
        };

        let imported = run_off_main_path(
            &engine,
            Job::Import {
                bytes,
                password: password(),
                existing: Vec::new(),
            },
        )
        .unwrap()
        .wait()
        .await
        .unwrap();
        let JobOutput::Imported(diff) = imported else {
            panic!("expected import output");
        };
        assert_eq!(diff.to_create, records());
    }

    #[test]
    fn test_try_take_polls_without_blocking() {
        let mut pending =
            export_in_background(&engine(), records(), ActiveIds::default(), password()).unwrap();

        let mut result = None;
        for _ in 0..2_000 {
            if let Some(ready) = pending.try_take() {
                result = Some(ready);
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        let bytes = result.expect("worker did not finish in time").unwrap();
        assert!(!bytes.is_empty());

        // The channel is spent after the result was taken.
        let err = pending.try_take().unwrap().unwrap_err();
        assert_eq!(err.kind, ErrorKind::OffloadFailed);
    }

    #[test]
    fn test_blocking_wait() {
        let bytes = export_in_background(&engine(), records(), ActiveIds::default(), password())
            .unwrap()
            .blocking_wait()
            .unwrap();
        let diff = import_in_background(&engine(), bytes, password(), Vec::new())
            .unwrap()
            .blocking_wait()
            .unwrap();
        assert_eq!(diff.to_create.len(), 2);
    }

    #[test]
    fn test_dropped_pending_does_not_disturb_worker() {
        let pending =
            export_in_background(&engine(), records(), ActiveIds::default(), password()).unwrap();
        drop(pending);

        // A later operation is unaffected.
        let bytes = export_in_background(&engine(), records(), ActiveIds::default(), password())
            .unwrap()
            .blocking_wait()
            .unwrap();
        assert!(!bytes.is_empty());
    }

    #[test]
    fn test_panicking_worker_reports_offload_failure() {
        let pending: Pending<()> = spawn(|| panic!("worker blew up")).unwrap();
        let err = pending.blocking_wait().unwrap_err();
        assert_eq!(err.kind, ErrorKind::OffloadFailed);
    }
}
