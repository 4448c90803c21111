//! Telemetry sink.
//!
//! The control thread hands one [`TelemetryRecord`] per completed
//! policy-running tick to a [`TelemetrySink`].  Recording is fire-and-forget:
//! a sink must never block, fail or panic back into the tick.  The sinks here
//! buffer through a bounded [`tokio::sync::mpsc`] channel with `try_send`;
//! when the buffer is full the record is dropped and counted.
//!
//! [`CsvTelemetryWriter`] drains such a channel on its own thread and appends
//! one row per record to `<dir>/<robot>_<YYYYmmdd_HHMMSS>.csv` with the header
//! `tick,time,tau_0..,tau_est_0..,q_0..,q_target_0..,dq_0..`.
//!
//! # Example
//!
//! ```rust
//! use strider_middleware::telemetry_sink::{TelemetrySink, channel_sink};
//! use strider_types::TelemetryRecord;
//!
//! let (sink, mut rx) = channel_sink(1);
//! let record = TelemetryRecord {
//!     tick: 1,
//!     time: 0.005,
//!     tau: vec![0.0],
//!     tau_est: vec![0.0],
//!     q: vec![0.0],
//!     q_target: vec![0.0],
//!     dq: vec![0.0],
//! };
//! sink.record(record.clone());
//! sink.record(record); // buffer full: dropped, not blocked
//! assert_eq!(sink.dropped(), 1);
//! assert_eq!(rx.try_recv().unwrap().tick, 1);
//! ```

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::JoinHandle;

use chrono::{DateTime, Local};
use strider_types::{ControlError, TelemetryRecord};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};

/// Records buffered between the control thread and a writer.
pub const DEFAULT_BUFFER: usize = 1024;

/// Rows written between explicit flushes.
const FLUSH_EVERY: u64 = 200;

// ────────────────────────────────────────────────────────────────────────────
// Sink trait
// ────────────────────────────────────────────────────────────────────────────

/// Consumer of per-tick telemetry.  Implementations must return promptly and
/// must not surface errors to the caller.
pub trait TelemetrySink: Send {
    fn record(&self, record: TelemetryRecord);

    /// Records discarded so far because the sink could not keep up.
    fn dropped(&self) -> u64 {
        0
    }
}

/// Discards every record.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl TelemetrySink for NullSink {
    fn record(&self, _record: TelemetryRecord) {}
}

/// Bounded, non-blocking channel sender.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<TelemetryRecord>,
    dropped: Arc<AtomicU64>,
}

/// Create a sink and the receiver that drains it.
pub fn channel_sink(capacity: usize) -> (ChannelSink, mpsc::Receiver<TelemetryRecord>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        ChannelSink {
            tx,
            dropped: Arc::new(AtomicU64::new(0)),
        },
        rx,
    )
}

impl TelemetrySink for ChannelSink {
    fn record(&self, record: TelemetryRecord) {
        match self.tx.try_send(record) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                let n = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                // log the first drop and then every thousandth
                if n == 1 || n % 1000 == 0 {
                    warn!(dropped = n, "telemetry buffer full; dropping records");
                }
            }
            Err(TrySendError::Closed(_)) => {
                let n = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                if n == 1 {
                    warn!("telemetry writer gone; dropping records");
                }
            }
        }
    }

    fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// CSV formatting
// ────────────────────────────────────────────────────────────────────────────

/// Header line (without newline) for a robot with `num_dofs` joints.
pub fn csv_header(num_dofs: usize) -> String {
    let mut columns = vec!["tick".to_string(), "time".to_string()];
    for prefix in ["tau", "tau_est", "q", "q_target", "dq"] {
        columns.extend((0..num_dofs).map(|j| format!("{prefix}_{j}")));
    }
    columns.join(",")
}

/// One data row (without newline).
pub fn csv_row(record: &TelemetryRecord) -> String {
    let mut fields = vec![record.tick.to_string(), record.time.to_string()];
    for values in [
        &record.tau,
        &record.tau_est,
        &record.q,
        &record.q_target,
        &record.dq,
    ] {
        fields.extend(values.iter().map(f64::to_string));
    }
    fields.join(",")
}

/// `<dir>/<robot>_<YYYYmmdd_HHMMSS>.csv`
pub fn telemetry_path(dir: &Path, robot: &str, started: DateTime<Local>) -> PathBuf {
    dir.join(format!("{robot}_{}.csv", started.format("%Y%m%d_%H%M%S")))
}

// ────────────────────────────────────────────────────────────────────────────
// CsvTelemetryWriter
// ────────────────────────────────────────────────────────────────────────────

/// Background CSV writer.  Dropping every [`ChannelSink`] clone ends the
/// writer thread; [`CsvTelemetryWriter::join`] waits for it.
#[derive(Debug)]
pub struct CsvTelemetryWriter {
    path: PathBuf,
    handle: JoinHandle<Result<u64, ControlError>>,
}

impl CsvTelemetryWriter {
    /// Create the log file, write its header and start the writer thread.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::Telemetry`] when the directory or file cannot
    /// be created.  Errors after startup are logged by the writer thread and
    /// reported by [`CsvTelemetryWriter::join`], never to the control loop.
    pub fn spawn(
        dir: &Path,
        robot: &str,
        num_dofs: usize,
        capacity: usize,
    ) -> Result<(ChannelSink, Self), ControlError> {
        fs::create_dir_all(dir).map_err(|e| {
            ControlError::Telemetry(format!("cannot create {}: {e}", dir.display()))
        })?;
        let path = telemetry_path(dir, robot, Local::now());
        let file = File::create(&path).map_err(|e| {
            ControlError::Telemetry(format!("cannot create {}: {e}", path.display()))
        })?;
        let mut out = BufWriter::new(file);
        writeln!(out, "{}", csv_header(num_dofs))
            .map_err(|e| ControlError::Telemetry(format!("header write failed: {e}")))?;

        let (sink, rx) = channel_sink(capacity);
        let thread_path = path.clone();
        let handle = std::thread::Builder::new()
            .name("telemetry-csv".to_string())
            .spawn(move || write_rows(out, rx, &thread_path))
            .map_err(|e| ControlError::Telemetry(format!("cannot start writer thread: {e}")))?;
        info!(path = %path.display(), "telemetry logging to CSV");
        Ok((sink, Self { path, handle }))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Wait for the writer to drain and close the file.  Returns the number
    /// of rows written.
    pub fn join(self) -> Result<u64, ControlError> {
        self.handle
            .join()
            .map_err(|_| ControlError::Telemetry("writer thread panicked".to_string()))?
    }
}

fn write_rows(
    mut out: BufWriter<File>,
    mut rx: mpsc::Receiver<TelemetryRecord>,
    path: &Path,
) -> Result<u64, ControlError> {
    let mut rows = 0u64;
    while let Some(record) = rx.blocking_recv() {
        if let Err(e) = writeln!(out, "{}", csv_row(&record)) {
            warn!(path = %path.display(), error = %e, "telemetry write failed; stopping writer");
            return Err(ControlError::Telemetry(e.to_string()));
        }
        rows += 1;
        if rows % FLUSH_EVERY == 0 {
            let _ = out.flush();
        }
    }
    out.flush()
        .map_err(|e| ControlError::Telemetry(format!("final flush failed: {e}")))?;
    debug!(rows, path = %path.display(), "telemetry writer finished");
    Ok(rows)
}
