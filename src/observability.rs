//! Load outcome reporting.
//!
//! [`crate::load::load_rows`] calls the observer configured in
//! [`crate::load::LoadOptions`] once per load: `on_success` with row counts, or `on_failure`
//! with a severity, plus `on_alert` when that severity reaches the configured threshold.

use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::error::RowpackError;
use crate::source::SourceFormat;

/// Severity classification used for observer callbacks and alerting thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LoadSeverity {
    Info,
    /// Non-fatal.
    Warning,
    /// The load failed.
    Error,
    /// Storage or container integrity failure.
    Critical,
}

/// What was being loaded, and where to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadContext {
    /// Container location.
    pub location: String,
    /// Source name.
    pub source: String,
    pub format: Option<SourceFormat>,
}

/// Counts reported on a successful load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadStats {
    /// Every stored record.
    pub records: u64,
    /// Data rows inside the boundary.
    pub rows: u64,
    pub cols: u64,
}

/// Observer interface for load outcomes.
pub trait LoadObserver: Send + Sync {
    fn on_success(&self, _ctx: &LoadContext, _stats: LoadStats) {}

    fn on_failure(&self, _ctx: &LoadContext, _severity: LoadSeverity, _error: &RowpackError) {}

    /// Called when a failure meets the alert threshold. Defaults to [`Self::on_failure`].
    fn on_alert(&self, ctx: &LoadContext, severity: LoadSeverity, error: &RowpackError) {
        self.on_failure(ctx, severity, error)
    }
}

/// Severity of a failed load.
pub fn severity_for_error(e: &RowpackError) -> LoadSeverity {
    match e {
        RowpackError::Io(_) | RowpackError::Corrupt { .. } => LoadSeverity::Critical,
        RowpackError::Csv(err) => match err.kind() {
            ::csv::ErrorKind::Io(_) => LoadSeverity::Critical,
            _ => LoadSeverity::Error,
        },
        _ => LoadSeverity::Error,
    }
}

/// Fans callbacks out to several observers.
#[derive(Default)]
pub struct CompositeObserver {
    observers: Vec<Arc<dyn LoadObserver>>,
}

impl CompositeObserver {
    pub fn new(observers: Vec<Arc<dyn LoadObserver>>) -> Self {
        Self { observers }
    }
}

impl fmt::Debug for CompositeObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeObserver")
            .field("observers_len", &self.observers.len())
            .finish()
    }
}

impl LoadObserver for CompositeObserver {
    fn on_success(&self, ctx: &LoadContext, stats: LoadStats) {
        self.observers.iter().for_each(|o| o.on_success(ctx, stats));
    }

    fn on_failure(&self, ctx: &LoadContext, severity: LoadSeverity, error: &RowpackError) {
        self.observers
            .iter()
            .for_each(|o| o.on_failure(ctx, severity, error));
    }

    fn on_alert(&self, ctx: &LoadContext, severity: LoadSeverity, error: &RowpackError) {
        self.observers
            .iter()
            .for_each(|o| o.on_alert(ctx, severity, error));
    }
}

fn format_label(ctx: &LoadContext) -> &'static str {
    ctx.format.map_or("-", |f| f.as_str())
}

/// Logs load events to stderr.
#[derive(Debug, Default)]
pub struct StdErrObserver;

impl LoadObserver for StdErrObserver {
    fn on_success(&self, ctx: &LoadContext, stats: LoadStats) {
        eprintln!(
            "[load][ok] location={} source={} format={} records={} rows={} cols={}",
            ctx.location,
            ctx.source,
            format_label(ctx),
            stats.records,
            stats.rows,
            stats.cols
        );
    }

    fn on_failure(&self, ctx: &LoadContext, severity: LoadSeverity, error: &RowpackError) {
        eprintln!(
            "[load][{severity:?}] location={} source={} format={} err={error}",
            ctx.location,
            ctx.source,
            format_label(ctx)
        );
    }

    fn on_alert(&self, ctx: &LoadContext, severity: LoadSeverity, error: &RowpackError) {
        eprintln!(
            "[ALERT][load][{severity:?}] location={} source={} format={} err={error}",
            ctx.location,
            ctx.source,
            format_label(ctx)
        );
    }
}

/// Appends load events to a local log file, one line per event.
#[derive(Debug)]
pub struct FileObserver {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileObserver {
    /// Writes are best-effort; failures to open or write the log are ignored.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    fn append_line(&self, line: &str) {
        let _guard = self.lock.lock().ok();
        if let Ok(mut f) = OpenOptions::new().create(true).append(true).open(&self.path) {
            let _ = writeln!(f, "{} {line}", chrono::Utc::now().to_rfc3339());
        }
    }
}

impl LoadObserver for FileObserver {
    fn on_success(&self, ctx: &LoadContext, stats: LoadStats) {
        self.append_line(&format!(
            "ok location={} source={} rows={} cols={}",
            ctx.location, ctx.source, stats.rows, stats.cols
        ));
    }

    fn on_failure(&self, ctx: &LoadContext, severity: LoadSeverity, error: &RowpackError) {
        self.append_line(&format!(
            "fail severity={severity:?} location={} source={} err={error}",
            ctx.location, ctx.source
        ));
    }

    fn on_alert(&self, ctx: &LoadContext, severity: LoadSeverity, error: &RowpackError) {
        self.append_line(&format!(
            "ALERT severity={severity:?} location={} source={} err={error}",
            ctx.location, ctx.source
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_and_integrity_failures_are_critical() {
        let io = RowpackError::Io(std::io::Error::other("disk full"));
        assert_eq!(severity_for_error(&io), LoadSeverity::Critical);
        assert_eq!(
            severity_for_error(&RowpackError::corrupt("bad magic")),
            LoadSeverity::Critical
        );
        let schema = RowpackError::SchemaMismatch {
            message: "x".into(),
        };
        assert_eq!(severity_for_error(&schema), LoadSeverity::Error);
        assert!(LoadSeverity::Warning < LoadSeverity::Error);
    }
}
