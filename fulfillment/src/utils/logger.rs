//! Logging Infrastructure
//!
//! Console output plus, when a log directory is given:
//! - Daily rotating application logs under `app/` (pruned by [`cleanup_old_logs`])
//! - Daily rotating activity logs under `audit/` (never pruned)

use std::fs;
use std::path::Path;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt, prelude::*};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync + 'static>;

/// Days application logs are kept
pub const APP_LOG_RETENTION_DAYS: i64 = 14;

/// Log target for activity records
pub const AUDIT_TARGET: &str = "audit";

/// Initialize console-only logging
pub fn init_logger(level: &str, json_format: bool) -> anyhow::Result<()> {
    init_logger_with_file(level, json_format, None)
}

/// Initialize logging with optional daily rotating files
///
/// `RUST_LOG` overrides `level` for the console when set.
///
/// ```no_run
/// fulfillment::init_logger_with_file("debug", false, None)?;
/// fulfillment::init_logger_with_file("info", true, Some("./data/logs"))?;
/// # Ok::<(), anyhow::Error>(())
/// ```
pub fn init_logger_with_file(
    level: &str,
    json_format: bool,
    log_dir: Option<&str>,
) -> anyhow::Result<()> {
    let console_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let mut layers: Vec<BoxedLayer> = Vec::new();
    if json_format {
        layers.push(
            fmt::layer()
                .json()
                .with_target(true)
                .with_current_span(true)
                .with_thread_ids(true)
                .with_filter(console_filter)
                .boxed(),
        );
    } else {
        layers.push(
            fmt::layer()
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .with_filter(console_filter)
                .boxed(),
        );
    }

    if let Some(dir) = log_dir {
        let log_dir = Path::new(dir);
        let app_dir = log_dir.join("app");
        let audit_dir = log_dir.join(AUDIT_TARGET);
        fs::create_dir_all(&app_dir)?;
        fs::create_dir_all(&audit_dir)?;

        let app_log = RollingFileAppender::new(Rotation::DAILY, app_dir, "app");
        layers.push(
            fmt::layer()
                .json()
                .with_target(true)
                .with_writer(app_log)
                .with_filter(EnvFilter::new(level))
                .with_filter(tracing_subscriber::filter::filter_fn(|meta| {
                    meta.target() != AUDIT_TARGET
                }))
                .boxed(),
        );

        let audit_log = RollingFileAppender::new(Rotation::DAILY, audit_dir, AUDIT_TARGET);
        layers.push(
            fmt::layer()
                .json()
                .with_target(true)
                .with_writer(audit_log)
                .with_filter(tracing_subscriber::filter::filter_fn(|meta| {
                    meta.target() == AUDIT_TARGET
                }))
                .boxed(),
        );
    }

    tracing_subscriber::registry().with(layers).try_init()?;
    Ok(())
}

/// Delete `app.YYYY-MM-DD` files older than `keep_days`
///
/// Returns the number of files removed.
pub fn cleanup_old_logs(log_dir: &Path, keep_days: i64) -> anyhow::Result<usize> {
    let app_dir = log_dir.join("app");
    if !app_dir.exists() {
        return Ok(0);
    }

    let cutoff = chrono::Local::now().date_naive() - chrono::Duration::days(keep_days);
    let mut removed = 0;
    for entry in fs::read_dir(app_dir)? {
        let path = entry?.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Some(date_part) = name.strip_prefix("app.") else {
            continue;
        };
        if let Ok(date) = chrono::NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
            && date < cutoff
        {
            fs::remove_file(&path)?;
            removed += 1;
            tracing::info!(file = %name, "Deleted old log file");
        }
    }
    Ok(removed)
}

/// Record an activity entry in the audit log stream
///
/// ```ignore
/// audit_log!("staff-1", "order_transition", "order:o-1", "PLACED -> PROCESSING");
/// ```
#[macro_export]
macro_rules! audit_log {
    ($actor:expr, $action:expr, $resource:expr) => {
        tracing::info!(
            target: "audit",
            actor = %$actor,
            action = %$action,
            resource = %$resource,
            "AUDIT"
        );
    };
    ($actor:expr, $action:expr, $resource:expr, $details:expr) => {
        tracing::info!(
            target: "audit",
            actor = %$actor,
            action = %$action,
            resource = %$resource,
            details = %$details,
            "AUDIT"
        );
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cleanup_removes_only_expired_app_logs() {
        let dir = tempfile::tempdir().unwrap();
        let app_dir = dir.path().join("app");
        fs::create_dir_all(&app_dir).unwrap();

        let today = chrono::Local::now().date_naive().format("%Y-%m-%d").to_string();
        fs::write(app_dir.join("app.2000-01-01"), "old").unwrap();
        fs::write(app_dir.join(format!("app.{}", today)), "new").unwrap();
        fs::write(app_dir.join("notes.txt"), "keep").unwrap();

        let removed = cleanup_old_logs(dir.path(), APP_LOG_RETENTION_DAYS).unwrap();
        assert_eq!(removed, 1);
        assert!(!app_dir.join("app.2000-01-01").exists());
        assert!(app_dir.join(format!("app.{}", today)).exists());
        assert!(app_dir.join("notes.txt").exists());
    }

    #[test]
    fn test_cleanup_without_app_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(cleanup_old_logs(dir.path(), 14).unwrap(), 0);
    }
}
