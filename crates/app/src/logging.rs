use anyhow::Context;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LoggingSection;

const ROTATION: Rotation = Rotation::WEEKLY;

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Log to stderr and to a rolling file under `config.dir`. Keep the returned
/// guard alive until exit or buffered lines are lost.
pub fn init(config: &LoggingSection) -> anyhow::Result<WorkerGuard> {
    let (writer, guard) = tracing_appender::non_blocking(file_appender(config)?);

    tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(fmt::layer().with_ansi(false).with_writer(writer))
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(guard)
}

fn file_appender(config: &LoggingSection) -> anyhow::Result<RollingFileAppender> {
    std::fs::create_dir_all(&config.dir)
        .with_context(|| format!("Failed to create log directory {}", config.dir.display()))?;

    RollingFileAppender::builder()
        .rotation(ROTATION)
        .filename_prefix(config.file_prefix.clone())
        .filename_suffix("log")
        .max_log_files(config.max_files)
        .build(&config.dir)
        .context("Failed to open log file")
}

/// Stderr-only fallback when the log directory is unusable.
pub fn init_stderr() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(std::io::stderr)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn rotates_weekly_into_the_configured_dir() {
        assert_eq!(ROTATION, Rotation::WEEKLY);

        let dir = tempfile::TempDir::new().unwrap();
        let config = LoggingSection {
            dir: dir.path().join("logs"),
            ..LoggingSection::default()
        };
        assert_eq!(config.max_files, 12);

        let mut appender = file_appender(&config).unwrap();
        writeln!(appender, "Start").unwrap();
        appender.flush().unwrap();

        let names: Vec<String> = std::fs::read_dir(&config.dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names.len(), 1);
        assert!(names[0].starts_with("remit.") && names[0].ends_with(".log"));
    }
}
