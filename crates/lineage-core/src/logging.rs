//! Structured logging setup, feature-gated behind `tracing`.
//!
//! Mirrors the layered stderr + rolling-file approach the crate's mutation
//! and analysis entry points rely on (`tracing_subscriber::fmt` layers
//! combined with `tracing_appender`'s daily rolling file), just without the
//! reload-handle control tower a GUI host would need — this crate has no
//! GUI, so a fixed level per layer set up once at process start is enough.

use std::{io, path::Path};

use anyhow::Error;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    EnvFilter, Layer, filter::LevelFilter, fmt::time::ChronoLocal, layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// Initializes a global subscriber that writes pretty, leveled output to
/// stderr (`INFO` and up, or `RUST_LOG` if set) and full `DEBUG` output to
/// a daily-rotating log file under `log_dir`.
pub fn init_stderr_and_rolling_file(
    log_dir: impl AsRef<Path>,
    filename_prefix: &str,
) -> Result<(), Error> {
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stderr)
        .with_timer(ChronoLocal::rfc_3339())
        .with_target(false)
        .with_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        );

    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_timer(ChronoLocal::rfc_3339())
        .with_writer(
            RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .filename_prefix(filename_prefix)
                .filename_suffix("log")
                .build(log_dir.as_ref())?,
        )
        .with_filter(LevelFilter::DEBUG);

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .try_init()?;

    Ok(())
}

/// Initializes a global subscriber that only logs to stderr. Useful for
/// tests and short-lived tool invocations that don't want a log file.
pub fn init_stderr_only() -> Result<(), Error> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer().with_writer(io::stderr).with_filter(
                EnvFilter::builder()
                    .with_default_directive(LevelFilter::INFO.into())
                    .from_env_lossy(),
            ),
        )
        .try_init()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rolling_file_setup_does_not_panic() {
        let dir = std::env::temp_dir().join("lineage-core-logging-test");
        std::fs::create_dir_all(&dir).unwrap();
        // try_init may fail if a global subscriber is already set by another
        // test in this binary; either outcome is fine here.
        let _ = init_stderr_and_rolling_file(&dir, "lineage-core-test");
    }
}
