use std::path::Path;
use std::sync::OnceLock;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Installs the global subscriber: stdout plus a daily rolling `server.log`.
///
/// `RUST_LOG` overrides the default `info` filter. Calling this twice is a
/// no-op for the second caller. If another global subscriber is already in
/// place, the failure is reported through it and that subscriber stays.
pub fn init(log_dir: &Path) {
    if let Err(err) = std::fs::create_dir_all(log_dir) {
        eprintln!("Failed to create log directory {}: {}", log_dir.display(), err);
    }

    let file_appender = tracing_appender::rolling::daily(log_dir, "server.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    if LOG_GUARD.set(guard).is_err() {
        return;
    }

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let stdout_layer = tracing_subscriber::fmt::layer().with_target(false);
    let file_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_ansi(false)
        .with_writer(non_blocking);

    if let Err(err) = tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
    {
        eprintln!("Failed to install tracing subscriber: {}", err);
        tracing::warn!(log_dir = %log_dir.display(), "File logging disabled: {}", err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_survives_an_existing_subscriber() {
        let dir = tempfile::tempdir().unwrap();
        let _ = tracing::subscriber::set_global_default(tracing_subscriber::registry());

        init(&dir.path().join("logs"));
        init(&dir.path().join("again"));
        assert!(dir.path().join("logs").is_dir());
    }
}
