//! Daemon lifecycle: PID file tracking and shutdown signals.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

/// Default PID file location under the user's config directory.
pub fn default_pid_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home)
        .join(".chatbridge")
        .join("chatbridge.pid")
}

/// Records the current process id at `path` and returns a guard that
/// removes the file again when dropped, so the error path and the signal
/// path clean up the same way.
pub async fn write_pid(path: impl AsRef<Path>) -> std::io::Result<PidGuard> {
    let path = path.as_ref().to_path_buf();
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(&path, std::process::id().to_string()).await?;
    info!("PID file written: {}", path.display());
    Ok(PidGuard { path })
}

/// Removes the PID file on drop.
pub struct PidGuard {
    path: PathBuf,
}

impl Drop for PidGuard {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => info!("PID file removed: {}", self.path.display()),
            Err(e) => debug!("PID file not removed ({}): {e}", self.path.display()),
        }
    }
}

/// Blocks until SIGTERM or SIGINT arrives.
#[cfg(not(test))]
pub async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut sigterm =
            signal(SignalKind::terminate()).expect("Failed to register SIGTERM handler");
        let received = tokio::select! {
            _ = tokio::signal::ctrl_c() => "SIGINT",
            _ = sigterm.recv() => "SIGTERM",
        };
        info!("Received {received}, shutting down");
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to listen for ctrl-c");
        info!("Received Ctrl-C, shutting down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_pid_path_is_under_the_config_dir() {
        let text = default_pid_path().to_string_lossy().into_owned();
        assert!(text.contains(".chatbridge"));
        assert!(text.ends_with("chatbridge.pid"));
    }

    #[tokio::test]
    async fn pid_guard_writes_and_removes_on_drop() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let pid_path = tmp.path().join("run/chatbridge.pid");
        {
            let _guard = write_pid(&pid_path).await.expect("pid write");
            let written = std::fs::read_to_string(&pid_path).expect("read pid");
            assert_eq!(
                written.parse::<u32>().expect("pid should be numeric"),
                std::process::id()
            );
        }
        assert!(!pid_path.exists());
    }
}
