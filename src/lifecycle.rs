//! Single-instance bookkeeping and shutdown signals.
//!
//! The running server claims a marker file holding its PID before it binds.
//! The claim is atomic: the PID is written to a staging file which is then
//! hard-linked into place, and linking fails if a marker already exists. A
//! marker naming a dead process is stale and gets taken over. A new instance
//! can ask the recorded process to stop (SIGTERM, then SIGKILL if it
//! lingers). The marker is released when the server shuts down on a signal.

use crate::error::{Result, ViewerError};
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

#[cfg(unix)]
use nix::errno::Errno;
#[cfg(unix)]
use nix::sys::signal::{self, Signal};
#[cfg(unix)]
use nix::unistd::Pid;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Time allowed for a process to exit after SIGKILL.
const KILL_WAIT: Duration = Duration::from_secs(2);

/// On-disk record of the running instance's PID.
#[derive(Debug, Clone)]
pub struct InstanceMarker {
    path: PathBuf,
}

impl InstanceMarker {
    /// Marker stored at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `logview.pid` in the system temporary directory.
    pub fn default_path() -> PathBuf {
        std::env::temp_dir().join("logview.pid")
    }

    /// Location of the marker file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The PID stored in the marker, if there is a readable one.
    pub fn read_pid(&self) -> Result<Option<u32>> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => Ok(content.trim().parse::<u32>().ok()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ViewerError::instance_error(format!(
                "Cannot read {}: {}",
                self.path.display(),
                e
            ))),
        }
    }

    /// Whether another live process holds the marker.
    pub fn is_already_running(&self) -> bool {
        match self.read_pid() {
            Ok(Some(pid)) => pid != std::process::id() && process_alive(pid),
            Ok(None) => false,
            Err(e) => {
                warn!("{}", e);
                false
            }
        }
    }

    /// Record `pid` as the running instance, replacing any stale marker.
    pub fn write(&self, pid: u32) -> Result<()> {
        std::fs::write(&self.path, format!("{}\n", pid)).map_err(|e| {
            ViewerError::instance_error(format!("Cannot write {}: {}", self.path.display(), e))
        })?;
        debug!("Wrote instance marker {} ({})", self.path.display(), pid);
        Ok(())
    }

    /// Claim the marker for the current process.
    pub fn acquire(&self) -> Result<()> {
        self.acquire_for(std::process::id())
    }

    /// Claim the marker for `pid`.
    ///
    /// Fails with [`ViewerError::AlreadyRunning`] when the marker names
    /// another live process. A stale marker is removed and the claim retried
    /// once. Re-claiming a marker that already names `pid` succeeds.
    pub fn acquire_for(&self, pid: u32) -> Result<()> {
        for _ in 0..2 {
            match self.try_claim(pid) {
                Ok(()) => {
                    debug!("Claimed instance marker {} ({})", self.path.display(), pid);
                    return Ok(());
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => match self.read_pid()? {
                    Some(holder) if holder == pid => return Ok(()),
                    Some(holder) if process_alive(holder) => {
                        return Err(ViewerError::AlreadyRunning {
                            pid: holder,
                            path: self.path.clone(),
                        })
                    }
                    holder => {
                        warn!(
                            "Taking over stale instance marker {} (pid {:?})",
                            self.path.display(),
                            holder
                        );
                        self.remove()?;
                    }
                },
                Err(e) => {
                    return Err(ViewerError::instance_error(format!(
                        "Cannot create {}: {}",
                        self.path.display(),
                        e
                    )))
                }
            }
        }

        Err(ViewerError::instance_error(format!(
            "Lost the race for {} to another instance",
            self.path.display()
        )))
    }

    /// Claim the marker, stopping a live holder first when `replace` is set.
    pub async fn acquire_or_replace(&self, replace: bool, grace: Duration) -> Result<()> {
        match self.acquire() {
            Err(ViewerError::AlreadyRunning { pid, .. }) if replace => {
                info!("Replacing running instance (pid {})", pid);
                self.stop_running_instance(grace).await?;
                self.acquire()
            }
            other => other,
        }
    }

    /// Remove the marker if it still names the current process.
    pub fn release(&self) -> Result<()> {
        match self.read_pid()? {
            Some(pid) if pid == std::process::id() => self.remove(),
            other => {
                debug!("Marker {} not ours ({:?}), leaving it", self.path.display(), other);
                Ok(())
            }
        }
    }

    /// Await `task`, then release the marker. A failed release is logged;
    /// the task's own result is what gets returned.
    pub async fn hold<T, F>(&self, task: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let result = task.await;
        if let Err(e) = self.release() {
            warn!("{}", e);
        }
        result
    }

    fn try_claim(&self, pid: u32) -> io::Result<()> {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(format!(".{}.tmp", pid));
        let staging = self.path.with_file_name(name);

        std::fs::write(&staging, format!("{}\n", pid))?;
        let linked = std::fs::hard_link(&staging, &self.path);
        if let Err(e) = std::fs::remove_file(&staging) {
            debug!("Cannot remove {}: {}", staging.display(), e);
        }
        linked
    }

    /// Delete the marker. A missing marker is not an error.
    pub fn remove(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ViewerError::instance_error(format!(
                "Cannot remove {}: {}",
                self.path.display(),
                e
            ))),
        }
    }

    /// Stop the instance recorded in the marker and clear the marker.
    ///
    /// Sends SIGTERM and waits up to `grace` for the process to exit, then
    /// escalates to SIGKILL. Returns `false` when no live instance was
    /// recorded (a stale marker is still removed).
    pub async fn stop_running_instance(&self, grace: Duration) -> Result<bool> {
        let pid = match self.read_pid()? {
            Some(pid) if pid != std::process::id() && process_alive(pid) => pid,
            _ => {
                self.remove()?;
                return Ok(false);
            }
        };

        info!("Stopping running instance (pid {})", pid);
        terminate(pid, grace).await?;
        self.remove()?;
        Ok(true)
    }
}

#[cfg(unix)]
fn process_alive(pid: u32) -> bool {
    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    match signal::kill(Pid::from_raw(raw), None) {
        Ok(()) => true,
        // Exists but belongs to someone else
        Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}

#[cfg(not(unix))]
fn process_alive(_pid: u32) -> bool {
    false
}

#[cfg(unix)]
async fn wait_for_exit(pid: u32, within: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + within;
    while tokio::time::Instant::now() < deadline {
        if !process_alive(pid) {
            return true;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
    !process_alive(pid)
}

#[cfg(unix)]
async fn terminate(pid: u32, grace: Duration) -> Result<()> {
    let target = Pid::from_raw(
        i32::try_from(pid)
            .map_err(|_| ViewerError::instance_error(format!("Invalid pid {}", pid)))?,
    );

    match signal::kill(target, Signal::SIGTERM) {
        Ok(()) => {}
        Err(Errno::ESRCH) => return Ok(()),
        Err(e) => {
            return Err(ViewerError::instance_error(format!(
                "Cannot signal pid {}: {}",
                pid, e
            )))
        }
    }
    if wait_for_exit(pid, grace).await {
        return Ok(());
    }

    warn!("Instance {} ignored SIGTERM, sending SIGKILL", pid);
    match signal::kill(target, Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => {
            return Err(ViewerError::instance_error(format!(
                "Cannot kill pid {}: {}",
                pid, e
            )))
        }
    }
    if wait_for_exit(pid, KILL_WAIT).await {
        Ok(())
    } else {
        Err(ViewerError::instance_error(format!(
            "Process {} did not exit after SIGKILL",
            pid
        )))
    }
}

#[cfg(not(unix))]
async fn terminate(pid: u32, _grace: Duration) -> Result<()> {
    Err(ViewerError::instance_error(format!(
        "Stopping pid {} is not supported on this platform",
        pid
    )))
}

/// Resolve when the process receives SIGINT or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl-C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn marker_in(dir: &tempfile::TempDir) -> InstanceMarker {
        InstanceMarker::new(dir.path().join("logview.pid"))
    }

    #[test]
    fn test_write_read_remove() {
        let dir = tempfile::tempdir().unwrap();
        let marker = marker_in(&dir);

        assert_eq!(marker.read_pid().unwrap(), None);
        marker.write(4242).unwrap();
        assert_eq!(marker.read_pid().unwrap(), Some(4242));

        marker.remove().unwrap();
        assert!(!marker.path().exists());
        marker.remove().unwrap();
    }

    #[test]
    fn test_own_pid_is_not_another_instance() {
        let dir = tempfile::tempdir().unwrap();
        let marker = marker_in(&dir);

        marker.write(std::process::id()).unwrap();
        assert!(!marker.is_already_running());
        marker.acquire().unwrap();
    }

    #[test]
    fn test_garbage_marker_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let marker = marker_in(&dir);

        std::fs::write(marker.path(), "not a pid").unwrap();
        assert_eq!(marker.read_pid().unwrap(), None);
        assert!(!marker.is_already_running());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stale_marker_is_cleared() {
        let dir = tempfile::tempdir().unwrap();
        let marker = marker_in(&dir);

        let mut child = tokio::process::Command::new("true").spawn().unwrap();
        let pid = child.id().unwrap();
        child.wait().await.unwrap();

        marker.write(pid).unwrap();
        assert!(!marker.is_already_running());
        assert!(!marker.stop_running_instance(Duration::from_millis(200)).await.unwrap());
        assert!(!marker.path().exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stop_running_instance() {
        let dir = tempfile::tempdir().unwrap();
        let marker = marker_in(&dir);

        let mut child = tokio::process::Command::new("sleep").arg("60").spawn().unwrap();
        let pid = child.id().unwrap();
        // Reap the child as soon as it dies so it does not linger as a zombie.
        let reaper = tokio::spawn(async move { child.wait().await });

        marker.write(pid).unwrap();
        assert!(marker.is_already_running());

        let stopped = marker.stop_running_instance(Duration::from_secs(2)).await.unwrap();
        assert!(stopped);
        assert!(!marker.path().exists());
        assert!(!reaper.await.unwrap().unwrap().success());
    }

    #[cfg(unix)]
    async fn spawn_sleeper() -> (u32, tokio::process::Child) {
        let child = tokio::process::Command::new("sleep")
            .arg("60")
            .kill_on_drop(true)
            .spawn()
            .unwrap();
        (child.id().unwrap(), child)
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_acquire_refuses_live_holder() {
        let dir = tempfile::tempdir().unwrap();
        let marker = marker_in(&dir);
        let (pid, _child) = spawn_sleeper().await;

        marker.write(pid).unwrap();
        match marker.acquire() {
            Err(ViewerError::AlreadyRunning { pid: holder, .. }) => assert_eq!(holder, pid),
            other => panic!("expected AlreadyRunning, got {:?}", other),
        }
        let refused = marker
            .acquire_or_replace(false, Duration::from_secs(1))
            .await;
        assert!(matches!(refused, Err(ViewerError::AlreadyRunning { .. })));
        assert_eq!(marker.read_pid().unwrap(), Some(pid));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_acquire_or_replace_stops_holder() {
        let dir = tempfile::tempdir().unwrap();
        let marker = marker_in(&dir);

        let mut child = tokio::process::Command::new("sleep").arg("60").spawn().unwrap();
        let pid = child.id().unwrap();
        let reaper = tokio::spawn(async move { child.wait().await });

        marker.write(pid).unwrap();
        marker
            .acquire_or_replace(true, Duration::from_secs(2))
            .await
            .unwrap();

        assert_eq!(marker.read_pid().unwrap(), Some(std::process::id()));
        assert!(!reaper.await.unwrap().unwrap().success());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_acquire_takes_over_stale_marker() {
        let dir = tempfile::tempdir().unwrap();
        let marker = marker_in(&dir);

        let mut child = tokio::process::Command::new("true").spawn().unwrap();
        let dead = child.id().unwrap();
        child.wait().await.unwrap();

        marker.write(dead).unwrap();
        marker.acquire().unwrap();
        assert_eq!(marker.read_pid().unwrap(), Some(std::process::id()));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_concurrent_acquire_has_one_winner() {
        let dir = tempfile::tempdir().unwrap();
        let (first, _a) = spawn_sleeper().await;
        let (second, _b) = spawn_sleeper().await;

        for _ in 0..20 {
            let marker = marker_in(&dir);
            marker.remove().unwrap();

            let barrier = std::sync::Arc::new(std::sync::Barrier::new(2));
            let handles: Vec<_> = [first, second]
                .into_iter()
                .map(|pid| {
                    let marker = marker.clone();
                    let barrier = barrier.clone();
                    std::thread::spawn(move || {
                        barrier.wait();
                        marker.acquire_for(pid).map(|()| pid)
                    })
                })
                .collect();
            let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

            let winners: Vec<u32> = results.iter().filter_map(|r| r.as_ref().ok().copied()).collect();
            assert_eq!(winners.len(), 1);
            assert!(results
                .iter()
                .any(|r| matches!(r, Err(ViewerError::AlreadyRunning { pid, .. }) if *pid == winners[0])));
            assert_eq!(marker.read_pid().unwrap(), Some(winners[0]));
        }
    }

    #[test]
    fn test_release_leaves_foreign_marker() {
        let dir = tempfile::tempdir().unwrap();
        let marker = marker_in(&dir);

        marker.write(4242).unwrap();
        marker.release().unwrap();
        assert_eq!(marker.read_pid().unwrap(), Some(4242));

        marker.remove().unwrap();
        marker.acquire().unwrap();
        marker.release().unwrap();
        assert!(!marker.path().exists());
    }

    #[tokio::test]
    async fn test_hold_releases_after_task() {
        let dir = tempfile::tempdir().unwrap();
        let marker = marker_in(&dir);

        marker.acquire().unwrap();
        let value = marker.hold(async { Ok(7) }).await.unwrap();
        assert_eq!(value, 7);
        assert!(!marker.path().exists());
    }

    #[tokio::test]
    async fn test_hold_keeps_task_error_when_release_fails() {
        let dir = tempfile::tempdir().unwrap();
        let marker = marker_in(&dir);
        marker.acquire().unwrap();

        let path = marker.path().to_path_buf();
        let result: Result<()> = marker
            .hold(async move {
                std::fs::remove_file(&path).unwrap();
                std::fs::create_dir(&path).unwrap();
                Err(ViewerError::config_error("listener died"))
            })
            .await;

        match result {
            Err(ViewerError::Config(msg)) => assert_eq!(msg, "listener died"),
            other => panic!("expected the task's error, got {:?}", other),
        }
        assert!(marker.release().is_err());
    }
}
