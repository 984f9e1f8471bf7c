//! Encoder child-process supervision.
//!
//! One registry entry per path id. Each live encoder is owned by a monitor
//! task that scans its stderr for the readiness marker, reaps it when it
//! exits, and terminates it when cancelled. State changes are published on a
//! `watch` channel per process.

use futures::future::join_all;
use std::collections::HashMap;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::process::{Child, ChildStderr, Command as TokioCommand};
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::config::EncoderConfig;
use crate::errors::{EncoderError, EncoderResult};
use crate::models::{EncoderProcessInfo, EncoderState, SourceSpec, StreamUrls};
use crate::services::encoder_command::{EncoderCommand, EncoderCommandBuilder};

/// Exit code recorded when the encoder never started
pub const SPAWN_FAILURE_EXIT_CODE: i32 = -1;

/// How long to keep reading stderr after the process has exited
const STDERR_DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

struct EncoderHandle {
    state: watch::Receiver<EncoderProcessInfo>,
    cancel: CancellationToken,
    /// None for entries whose spawn failed
    monitor: Option<JoinHandle<()>>,
}

impl EncoderHandle {
    fn snapshot(&self) -> EncoderProcessInfo {
        self.state.borrow().clone()
    }

    fn is_live(&self) -> bool {
        self.state.borrow().is_live()
    }
}

pub struct EncoderSupervisor {
    commands: EncoderCommandBuilder,
    readiness_marker: String,
    stop_timeout: Duration,
    processes: RwLock<HashMap<String, EncoderHandle>>,
}

impl EncoderSupervisor {
    pub fn new(config: &EncoderConfig, urls: StreamUrls) -> Self {
        Self {
            commands: EncoderCommandBuilder::new(config, urls),
            readiness_marker: config.readiness_marker.clone(),
            stop_timeout: config.stop_timeout,
            processes: RwLock::new(HashMap::new()),
        }
    }

    /// Check whether the configured encoder binary can be executed
    pub async fn check_availability(&self) -> bool {
        match TokioCommand::new(self.commands.program())
            .arg("-version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
        {
            Ok(status) => status.success(),
            Err(e) => {
                debug!("Encoder binary {} not available: {}", self.commands.program(), e);
                false
            }
        }
    }

    /// Launch an encoder for `path_id`.
    ///
    /// Fails with `InvalidSource` before spawning when a file source is
    /// missing, and with `Duplicate` when a live encoder is registered. A
    /// spawn failure leaves an `exited` entry behind and is not retried.
    pub async fn start(&self, path_id: &str, source: &SourceSpec) -> EncoderResult<EncoderProcessInfo> {
        if let SourceSpec::File { path, .. } = source {
            match tokio::fs::metadata(path).await {
                Ok(meta) if meta.is_file() => {}
                Ok(_) => {
                    return Err(EncoderError::invalid_source(
                        path_id,
                        format!("{} is not a regular file", path.display()),
                    ))
                }
                Err(e) => {
                    return Err(EncoderError::invalid_source(
                        path_id,
                        format!("{}: {}", path.display(), e),
                    ))
                }
            }
        }

        let command = self.commands.build(path_id, source);
        let mut processes = self.processes.write().await;

        if let Some(existing) = processes.get(path_id) {
            if existing.is_live() {
                return Err(EncoderError::duplicate(path_id));
            }
            debug!("Replacing finished encoder entry for {}", path_id);
        }

        let mut child = match Self::spawn(&command) {
            Ok(child) => child,
            Err(e) => {
                error!("Failed to spawn encoder for {}: {}", path_id, e);
                let mut info = EncoderProcessInfo::starting(path_id, None, command.argv());
                info.transition(EncoderState::Exited, Some(SPAWN_FAILURE_EXIT_CODE));
                let (_tx, rx) = watch::channel(info);
                processes.insert(
                    path_id.to_string(),
                    EncoderHandle {
                        state: rx,
                        cancel: CancellationToken::new(),
                        monitor: None,
                    },
                );
                return Err(EncoderError::spawn(path_id, e.to_string()));
            }
        };

        let info = EncoderProcessInfo::starting(path_id, child.id(), command.argv());
        let (tx, rx) = watch::channel(info.clone());
        let cancel = CancellationToken::new();
        let monitor = ProcessMonitor {
            path_id: path_id.to_string(),
            readiness_marker: self.readiness_marker.clone(),
            stop_timeout: self.stop_timeout,
            stderr: child.stderr.take().map(|stderr| BufReader::new(stderr).lines()),
            child,
            state: tx,
            cancel: cancel.clone(),
        };
        let handle = tokio::spawn(monitor.run());

        processes.insert(
            path_id.to_string(),
            EncoderHandle {
                state: rx,
                cancel,
                monitor: Some(handle),
            },
        );

        info!(
            "Started encoder for {} with PID {:?}: {:?}",
            path_id, info.pid, command.args
        );
        Ok(info)
    }

    fn spawn(command: &EncoderCommand) -> std::io::Result<Child> {
        let mut cmd = TokioCommand::new(&command.program);
        cmd.args(&command.args);
        cmd.kill_on_drop(true);
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::null());
        cmd.stderr(Stdio::piped());
        cmd.spawn()
    }

    /// Stop the encoder for `path_id`; a no-op when none is registered.
    ///
    /// The entry leaves the registry before the process is signalled, so a
    /// new `start` for the same id can proceed immediately.
    pub async fn stop(&self, path_id: &str) -> EncoderResult<Option<EncoderProcessInfo>> {
        let Some(handle) = self.processes.write().await.remove(path_id) else {
            debug!("No encoder registered for {}, nothing to stop", path_id);
            return Ok(None);
        };
        Self::shutdown(path_id, handle).await.map(Some)
    }

    async fn shutdown(path_id: &str, handle: EncoderHandle) -> EncoderResult<EncoderProcessInfo> {
        handle.cancel.cancel();
        if let Some(monitor) = handle.monitor {
            monitor.await.map_err(|e| EncoderError::Monitor {
                path_id: path_id.to_string(),
                message: e.to_string(),
            })?;
        }
        let info = handle.state.borrow().clone();
        info!("Encoder for {} stopped ({})", path_id, info.state);
        Ok(info)
    }

    /// Stop every encoder. Failures are logged and returned, never raised;
    /// the registry is empty afterwards.
    pub async fn stop_all(&self) -> Vec<EncoderError> {
        let handles: Vec<(String, EncoderHandle)> = self.processes.write().await.drain().collect();
        if handles.is_empty() {
            return Vec::new();
        }
        info!("Stopping {} encoder processes", handles.len());

        for (_, handle) in &handles {
            handle.cancel.cancel();
        }
        let results = join_all(
            handles
                .into_iter()
                .map(|(path_id, handle)| async move { Self::shutdown(&path_id, handle).await }),
        )
        .await;

        let failures: Vec<EncoderError> = results.into_iter().filter_map(Result::err).collect();
        for failure in &failures {
            error!("Encoder shutdown failure: {}", failure);
        }
        failures
    }

    /// Drop registry entries whose process has already finished
    pub async fn reap_exited(&self) -> Vec<EncoderProcessInfo> {
        let mut processes = self.processes.write().await;
        let finished: Vec<String> = processes
            .iter()
            .filter(|(_, handle)| !handle.is_live())
            .map(|(path_id, _)| path_id.clone())
            .collect();

        let reaped: Vec<EncoderProcessInfo> = finished
            .iter()
            .filter_map(|path_id| processes.remove(path_id))
            .map(|handle| handle.snapshot())
            .collect();

        if !reaped.is_empty() {
            debug!("Reaped {} finished encoder entries", reaped.len());
        }
        reaped
    }

    pub async fn status(&self, path_id: &str) -> Option<EncoderProcessInfo> {
        self.processes.read().await.get(path_id).map(EncoderHandle::snapshot)
    }

    pub async fn list(&self) -> Vec<EncoderProcessInfo> {
        let mut all: Vec<_> = self
            .processes
            .read()
            .await
            .values()
            .map(EncoderHandle::snapshot)
            .collect();
        all.sort_by(|a, b| a.path_id.cmp(&b.path_id));
        all
    }

    /// Follow state changes of the encoder currently registered for `path_id`
    pub async fn subscribe(&self, path_id: &str) -> Option<watch::Receiver<EncoderProcessInfo>> {
        self.processes
            .read()
            .await
            .get(path_id)
            .map(|handle| handle.state.clone())
    }

    pub async fn is_running(&self, path_id: &str) -> bool {
        self.processes
            .read()
            .await
            .get(path_id)
            .is_some_and(EncoderHandle::is_live)
    }
}

/// Owns one child process for its whole life
struct ProcessMonitor {
    path_id: String,
    readiness_marker: String,
    stop_timeout: Duration,
    child: Child,
    stderr: Option<Lines<BufReader<ChildStderr>>>,
    state: watch::Sender<EncoderProcessInfo>,
    cancel: CancellationToken,
}

impl ProcessMonitor {
    async fn run(mut self) {
        loop {
            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => {
                    let (state, code) = self.terminate().await;
                    self.publish(state, code);
                    break;
                }
                line = next_line(&mut self.stderr) => match line {
                    Ok(Some(line)) => self.scan(&line),
                    Ok(None) => self.stderr = None,
                    Err(e) => {
                        debug!("Stopped reading encoder stderr for {}: {}", self.path_id, e);
                        self.stderr = None;
                    }
                },
                status = self.child.wait() => {
                    self.drain_stderr().await;
                    match status {
                        Ok(status) => {
                            if status.success() {
                                info!("Encoder for {} exited", self.path_id);
                            } else {
                                warn!("Encoder for {} exited with {}", self.path_id, status);
                            }
                            self.publish(EncoderState::Exited, exit_code(status));
                        }
                        Err(e) => {
                            error!("Failed to wait on encoder for {}: {}", self.path_id, e);
                            self.publish(EncoderState::Exited, None);
                        }
                    }
                    break;
                }
            }
        }
    }

    fn scan(&self, line: &str) {
        trace!("[{}] {}", self.path_id, line);
        if self.state.borrow().state == EncoderState::Starting && line.contains(&self.readiness_marker) {
            info!("Encoder for {} is producing frames", self.path_id);
            self.publish(EncoderState::Running, None);
        }
    }

    /// Pick up lines written just before exit so a quick run still reports readiness
    async fn drain_stderr(&mut self) {
        let deadline = tokio::time::Instant::now() + STDERR_DRAIN_TIMEOUT;
        loop {
            let next = match self.stderr.as_mut() {
                Some(lines) => tokio::time::timeout_at(deadline, lines.next_line()).await,
                None => break,
            };
            match next {
                Ok(Ok(Some(line))) => self.scan(&line),
                _ => self.stderr = None,
            }
        }
    }

    /// Graceful terminate, then force kill after `stop_timeout`
    async fn terminate(&mut self) -> (EncoderState, Option<i32>) {
        if let Ok(Some(status)) = self.child.try_wait() {
            return (EncoderState::Exited, exit_code(status));
        }

        if let Err(e) = self.send_terminate() {
            warn!("{}", e);
        }
        match tokio::time::timeout(self.stop_timeout, self.child.wait()).await {
            Ok(Ok(status)) => {
                info!("Encoder for {} terminated gracefully", self.path_id);
                (EncoderState::Exited, exit_code(status))
            }
            Ok(Err(e)) => {
                warn!("Lost track of encoder for {}: {}, killing", self.path_id, e);
                self.force_kill().await
            }
            Err(_) => {
                warn!(
                    "Encoder for {} ignored terminate for {:?}, killing",
                    self.path_id, self.stop_timeout
                );
                self.force_kill().await
            }
        }
    }

    #[cfg(unix)]
    fn send_terminate(&mut self) -> EncoderResult<()> {
        match self.child.id() {
            Some(pid) => sigterm(&self.path_id, pid),
            None => Ok(()),
        }
    }

    #[cfg(not(unix))]
    fn send_terminate(&mut self) -> EncoderResult<()> {
        self.child
            .start_kill()
            .map_err(|e| EncoderError::signal(&self.path_id, e.to_string()))
    }

    async fn force_kill(&mut self) -> (EncoderState, Option<i32>) {
        if let Err(e) = self.child.kill().await {
            error!("Failed to kill encoder for {}: {}", self.path_id, e);
        }
        let code = self.child.try_wait().ok().flatten().and_then(exit_code);
        (EncoderState::Killed, code)
    }

    fn publish(&self, next: EncoderState, exit_code: Option<i32>) {
        self.state.send_if_modified(|info| {
            let moved = info.transition(next, exit_code);
            if !moved {
                trace!("Ignoring {} -> {} for {}", info.state, next, self.path_id);
            }
            moved
        });
    }
}

#[cfg(unix)]
fn sigterm(path_id: &str, pid: u32) -> EncoderResult<()> {
    use nix::sys::signal::{self, Signal};
    use nix::unistd::Pid;

    signal::kill(Pid::from_raw(pid as i32), Signal::SIGTERM)
        .map_err(|e| EncoderError::signal(path_id, format!("SIGTERM to pid {pid}: {e}")))
}

async fn next_line(stderr: &mut Option<Lines<BufReader<ChildStderr>>>) -> std::io::Result<Option<String>> {
    match stderr {
        Some(lines) => lines.next_line().await,
        None => std::future::pending().await,
    }
}

fn exit_code(status: ExitStatus) -> Option<i32> {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        status.code().or_else(|| status.signal().map(|signal| -signal))
    }
    #[cfg(not(unix))]
    {
        status.code()
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use std::path::{Path, PathBuf};
    use std::sync::Arc;
    use tempfile::TempDir;

    /// Stand-in encoder binary; it ignores its arguments
    fn fake_encoder(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn supervisor(program: &Path, stop_timeout: Duration) -> EncoderSupervisor {
        let config = EncoderConfig {
            ffmpeg_command: program.to_string_lossy().into_owned(),
            stop_timeout,
            ..EncoderConfig::default()
        };
        EncoderSupervisor::new(&config, StreamUrls::default())
    }

    fn ready_encoder(dir: &TempDir) -> PathBuf {
        fake_encoder(
            dir.path(),
            "ready.sh",
            "echo 'frame=    1 fps=0.0 q=0.0' >&2\nexec sleep 30",
        )
    }

    async fn wait_for_state(sup: &EncoderSupervisor, path_id: &str, state: EncoderState) {
        let mut rx = sup.subscribe(path_id).await.expect("encoder registered");
        tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|info| info.state == state))
            .await
            .expect("state reached in time")
            .expect("monitor alive");
    }

    fn pid_alive(pid: u32) -> bool {
        use nix::sys::signal::kill;
        use nix::unistd::Pid;
        kill(Pid::from_raw(pid as i32), None).is_ok()
    }

    #[test]
    fn test_sigterm_to_vanished_pid_is_signal_error() {
        let err = sigterm("drone-1", i32::MAX as u32).unwrap_err();
        assert!(matches!(
            err,
            EncoderError::Signal { ref path_id, .. } if path_id == "drone-1"
        ));
        assert!(err.to_string().starts_with("Failed to signal encoder for drone-1"));
    }

    #[tokio::test]
    async fn test_missing_file_is_invalid_source() {
        let dir = TempDir::new().unwrap();
        let sup = supervisor(&ready_encoder(&dir), Duration::from_secs(5));

        let err = sup
            .start(
                "drone-2",
                &SourceSpec::File {
                    path: "missing.mp4".into(),
                    looping: false,
                },
            )
            .await
            .unwrap_err();

        assert!(matches!(err, EncoderError::InvalidSource { .. }));
        assert!(sup.status("drone-2").await.is_none());
    }

    #[tokio::test]
    async fn test_stop_without_entry_is_noop() {
        let dir = TempDir::new().unwrap();
        let sup = supervisor(&ready_encoder(&dir), Duration::from_secs(5));
        assert!(sup.stop("drone-3").await.unwrap().is_none());
        assert!(sup.list().await.is_empty());
    }

    #[tokio::test]
    async fn test_readiness_marker_then_graceful_stop() {
        let dir = TempDir::new().unwrap();
        let media = dir.path().join("clip.mp4");
        std::fs::write(&media, b"not really video").unwrap();
        let sup = supervisor(&ready_encoder(&dir), Duration::from_secs(5));

        let info = sup
            .start(
                "drone-1",
                &SourceSpec::File {
                    path: media.clone(),
                    looping: true,
                },
            )
            .await
            .unwrap();
        assert_eq!(info.state, EncoderState::Starting);
        assert!(info.command.contains(&media.to_string_lossy().into_owned()));
        let pid = info.pid.unwrap();

        wait_for_state(&sup, "drone-1", EncoderState::Running).await;
        assert!(sup.is_running("drone-1").await);

        let stopped = sup.stop("drone-1").await.unwrap().unwrap();
        assert_eq!(stopped.state, EncoderState::Exited);
        assert!(sup.status("drone-1").await.is_none());
        assert!(!pid_alive(pid));
    }

    #[tokio::test]
    async fn test_concurrent_start_allows_exactly_one() {
        let dir = TempDir::new().unwrap();
        let sup = Arc::new(supervisor(&ready_encoder(&dir), Duration::from_secs(5)));

        let (a, b) = tokio::join!(
            sup.start("drone-4", &SourceSpec::Camera),
            sup.start("drone-4", &SourceSpec::Camera)
        );
        let results = [a, b];
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert_eq!(
            results
                .iter()
                .filter(|r| matches!(r, Err(EncoderError::Duplicate { .. })))
                .count(),
            1
        );

        assert_eq!(sup.stop_all().await.len(), 0);
        assert!(sup.list().await.is_empty());
    }

    #[tokio::test]
    async fn test_spawn_failure_records_exited_entry() {
        let sup = supervisor(Path::new("/nonexistent/encoder-binary"), Duration::from_secs(5));

        let err = sup.start("drone-5", &SourceSpec::Screen).await.unwrap_err();
        assert!(matches!(err, EncoderError::Spawn { .. }));

        let info = sup.status("drone-5").await.unwrap();
        assert_eq!(info.state, EncoderState::Exited);
        assert_eq!(info.exit_code, Some(SPAWN_FAILURE_EXIT_CODE));
        assert!(!sup.is_running("drone-5").await);
        assert!(!sup.check_availability().await);

        // A failed entry does not block a retry, and is reaped
        assert!(matches!(
            sup.start("drone-5", &SourceSpec::Screen).await,
            Err(EncoderError::Spawn { .. })
        ));
        assert_eq!(sup.reap_exited().await.len(), 1);
        assert!(sup.status("drone-5").await.is_none());
    }

    #[tokio::test]
    async fn test_stubborn_encoder_is_killed_after_timeout() {
        let dir = TempDir::new().unwrap();
        let program = fake_encoder(
            dir.path(),
            "stubborn.sh",
            "trap '' TERM\necho 'frame=1' >&2\nwhile true; do sleep 1; done",
        );
        let sup = supervisor(&program, Duration::from_millis(300));

        let pid = sup.start("drone-6", &SourceSpec::Camera).await.unwrap().pid.unwrap();
        wait_for_state(&sup, "drone-6", EncoderState::Running).await;

        let stopped = sup.stop("drone-6").await.unwrap().unwrap();
        assert_eq!(stopped.state, EncoderState::Killed);
        assert!(!pid_alive(pid));
    }

    #[tokio::test]
    async fn test_natural_exit_is_observed_and_reaped() {
        let dir = TempDir::new().unwrap();
        let program = fake_encoder(dir.path(), "short.sh", "echo 'frame=1' >&2\nexit 3");
        let sup = supervisor(&program, Duration::from_secs(5));

        sup.start("drone-7", &SourceSpec::Camera).await.unwrap();
        wait_for_state(&sup, "drone-7", EncoderState::Exited).await;

        let info = sup.status("drone-7").await.unwrap();
        assert_eq!(info.exit_code, Some(3));

        // Exited entries can be replaced without stopping first
        sup.start("drone-7", &SourceSpec::Camera).await.unwrap();
        wait_for_state(&sup, "drone-7", EncoderState::Exited).await;
        assert_eq!(sup.reap_exited().await.len(), 1);
    }
}
