//! JSON-RPC over stdio transport.
//!
//! Owns the MCP server child process and its pipes:
//! - Writing one JSON message per line to stdin
//! - Reading one JSON message per line from stdout
//! - Draining stderr on a background task so the server never stalls on it
//! - Tearing the process down (EOF → SIGTERM → SIGKILL) and reaping it

use std::collections::VecDeque;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::task::JoinHandle;

use super::errors::McpError;
use super::types::ServerConfig;

// ─── Constants ───────────────────────────────────────────────────────────────

/// Number of stderr lines retained for error context.
const STDERR_TAIL_LINES: usize = 20;

/// How long to wait for the stderr drain to catch up after stdout EOF.
const STDERR_SETTLE: Duration = Duration::from_millis(200);

// ─── Transport ───────────────────────────────────────────────────────────────

/// Line-delimited JSON transport over a child process's stdio.
///
/// All I/O methods take `&mut self`: one owner, one message in flight.
pub struct StdioTransport {
    server_name: String,
    child: Option<Child>,
    writer: Option<ChildStdin>,
    reader: Option<BufReader<ChildStdout>>,
    stderr_tail: Arc<Mutex<VecDeque<String>>>,
    stderr_task: Option<JoinHandle<()>>,
    pid: Option<u32>,
    shutdown_grace: Duration,
}

impl StdioTransport {
    /// Spawn the server process with all three stdio streams piped.
    pub fn start(config: &ServerConfig, shutdown_grace: Duration) -> Result<Self, McpError> {
        let mut cmd = Command::new(&config.command);
        cmd.args(&config.args);

        for (key, value) in &config.env {
            cmd.env(key, value);
        }
        if let Some(dir) = &config.cwd {
            cmd.current_dir(dir);
        }

        // Windows: prevent console window from appearing for child processes
        #[cfg(target_os = "windows")]
        {
            const CREATE_NO_WINDOW: u32 = 0x08000000;
            cmd.creation_flags(CREATE_NO_WINDOW);
        }

        cmd.stdin(Stdio::piped());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| McpError::SpawnFailed {
            name: config.name.clone(),
            reason: format!("{}: {e}", config.command),
        })?;

        let stdin = child.stdin.take().ok_or_else(|| McpError::SpawnFailed {
            name: config.name.clone(),
            reason: "failed to capture stdin".into(),
        })?;
        let stdout = child.stdout.take().ok_or_else(|| McpError::SpawnFailed {
            name: config.name.clone(),
            reason: "failed to capture stdout".into(),
        })?;

        let pid = child.id();
        let stderr_tail = Arc::new(Mutex::new(VecDeque::with_capacity(STDERR_TAIL_LINES)));
        let stderr_task = child
            .stderr
            .take()
            .map(|stderr| spawn_stderr_drain(&config.name, stderr, Arc::clone(&stderr_tail)));

        tracing::info!(
            server = %config.name,
            command = %config.command,
            args = ?config.args,
            pid = ?pid,
            "spawned MCP server"
        );

        Ok(Self {
            server_name: config.name.clone(),
            child: Some(child),
            writer: Some(stdin),
            reader: Some(BufReader::new(stdout)),
            stderr_tail,
            stderr_task,
            pid,
            shutdown_grace,
        })
    }

    /// Name of the server this transport talks to.
    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    /// OS process id of the child, if it was available at spawn time.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Whether `close` has already run.
    pub fn is_closed(&self) -> bool {
        self.child.is_none()
    }

    /// The last lines the server wrote to stderr.
    pub fn stderr_tail(&self) -> String {
        match self.stderr_tail.lock() {
            Ok(tail) => tail.iter().cloned().collect::<Vec<_>>().join("\n"),
            Err(_) => String::new(),
        }
    }

    // ─── Framing ─────────────────────────────────────────────────────────

    /// Write one message as a single JSON line and flush it.
    ///
    /// Writing to a server that has already exited yields `StreamClosed`.
    pub async fn send<T: Serialize>(&mut self, message: &T) -> Result<(), McpError> {
        let mut json = serde_json::to_string(message).map_err(|e| McpError::WriteFailed {
            server: self.server_name.clone(),
            reason: format!("failed to serialize message: {e}"),
        })?;
        json.push('\n');

        let writer = self.writer.as_mut().ok_or_else(|| McpError::Disconnected {
            server: self.server_name.clone(),
        })?;

        let written = match writer.write_all(json.as_bytes()).await {
            Ok(()) => writer.flush().await,
            Err(e) => Err(e),
        };

        if let Err(e) = written {
            // The read end is gone: the server has exited.
            if e.kind() == std::io::ErrorKind::BrokenPipe {
                return Err(self.stream_closed().await);
            }
            return Err(McpError::WriteFailed {
                server: self.server_name.clone(),
                reason: format!("failed to write to stdin: {e}"),
            });
        }

        tracing::trace!(server = %self.server_name, bytes = json.len(), "sent message");
        Ok(())
    }

    /// Block until one full line arrives on stdout and parse it as JSON.
    ///
    /// Blank lines are skipped. EOF yields `StreamClosed`, a line that is not
    /// JSON yields `ParseFailed`.
    pub async fn receive(&mut self) -> Result<Value, McpError> {
        let reader = self.reader.as_mut().ok_or_else(|| McpError::Disconnected {
            server: self.server_name.clone(),
        })?;

        let mut line_buf = String::new();
        loop {
            line_buf.clear();
            let bytes_read = match reader.read_line(&mut line_buf).await {
                Ok(n) => n,
                Err(e) if e.kind() == std::io::ErrorKind::InvalidData => {
                    return Err(McpError::ParseFailed {
                        server: self.server_name.clone(),
                        reason: format!("reply is not valid UTF-8: {e}"),
                    });
                }
                Err(e) => {
                    tracing::warn!(server = %self.server_name, error = %e, "stdout read failed");
                    return Err(self.stream_closed().await);
                }
            };

            if bytes_read == 0 {
                return Err(self.stream_closed().await);
            }

            let trimmed = line_buf.trim();
            if trimmed.is_empty() {
                continue;
            }

            return serde_json::from_str(trimmed).map_err(|e| McpError::ParseFailed {
                server: self.server_name.clone(),
                reason: format!("{e} in line: {}", truncate(trimmed, 200)),
            });
        }
    }

    /// Build a `StreamClosed` error once stderr has had a moment to drain.
    async fn stream_closed(&mut self) -> McpError {
        if let Some(mut task) = self.stderr_task.take() {
            if tokio::time::timeout(STDERR_SETTLE, &mut task).await.is_err() {
                self.stderr_task = Some(task);
            }
        }
        McpError::StreamClosed {
            server: self.server_name.clone(),
            stderr: self.stderr_tail(),
        }
    }

    // ─── Teardown ────────────────────────────────────────────────────────

    /// Terminate the server and reap it. Idempotent.
    ///
    /// Escalates: close stdin and wait, then SIGTERM (Unix) and wait, then
    /// SIGKILL. Each wait is bounded by the shutdown grace period.
    pub async fn close(&mut self) {
        let Some(mut child) = self.child.take() else {
            return;
        };

        // EOF on stdin is the stdio-server signal to exit.
        drop(self.writer.take());
        self.reader = None;

        let status = match tokio::time::timeout(self.shutdown_grace, child.wait()).await {
            Ok(result) => result.ok(),
            Err(_) => {
                tracing::debug!(server = %self.server_name, "server ignored stdin EOF, terminating");
                self.terminate(&mut child).await
            }
        };

        if let Some(task) = self.stderr_task.take() {
            task.abort();
        }

        tracing::info!(
            server = %self.server_name,
            pid = ?self.pid,
            status = ?status,
            "MCP server stopped"
        );
    }

    async fn terminate(&self, child: &mut Child) -> Option<std::process::ExitStatus> {
        #[cfg(unix)]
        if let Some(pid) = self.pid {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
                tracing::debug!(server = %self.server_name, error = %e, "SIGTERM failed");
            }
            if let Ok(result) = tokio::time::timeout(self.shutdown_grace, child.wait()).await {
                return result.ok();
            }
        }

        tracing::warn!(server = %self.server_name, pid = ?self.pid, "force-killing MCP server");
        if let Err(e) = child.kill().await {
            tracing::warn!(server = %self.server_name, error = %e, "kill failed");
        }
        child.try_wait().ok().flatten()
    }
}

impl std::fmt::Debug for StdioTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StdioTransport")
            .field("server_name", &self.server_name)
            .field("pid", &self.pid)
            .field("closed", &self.is_closed())
            .finish()
    }
}

// ─── Stderr Drain ────────────────────────────────────────────────────────────

fn spawn_stderr_drain(
    server_name: &str,
    stderr: ChildStderr,
    tail: Arc<Mutex<VecDeque<String>>>,
) -> JoinHandle<()> {
    let server_name = server_name.to_string();
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    tracing::debug!(server = %server_name, "stderr: {line}");
                    if let Ok(mut tail) = tail.lock() {
                        if tail.len() == STDERR_TAIL_LINES {
                            tail.pop_front();
                        }
                        tail.push_back(line);
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::debug!(server = %server_name, error = %e, "stderr drain stopped");
                    break;
                }
            }
        }
    })
}

fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_short_string_unchanged() {
        assert_eq!(truncate("abc", 10), "abc");
    }

    #[test]
    fn test_truncate_long_string() {
        assert_eq!(truncate("abcdef", 3), "abc...");
    }

    #[tokio::test]
    async fn test_spawn_missing_binary_fails() {
        let config = ServerConfig::new("/nonexistent/definitely-not-a-binary", &[]);
        let err = StdioTransport::start(&config, Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, McpError::SpawnFailed { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_send_receive_through_cat() {
        let config = ServerConfig::new("cat", &[]);
        let mut transport = StdioTransport::start(&config, Duration::from_secs(1)).unwrap();

        let message = serde_json::json!({"jsonrpc": "2.0", "id": 1, "result": {}});
        transport.send(&message).await.unwrap();
        let echoed = transport.receive().await.unwrap();
        assert_eq!(echoed, message);

        transport.close().await;
        assert!(transport.is_closed());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_io_after_close_is_disconnected() {
        let config = ServerConfig::new("cat", &[]);
        let mut transport = StdioTransport::start(&config, Duration::from_secs(1)).unwrap();
        transport.close().await;
        transport.close().await;

        let err = transport.send(&serde_json::json!({})).await.unwrap_err();
        assert!(matches!(err, McpError::Disconnected { .. }));
        let err = transport.receive().await.unwrap_err();
        assert!(matches!(err, McpError::Disconnected { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_non_json_line_is_parse_error() {
        let config = ServerConfig::new("sh", &["-c", "echo 'not json'; sleep 5"]);
        let mut transport = StdioTransport::start(&config, Duration::from_secs(1)).unwrap();
        let err = transport.receive().await.unwrap_err();
        assert!(matches!(err, McpError::ParseFailed { .. }));
        transport.close().await;
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_write_after_exit_is_stream_closed() {
        let config = ServerConfig::new("sh", &["-c", "echo 'db missing' >&2; exit 1"]);
        let mut transport = StdioTransport::start(&config, Duration::from_secs(1)).unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;

        let message = serde_json::json!({"jsonrpc": "2.0", "id": 1, "method": "initialize"});
        match transport.send(&message).await.unwrap_err() {
            McpError::StreamClosed { stderr, .. } => assert_eq!(stderr, "db missing"),
            other => panic!("expected StreamClosed, got {other:?}"),
        }
        transport.close().await;
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_eof_reports_stderr() {
        let config = ServerConfig::new("sh", &["-c", "echo boom >&2; exit 1"]);
        let mut transport = StdioTransport::start(&config, Duration::from_secs(1)).unwrap();
        match transport.receive().await.unwrap_err() {
            McpError::StreamClosed { stderr, .. } => assert_eq!(stderr, "boom"),
            other => panic!("expected StreamClosed, got {other:?}"),
        }
        transport.close().await;
    }
}
