//! The shell-exec daemon: listens for `RemoteEvent`s addressed to
//! [`SHELL_EXECUTE_RID`], runs the embedded command line in a forked child,
//! captures its stdout, and replies with its exit status. Ported from
//! `CShellExecuteServer` (`shell_execute.cpp`): `prepareSocket` ->
//! `prepare_unix_socket_path`, `executeEvent`/`executeCmd`/`doExecute` ->
//! [`execute_command`], `sendReply` -> [`send_reply`].

use std::ffi::CString;
use std::io::Read as _;
use std::os::fd::{AsRawFd, OwnedFd};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use carbon_core::{CarbonError, CarbonErrorKind, CarbonResult, Event, EventLoop, LoopThread, Receiver, Target};
use carbon_net::{Connector, ConnectorConfig, Endpoint};
use carbon_remote::{Container, RemoteEvent};
use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::{dup2, execvpe, fork, pipe, ForkResult};

use crate::cmdline;

/// The RID this daemon listens on, mirroring `CARBON_SHELL_EXECUTE_RID`.
pub const SHELL_EXECUTE_RID: &str = "carbon.shell_execute";
pub const EVENT_SHELL_EXECUTE: u32 = 0x8101;
pub const EVENT_SHELL_EXECUTE_REPLY: u32 = 0x8102;

const CMD_MAX: usize = 1024;
const OUTPUT_MAX: usize = 16 * 1024;
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(50);
const CONNECTION_READ_TIMEOUT: Duration = Duration::from_secs(8);
const EINVAL: i32 = 22;

struct DoneLogger;

impl Receiver for DoneLogger {
    fn handle(&self, event: &Event) -> bool {
        if event.nparam != 0 {
            tracing::warn!(code = event.nparam, "shell-exec reply delivery failed");
        }
        true
    }
}

/// A running shell-exec server. Drop (or [`stop`](Self::stop)) tears down
/// the accept loop and removes the socket.
pub struct ShellExecuteServer {
    socket_path: PathBuf,
    stopped: Arc<AtomicBool>,
    accept_thread: Mutex<Option<JoinHandle<()>>>,
    reply_loop: LoopThread,
}

impl ShellExecuteServer {
    /// Binds `{root}/carbon.shell_execute` and starts accepting commands.
    pub fn start(root_path: impl AsRef<Path>) -> CarbonResult<Self> {
        let socket_path = root_path.as_ref().join(SHELL_EXECUTE_RID);
        carbon_net::prepare_unix_socket_path(&socket_path)?;

        let listener = UnixListener::bind(&socket_path)
            .map_err(|e| CarbonError::io(format!("failed to bind shell-exec socket {}", socket_path.display()), e))?;
        listener
            .set_nonblocking(true)
            .map_err(|e| CarbonError::io("failed to set shell-exec listener nonblocking", e))?;

        let reply_loop = LoopThread::new("carbon-shell-replies");
        reply_loop.event_loop().register_receiver(Arc::new(DoneLogger));
        reply_loop.start()?;

        let connector = Arc::new(Connector::new(ConnectorConfig { pool_size: 16, ..ConnectorConfig::default() })?);
        let event_loop = reply_loop.event_loop();

        let stopped = Arc::new(AtomicBool::new(false));
        let thread_stopped = stopped.clone();
        let root = socket_path.parent().unwrap_or_else(|| Path::new("/tmp")).to_path_buf();

        let accept_thread = thread::Builder::new()
            .name("carbon-shell-accept".to_string())
            .spawn(move || accept_loop(listener, thread_stopped, connector, event_loop, root))
            .map_err(|e| CarbonError::io("failed to spawn shell-exec accept thread", e))?;

        Ok(Self { socket_path, stopped, accept_thread: Mutex::new(Some(accept_thread)), reply_loop })
    }

    #[must_use]
    pub fn socket_path(&self) -> &Path { &self.socket_path }

    /// Stops the accept loop, joins it, and unlinks the socket.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
        if let Some(handle) = self.accept_thread.lock().expect("accept thread handle poisoned").take() {
            let _ = handle.join();
        }
        self.reply_loop.stop();
        let _ = std::fs::remove_file(&self.socket_path);
    }
}

impl Drop for ShellExecuteServer {
    fn drop(&mut self) { self.stop(); }
}

fn accept_loop(
    listener: UnixListener,
    stopped: Arc<AtomicBool>,
    connector: Arc<Connector>,
    event_loop: Arc<EventLoop>,
    root: PathBuf,
) {
    tracing::info!("shell-exec accept loop starting");
    while !stopped.load(Ordering::Acquire) {
        match listener.accept() {
            Ok((stream, _addr)) => {
                let connector = connector.clone();
                let event_loop = event_loop.clone();
                let root = root.clone();
                thread::spawn(move || handle_connection(stream, &connector, &event_loop, &root));
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => thread::sleep(ACCEPT_POLL_INTERVAL),
            Err(e) => {
                tracing::error!(error = %e, "shell-exec accept failed");
                thread::sleep(ACCEPT_POLL_INTERVAL);
            }
        }
    }
    tracing::info!("shell-exec accept loop stopped");
}

fn handle_connection(stream: UnixStream, connector: &Connector, event_loop: &Arc<EventLoop>, root: &Path) {
    if let Err(e) = stream.set_read_timeout(Some(CONNECTION_READ_TIMEOUT)) {
        tracing::warn!(error = %e, "failed to set read timeout on shell-exec connection");
    }
    let mut conn = carbon_net::Conn::Unix(stream);
    let bytes = match carbon_net::endpoint::read_capped(&mut conn, carbon_remote::vep::MAX_CONTAINER_LEN) {
        Ok(b) => b,
        Err(e) => {
            tracing::debug!(error = %e, "dropping shell-exec connection: read failed");
            return;
        }
    };

    let container = match Container::decode(&bytes) {
        Ok(c) => c,
        Err(e) => {
            tracing::warn!(kind = %e.kind, message = %e.message, "dropping malformed shell-exec container");
            return;
        }
    };
    let request = match RemoteEvent::from_container(&container) {
        Ok(ev) => ev,
        Err(e) => {
            tracing::warn!(kind = %e.kind, message = %e.message, "dropping unparseable shell-exec request");
            return;
        }
    };

    tracing::debug!(from = %request.reply_rid, "received a shell-exec request");

    let cmd_len = request.payload.len().min(CMD_MAX);
    let cmd = String::from_utf8_lossy(&request.payload[..cmd_len]).into_owned();
    let (result, ret_val, output) = execute_command(&cmd);

    if request.session_id == 0 {
        return;
    }

    let nparam: i64 = match &result {
        Ok(()) => 0,
        Err(e) => -e.kind.wire_code(),
    };
    let reply = RemoteEvent {
        event_type: EVENT_SHELL_EXECUTE_REPLY,
        pparam: ret_val as u64,
        nparam: nparam as u64,
        session_id: request.session_id,
        reply_rid: SHELL_EXECUTE_RID.to_string(),
        payload: output,
    };
    send_reply(connector, event_loop, root, &request.reply_rid, reply, &cmd);
}

fn send_reply(connector: &Connector, event_loop: &Arc<EventLoop>, root: &Path, dst_rid: &str, reply: RemoteEvent, cmd: &str) {
    let container = match reply.to_container() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(kind = %e.kind, message = %e.message, cmd, "failed to frame shell-exec reply");
            return;
        }
    };
    let wire = match container.encode() {
        Ok(w) => w,
        Err(e) => {
            tracing::error!(kind = %e.kind, message = %e.message, cmd, "failed to encode shell-exec reply");
            return;
        }
    };
    let dst_socket = root.join(dst_rid);
    if let Err(e) = connector.send(Endpoint::Unix(dst_socket), wire, event_loop.clone(), Target::Multicast, None) {
        tracing::error!(kind = %e.kind, message = %e.message, dst_rid, cmd, "failed to dispatch shell-exec reply");
    }
}

/// Forks, execs `cmd` (parsed via [`cmdline::parse`]), captures up to
/// [`OUTPUT_MAX`] bytes of its stdout, and maps its exit status to a
/// `(result, raw_exit_code, stdout)` triple per `doExecute`'s switch on
/// `WEXITSTATUS`. `result` is `Ok(())` only for a clean exit 0.
fn execute_command(cmd: &str) -> (CarbonResult<()>, i32, Vec<u8>) {
    let parsed = cmdline::parse(cmd);
    if parsed.args.is_empty() {
        return (Err(CarbonError::new(CarbonErrorKind::Invalid, "empty command line")), EINVAL, Vec::new());
    }

    let (read_fd, write_fd) = match pipe() {
        Ok(fds) => fds,
        Err(e) => {
            tracing::error!(error = %e, cmd, "failed to create shell-exec pipe");
            return (Err(CarbonError::new(CarbonErrorKind::NoMem, "pipe() failed")), -1, Vec::new());
        }
    };

    // SAFETY: the child only calls async-signal-safe functions (dup2,
    // execvpe, _exit) between fork and replacing or exiting the process.
    match unsafe { fork() } {
        Ok(ForkResult::Child) => {
            drop(read_fd);
            let _ = dup2(write_fd.as_raw_fd(), libc::STDOUT_FILENO);
            drop(write_fd);

            let Some(program) = parsed.args.first() else {
                nix::unistd::_exit(127);
            };
            let Ok(c_program) = CString::new(program.as_str()) else {
                nix::unistd::_exit(127);
            };
            let c_args: Vec<CString> = parsed.args.iter().filter_map(|a| CString::new(a.as_str()).ok()).collect();
            let c_env: Vec<CString> =
                parsed.env.iter().filter_map(|(k, v)| CString::new(format!("{k}={v}")).ok()).collect();

            let _ = execvpe(&c_program, &c_args, &c_env);
            nix::unistd::_exit(127);
        }
        Ok(ForkResult::Parent { child }) => {
            drop(write_fd);
            let output = read_child_output(read_fd);
            match waitpid(child, None) {
                Ok(WaitStatus::Exited(_, 0)) => (Ok(()), 0, output),
                Ok(WaitStatus::Exited(_, code)) => (
                    Err(CarbonError::new(exit_code_to_kind(code), format!("child exited with status {code}"))
                        .with_detail(code.into())),
                    code,
                    output,
                ),
                Ok(WaitStatus::Signaled(_, signal, _)) => (
                    Err(CarbonError::new(CarbonErrorKind::Io, format!("child killed by signal {signal}"))),
                    128,
                    output,
                ),
                Ok(_) => (Err(CarbonError::new(CarbonErrorKind::Invalid, "child left in an unexpected wait state")), -1, output),
                Err(e) => {
                    tracing::error!(error = %e, cmd, "waitpid failed after shell-exec");
                    (Err(CarbonError::new(CarbonErrorKind::Invalid, "waitpid failed")), -1, output)
                }
            }
        }
        Err(e) => {
            tracing::error!(error = %e, cmd, "fork failed for shell-exec");
            (Err(CarbonError::new(CarbonErrorKind::NoMem, "fork() failed")), -1, Vec::new())
        }
    }
}

fn read_child_output(read_fd: OwnedFd) -> Vec<u8> {
    let mut file = std::fs::File::from(read_fd);
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        match file.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => {
                let take = n.min(OUTPUT_MAX.saturating_sub(buf.len()));
                buf.extend_from_slice(&chunk[..take]);
                if buf.len() >= OUTPUT_MAX {
                    break;
                }
            }
            Err(_) => break,
        }
    }
    buf
}

/// Mirrors `doExecute`'s switch on `WEXITSTATUS`: 127 (not found) and 130
/// (signal-terminated via a shell wrapper) get dedicated kinds, everything
/// else narrows to `Invalid`.
fn exit_code_to_kind(code: i32) -> CarbonErrorKind {
    match code {
        127 => CarbonErrorKind::NotFound,
        130 => CarbonErrorKind::Io,
        _ => CarbonErrorKind::Invalid,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn executes_a_simple_command_and_captures_stdout() {
        let (result, code, output) = execute_command("/bin/echo hello");
        assert!(result.is_ok());
        assert_eq!(code, 0);
        assert_eq!(String::from_utf8_lossy(&output).trim(), "hello");
    }

    #[test]
    fn missing_binary_maps_to_not_found() {
        let (result, code, _output) = execute_command("/no/such/binary-xyz");
        assert_eq!(result.unwrap_err().kind, CarbonErrorKind::NotFound);
        assert_eq!(code, 127);
    }

    #[test]
    fn env_assignment_is_visible_to_the_child() {
        let (result, code, output) = execute_command("GREETING=hi /usr/bin/env");
        assert!(result.is_ok());
        assert_eq!(code, 0);
        assert!(String::from_utf8_lossy(&output).contains("GREETING=hi"));
    }

    #[test]
    fn empty_command_line_is_rejected_without_forking() {
        let (result, code, output) = execute_command("   ");
        assert_eq!(result.unwrap_err().kind, CarbonErrorKind::Invalid);
        assert_eq!(code, EINVAL);
        assert!(output.is_empty());
    }
}
