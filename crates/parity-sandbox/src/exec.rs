use std::io::Write as _;
use std::os::unix::process::ExitStatusExt as _;
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::capture::{decode_output, StreamCapture};
use crate::env::sanitized_env;
use crate::error::SandboxError;
use crate::limits::{install_pre_exec, ChildLimits, MEMORY_LIMIT_SUPPORTED};
use crate::process_group::{escalate, Escalation, ProcessGroup, UnixProcessGroup};
use crate::workspace::ensure_safe_rel_path;
use crate::{round_ms, ExecutionRequest, ExecutionResult};

const POLL_INTERVAL: Duration = Duration::from_millis(5);

// Lower bound on how long output readers are given to drain after the guest
// is gone, independent of a very short kill grace.
const MIN_DRAIN: Duration = Duration::from_millis(500);

pub(crate) fn run_request(request: ExecutionRequest) -> Result<ExecutionResult, SandboxError> {
    let ExecutionRequest {
        entry_file,
        interpreter,
        workspace,
        stdin_input,
        limits,
        module_path_var,
    } = request;

    if ensure_safe_rel_path(&entry_file).is_err() {
        return Err(SandboxError::UnsafePath { path: entry_file });
    }

    let env = sanitized_env(
        module_path_var
            .as_deref()
            .map(|var| (var, workspace.path())),
    );

    let mut cmd = Command::new(&interpreter);
    cmd.arg(&entry_file);
    cmd.current_dir(workspace.path());
    cmd.env_clear();
    cmd.envs(&env);
    cmd.stdin(if stdin_input.is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    });
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());
    install_pre_exec(
        &mut cmd,
        ChildLimits::new(limits.timeout_seconds, limits.memory_limit_mb),
    );

    let start = Instant::now();
    let mut child = cmd
        .spawn()
        .map_err(|err| SandboxError::spawn(&interpreter, err))?;
    let group = UnixProcessGroup::from_leader_pid(child.id());
    debug!(
        pid = child.id(),
        interpreter = %interpreter.display(),
        entry = %entry_file.display(),
        dir = %workspace.path().display(),
        "spawned guest"
    );

    let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
        abort(&mut child, group);
        return Err(SandboxError::io(
            "take guest output pipes",
            std::io::Error::from(std::io::ErrorKind::BrokenPipe),
        ));
    };

    // The writer is detached: a guest that never reads stdin must not be able
    // to stall the run on a full pipe.
    if let (Some(input), Some(mut stdin)) = (stdin_input, child.stdin.take()) {
        std::thread::spawn(move || {
            if let Err(err) = stdin.write_all(input.as_bytes()) {
                debug!(%err, "guest closed stdin early");
            }
        });
    }

    let stdout_cap = StreamCapture::spawn("stdout", stdout, limits.max_output_bytes);
    let stderr_cap = StreamCapture::spawn("stderr", stderr, limits.max_output_bytes);

    let deadline = start.checked_add(Duration::from_secs(limits.timeout_seconds));
    let (status, timed_out) = loop {
        match child.try_wait() {
            Ok(Some(status)) => break (status, false),
            Ok(None) => {}
            Err(err) => {
                abort(&mut child, group);
                return Err(SandboxError::io("wait for guest", err));
            }
        }

        if deadline.is_some_and(|d| Instant::now() >= d) {
            warn!(
                pid = child.id(),
                timeout_seconds = limits.timeout_seconds,
                "guest timed out; terminating process group"
            );
            let escalation = match group {
                Some(group) => escalate(&group, limits.kill_grace, || {
                    child.try_wait().map(|s| s.is_some())
                }),
                None => child.kill().map(|()| Escalation::Killed),
            };
            match escalation {
                Ok(Escalation::Killed) => warn!(pid = child.id(), "escalated to SIGKILL"),
                Ok(Escalation::ExitedAfterTerminate) => {}
                Err(err) => {
                    abort(&mut child, group);
                    return Err(SandboxError::io("terminate guest process group", err));
                }
            }
            match child.wait() {
                Ok(status) => break (status, true),
                Err(err) => {
                    abort(&mut child, group);
                    return Err(SandboxError::io("reap guest after timeout", err));
                }
            }
        }

        std::thread::sleep(POLL_INTERVAL);
    };
    let elapsed = start.elapsed();

    // Descendants that outlived the leader are still in its group.
    if let Some(group) = group {
        if let Err(err) = group.kill() {
            warn!(pgid = group.pgid(), %err, "sweep guest process group");
        }
    }

    let drain = limits.kill_grace.max(MIN_DRAIN);
    let (stdout_bytes, stdout_truncated) = stdout_cap.finish(drain);
    let (stderr_bytes, stderr_truncated) = stderr_cap.finish(drain);

    let exit_signal = status.signal();
    let exit_code = if timed_out {
        None
    } else {
        status.code().or(exit_signal.map(|s| 128 + s))
    };
    debug!(
        ?exit_code,
        ?exit_signal,
        timed_out,
        elapsed_ms = elapsed.as_millis() as u64,
        "guest finished"
    );

    drop(workspace);

    Ok(ExecutionResult {
        exit_code,
        exit_signal,
        stdout: decode_output(&stdout_bytes, stdout_truncated),
        stderr: decode_output(&stderr_bytes, stderr_truncated),
        truncated: stdout_truncated || stderr_truncated,
        timed_out,
        execution_time_ms: round_ms(elapsed),
        memory_limit_enforced: MEMORY_LIMIT_SUPPORTED,
        fault: None,
    })
}

fn abort(child: &mut Child, group: Option<UnixProcessGroup>) {
    if let Some(group) = group {
        let _ = group.kill();
    }
    let _ = child.kill();
    let _ = child.wait();
}
