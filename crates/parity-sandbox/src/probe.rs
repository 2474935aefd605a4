use std::path::Path;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::env::sanitized_env;

pub const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Runs `interpreter --version` and reports whether it exited successfully
/// within [`PROBE_TIMEOUT`].
pub fn is_interpreter_available(interpreter: &Path) -> bool {
    is_interpreter_available_within(interpreter, PROBE_TIMEOUT)
}

pub fn is_interpreter_available_within(interpreter: &Path, timeout: Duration) -> bool {
    let mut cmd = Command::new(interpreter);
    cmd.arg("--version");
    cmd.env_clear();
    cmd.envs(sanitized_env(None));
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::null());
    cmd.stderr(Stdio::null());

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt as _;
        unsafe {
            cmd.pre_exec(|| {
                if libc::setsid() == -1 && libc::setpgid(0, 0) == -1 {
                    return Err(std::io::Error::last_os_error());
                }
                Ok(())
            });
        }
    }

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(err) => {
            debug!(interpreter = %interpreter.display(), %err, "interpreter probe failed to spawn");
            return false;
        }
    };

    let deadline = Instant::now().checked_add(timeout);
    loop {
        match child.try_wait() {
            Ok(Some(status)) => {
                debug!(interpreter = %interpreter.display(), %status, "interpreter probe finished");
                return status.success();
            }
            Ok(None) => {}
            Err(err) => {
                debug!(interpreter = %interpreter.display(), %err, "interpreter probe wait failed");
                break;
            }
        }
        if deadline.map_or(true, |d| Instant::now() >= d) {
            debug!(interpreter = %interpreter.display(), "interpreter probe timed out");
            break;
        }
        std::thread::sleep(Duration::from_millis(5));
    }

    #[cfg(unix)]
    if let Some(group) = crate::process_group::UnixProcessGroup::from_leader_pid(child.id()) {
        use crate::process_group::ProcessGroup as _;
        let _ = group.kill();
    }
    let _ = child.kill();
    let _ = child.wait();
    false
}
