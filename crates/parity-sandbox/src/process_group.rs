use std::time::{Duration, Instant};

use tracing::debug;

/// Every process a guest starts shares one group with it, so teardown is a
/// group-wide operation rather than a kill of the direct child.
///
/// Implementations must be idempotent: signalling a group that has already
/// gone away is success.
pub trait ProcessGroup {
    fn terminate(&self) -> std::io::Result<()>;
    fn kill(&self) -> std::io::Result<()>;
    fn is_alive(&self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Escalation {
    ExitedAfterTerminate,
    Killed,
}

/// Sends the polite signal, gives the group `grace` to wind down, then sends
/// the forceful one. `has_exited` reports (and reaps) the group leader.
pub fn escalate<G, F>(group: &G, grace: Duration, mut has_exited: F) -> std::io::Result<Escalation>
where
    G: ProcessGroup + ?Sized,
    F: FnMut() -> std::io::Result<bool>,
{
    group.terminate()?;

    let deadline = Instant::now().checked_add(grace);
    loop {
        if has_exited()? && !group.is_alive() {
            debug!("process group exited after terminate");
            return Ok(Escalation::ExitedAfterTerminate);
        }
        if deadline.map_or(true, |d| Instant::now() >= d) {
            break;
        }
        std::thread::sleep(Duration::from_millis(5));
    }

    debug!(grace_ms = grace.as_millis() as u64, "grace elapsed; killing process group");
    group.kill()?;
    Ok(Escalation::Killed)
}

#[cfg(unix)]
#[derive(Debug, Clone, Copy)]
pub struct UnixProcessGroup {
    pgid: libc::pid_t,
}

#[cfg(unix)]
impl UnixProcessGroup {
    /// The guest calls `setsid` before exec, so its pid is also its group id.
    /// Ids that would address "every process" are refused.
    pub fn from_leader_pid(pid: u32) -> Option<Self> {
        let pgid = libc::pid_t::try_from(pid).ok()?;
        (pgid > 1).then_some(Self { pgid })
    }

    pub fn pgid(&self) -> i32 {
        self.pgid
    }

    fn signal(&self, sig: libc::c_int) -> std::io::Result<()> {
        let rc = unsafe { libc::kill(-self.pgid, sig) };
        if rc == 0 {
            return Ok(());
        }
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::ESRCH) {
            return Ok(());
        }
        Err(err)
    }
}

#[cfg(unix)]
impl ProcessGroup for UnixProcessGroup {
    fn terminate(&self) -> std::io::Result<()> {
        self.signal(libc::SIGTERM)
    }

    fn kill(&self) -> std::io::Result<()> {
        self.signal(libc::SIGKILL)
    }

    fn is_alive(&self) -> bool {
        let rc = unsafe { libc::kill(-self.pgid, 0) };
        if rc == 0 {
            return true;
        }
        std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
    }
}
