//! Kernel resource limits applied to the guest between `fork` and `exec`.

/// Address-space limits are only honoured reliably by the Linux kernel; on
/// macOS `RLIMIT_AS` is accepted but ignored, so it is not applied there.
pub const MEMORY_LIMIT_SUPPORTED: bool = cfg!(any(target_os = "linux", target_os = "android"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChildLimits {
    pub cpu_seconds: u64,
    pub memory_bytes: u64,
}

impl ChildLimits {
    pub fn new(timeout_seconds: u64, memory_limit_mb: u64) -> Self {
        Self {
            cpu_seconds: timeout_seconds,
            memory_bytes: memory_limit_mb.saturating_mul(1024 * 1024),
        }
    }
}

/// Installs the child-side setup on `cmd`: a new session (so the whole
/// process tree can be signalled as one group) followed by the rlimits.
/// Any failure here aborts the spawn; the guest never runs unconfined.
#[cfg(unix)]
pub fn install_pre_exec(cmd: &mut std::process::Command, limits: ChildLimits) {
    use std::os::unix::process::CommandExt as _;
    unsafe {
        cmd.pre_exec(move || {
            detach_session()?;
            apply_rlimits(&limits)
        });
    }
}

#[cfg(unix)]
fn detach_session() -> std::io::Result<()> {
    unsafe {
        if libc::setsid() == -1 && libc::setpgid(0, 0) == -1 {
            return Err(std::io::Error::last_os_error());
        }
    }
    Ok(())
}

#[cfg(unix)]
fn apply_rlimits(limits: &ChildLimits) -> std::io::Result<()> {
    // The wall clock is the primary bound. The CPU ceiling sits just above it
    // so a spinning guest is still reported as timed out rather than killed
    // by SIGXCPU first.
    let cpu_soft = limits.cpu_seconds.saturating_add(1);
    let cpu_hard = limits.cpu_seconds.saturating_add(2);

    unsafe {
        let cpu = libc::rlimit {
            rlim_cur: cpu_soft as libc::rlim_t,
            rlim_max: cpu_hard as libc::rlim_t,
        };
        if libc::setrlimit(libc::RLIMIT_CPU, &cpu) != 0 {
            return Err(std::io::Error::last_os_error());
        }

        #[cfg(any(target_os = "linux", target_os = "android"))]
        {
            let mem = libc::rlimit {
                rlim_cur: limits.memory_bytes as libc::rlim_t,
                rlim_max: limits.memory_bytes as libc::rlim_t,
            };
            if libc::setrlimit(libc::RLIMIT_AS, &mem) != 0 {
                return Err(std::io::Error::last_os_error());
            }
        }

        let core = libc::rlimit {
            rlim_cur: 0,
            rlim_max: 0,
        };
        if libc::setrlimit(libc::RLIMIT_CORE, &core) != 0 {
            return Err(std::io::Error::last_os_error());
        }
    }
    Ok(())
}
