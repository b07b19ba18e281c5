//! Process termination primitives.

use bench_common::{ProcessError, ProcessResult};

/// Ask a process to terminate gracefully (SIGTERM on Unix).
///
/// Fails with `StopFailed` if the signal cannot be delivered; a process that
/// has already gone away is reported as success.
pub fn terminate_gracefully(pid: u32) -> ProcessResult<()> {
    #[cfg(unix)]
    {
        send_signal(pid, nix::sys::signal::Signal::SIGTERM)
    }

    #[cfg(not(unix))]
    {
        Err(ProcessError::stop_failed(
            pid.to_string(),
            "graceful termination is not supported on this platform",
        ))
    }
}

#[cfg(unix)]
fn send_signal(pid: u32, signal: nix::sys::signal::Signal) -> ProcessResult<()> {
    use nix::errno::Errno;
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    match kill(Pid::from_raw(pid as i32), signal) {
        Ok(()) => Ok(()),
        Err(Errno::ESRCH) => Ok(()),
        Err(e) => Err(ProcessError::stop_failed(pid.to_string(), e.to_string())),
    }
}
