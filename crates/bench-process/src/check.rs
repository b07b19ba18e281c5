//! Process existence checking.

use bench_common::{ProcessError, ProcessResult};

/// Check if a process with the given PID exists.
///
/// On Unix this uses `kill(pid, 0)`, which sends no signal but reports whether
/// the process exists. A zombie still counts as existing until it is reaped.
///
/// # Returns
///
/// * `Ok(true)` - Process exists
/// * `Ok(false)` - Process does not exist
/// * `Err(_)` - The check itself failed
pub fn process_exists(pid: u32) -> ProcessResult<bool> {
    #[cfg(unix)]
    {
        use nix::errno::Errno;
        use nix::sys::signal::kill;
        use nix::unistd::Pid;

        match kill(Pid::from_raw(pid as i32), None) {
            Ok(_) => Ok(true),
            Err(Errno::ESRCH) => Ok(false),
            // Exists, but owned by someone else
            Err(Errno::EPERM) => Ok(true),
            Err(e) => Err(ProcessError::configuration(
                pid.to_string(),
                format!("Failed to check process: {}", e),
            )),
        }
    }

    #[cfg(not(unix))]
    {
        Err(ProcessError::configuration(
            pid.to_string(),
            "process existence check is not supported on this platform",
        ))
    }
}
