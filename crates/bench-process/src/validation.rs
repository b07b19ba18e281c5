//! Pre-flight validation of paths handed to the process primitives.
//!
//! These checks run before anything is spawned so that a missing binary or
//! directory aborts the whole run as a configuration error.

use bench_common::{ProcessError, ProcessResult};
use std::path::{Path, PathBuf};

/// Resolve an executable to a concrete path.
///
/// A name containing a path separator is taken as a path and must exist.
/// A bare name is searched for in `PATH`.
pub fn resolve_executable(program: &Path) -> Option<PathBuf> {
    if program.as_os_str().is_empty() {
        return None;
    }

    if program.components().count() > 1 || program.is_absolute() {
        return program.is_file().then(|| program.to_path_buf());
    }

    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var)
        .map(|dir| dir.join(program))
        .find(|candidate| candidate.is_file())
}

/// Validate that an executable exists and return its resolved path.
pub fn validate_executable(id: &str, program: &Path) -> ProcessResult<PathBuf> {
    if program.as_os_str().is_empty() {
        return Err(ProcessError::configuration(id, "Executable path cannot be empty"));
    }

    resolve_executable(program).ok_or_else(|| {
        ProcessError::configuration(
            id,
            format!("Executable not found: {}", program.display()),
        )
    })
}

/// Validate that a directory exists.
pub fn validate_directory(id: &str, what: &str, dir: &Path) -> ProcessResult<()> {
    if dir.is_dir() {
        Ok(())
    } else {
        Err(ProcessError::configuration(
            id,
            format!("{} is not a directory: {}", what, dir.display()),
        ))
    }
}

/// Validate that a regular file exists.
pub fn validate_file(id: &str, what: &str, file: &Path) -> ProcessResult<()> {
    if file.is_file() {
        Ok(())
    } else {
        Err(ProcessError::configuration(
            id,
            format!("{} not found: {}", what, file.display()),
        ))
    }
}
