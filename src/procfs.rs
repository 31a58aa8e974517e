//! Reading an already-running process out of `/proc`
//!
//! Attached processes exec'd long before tracing started, so their command
//! line, environment and directory come from procfs instead of an `execve`.

use nix::unistd::Pid;
use std::fs;
use std::io;
use std::path::Path;

/// Default procfs mount point.
pub const PROC_ROOT: &str = "/proc";

/// What procfs says about a process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInfo {
    pub working_directory: String,
    pub arguments: Vec<String>,
    pub environment: Vec<String>,
}

/// Read `cwd`, `cmdline` and `environ` of `pid` under `proc_root`.
///
/// Any of the three being unreadable is an error.
pub fn read_process_info(proc_root: &Path, pid: Pid) -> io::Result<ProcessInfo> {
    let dir = proc_root.join(pid.as_raw().to_string());

    let cwd = fs::read_link(dir.join("cwd"))?;
    let cmdline = fs::read(dir.join("cmdline"))?;
    let environ = fs::read(dir.join("environ"))?;

    Ok(ProcessInfo {
        working_directory: cwd.to_string_lossy().into_owned(),
        arguments: split_nul_records(&cmdline),
        environment: split_nul_records(&environ),
    })
}

/// Split NUL-terminated records. A final record without its NUL still counts.
pub fn split_nul_records(data: &[u8]) -> Vec<String> {
    let data = data.strip_suffix(&[0]).unwrap_or(data);
    if data.is_empty() {
        return Vec::new();
    }

    data.split(|&byte| byte == 0)
        .map(|record| String::from_utf8_lossy(record).into_owned())
        .collect()
}
