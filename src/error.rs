//! Error types for the tracing engine

use nix::unistd::Pid;
use std::io;

pub type Result<T> = std::result::Result<T, TraceError>;

/// Failures the tracer can run into, from setup through the dispatch loop.
#[derive(thiserror::Error, Debug)]
pub enum TraceError {
    #[error("Command array is empty")]
    EmptyCommand,

    #[error("Failed to fork process")]
    Fork(#[source] nix::Error),

    #[error("Failed to read current directory")]
    CurrentDir(#[source] io::Error),

    #[error("Failed to attach to process {pid}")]
    Attach {
        pid: Pid,
        #[source]
        source: nix::Error,
    },

    #[error("Failed to get info about root tracee {pid}")]
    Introspect {
        pid: Pid,
        #[source]
        source: io::Error,
    },

    #[error("ptrace(PTRACE_SETOPTIONS, {pid}) failed")]
    SetOptions {
        pid: Pid,
        #[source]
        source: nix::Error,
    },

    #[error("ptrace(PTRACE_SYSCALL, {pid}) failed")]
    Resume {
        pid: Pid,
        #[source]
        source: nix::Error,
    },

    #[error("ptrace(PTRACE_GETEVENTMSG, {pid}, ...) failed")]
    EventMessage {
        pid: Pid,
        #[source]
        source: nix::Error,
    },

    #[error("waitpid failed")]
    Wait(#[source] nix::Error),

    #[error("Failed to install SIGINT handler")]
    SignalHandler(#[source] nix::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::errno::Errno;

    #[test]
    fn test_resume_error_names_operation_and_pid() {
        let err = TraceError::Resume {
            pid: Pid::from_raw(42),
            source: Errno::ESRCH,
        };
        assert_eq!(err.to_string(), "ptrace(PTRACE_SYSCALL, 42) failed");
    }

    #[test]
    fn test_attach_error_keeps_source() {
        let err = TraceError::Attach {
            pid: Pid::from_raw(7),
            source: Errno::EPERM,
        };
        let source = std::error::Error::source(&err).unwrap();
        assert!(source.to_string().contains("not permitted"));
    }
}
