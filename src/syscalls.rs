//! Syscalls the tracer cares about
//!
//! Numbers come from `libc` so the table follows the target architecture.

/// A syscall that changes what the tree should record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intercepted {
    /// `execve(path, argv, envp)`
    Execve,
    /// `execveat(dirfd, path, argv, envp, flags)`
    Execveat,
    /// `chdir(path)`
    Chdir,
    /// `clone(flags, ...)` with the flags passed directly
    Clone,
    /// `clone3(struct clone_args *, size)` with the flags as the first field
    Clone3,
}

impl Intercepted {
    /// Classify a syscall number, returning `None` for everything else.
    pub fn from_nr(nr: i64) -> Option<Self> {
        match nr {
            n if n == libc::SYS_execve as i64 => Some(Self::Execve),
            n if n == libc::SYS_execveat as i64 => Some(Self::Execveat),
            n if n == libc::SYS_chdir as i64 => Some(Self::Chdir),
            n if n == libc::SYS_clone as i64 => Some(Self::Clone),
            n if n == libc::SYS_clone3 as i64 => Some(Self::Clone3),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Execve => "execve",
            Self::Execveat => "execveat",
            Self::Chdir => "chdir",
            Self::Clone => "clone",
            Self::Clone3 => "clone3",
        }
    }

    /// Argument positions of the `argv` and `envp` pointers for the exec family.
    pub fn exec_vectors(self) -> Option<(usize, usize)> {
        match self {
            Self::Execve => Some((1, 2)),
            Self::Execveat => Some((2, 3)),
            _ => None,
        }
    }
}

/// Whether clone flags request a thread in the caller's thread group.
pub fn creates_thread(flags: u64) -> bool {
    flags & libc::CLONE_THREAD as u64 != 0
}
