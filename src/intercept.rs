//! Syscall-entry interception
//!
//! Only entry stops are inspected: by the time an exit stop arrives an
//! `execve` has already replaced the address space the arguments lived in.

use crate::memory::{self, ForeignMemory, MemoryError};
use crate::syscalls::{self, Intercepted};
use crate::tracee::Tracee;
use nix::unistd::Pid;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Command line and environment read at an exec entry, waiting for the exec
/// event that makes them true.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecCapture {
    pub arguments: Option<Vec<String>>,
    pub environment: Option<Vec<String>>,
}

/// Exec captures keyed by the tid that entered the exec.
#[derive(Debug, Default)]
pub struct PendingExecs {
    captures: HashMap<Pid, ExecCapture>,
}

impl PendingExecs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a capture for `tid`, replacing one that was never consumed
    /// (an exec that failed).
    pub fn insert(&mut self, tid: Pid, capture: ExecCapture) {
        if self.captures.insert(tid, capture).is_some() {
            debug!(tid = tid.as_raw(), "replacing unconsumed exec capture");
        }
    }

    pub fn take(&mut self, tid: Pid) -> Option<ExecCapture> {
        self.captures.remove(&tid)
    }

    /// Take the capture for an exec reported by `tid`.
    ///
    /// When a non-leader thread execs, the kernel reports the event under the
    /// leader's tid and `former_tid` names the thread that made the call.
    pub fn take_for_exec(&mut self, tid: Pid, former_tid: Option<Pid>) -> Option<ExecCapture> {
        former_tid
            .and_then(|former| self.take(former))
            .or_else(|| self.take(tid))
    }

    pub fn discard(&mut self, tid: Pid) {
        self.captures.remove(&tid);
    }

    pub fn len(&self) -> usize {
        self.captures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.captures.is_empty()
    }
}

impl Tracee {
    /// Install an exec capture. Re-exec overwrites, never merges.
    pub fn apply_exec(&mut self, capture: ExecCapture) {
        self.arguments = capture.arguments;
        self.environment = capture.environment;
    }
}

/// Act on a syscall-entry stop of the live tracee `tid`.
///
/// Returns the syscall when it was one of the intercepted ones. Memory read
/// failures mark the tracee degraded and leave everything else as it was.
pub fn handle_syscall_entry<M: ForeignMemory + ?Sized>(
    root: &mut Tracee,
    pending: &mut PendingExecs,
    memory: &M,
    tid: Pid,
    nr: i64,
    args: &[u64; 6],
) -> Option<Intercepted> {
    let syscall = Intercepted::from_nr(nr)?;

    let outcome = match syscall {
        Intercepted::Execve | Intercepted::Execveat => {
            let (argv, envp) = syscall.exec_vectors()?;
            capture_exec(memory, args[argv], args[envp]).map(|capture| {
                debug!(
                    tid = tid.as_raw(),
                    syscall = syscall.name(),
                    arguments = ?capture.arguments,
                    "captured exec"
                );
                pending.insert(tid, capture);
            })
        }
        Intercepted::Chdir => memory::read_string(memory, args[0]).map(|dir| {
            if let Some(dir) = dir {
                let dir = String::from_utf8_lossy(&dir);
                root.change_directory(tid, &dir);
            }
        }),
        Intercepted::Clone => {
            set_next_child_is_thread(root, tid, args[0]);
            Ok(())
        }
        Intercepted::Clone3 => memory.peek_word(args[0]).map(|flags| {
            set_next_child_is_thread(root, tid, flags as u64);
        }),
    };

    if let Err(err) = outcome {
        warn!(tid = tid.as_raw(), syscall = syscall.name(), %err, "cannot read tracee memory");
        if syscall.exec_vectors().is_some() {
            pending.discard(tid);
        }
        if let Some(tracee) = root.find_live_mut(tid) {
            tracee.degraded = true;
        }
    }

    Some(syscall)
}

fn capture_exec<M: ForeignMemory + ?Sized>(
    memory: &M,
    argv: u64,
    envp: u64,
) -> Result<ExecCapture, MemoryError> {
    Ok(ExecCapture {
        arguments: memory::read_string_array(memory, argv)?.map(memory::to_lossy_strings),
        environment: memory::read_string_array(memory, envp)?.map(memory::to_lossy_strings),
    })
}

fn set_next_child_is_thread(root: &mut Tracee, tid: Pid, flags: u64) {
    if let Some(tracee) = root.find_live_mut(tid) {
        tracee.next_child_is_thread = syscalls::creates_thread(flags);
    }
}
