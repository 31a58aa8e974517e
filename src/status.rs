//! Classification of wait statuses and syscall stops
//!
//! A stopped tracee reports everything through the same status word: plain
//! signal stops, syscall stops (`SIGTRAP | 0x80` with `PTRACE_O_TRACESYSGOOD`)
//! and ptrace events (`SIGTRAP` with the event number in bits 16..24). `nix`
//! splits the word into a `WaitStatus`; this module maps that onto the handful
//! of cases the dispatch loop acts on.

use nix::errno::Errno;
use nix::sys::signal::Signal;
use nix::sys::wait::WaitStatus;
use nix::unistd::Pid;
use std::mem::{self, MaybeUninit};

/// How a new tracee came to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NewTraceeKind {
    Fork,
    Vfork,
    Clone,
}

/// What a single wait status means for the tracer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceEvent {
    /// The tracee exited normally.
    Exited { code: i32 },
    /// The tracee was killed by a signal.
    Killed { signal: Signal },
    /// `PTRACE_EVENT_EXIT`: the tracee is about to exit and is still stopped.
    ExitEvent,
    /// `PTRACE_EVENT_FORK`, `_VFORK` or `_CLONE`.
    NewTracee(NewTraceeKind),
    /// `PTRACE_EVENT_EXEC`: an exec completed.
    Exec,
    /// Syscall-entry or syscall-exit stop.
    SyscallStop,
    /// Signal-delivery stop (or group stop).
    SignalStop { signal: Signal },
    /// Any other ptrace event stop (vfork-done, seccomp, ...).
    OtherEvent { signal: Signal, event: i32 },
}

impl TraceEvent {
    /// Whether the tracee is gone and must not be resumed.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Exited { .. } | Self::Killed { .. })
    }

    /// Whether the tracee is exiting, whether or not it still has to be resumed.
    pub fn is_exit(self) -> bool {
        self.is_terminal() || self == Self::ExitEvent
    }
}

/// Split a wait status into the reporting tid and its event.
///
/// Returns `None` for statuses that carry no tracee event (`StillAlive`,
/// `Continued`).
pub fn classify(status: WaitStatus) -> Option<(Pid, TraceEvent)> {
    let classified = match status {
        WaitStatus::Exited(pid, code) => (pid, TraceEvent::Exited { code }),
        WaitStatus::Signaled(pid, signal, _) => (pid, TraceEvent::Killed { signal }),
        WaitStatus::Stopped(pid, signal) => (pid, TraceEvent::SignalStop { signal }),
        WaitStatus::PtraceSyscall(pid) => (pid, TraceEvent::SyscallStop),
        WaitStatus::PtraceEvent(pid, signal, event) => (pid, classify_event(signal, event)),
        WaitStatus::Continued(_) | WaitStatus::StillAlive => return None,
    };
    Some(classified)
}

fn classify_event(signal: Signal, event: i32) -> TraceEvent {
    if signal != Signal::SIGTRAP {
        return TraceEvent::OtherEvent { signal, event };
    }

    match event {
        libc::PTRACE_EVENT_FORK => TraceEvent::NewTracee(NewTraceeKind::Fork),
        libc::PTRACE_EVENT_VFORK => TraceEvent::NewTracee(NewTraceeKind::Vfork),
        libc::PTRACE_EVENT_CLONE => TraceEvent::NewTracee(NewTraceeKind::Clone),
        libc::PTRACE_EVENT_EXEC => TraceEvent::Exec,
        libc::PTRACE_EVENT_EXIT => TraceEvent::ExitEvent,
        _ => TraceEvent::OtherEvent { signal, event },
    }
}

/// A syscall stop as reported by `PTRACE_GET_SYSCALL_INFO`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyscallStop {
    Entry { nr: i64, args: [u64; 6] },
    Exit,
    Other,
}

/// `PTRACE_GET_SYSCALL_INFO` for a tracee in a syscall stop.
///
/// The request takes the buffer size in `addr` and copies at most that many
/// bytes, so it is issued directly instead of through `nix`, which passes 0.
pub fn syscall_info(pid: Pid) -> nix::Result<libc::ptrace_syscall_info> {
    let mut info = MaybeUninit::<libc::ptrace_syscall_info>::zeroed();

    // SAFETY: the kernel writes at most `size_of::<ptrace_syscall_info>()`
    // bytes into `info`, which is that large.
    let res = unsafe {
        libc::ptrace(
            libc::PTRACE_GET_SYSCALL_INFO,
            pid.as_raw(),
            mem::size_of::<libc::ptrace_syscall_info>(),
            info.as_mut_ptr(),
        )
    };
    Errno::result(res)?;

    // SAFETY: all-zero is a valid `ptrace_syscall_info`, and the kernel only
    // overwrote part of it.
    Ok(unsafe { info.assume_init() })
}

impl From<&libc::ptrace_syscall_info> for SyscallStop {
    fn from(info: &libc::ptrace_syscall_info) -> Self {
        match info.op {
            libc::PTRACE_SYSCALL_INFO_ENTRY => {
                // SAFETY: the kernel fills the `entry` member for entry stops.
                let entry = unsafe { info.u.entry };
                SyscallStop::Entry {
                    nr: entry.nr as i64,
                    args: entry.args,
                }
            }
            libc::PTRACE_SYSCALL_INFO_EXIT => SyscallStop::Exit,
            _ => SyscallStop::Other,
        }
    }
}
