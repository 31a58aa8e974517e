//! Process tree tracing using ptrace
//!
//! The root tracee is either spawned (fork, `PTRACE_TRACEME`, exec) or
//! attached to. From then on a single loop waits for any tracee, updates the
//! tree and resumes the tracee until the next syscall stop.

use crate::error::{Result, TraceError};
use crate::intercept::{self, PendingExecs};
use crate::memory::TraceeMemory;
use crate::procfs;
use crate::status::{self, SyscallStop, TraceEvent};
use crate::tracee::Tracee;
use nix::errno::Errno;
use nix::sys::ptrace::{self, Options};
use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::{fork, ForkResult, Pid};
use std::env;
use std::io;
use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, trace, warn};

/// Options applied to every tracee on its first stop.
pub const OPTIONS: Options = Options::PTRACE_O_TRACEEXEC
    .union(Options::PTRACE_O_TRACEFORK)
    .union(Options::PTRACE_O_TRACEVFORK)
    .union(Options::PTRACE_O_TRACECLONE)
    .union(Options::PTRACE_O_TRACESYSGOOD);

static INTERRUPTED: AtomicBool = AtomicBool::new(false);

extern "C" fn on_sigint(_: libc::c_int) {
    INTERRUPTED.store(true, Ordering::SeqCst);
}

/// Install the `SIGINT` handler that stops the trace loop.
///
/// `SA_RESTART` is left out so a blocked `waitpid` returns `EINTR`.
pub fn install_interrupt_handler() -> Result<()> {
    let action = SigAction::new(
        SigHandler::Handler(on_sigint),
        SaFlags::empty(),
        SigSet::empty(),
    );
    // SAFETY: the handler only stores to an atomic.
    unsafe { sigaction(Signal::SIGINT, &action) }.map_err(TraceError::SignalHandler)?;
    Ok(())
}

pub fn interrupted() -> bool {
    INTERRUPTED.load(Ordering::SeqCst)
}

/// Where the spawned command's output goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChildOutput {
    #[default]
    Inherit,
    /// stdout and stderr to `/dev/null`.
    Silent,
    /// stdout merged into stderr.
    Redirect,
}

/// Fork and exec `command` as a tracee.
///
/// The returned root already knows its command line, environment and
/// directory, since its own exec happens before tracing options are set.
pub fn spawn_root(command: &[String], output: ChildOutput) -> Result<Tracee> {
    let (program, args) = command.split_first().ok_or(TraceError::EmptyCommand)?;
    let working_directory = env::current_dir().map_err(TraceError::CurrentDir)?;

    let mut cmd = Command::new(program);
    cmd.args(args);
    match output {
        ChildOutput::Inherit => {}
        ChildOutput::Silent => {
            cmd.stdout(Stdio::null()).stderr(Stdio::null());
        }
        ChildOutput::Redirect => {
            cmd.stdout(Stdio::from(io::stderr()));
        }
    }

    // Fork: parent will trace, child will exec
    match unsafe { fork() }.map_err(TraceError::Fork)? {
        ForkResult::Parent { child } => {
            info!(pid = child.as_raw(), %program, "spawned root tracee");

            let mut root = Tracee::new(child);
            root.arguments = Some(command.to_vec());
            root.environment = Some(
                env::vars_os()
                    .map(|(key, value)| {
                        format!("{}={}", key.to_string_lossy(), value.to_string_lossy())
                    })
                    .collect(),
            );
            root.working_directory = Some(working_directory.to_string_lossy().into_owned());
            Ok(root)
        }
        ForkResult::Child => {
            if let Err(err) = ptrace::traceme() {
                eprintln!("{}: ptrace(PTRACE_TRACEME) failed: {}", env!("CARGO_PKG_NAME"), err);
                std::process::exit(1);
            }

            let err = cmd.exec();

            // If we get here, exec failed
            eprintln!("{}: Failed to exec {}: {}", env!("CARGO_PKG_NAME"), program, err);
            std::process::exit(1);
        }
    }
}

/// Attach to the running process `pid` and read its state from procfs.
pub fn attach_root(pid: Pid, proc_root: &Path) -> Result<Tracee> {
    ptrace::attach(pid).map_err(|source| TraceError::Attach { pid, source })?;
    info!(pid = pid.as_raw(), "attached to root tracee");

    let process = procfs::read_process_info(proc_root, pid)
        .map_err(|source| TraceError::Introspect { pid, source })?;

    let mut root = Tracee::new(pid);
    root.working_directory = Some(process.working_directory);
    root.arguments = Some(process.arguments);
    root.environment = Some(process.environment);
    Ok(root)
}

/// Why the trace loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    RootExited,
    Interrupted,
    /// `waitpid` reported no children left.
    NoTracees,
}

/// Owns the process tree and the state that only lives between two stops.
#[derive(Debug)]
pub struct Tracer {
    root: Tracee,
    pending: PendingExecs,
}

impl Tracer {
    pub fn new(root: Tracee) -> Self {
        Self {
            root,
            pending: PendingExecs::new(),
        }
    }

    pub fn root(&self) -> &Tracee {
        &self.root
    }

    /// Wait for and dispatch tracee events until the root exits, the user
    /// interrupts, or nothing is left to wait for.
    pub fn run(&mut self) -> Result<Outcome> {
        loop {
            if interrupted() {
                info!("interrupted");
                return Ok(Outcome::Interrupted);
            }

            let status = match waitpid(None, Some(WaitPidFlag::__WALL)) {
                Ok(status) => status,
                Err(Errno::EINTR) => continue,
                Err(Errno::ECHILD) => return Ok(Outcome::NoTracees),
                Err(err) => return Err(TraceError::Wait(err)),
            };

            if let Some(outcome) = self.dispatch(status)? {
                return Ok(outcome);
            }
        }
    }

    /// Detach from every tracee and hand back the finished tree.
    pub fn finish(self) -> Tracee {
        if !self.pending.is_empty() {
            debug!(pending = self.pending.len(), "exec captures never consumed");
        }
        debug!(tracees = self.root.tracee_count(), "detaching");
        self.root.detach_all();
        self.root
    }

    fn dispatch(&mut self, status: WaitStatus) -> Result<Option<Outcome>> {
        let Some((tid, event)) = status::classify(status) else {
            return Ok(None);
        };
        trace!(tid = tid.as_raw(), ?event, "wait status");

        let is_root = tid == self.root.tid;
        let Some(tracee) = self.root.find_live_mut(tid) else {
            // Nothing is left to resume for a terminal status.
            if !event.is_terminal() {
                debug!(tid = tid.as_raw(), "resuming unknown tid");
                resume(tid, None)?;
            }
            return Ok(None);
        };

        if event.is_exit() {
            tracee.exited = true;
            self.pending.discard(tid);
            debug!(tid = tid.as_raw(), ?event, "tracee exited");

            if is_root {
                return Ok(Some(Outcome::RootExited));
            }
            if !event.is_terminal() {
                resume(tid, None)?;
            }
            return Ok(None);
        }

        let first_stop = note_stop(tracee, is_root)?;
        let configured = tracee.ptrace_configured;

        let mut signal = None;
        match event {
            TraceEvent::NewTracee(kind) => {
                let message = ptrace::getevent(tid)
                    .map_err(|source| TraceError::EventMessage { pid: tid, source })?;
                let child = Pid::from_raw(message as i32);
                debug!(tid = tid.as_raw(), child = child.as_raw(), ?kind, "new tracee");
                tracee.add_child(Tracee::new(child));
            }
            TraceEvent::SyscallStop if configured => self.syscall_stop(tid),
            TraceEvent::Exec => self.exec_event(tid),
            TraceEvent::SignalStop { signal: delivered } => {
                signal = resume_signal(delivered, first_stop, is_group_stop(tid, delivered));
                debug!(tid = tid.as_raw(), ?delivered, forwarded = ?signal, "signal stop");
            }
            _ => {}
        }

        resume(tid, signal)?;
        Ok(None)
    }

    fn syscall_stop(&mut self, tid: Pid) {
        let info = match status::syscall_info(tid) {
            Ok(info) => info,
            Err(err) => {
                warn!(tid = tid.as_raw(), %err, "ptrace(PTRACE_GET_SYSCALL_INFO) failed");
                return;
            }
        };

        if let SyscallStop::Entry { nr, args } = SyscallStop::from(&info) {
            let memory = TraceeMemory::new(tid);
            intercept::handle_syscall_entry(
                &mut self.root,
                &mut self.pending,
                &memory,
                tid,
                nr,
                &args,
            );
        }
    }

    fn exec_event(&mut self, tid: Pid) {
        // The event message holds the tid that called exec, which differs from
        // `tid` when a non-leader thread exec'd and took over the leader's id.
        let former = match ptrace::getevent(tid) {
            Ok(message) => Some(Pid::from_raw(message as i32)),
            Err(err) => {
                warn!(tid = tid.as_raw(), %err, "ptrace(PTRACE_GETEVENTMSG) failed");
                None
            }
        };

        if let Some(former) = former.filter(|&former| former != tid) {
            if let Some(thread) = self.root.find_live_mut(former) {
                debug!(tid = tid.as_raw(), former = former.as_raw(), "exec from non-leader thread");
                thread.exited = true;
            }
        }

        let Some(capture) = self.pending.take_for_exec(tid, former) else {
            debug!(tid = tid.as_raw(), "exec without captured arguments");
            return;
        };

        if let Some(tracee) = self.root.find_live_mut(tid) {
            debug!(tid = tid.as_raw(), arguments = ?capture.arguments, "exec");
            tracee.apply_exec(capture);
        }
    }
}

/// Record a stop of `tracee` and set its options if that has not worked yet.
///
/// Returns whether this is the tracee's first stop. Failing to configure the
/// root is fatal; any other tracee is retried on its next stop.
fn note_stop(tracee: &mut Tracee, is_root: bool) -> Result<bool> {
    let first_stop = !tracee.stopped_before;
    tracee.stopped_before = true;

    if !tracee.ptrace_configured {
        let tid = tracee.tid;
        match ptrace::setoptions(tid, OPTIONS) {
            Ok(()) => tracee.ptrace_configured = true,
            Err(source) if is_root => return Err(TraceError::SetOptions { pid: tid, source }),
            Err(err) => warn!(tid = tid.as_raw(), %err, "cannot set ptrace options, will retry"),
        }
    }

    Ok(first_stop)
}

fn resume(tid: Pid, signal: Option<Signal>) -> Result<()> {
    ptrace::syscall(tid, signal).map_err(|source| TraceError::Resume { pid: tid, source })
}

/// A stop signal whose siginfo cannot be read is a group-stop, not a delivery.
fn is_group_stop(tid: Pid, signal: Signal) -> bool {
    match signal {
        Signal::SIGSTOP | Signal::SIGTSTP | Signal::SIGTTIN | Signal::SIGTTOU => {
            matches!(ptrace::getsiginfo(tid), Err(Errno::EINVAL))
        }
        _ => false,
    }
}

/// The signal to inject when resuming from a signal stop.
///
/// `SIGSTOP` comes from attaching (or is a group-stop), and the `SIGTRAP` on a
/// tracee's first stop is the one exec sends before options are set.
fn resume_signal(signal: Signal, first_stop: bool, group_stop: bool) -> Option<Signal> {
    match signal {
        _ if group_stop => None,
        Signal::SIGSTOP => None,
        Signal::SIGTRAP if first_stop => None,
        other => Some(other),
    }
}
