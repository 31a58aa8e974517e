//! The traced process genealogy
//!
//! Every tracee owns its children, so the whole history is one owned tree
//! rooted at the spawned or attached process. Exited tracees stay in place so
//! the final report shows everything that ever ran.

use nix::sys::ptrace;
use nix::unistd::Pid;
use tracing::{debug, trace};

/// One traced thread of execution, process or thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tracee {
    pub tid: Pid,
    /// Command line, known once an exec has been observed (or read from /proc).
    pub arguments: Option<Vec<String>>,
    /// `KEY=VALUE` entries, known once an exec has been observed.
    pub environment: Option<Vec<String>>,
    pub working_directory: Option<String>,
    /// Shares address space and working directory with its parent.
    pub is_thread: bool,
    pub ptrace_configured: bool,
    /// At least one stop has been dispatched for this tracee.
    pub stopped_before: bool,
    /// Set by a thread-creating clone on entry, consumed by the next child.
    pub next_child_is_thread: bool,
    pub exited: bool,
    /// A memory read for this tracee failed; some recorded state may be stale.
    pub degraded: bool,
    pub children: Vec<Tracee>,
}

impl Tracee {
    /// A blank record for `tid`.
    pub fn new(tid: Pid) -> Self {
        Self {
            tid,
            arguments: None,
            environment: None,
            working_directory: None,
            is_thread: false,
            ptrace_configured: false,
            stopped_before: false,
            next_child_is_thread: false,
            exited: false,
            degraded: false,
            children: Vec::new(),
        }
    }

    /// Append `child`, which inherits the current working directory and takes
    /// over the pending thread flag.
    pub fn add_child(&mut self, mut child: Tracee) -> &mut Tracee {
        child.working_directory = self.working_directory.clone();
        child.is_thread = std::mem::take(&mut self.next_child_is_thread);

        debug!(
            parent = self.tid.as_raw(),
            child = child.tid.as_raw(),
            thread = child.is_thread,
            "new tracee"
        );

        let index = self.children.len();
        self.children.push(child);
        &mut self.children[index]
    }

    /// Depth-first search for `tid`, exited tracees included.
    pub fn find(&self, tid: Pid) -> Option<&Tracee> {
        if self.tid == tid {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find(tid))
    }

    /// Depth-first search for a tracee with `tid` that has not exited.
    ///
    /// The kernel may hand an exited tracee's id to a new one, and events for
    /// that id always belong to the live tracee.
    pub fn find_live_mut(&mut self, tid: Pid) -> Option<&mut Tracee> {
        if self.tid == tid && !self.exited {
            return Some(self);
        }
        self.children
            .iter_mut()
            .find_map(|child| child.find_live_mut(tid))
    }

    /// Set the working directory here and on every thread reachable through
    /// thread children. Process children keep their own directory.
    ///
    /// Exited tracees are left as they were but still pass the change on.
    pub fn chdir(&mut self, dir: &str) {
        if !self.exited {
            self.working_directory = Some(dir.to_string());
        }

        for child in self.children.iter_mut().filter(|child| child.is_thread) {
            child.chdir(dir);
        }
    }

    /// Apply a `chdir` observed on the live tracee `tid`.
    ///
    /// A thread shares its directory with the tracee that created it, so the
    /// change starts at the closest ancestor-or-self that is not a thread.
    /// Returns false when `tid` is not a live tracee in this tree.
    pub fn change_directory(&mut self, tid: Pid, dir: &str) -> bool {
        let Some(path) = self.live_path_to(tid) else {
            return false;
        };

        let mut threads = Vec::with_capacity(path.len());
        let mut node: &Tracee = self;
        for &index in &path {
            node = &node.children[index];
            threads.push(node.is_thread);
        }

        let mut depth = path.len();
        while depth > 0 && threads[depth - 1] {
            depth -= 1;
        }

        let mut leader: &mut Tracee = self;
        for &index in &path[..depth] {
            leader = &mut leader.children[index];
        }

        debug!(tid = tid.as_raw(), leader = leader.tid.as_raw(), dir, "chdir");
        leader.chdir(dir);
        true
    }

    /// Child indices leading from this node to the live tracee `tid`.
    fn live_path_to(&self, tid: Pid) -> Option<Vec<usize>> {
        if self.tid == tid && !self.exited {
            return Some(Vec::new());
        }

        for (index, child) in self.children.iter().enumerate() {
            if let Some(mut path) = child.live_path_to(tid) {
                path.insert(0, index);
                return Some(path);
            }
        }

        None
    }

    /// Detach from every tracee in this subtree, children first.
    ///
    /// Failures are expected (the tracee may be running or gone) and ignored.
    pub fn detach_all(&self) {
        for child in &self.children {
            child.detach_all();
        }

        if self.exited {
            return;
        }

        if let Err(err) = ptrace::detach(self.tid, None) {
            trace!(tid = self.tid.as_raw(), %err, "detach failed");
        }
    }

    /// Number of tracees in this subtree, this one included.
    pub fn tracee_count(&self) -> usize {
        1 + self
            .children
            .iter()
            .map(Tracee::tracee_count)
            .sum::<usize>()
    }
}
