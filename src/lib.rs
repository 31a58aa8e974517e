//! Lineage - process genealogy tracer
//!
//! This library follows a process and every descendant it creates with
//! ptrace, recording who spawned whom, each command line and environment,
//! each working directory, and which descendants are threads. The finished
//! tree is rendered as an indented tree, JSON, or a flat listing.

pub mod cli;
pub mod error;
pub mod filter;
pub mod intercept;
pub mod json_output;
pub mod memory;
pub mod output;
pub mod plain_output;
pub mod procfs;
pub mod status;
pub mod syscalls;
pub mod tracee;
pub mod tracer;
pub mod tree_output;
