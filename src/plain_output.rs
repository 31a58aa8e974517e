//! Flat listing: one command line per line, parents before children.

use crate::filter::ExcludeFilter;
use crate::tracee::Tracee;
use std::io::{self, Write};

/// Write every non-excluded tracee with a known command line, depth-first.
///
/// Tracees without a command line print nothing, but their children are
/// still listed.
pub fn write_plain<W: Write + ?Sized>(
    out: &mut W,
    tracee: &Tracee,
    exclude: &ExcludeFilter,
) -> io::Result<()> {
    if exclude.excludes(tracee) {
        return Ok(());
    }

    if let Some(arguments) = &tracee.arguments {
        writeln!(out, "{}", arguments.join(" "))?;
    }

    for child in &tracee.children {
        write_plain(out, child, exclude)?;
    }

    Ok(())
}
