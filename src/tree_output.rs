//! Indented tree drawing
//!
//! ```text
//! make
//! ├───cc -c main.c
//! │   └───as -o main.o
//! └───ld -o main main.o
//! ```

use crate::filter::ExcludeFilter;
use crate::tracee::Tracee;
use std::io::{self, Write};

const BRANCH: &str = "├───";
const LAST_BRANCH: &str = "└───";
const PIPE: &str = "│   ";
const SPACE: &str = "    ";

/// Write the root's command line, then one line per descendant.
pub fn write_tree<W: Write + ?Sized>(
    out: &mut W,
    root: &Tracee,
    exclude: &ExcludeFilter,
) -> io::Result<()> {
    if exclude.excludes(root) {
        return Ok(());
    }

    writeln!(out, "{}", label(root))?;

    let mut prefix = String::new();
    write_children(out, root, exclude, &mut prefix)
}

fn write_children<W: Write + ?Sized>(
    out: &mut W,
    tracee: &Tracee,
    exclude: &ExcludeFilter,
    prefix: &mut String,
) -> io::Result<()> {
    let visible: Vec<&Tracee> = tracee
        .children
        .iter()
        .filter(|child| !exclude.excludes(child))
        .collect();

    for (i, child) in visible.iter().enumerate() {
        let last = i + 1 == visible.len();
        writeln!(
            out,
            "{}{}{}",
            prefix,
            if last { LAST_BRANCH } else { BRANCH },
            label(child)
        )?;

        let len = prefix.len();
        prefix.push_str(if last { SPACE } else { PIPE });
        write_children(out, child, exclude, prefix)?;
        prefix.truncate(len);
    }

    Ok(())
}

/// Space-joined command line, or the bare tid when none was observed.
fn label(tracee: &Tracee) -> String {
    match &tracee.arguments {
        Some(arguments) => arguments.join(" "),
        None => tracee.tid.to_string(),
    }
}
