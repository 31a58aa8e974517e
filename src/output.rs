//! Rendering the finished process tree

use crate::cli::OutputFormat;
use crate::filter::ExcludeFilter;
use crate::json_output;
use crate::plain_output;
use crate::tracee::Tracee;
use crate::tree_output;
use std::io::{self, Write};

/// Everything a renderer needs besides the tree itself.
#[derive(Debug, Clone)]
pub struct RenderOptions {
    pub format: OutputFormat,
    pub exclude: ExcludeFilter,
    /// Only the JSON format prints environments.
    pub include_environment: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            format: OutputFormat::Tree,
            exclude: ExcludeFilter::none(),
            include_environment: true,
        }
    }
}

/// Render `root` in the configured format and flush the sink.
pub fn render(root: &Tracee, options: &RenderOptions, out: &mut dyn Write) -> io::Result<()> {
    match options.format {
        OutputFormat::Tree => tree_output::write_tree(out, root, &options.exclude)?,
        OutputFormat::Json => json_output::write_json(
            out,
            root,
            &options.exclude,
            options.include_environment,
        )?,
        OutputFormat::Plain => plain_output::write_plain(out, root, &options.exclude)?,
    }
    out.flush()
}
