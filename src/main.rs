use anyhow::{Context, Result};
use clap::Parser;
use lineage::cli::{Cli, Mode};
use lineage::filter::ExcludeFilter;
use lineage::output::{self, RenderOptions};
use lineage::procfs;
use lineage::tracer::{self, Tracer};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::process::ExitCode;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber for debug output
fn init_tracing(debug: bool) {
    if debug {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::from_default_env().add_directive(tracing::Level::DEBUG.into()),
            )
            .with_writer(std::io::stderr)
            .init();
    }
}

/// Open the output sink before anything is traced, so a bad path fails early
fn open_sink(path: Option<&str>) -> Result<Box<dyn Write>> {
    match path {
        Some(path) => {
            let file =
                File::create(path).with_context(|| format!("Failed to open output file {}", path))?;
            Ok(Box::new(BufWriter::new(file)))
        }
        None => Ok(Box::new(io::stdout().lock())),
    }
}

/// Trace until the root exits or the user interrupts, then render the tree
fn run(cli: &Cli, mode: Mode) -> Result<()> {
    let options = RenderOptions {
        format: cli.format,
        exclude: ExcludeFilter::from_option(cli.exclude.as_deref())?,
        include_environment: !cli.no_env,
    };
    let mut sink = open_sink(cli.output.as_deref())?;

    tracer::install_interrupt_handler()?;

    let root = match mode {
        Mode::Attach(pid) => tracer::attach_root(pid, Path::new(procfs::PROC_ROOT))?,
        Mode::Spawn(command) => tracer::spawn_root(&command, cli.child_output())?,
    };

    let mut tracer = Tracer::new(root);
    let outcome = tracer.run();
    let root = tracer.finish();

    // The tree is rendered even when the loop failed.
    output::render(&root, &options, sink.as_mut()).context("Failed to write output")?;

    let outcome = outcome?;
    info!(?outcome, tracees = root.tracee_count(), "done");
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize tracing if --debug flag is set
    init_tracing(cli.debug);

    // Either attach to PID or trace command (mutually exclusive)
    let mode = cli.mode().unwrap_or_else(|err| err.exit());

    match run(&cli, mode) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{}: {:#}", env!("CARGO_BIN_NAME"), err);
            ExitCode::FAILURE
        }
    }
}
