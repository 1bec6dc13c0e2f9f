//! pdsl - link compiled documentation objects into one linked object.

use bumpalo::Bump;
use clap::Parser;
use gendoc::config::{DEFAULT_LINKED_OUTPUT, DEFAULT_MAX_CALL_DEPTH};
use gendoc::{semantic_check, write_linked_file, DocError, LinkOptions, LinkSession, Linker};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "pdsl")]
#[command(version)]
#[command(about = "Link compiled documentation objects", long_about = None)]
struct Cli {
    /// Compiled objects, linked in the order given
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Linked object to write
    #[arg(short, long, default_value = DEFAULT_LINKED_OUTPUT)]
    output: PathBuf,

    /// How deep function calls are inlined into timelines
    #[arg(long, default_value_t = DEFAULT_MAX_CALL_DEPTH)]
    max_call_depth: usize,

    /// Log what the linker is doing and print link statistics
    #[arg(short, long)]
    verbose: bool,

    /// Only report errors
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

fn init_logging(verbose: bool, quiet: bool) {
    let level = if verbose {
        "debug"
    } else if quiet {
        "error"
    } else {
        "info"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

/// Returns `false` when the model did not pass the semantic checks; no
/// output is written in that case.
fn run(cli: Cli) -> Result<bool, DocError> {
    let options = LinkOptions {
        output: cli.output,
        max_call_depth: cli.max_call_depth,
        verbose: cli.verbose,
        quiet: cli.quiet,
    };

    let arena = Bump::new();
    let session = LinkSession::new(&arena);
    for input in &cli.inputs {
        session.load(input)?;
    }

    let mut linker = Linker::new(options.clone());
    linker.link_session(&session)?;
    let (mut model, mut diagnostics) = linker.into_parts();

    if !semantic_check(&mut model, &mut diagnostics, options.max_call_depth) {
        if !options.quiet {
            println!("{} warnings, no output written", diagnostics.raised().len());
        }
        return Ok(false);
    }
    session.record_model(model.groups.len(), model.nodes.len(), model.states.len());

    let Some(written) = write_linked_file(&mut model, &mut diagnostics, &options.output)? else {
        if !options.quiet {
            println!("{} warnings, no output written", diagnostics.raised().len());
        }
        return Ok(false);
    };
    session.record_output(written);

    if options.verbose {
        print!("{}", session.stats());
    }
    log::info!("wrote {} bytes to {}", written, options.output.display());
    Ok(true)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    match run(cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            log::error!("pdsl: {}", e);
            ExitCode::FAILURE
        }
    }
}
