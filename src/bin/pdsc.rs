//! pdsc - compile the documentation comments of one source file.

use clap::Parser;
use gendoc::config::DEFAULT_COMPILED_OUTPUT;
use gendoc::{compile_file, CompileOptions, DocError};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "pdsc")]
#[command(version)]
#[command(about = "Compile documentation comments into an object file", long_about = None)]
struct Cli {
    /// Source file to compile (.c, .h or .cpp)
    input: PathBuf,

    /// Object file to write
    #[arg(short, long, default_value = DEFAULT_COMPILED_OUTPUT)]
    output: PathBuf,

    /// Define a macro usable as `$NAME` in group positions
    #[arg(short = 'D', value_name = "NAME=VALUE")]
    define: Vec<String>,

    /// Log what the compiler is doing
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

/// Returns `false` when any diagnostic was raised.
fn run(cli: Cli) -> Result<bool, DocError> {
    let mut options = CompileOptions {
        output: cli.output,
        verbose: cli.verbose,
        quiet: cli.quiet,
        ..CompileOptions::default()
    };
    for definition in &cli.define {
        options.define(definition);
    }

    let compilation = compile_file(&cli.input, &options)?;
    let bytes = compilation.generate_output()?;
    std::fs::write(&options.output, &bytes).map_err(|source| DocError::Io {
        path: options.output.display().to_string(),
        source,
    })?;

    let raised = compilation.diagnostics.raised().len();
    log::debug!("wrote {} bytes to {}", bytes.len(), options.output.display());
    if !options.quiet {
        println!(
            "{}: {} records, {} warnings",
            cli.input.display(),
            compilation.state.atoms.number_atoms(),
            raised
        );
    }
    Ok(raised == 0)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    match run(cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            log::error!("pdsc: {}", e);
            ExitCode::FAILURE
        }
    }
}
