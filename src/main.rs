use clap::{CommandFactory, Parser};
use kmerge::archive::{self, SplitOptions};
use kmerge::{DecodeError, EncodeError};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

const EXAMPLES: &str = "\
e.g. To merge x, y and z into m:
     kmerge m x y z
e.g. To split m:
     kmerge m
     k1.bin, k2.bin, ..., kN.bin will be generated from m";

#[derive(Parser)]
#[command(
    name = "kmerge",
    version,
    about = "*** kmerge version 1 ***\nConcatenate files into one container, or split one back apart",
    override_usage = "kmerge mergedfile [file1] [file2] ... [fileN]",
    after_help = EXAMPLES,
)]
struct Cli {
    /// Container to split, or to create when input files follow
    container: Option<PathBuf>,
    /// Files to merge, in order
    inputs: Vec<PathBuf>,
    /// Directory split outputs are written to
    #[arg(short = 'C', long, default_value = ".")]
    output_dir: PathBuf,
    /// File name prefix for split outputs
    #[arg(long, default_value = "k")]
    prefix: String,
    /// List the container's entries instead of splitting it
    #[arg(short, long, conflicts_with = "inputs")]
    list: bool,
    /// Print the listing as JSON
    #[arg(long, requires = "list")]
    json: bool,
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    let Some(container) = cli.container.clone() else {
        // No arguments: usage, not an error.
        return match Cli::command().print_help() {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("kmerge: {e}");
                ExitCode::FAILURE
            }
        };
    };

    let outcome = if cli.list {
        run_list(&container, cli.json)
    } else if cli.inputs.is_empty() {
        run_split(&container, &cli)
    } else {
        run_merge(&container, &cli.inputs)
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(msg) => {
            eprintln!("{msg}");
            ExitCode::FAILURE
        }
    }
}

// ── commands ─────────────────────────────────────────────────────────────────

fn run_merge(container: &Path, inputs: &[PathBuf]) -> Result<(), String> {
    let len = archive::merge(container, inputs)
        .map_err(|e| describe_encode(&e, container, inputs))?;
    for path in inputs {
        println!("  packed  {}", path.display());
    }
    println!("Created: {} ({} bytes)", container.display(), len);
    Ok(())
}

fn run_split(container: &Path, cli: &Cli) -> Result<(), String> {
    let opts = SplitOptions {
        output_dir: cli.output_dir.clone(),
        prefix:     cli.prefix.clone(),
        ..SplitOptions::default()
    };
    let written = archive::split(container, &opts)
        .map_err(|e| describe_decode(&e, container, &opts))?;
    for path in &written {
        println!("  wrote   {}", path.display());
    }
    println!("Split {} into {} file(s)", container.display(), written.len());
    Ok(())
}

fn run_list(container: &Path, json: bool) -> Result<(), String> {
    let entries = archive::list(container)
        .map_err(|e| describe_decode(&e, container, &SplitOptions::default()))?;
    if json {
        let out = serde_json::to_string_pretty(&entries).map_err(|e| e.to_string())?;
        println!("{out}");
        return Ok(());
    }
    println!("Container: {}", container.display());
    println!("{:>7} {:>12} {:>12}", "Entry", "Size", "Offset");
    for e in &entries {
        println!("{:>7} {:>12} {:>12}", e.index + 1, e.size, e.offset);
    }
    Ok(())
}

// ── helpers ──────────────────────────────────────────────────────────────────

fn describe_encode(err: &EncodeError, container: &Path, inputs: &[PathBuf]) -> String {
    match err.index().and_then(|i| inputs.get(i)) {
        Some(path) => format!("{}: {err}", path.display()),
        None       => format!("{}: {err}", container.display()),
    }
}

fn describe_decode(err: &DecodeError, container: &Path, opts: &SplitOptions) -> String {
    match err {
        DecodeError::SinkUnavailable { index, .. } => {
            format!("{}: {err}", opts.output_path(*index).display())
        }
        DecodeError::OutputDirUnavailable(_) => {
            format!("{}: {err}", opts.output_dir.display())
        }
        _ => format!("{}: {err}", container.display()),
    }
}
