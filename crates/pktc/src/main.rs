use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use pktc::compile_dir;

#[derive(Parser)]
#[command(name = "pktc")]
#[command(about = "Protocol schema compiler (protocol.json -> serializer definitions).", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Compile a schema directory and emit the serializer definitions.
    Compile {
        #[arg(long)]
        input: PathBuf,
        /// Write the definitions here instead of stdout.
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Compile a schema directory and report validity only.
    Check {
        #[arg(long)]
        input: PathBuf,
    },
}

fn main() -> std::process::ExitCode {
    match try_main() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err:#}");
            std::process::ExitCode::from(2)
        }
    }
}

fn try_main() -> Result<std::process::ExitCode> {
    let cli = Cli::parse();

    match cli.cmd {
        Cmd::Compile { input, out } => {
            let compiled = compile_dir(&input)?;
            let json = serde_json::to_string_pretty(&compiled)? + "\n";
            match out {
                Some(path) => {
                    if let Some(parent) = path.parent() {
                        std::fs::create_dir_all(parent)
                            .with_context(|| format!("create output dir: {}", parent.display()))?;
                    }
                    std::fs::write(&path, json.as_bytes())
                        .with_context(|| format!("write: {}", path.display()))?;
                }
                None => print!("{json}"),
            }
            Ok(std::process::ExitCode::SUCCESS)
        }
        Cmd::Check { input } => {
            let compiled = compile_dir(&input)?;
            println!(
                "ok: {} types, {} packets",
                compiled.objects.len(),
                compiled.packets.len()
            );
            Ok(std::process::ExitCode::SUCCESS)
        }
    }
}
