//! Build automation for the dmx-rdm driver stack.
//!
//! Usage:
//!   cargo run -p xtask -- test    - Run host unit + integration tests
//!   cargo run -p xtask -- lint    - Run clippy across the workspace
//!   cargo run -p xtask -- check   - Type-check the workspace

use anyhow::Result;
use clap::{Parser, Subcommand};
use xshell::{cmd, Shell};

#[derive(Parser)]
#[command(name = "xtask")]
#[command(about = "Build automation for the dmx-rdm driver stack")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run host unit and integration tests (`dmx-core`, `dmx-hal` with its
    /// `std` feature, `dmx-rdm`).
    Test {
        /// Run a single package's tests instead of the whole workspace.
        #[arg(short, long)]
        package: Option<String>,

        /// Extra arguments forwarded to the underlying `cargo test`.
        #[arg(last = true)]
        extra_args: Vec<String>,
    },
    /// Run clippy with the workspace's `pedantic` lint set across every
    /// crate (the embedded-target crates still build host-side under their
    /// `std`/test cfg, so this never needs a cross target).
    Lint,
    /// Type-check the workspace without producing artifacts.
    Check,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let sh = Shell::new()?;

    match cli.command {
        Commands::Test { package, extra_args } => {
            let mut args: Vec<String> = vec!["test".into()];
            match package {
                Some(p) => {
                    args.push("-p".into());
                    args.push(p);
                },
                None => args.push("--workspace".into()),
            }
            args.push("--features".into());
            args.push("dmx-hal/std".into());
            args.extend(extra_args);
            cmd!(sh, "cargo {args...}").run()?;
        },
        Commands::Lint => {
            cmd!(sh, "cargo clippy --workspace --all-targets --features dmx-hal/std -- -D warnings").run()?;
        },
        Commands::Check => {
            cmd!(sh, "cargo check --workspace --features dmx-hal/std").run()?;
        },
    }

    Ok(())
}
