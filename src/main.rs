use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

/// verstep - manifest-driven package version manager
///
/// Walks a package manifest's version chain and applies each version's
/// change-set in order, recording progress in a local registry.
///
/// Examples:
///   verstep apply pack.json            # Install or update to the latest version
///   verstep apply pack.json --to v2    # Transition to a specific version
///   verstep remove pack.json           # Unwind and remove the package
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Install root directory (overrides defaults; also via VERSTEP_ROOT)
    #[arg(
        long = "root",
        short = 'r',
        env = "VERSTEP_ROOT",
        value_name = "PATH",
        global = true
    )]
    pub install_root: Option<PathBuf>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Apply a manifest, installing or updating its package
    Apply(ApplyArgs),

    /// Remove a manifest's package, unwinding all installed versions
    Remove(RemoveArgs),

    /// Show the versions a transition would apply, without applying them
    Plan(ApplyArgs),

    /// List installed packages
    List,
}

#[derive(clap::Args, Debug)]
pub struct ApplyArgs {
    /// Path to the package manifest JSON file
    #[arg(value_name = "MANIFEST")]
    pub manifest: PathBuf,

    /// Target version id (defaults to the manifest's latest version)
    #[arg(long = "to", value_name = "VERSION")]
    pub target: Option<String>,
}

#[derive(clap::Args, Debug)]
pub struct RemoveArgs {
    /// Path to the package manifest JSON file
    #[arg(value_name = "MANIFEST")]
    pub manifest: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();
    let runtime = verstep::runtime::RealRuntime;

    match cli.command {
        Commands::Apply(args) => {
            verstep::commands::apply(
                runtime,
                &args.manifest,
                args.target.as_deref(),
                cli.install_root,
            )
            .await?
        }
        Commands::Remove(args) => {
            verstep::commands::remove(runtime, &args.manifest, cli.install_root).await?
        }
        Commands::Plan(args) => verstep::commands::plan(
            runtime,
            &args.manifest,
            args.target.as_deref(),
            cli.install_root,
        )?,
        Commands::List => verstep::commands::list(runtime, cli.install_root)?,
    }
    Ok(())
}
