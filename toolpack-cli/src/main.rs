//! Toolpack CLI
//!
//! Lists, resolves and runs the helper tools bundled into toolpack-core.

mod cli;

use std::process::{ExitCode, ExitStatus};

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use toolpack_core::{
    EmbeddedBundle, Error, LauncherConfig, NativePlatform, Platform, PlatformAdapter,
    ProcessLauncher,
};
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands, ListArgs, RunArgs, WhichArgs};

/// Conventional exit code for a run interrupted by Ctrl+C.
const EXIT_INTERRUPTED: u8 = 130;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_tracing(cli.verbose) {
        eprintln!("Warning: failed to initialize logging: {e}");
    }

    tracing::debug!("Starting Toolpack v{}", toolpack_core::VERSION);

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            if let Some(Error::Cancelled { .. }) = e.downcast_ref::<Error>() {
                eprintln!("Interrupted");
                return ExitCode::from(EXIT_INTERRUPTED);
            }
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) -> Result<()> {
    let mut filter = EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into());
    if verbose {
        filter = filter
            .add_directive("toolpack=debug".parse()?)
            .add_directive("toolpack_core=debug".parse()?);
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!(e))
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let config = load_config(&cli)?;

    match cli.command {
        Commands::List(args) => list(&config, args),
        Commands::Which(args) => which(&config, args),
        Commands::Run(args) => run_tool(&config, args).await,
        Commands::Info => info(&config),
    }
}

fn load_config(cli: &Cli) -> Result<LauncherConfig> {
    match &cli.config {
        Some(path) => {
            let mut config = LauncherConfig::from_file(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?;
            config.apply_env(|key| std::env::var_os(key));
            Ok(config)
        }
        None => LauncherConfig::load().context("Failed to load config"),
    }
}

fn list(config: &LauncherConfig, args: ListArgs) -> Result<ExitCode> {
    let launcher = ProcessLauncher::from_config(config);
    let bundle = launcher.extractor().bundle();

    for item in bundle
        .walk(&args.dir)
        .with_context(|| format!("Cannot list '{}'", args.dir))?
    {
        let (rel, entry) = item?;
        let marker = if entry.is_directory {
            "/"
        } else if entry.executable {
            "*"
        } else {
            ""
        };
        println!("{rel}{marker}");
    }

    Ok(ExitCode::SUCCESS)
}

fn which(config: &LauncherConfig, args: WhichArgs) -> Result<ExitCode> {
    let launcher = ProcessLauncher::from_config(config)
        .with_system_fallback(config.system_fallback && !args.no_system);

    let resolved = launcher
        .resolve(&args.tool)
        .with_context(|| format!("Cannot resolve '{}'", args.tool))?;

    let origin = if resolved.is_bundled() { "bundled" } else { "system" };
    println!("{} ({origin})", resolved.path().display());

    resolved.into_parts().1.cleanup();
    Ok(ExitCode::SUCCESS)
}

async fn run_tool(config: &LauncherConfig, args: RunArgs) -> Result<ExitCode> {
    let launcher = ProcessLauncher::from_config(config)
        .with_system_fallback(config.system_fallback && !args.no_system);

    let token = CancellationToken::new();
    let ctrl_c = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupt received, stopping tool");
            ctrl_c.cancel();
        }
    });

    let launched = launcher
        .launch(&args.tool, args.args, token)
        .with_context(|| format!("Cannot launch '{}'", args.tool))?;

    let status = launched.run().await?;
    tracing::debug!(tool = %args.tool, %status, "Tool exited");

    Ok(ExitCode::from(exit_code(status)))
}

fn info(config: &LauncherConfig) -> Result<ExitCode> {
    let platform = Platform::detect()
        .map(|p| p.display_name())
        .unwrap_or("unsupported");
    let embedded = EmbeddedBundle::for_current_platform();
    let temp_root = NativePlatform::new(config)
        .temp_root()
        .context("Cannot prepare temp root")?;

    println!("toolpack {}", toolpack_core::VERSION);
    println!("platform:        {platform}");
    println!(
        "embedded bundle: {} ({} files)",
        display_or_none(EmbeddedBundle::embedded_platform()),
        embedded.len()
    );
    if let Some(dir) = &config.bundle_dir {
        println!("bundle override: {}", dir.display());
    }
    println!("temp root:       {}", temp_root.display());
    println!(
        "system fallback: {}",
        if config.system_fallback { "on" } else { "off" }
    );

    Ok(ExitCode::SUCCESS)
}

fn display_or_none(value: &str) -> &str {
    if value.is_empty() {
        "none"
    } else {
        value
    }
}

/// Maps a child's exit status onto ours. Signal deaths become `128 + signal`
/// on Unix, like a shell reports them.
fn exit_code(status: ExitStatus) -> u8 {
    if let Some(code) = status.code() {
        return u8::try_from(code & 0xff).unwrap_or(1);
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return u8::try_from(128 + signal).unwrap_or(1);
        }
    }

    1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_or_none() {
        assert_eq!(display_or_none(""), "none");
        assert_eq!(display_or_none("linux-x64"), "linux-x64");
    }

    #[cfg(unix)]
    #[test]
    fn test_exit_code_mapping() {
        use std::os::unix::process::ExitStatusExt;

        // Raw wait statuses: exit code in the high byte, signal in the low bits.
        assert_eq!(exit_code(ExitStatus::from_raw(0)), 0);
        assert_eq!(exit_code(ExitStatus::from_raw(3 << 8)), 3);
        assert_eq!(exit_code(ExitStatus::from_raw(9)), 137);
    }
}
