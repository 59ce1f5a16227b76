//! Verso static site generator.

mod build;
mod cli;
mod config;
mod logger;
mod plugin;
mod rebuild;
mod serve;
mod site;
mod store;
mod watch;

use anyhow::{Result, bail};
use build::{BuildOptions, Builder, SitePipeline};
use clap::Parser;
use cli::{Cli, Commands};
use config::SiteConfig;

fn main() {
    let cli = Cli::parse();

    if let Err(err) = run(&cli) {
        log!("error"; "{err:#}");
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<()> {
    let config = SiteConfig::load(cli)?;

    match cli.command {
        Commands::Build { overwrite } => build_to_disk(&config, overwrite),
        Commands::Serve { .. } => serve::serve_site(&config),
    }
}

/// Build once and write the output directory to disk.
fn build_to_disk(config: &SiteConfig, overwrite: bool) -> Result<()> {
    let output_dir = config.output_dir();
    if output_dir.exists() && !overwrite {
        bail!(
            "output directory {} already exists (pass --overwrite to replace it)",
            output_dir.display()
        );
    }

    let options = BuildOptions {
        overwrite,
        recompile_templates: true,
        output: config.build.output.clone(),
    };

    log!("build"; "building site...");
    let store = SitePipeline::from_config(config).build(&options)?;
    store.write_to_disk(&config.root)?;
    log!("build"; "wrote {} files to {}", store.len(), output_dir.display());

    Ok(())
}
