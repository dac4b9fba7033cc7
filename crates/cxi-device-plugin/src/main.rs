use anyhow::Result;
use clap::Parser;
use cxi_device_plugin::cmd::run_device_plugin;
use cxi_device_plugin::cmd::run_generate_manifest;
use cxi_device_plugin::config::Cli;
use cxi_device_plugin::config::Commands;

/// Sets up global panic hooks.
fn setup_global_hooks() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        default_hook(panic_info);
        tracing::error!("Thread panicked: {}", panic_info);
    }));
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_global_hooks();

    let cli = Cli::parse();

    match cli.command {
        Commands::DevicePlugin(args) => run_device_plugin(args).await,
        Commands::GenerateManifest(args) => run_generate_manifest(args).await,
    }
}
