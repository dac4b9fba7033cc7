use clap::Parser;
use clap::Subcommand;
use utils::version;

use crate::config::manifest::GenerateManifestArgs;
use crate::config::plugin::DevicePluginArgs;

#[derive(Parser)]
#[command(about, long_about, version = &**version::VERSION)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the kubelet device plugin for HPE Slingshot NICs
    #[command(name = "device-plugin")]
    DevicePlugin(DevicePluginArgs),
    /// Generate the CDI manifest for HPE Slingshot NICs
    #[command(name = "generate-manifest")]
    GenerateManifest(GenerateManifestArgs),
}
