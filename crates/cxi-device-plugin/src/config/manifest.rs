use std::path::PathBuf;

use clap::Parser;

use crate::manifest::ReconcilePolicy;

#[derive(Parser, Clone, Debug)]
pub struct GenerateManifestArgs {
    #[arg(
        long,
        env = "CDI_MANIFEST_DIR",
        default_value = "/etc/cdi",
        value_hint = clap::ValueHint::DirPath,
        help = "Directory the CDI manifest is written to"
    )]
    pub manifest_dir: PathBuf,

    #[arg(
        long,
        env = "CXI_ENV_VARS",
        value_hint = clap::ValueHint::FilePath,
        help = "YAML file listing KEY=VALUE environment variables to add to the manifest"
    )]
    pub env_vars: Option<PathBuf>,

    #[arg(
        short = 'n',
        long,
        help = "Discover devices and print what would be written without touching the manifest directory"
    )]
    pub dry_run: bool,

    #[arg(
        long,
        env = "CDI_RECONCILE",
        value_enum,
        default_value_t = ReconcilePolicy::Keep,
        help = "What to do when a manifest for hpe.com/cxi already exists"
    )]
    pub reconcile: ReconcilePolicy,

    #[arg(
        long,
        env = "CXI_LOG_PATH",
        value_hint = clap::ValueHint::FilePath,
        help = "Also write logs to this file, rotated daily"
    )]
    pub log_path: Option<PathBuf>,
}
