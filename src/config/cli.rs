use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum, ValueHint, builder::BoolishValueParser};

/// Command-line arguments for the Tessera binary.
#[derive(Debug, Parser)]
#[command(name = "tessera", version, about = "Fragment render cache maintenance")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(
        long = "config-file",
        env = "TESSERA_CONFIG_FILE",
        value_name = "PATH",
        global = true,
        value_hint = ValueHint::FilePath
    )]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: GlobalOverrides,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Derive the cache key for a fragment and its requirement values.
    Key(KeyArgs),
    /// Print a cached fragment artifact.
    Show(ShowArgs),
    /// List rendition records that required a dependency.
    Lookup(DependencyArgs),
    /// Remove cached fragments that required a dependency.
    Evict(DependencyArgs),
    /// Remove every cached fragment of a tenant branch.
    Purge(ScopeArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct GlobalOverrides {
    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        global = true,
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override the content store backend.
    #[arg(long = "store-backend", value_name = "BACKEND", global = true)]
    pub store_backend: Option<StoreBackendArg>,

    /// Override the filesystem store root directory.
    #[arg(
        long = "store-root",
        value_name = "PATH",
        global = true,
        value_hint = ValueHint::DirPath
    )]
    pub store_root: Option<PathBuf>,

    /// Override the per-operation store timeout (0 disables it).
    #[arg(long = "store-timeout-ms", value_name = "MILLIS", global = true)]
    pub store_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StoreBackendArg {
    Fs,
    Memory,
}

impl StoreBackendArg {
    pub fn as_str(self) -> &'static str {
        match self {
            StoreBackendArg::Fs => "fs",
            StoreBackendArg::Memory => "memory",
        }
    }
}

#[derive(Debug, Args, Clone)]
pub struct ScopeArgs {
    /// Tenant whose cache to address.
    #[arg(long, value_name = "TENANT")]
    pub tenant: String,

    /// Content branch within the tenant.
    #[arg(long, value_name = "BRANCH", default_value = "master")]
    pub branch: String,
}

#[derive(Debug, Args, Clone)]
pub struct KeyArgs {
    /// Fragment identity.
    #[arg(long, value_name = "ID")]
    pub fragment: String,

    /// Resolved requirement value; may be repeated.
    #[arg(long = "require", value_name = "NAME=VALUE", value_parser = parse_requirement)]
    pub requirements: Vec<(String, String)>,
}

#[derive(Debug, Args, Clone)]
pub struct ShowArgs {
    #[command(flatten)]
    pub scope: ScopeArgs,

    /// Fragment identity.
    #[arg(long, value_name = "ID")]
    pub fragment: String,

    /// Cache key as printed by `tessera key`.
    #[arg(long, value_name = "KEY")]
    pub key: String,
}

#[derive(Debug, Args, Clone)]
pub struct DependencyArgs {
    #[command(flatten)]
    pub scope: ScopeArgs,

    /// Upstream data item, e.g. `page:home`.
    #[arg(long, value_name = "ITEM")]
    pub dependency: String,
}

fn parse_requirement(raw: &str) -> Result<(String, String), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got `{raw}`"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("requirement name is empty in `{raw}`"));
    }
    Ok((name.to_string(), value.trim().to_string()))
}
