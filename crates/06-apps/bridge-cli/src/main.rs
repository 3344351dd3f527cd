//! Command-line inspector for bridge module configs.

use anyhow::{Context, Result};
use bridge_runtime::{BatchedBridgeConfig, ModuleConfig, Registry};
use clap::{Parser, Subcommand};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

/// Text rendering helpers used by the CLI commands.
mod render {
    use bridge_runtime::{LookupTables, MethodKind, Registry};
    use std::fmt::Write;

    /// Format the remote and local module tables of a registry.
    pub fn tables(registry: &Registry) -> String {
        let mut out = String::new();
        let remote: Vec<_> = registry.modules().collect();
        writeln!(out, "remote modules ({})", remote.len()).expect("write header");
        for module in remote {
            write!(out, "  {} {}", module.id(), module.name()).expect("write module");
            if !module.constants().is_empty() {
                let keys: Vec<_> = module.constants().keys().map(String::as_str).collect();
                write!(out, " {{{}}}", keys.join(", ")).expect("write constants");
            }
            out.push('\n');
            let mut methods: Vec<_> = module.methods().collect();
            methods.sort_by_key(|(_, handle)| handle.method_id());
            for (name, handle) in methods {
                let marker = match handle.kind() {
                    MethodKind::Sync => "",
                    MethodKind::Promise => " (promise)",
                };
                writeln!(out, "      {} {name}{marker}", handle.method_id())
                    .expect("write method");
            }
        }
        if !registry.local().is_empty() {
            out.push_str(&local(registry.local()));
        }
        out
    }

    fn local(tables: &LookupTables) -> String {
        let mut out = String::new();
        writeln!(out, "local modules ({})", tables.len()).expect("write header");
        for (id, name, methods) in tables.iter() {
            writeln!(out, "  {id} {name}").expect("write module");
            for (method_id, method) in methods.iter().enumerate() {
                if let Some(method) = method {
                    writeln!(out, "      {method_id} {method}").expect("write method");
                }
            }
        }
        out
    }
}

/// Inspect module configs of the batched call bridge.
#[derive(Parser, Debug)]
#[command(author, version, about = "Inspect batched bridge module configs", long_about = None)]
struct Cli {
    /// Log at debug level instead of warn.
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the module and method tables a bridge would build.
    Tables {
        /// Module config, or a host config with `remoteModuleConfig`.
        #[arg(value_name = "CONFIG")]
        config: PathBuf,
    },
    /// Print a module config in the ordered array form.
    Normalize {
        /// Module config, or a host config with `remoteModuleConfig`.
        #[arg(value_name = "CONFIG")]
        config: PathBuf,
        /// Emit the legacy name-keyed form instead.
        #[arg(long)]
        legacy: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match cli.command {
        Command::Tables { config } => {
            let (remote, local) = load_configs(&config)?;
            let registry = Registry::build(&remote, local.as_ref());
            print!("{}", render::tables(&registry));
        }
        Command::Normalize { config, legacy } => {
            let (remote, _) = load_configs(&config)?;
            let value = if legacy {
                remote.to_legacy_value()
            } else {
                remote.to_value()
            };
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
    }
    Ok(())
}

fn load_configs(path: &Path) -> Result<(ModuleConfig, Option<ModuleConfig>)> {
    let text = fs::read_to_string(path).with_context(|| format!("failed to read {path:?}"))?;
    parse_configs(&text).with_context(|| format!("invalid config in {path:?}"))
}

/// Accepts either a bare module config or a full host config.
fn parse_configs(text: &str) -> Result<(ModuleConfig, Option<ModuleConfig>)> {
    let value: Value = serde_json::from_str(text)?;
    if value.get("remoteModuleConfig").is_some() {
        let config: BatchedBridgeConfig = serde_json::from_value(value)?;
        log::debug!(
            "read host config with {} remote modules",
            config.remote_module_config.len()
        );
        return Ok((config.remote_module_config, config.local_modules_config));
    }
    Ok((ModuleConfig::from_value(&value)?, None))
}
