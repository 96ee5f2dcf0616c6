//! Rolegate - administration and check CLI for the authorization engine
//!
//! Every invocation loads the configured store, runs one command and exits.
//! Mutations are persisted by the store before the command returns.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use rolegate_authz::{
    AuthorizationEngine, EngineSettings, FileStore, IdentityProvider, Item, ItemKind, Params,
    SessionIdentity,
};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

/// Rolegate CLI
#[derive(Parser)]
#[command(name = "rolegate")]
#[command(about = "Hierarchical role-based authorization engine")]
#[command(version)]
struct Cli {
    /// Path to configuration file (defaults to a compiled file in the current directory)
    #[arg(short, long, env = "ROLEGATE_CONFIG")]
    config: Option<PathBuf>,

    /// Use this compiled graph file instead of the configured backend
    #[arg(long, env = "ROLEGATE_FILE")]
    file: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, PartialEq)]
enum Command {
    /// Decide whether a principal holds an item
    Check {
        principal: String,
        item: String,

        /// Parameter bag as a JSON object
        #[arg(long, default_value = "{}")]
        params: String,

        /// Evaluate rules for an anonymous caller
        #[arg(long)]
        guest: bool,
    },

    /// Print the path that grants an item
    Explain {
        principal: String,
        item: String,

        #[arg(long, default_value = "{}")]
        params: String,

        #[arg(long)]
        guest: bool,
    },

    /// Grant an item to a principal
    Assign { principal: String, item: String },

    /// Remove a grant
    Revoke { principal: String, item: String },

    /// Remove every grant of a principal
    RevokeAll { principal: String },

    /// List items
    Items {
        /// Only items of this kind (role or permission)
        #[arg(long)]
        kind: Option<ItemKind>,
    },

    /// Show an item with its edges and grants
    Show { item: String },

    /// Create an item
    AddItem {
        name: String,

        #[arg(long, default_value = "role")]
        kind: ItemKind,

        #[arg(long, default_value = "")]
        description: String,

        #[arg(long, default_value_t = 0)]
        order: i32,

        /// Registered business rule kind gating the item
        #[arg(long)]
        rule: Option<String>,
    },

    /// Add a parent -> child edge
    AddChild { parent: String, child: String },

    /// Remove a parent -> child edge
    RemoveChild { parent: String, child: String },

    /// Delete an item with its edges and grants
    RemoveItem { name: String },

    /// Write the current graph and grants as a compiled file
    Export { path: PathBuf },
}

impl Command {
    /// Identity the engine evaluates rules for
    fn identity(&self) -> Arc<dyn IdentityProvider> {
        match self {
            Command::Check {
                principal, guest, ..
            }
            | Command::Explain {
                principal, guest, ..
            } if !guest => Arc::new(SessionIdentity::logged_in(principal.clone())),
            _ => Arc::new(SessionIdentity::new()),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_log_filter(cli.verbose).into()),
        )
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let settings = load_settings(&cli)?;
    let engine = open_engine(&settings, cli.command.identity()).await?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    execute(&engine, cli.command, &mut out).await
}

/// Filter used when RUST_LOG is unset
fn default_log_filter(verbose: bool) -> String {
    let log_level = if verbose { "debug" } else { "info" };
    format!("{},rolegate_authz={}", log_level, log_level)
}

fn load_settings(cli: &Cli) -> Result<EngineSettings> {
    let mut settings = match &cli.config {
        Some(path) => EngineSettings::load(path)
            .with_context(|| format!("Failed to load configuration from {:?}", path))?,
        None => EngineSettings::default(),
    };

    if let Some(file) = &cli.file {
        settings.backend = rolegate_authz::BackendSettings::File {
            path: file.clone(),
            create_if_missing: true,
        };
    }

    settings.validate().context("Invalid configuration")?;
    debug!("Using settings {:?}", settings);
    Ok(settings)
}

async fn open_engine(
    settings: &EngineSettings,
    identity: Arc<dyn IdentityProvider>,
) -> Result<AuthorizationEngine> {
    let store = settings
        .open_store()
        .await
        .context("Failed to open graph store")?;
    let engine = AuthorizationEngine::new(settings.engine_config(), store)
        .await
        .context("Failed to load authorization graph")?;
    Ok(engine.with_identity(identity))
}

fn parse_params(raw: &str) -> Result<Params> {
    let value: serde_json::Value =
        serde_json::from_str(raw).with_context(|| format!("Invalid --params JSON: {}", raw))?;
    match value {
        serde_json::Value::Object(map) => Ok(map),
        other => bail!("--params must be a JSON object, got {}", other),
    }
}

async fn execute(engine: &AuthorizationEngine, command: Command, out: &mut impl Write) -> Result<()> {
    match command {
        Command::Check {
            principal,
            item,
            params,
            ..
        } => {
            let params = parse_params(&params)?;
            let allowed = engine.check(&principal, &item, &params)?;
            writeln!(out, "{}", if allowed { "allow" } else { "deny" })?;
        }

        Command::Explain {
            principal,
            item,
            params,
            ..
        } => {
            let params = parse_params(&params)?;
            match engine.explain(&principal, &item, &params)? {
                Some(path) => writeln!(out, "{}", path.join(" -> "))?,
                None => writeln!(out, "no path grants '{}' to '{}'", item, principal)?,
            }
        }

        Command::Assign { principal, item } => {
            engine.assign(&principal, &item).await?;
            info!("Assigned '{}' to '{}'", item, principal);
        }

        Command::Revoke { principal, item } => {
            engine.revoke(&principal, &item).await?;
        }

        Command::RevokeAll { principal } => {
            engine.revoke_all(&principal).await?;
        }

        Command::Items { kind } => {
            for item in engine.all_items(kind) {
                writeln!(
                    out,
                    "{:<24} {:<10} {:>5}  {:<16} {}",
                    item.name,
                    item.kind,
                    item.order,
                    item.rule.as_deref().unwrap_or("-"),
                    item.description
                )?;
            }
        }

        Command::Show { item } => {
            let found = engine.get_item(&item)?;
            writeln!(out, "name:        {}", found.name)?;
            writeln!(out, "kind:        {}", found.kind)?;
            writeln!(out, "description: {}", found.description)?;
            writeln!(out, "order:       {}", found.order)?;
            writeln!(out, "rule:        {}", found.rule.as_deref().unwrap_or("-"))?;
            writeln!(out, "children:    {}", engine.children(&item)?.join(", "))?;
            writeln!(out, "parents:     {}", engine.parents(&item)?.join(", "))?;
            writeln!(out, "principals:  {}", engine.principals_of(&item).join(", "))?;
        }

        Command::AddItem {
            name,
            kind,
            description,
            order,
            rule,
        } => {
            let mut item = Item::new(name, kind)
                .with_description(description)
                .with_order(order);
            if let Some(rule) = rule {
                if !engine.rules().is_registered(&rule) {
                    eprintln!("warning: rule kind '{}' is not registered and will deny", rule);
                }
                item = item.with_rule(rule);
            }
            engine.add_item(item).await?;
        }

        Command::AddChild { parent, child } => {
            engine.add_child(&parent, &child).await?;
        }

        Command::RemoveChild { parent, child } => {
            engine.remove_child(&parent, &child).await?;
        }

        Command::RemoveItem { name } => {
            engine.remove_item(&name).await?;
        }

        Command::Export { path } => {
            let snapshot = engine.snapshot();
            FileStore::new(&path)
                .save(&snapshot)
                .await
                .with_context(|| format!("Failed to export to {:?}", path))?;
            writeln!(
                out,
                "exported {} items and {} assignments to {}",
                snapshot.graph.len(),
                snapshot.assignments.len(),
                path.display()
            )?;
        }
    }

    Ok(())
}
