pub mod bulk;
pub mod init;
pub mod menu;
pub mod permission;
pub mod role;
pub mod status;
pub mod transfer;

use std::path::PathBuf;

use anyhow::Context as _;
use clap::Subcommand;

use gatehouse_core::Gatehouse;
use gatehouse_core::config::GatehouseConfig;
use gatehouse_core::store::LazyStore;
use gatehouse_core::tree::{Forest, TreeNode};

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create the database (if absent) and check its schema
    Init(init::InitArgs),
    /// Show row counts and database size
    Status(status::StatusArgs),
    /// Manage the menu forest
    Menu(menu::MenuArgs),
    /// Manage class/method permissions
    Permission(permission::PermissionArgs),
    /// Manage roles and their menu/permission sets
    Role(role::RoleArgs),
    /// Bind or unbind many roles to many menus or permissions at once
    Bulk(bulk::BulkArgs),
    /// Write the whole configuration to a JSON snapshot
    Export(transfer::ExportArgs),
    /// Apply a JSON snapshot, matching records by code
    Import(transfer::ImportArgs),
}

/// Global options from the command line.
#[derive(Debug, Clone, Default)]
pub struct Context {
    pub config_path: Option<PathBuf>,
    pub db_override: Option<PathBuf>,
    pub quiet: bool,
}

impl Context {
    /// Resolve configuration: file, then `GATEHOUSE_DB_PATH`, then `--db`.
    pub fn config(&self) -> anyhow::Result<GatehouseConfig> {
        let mut config = GatehouseConfig::load(self.config_path.as_deref())
            .context("Cannot load configuration")?;
        if let Some(db) = &self.db_override {
            config.store.path.clone_from(db);
        }
        Ok(config)
    }
}

/// Resolved configuration plus the store, opened on first use.
#[derive(Debug)]
pub struct Session {
    config: GatehouseConfig,
    store: LazyStore,
    quiet: bool,
}

impl Session {
    pub fn new(ctx: &Context) -> anyhow::Result<Self> {
        let config = ctx.config()?;
        Ok(Self {
            store: LazyStore::new(config.store.clone()),
            config,
            quiet: ctx.quiet,
        })
    }

    pub fn config(&self) -> &GatehouseConfig {
        &self.config
    }

    pub async fn gatehouse(&self) -> anyhow::Result<Gatehouse> {
        let store = self.store.get().await.with_context(|| {
            format!("Cannot open database: {}", self.config.store.path.display())
        })?;
        Ok(Gatehouse::from_store(store, self.config.clone()))
    }

    /// Print a line unless `--quiet` was given.
    pub fn say(&self, line: impl std::fmt::Display) {
        if !self.quiet {
            println!("{line}");
        }
    }
}

pub async fn run(cmd: Command, ctx: Context) -> anyhow::Result<()> {
    let session = Session::new(&ctx)?;
    match cmd {
        Command::Init(args) => init::run(args, &session).await,
        Command::Status(args) => status::run(args, &session).await,
        Command::Menu(args) => menu::run(args, &session).await,
        Command::Permission(args) => permission::run(args, &session).await,
        Command::Role(args) => role::run(args, &session).await,
        Command::Bulk(args) => bulk::run(args, &session).await,
        Command::Export(args) => transfer::export(args, &session).await,
        Command::Import(args) => transfer::import(args, &session).await,
    }
}

/// `on`/`off` column for listings.
pub(crate) fn on_off(enabled: bool) -> &'static str {
    if enabled { "on" } else { "off" }
}

/// Print rows as pretty JSON.
pub(crate) fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("Failed to encode JSON")?
    );
    Ok(())
}

/// Patch value for a nullable text column: `--clear-*` wins over a new value.
pub(crate) fn nullable(value: Option<String>, clear: bool) -> Option<Option<String>> {
    if clear { Some(None) } else { value.map(Some) }
}

/// Print a forest, two spaces of indent per level.
pub(crate) fn print_forest<T: TreeNode>(forest: &Forest<T>, label: impl Fn(&T) -> String) {
    for (depth, node) in forest.walk() {
        println!("{:indent$}{}", "", label(node), indent = depth * 2);
    }
}
