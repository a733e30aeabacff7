use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Args;
use tracing::info;

use gatehouse_core::snapshot::export_file_name;

use super::{Session, print_json};

#[derive(Args, Debug)]
pub struct ExportArgs {
    /// Output file, `-` for stdout (default: role-config-export-<millis>.json)
    #[arg(long, short)]
    pub out: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct ImportArgs {
    /// Snapshot file, `-` for stdin
    pub file: PathBuf,
    /// Print the summary as JSON
    #[arg(long)]
    pub json: bool,
}

fn is_stdio(path: &Path) -> bool {
    path.as_os_str() == "-"
}

pub async fn export(args: ExportArgs, session: &Session) -> anyhow::Result<()> {
    let gatehouse = session.gatehouse().await?;
    let json = gatehouse
        .export_json()
        .await
        .context("Failed to export configuration")?;

    let out = args
        .out
        .unwrap_or_else(|| PathBuf::from(export_file_name(chrono::Utc::now())));
    if is_stdio(&out) {
        println!("{json}");
        return Ok(());
    }
    info!(out = %out.display(), bytes = json.len(), "Writing snapshot");
    std::fs::write(&out, format!("{json}\n"))
        .with_context(|| format!("Cannot write {}", out.display()))?;
    session.say(format!("Exported configuration to {}", out.display()));
    Ok(())
}

pub async fn import(args: ImportArgs, session: &Session) -> anyhow::Result<()> {
    info!(source = %args.file.display(), "Reading snapshot");
    let text = if is_stdio(&args.file) {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Cannot read snapshot from stdin")?;
        buf
    } else {
        std::fs::read_to_string(&args.file)
            .with_context(|| format!("Cannot read {}", args.file.display()))?
    };

    let gatehouse = session.gatehouse().await?;
    let summary = gatehouse
        .import_json(&text)
        .await
        .context("Import failed; nothing was changed")?;

    if args.json {
        return print_json(&summary);
    }
    session.say(format!(
        "Imported {} menus, {} permissions, {} roles, {} role-menu and {} role-permission links",
        summary.menus,
        summary.permissions,
        summary.roles,
        summary.role_menus,
        summary.role_permissions
    ));
    Ok(())
}
