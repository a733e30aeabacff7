use anyhow::Context;
use clap::Args;

use super::{Session, print_json};

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Print the counts as JSON
    #[arg(long)]
    pub json: bool,
}

pub async fn run(args: StatusArgs, session: &Session) -> anyhow::Result<()> {
    let gatehouse = session.gatehouse().await?;
    let stats = gatehouse
        .stats()
        .await
        .context("Failed to read store stats")?;

    if args.json {
        return print_json(&stats);
    }

    println!(
        "Gatehouse status for {}",
        session.config().store.path.display()
    );
    println!();
    if stats.db_size_bytes > 0 {
        println!("  Size:             {}", format_bytes(stats.db_size_bytes));
        println!();
    }
    println!("  Menus:            {:>6}", stats.menus);
    println!("  Permissions:      {:>6}", stats.permissions);
    println!("  Roles:            {:>6}", stats.roles);
    println!("  Role menus:       {:>6}", stats.role_menus);
    println!("  Role permissions: {:>6}", stats.role_permissions);
    Ok(())
}

#[allow(clippy::cast_precision_loss)]
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
