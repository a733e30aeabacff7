use anyhow::Context;
use clap::{Args, ValueEnum};

use gatehouse_core::types::{AssociationKind, BulkAction, RoleId};

use super::{Session, print_json};

#[derive(Args, Debug)]
pub struct BulkArgs {
    /// Which link table to update
    #[arg(value_enum)]
    pub target: Target,
    /// Add or remove every role x target pair
    #[arg(value_enum)]
    pub action: Action,
    /// Role ids (comma separated)
    #[arg(long, value_delimiter = ',', required = true, num_args = 1..)]
    pub roles: Vec<i64>,
    /// Menu or permission ids (comma separated)
    #[arg(long, value_delimiter = ',', required = true, num_args = 1..)]
    pub targets: Vec<i64>,
    /// Print the outcome as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum Target {
    Menus,
    Permissions,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum Action {
    Bind,
    Unbind,
}

impl From<Target> for AssociationKind {
    fn from(target: Target) -> Self {
        match target {
            Target::Menus => Self::Menus,
            Target::Permissions => Self::Permissions,
        }
    }
}

impl From<Action> for BulkAction {
    fn from(action: Action) -> Self {
        match action {
            Action::Bind => Self::Bind,
            Action::Unbind => Self::Unbind,
        }
    }
}

pub async fn run(args: BulkArgs, session: &Session) -> anyhow::Result<()> {
    let gatehouse = session.gatehouse().await?;
    let roles: Vec<RoleId> = args.roles.iter().copied().map(RoleId).collect();
    let outcome = gatehouse
        .bulk_update(
            args.target.into(),
            &roles,
            &args.targets,
            args.action.into(),
        )
        .await
        .context("Bulk update failed")?;

    if args.json {
        return print_json(&outcome);
    }
    match outcome.action {
        BulkAction::Bind => session.say(format!("Bound {} new pairs", outcome.inserted)),
        BulkAction::Unbind => session.say(format!("Unbound {} pairs", outcome.deleted)),
    }
    Ok(())
}
