use anyhow::Context;
use clap::{Args, Subcommand};

use gatehouse_core::types::{MenuId, NewRole, PermissionId, Role, RoleId, RolePatch};

use super::{Session, nullable, on_off, print_json};

#[derive(Args, Debug)]
pub struct RoleArgs {
    #[command(subcommand)]
    pub action: RoleAction,
}

#[derive(Subcommand, Debug)]
pub enum RoleAction {
    /// List roles, newest first
    List {
        #[arg(long)]
        json: bool,
    },
    /// Create a role
    Add(AddArgs),
    /// Change fields of an existing role
    Update(UpdateArgs),
    /// Delete a role and its links
    Remove { id: i64 },
    /// Show the menu ids linked to a role
    Menus { id: i64 },
    /// Show the permission ids linked to a role
    Permissions { id: i64 },
    /// Replace a role's menus with exactly the given ids (none clears them)
    SetMenus { id: i64, menus: Vec<i64> },
    /// Replace a role's permissions with exactly the given ids (none clears them)
    SetPermissions { id: i64, permissions: Vec<i64> },
}

#[derive(Args, Debug)]
pub struct AddArgs {
    pub code: String,
    pub name: String,
    #[arg(long)]
    pub owner: Option<String>,
    #[arg(long)]
    pub description: Option<String>,
    #[arg(long)]
    pub disabled: bool,
}

#[derive(Args, Debug)]
pub struct UpdateArgs {
    pub id: i64,
    #[arg(long)]
    pub name: Option<String>,
    #[arg(long)]
    pub code: Option<String>,
    #[arg(long, conflicts_with = "clear_owner")]
    pub owner: Option<String>,
    #[arg(long)]
    pub clear_owner: bool,
    #[arg(long, conflicts_with = "clear_description")]
    pub description: Option<String>,
    #[arg(long)]
    pub clear_description: bool,
    #[arg(long, action = clap::ArgAction::Set)]
    pub enabled: Option<bool>,
}

fn describe(role: &Role) -> String {
    format!("{} [{}] #{}", role.name, role.code, role.id)
}

fn join<T: std::fmt::Display>(ids: &[T]) -> String {
    ids.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" ")
}

pub async fn run(args: RoleArgs, session: &Session) -> anyhow::Result<()> {
    let gatehouse = session.gatehouse().await?;
    match args.action {
        RoleAction::List { json } => {
            let roles = gatehouse.roles().await.context("Failed to list roles")?;
            if json {
                return print_json(&roles);
            }
            println!(
                "{:>6}  {:<3}  {:<20}  {:<24}  OWNER",
                "ID", "ON", "CODE", "NAME"
            );
            for r in &roles {
                println!(
                    "{:>6}  {:<3}  {:<20}  {:<24}  {}",
                    r.id,
                    on_off(r.enabled),
                    r.code,
                    r.name,
                    r.owner.as_deref().unwrap_or("-")
                );
            }
        }
        RoleAction::Add(add) => {
            let role = NewRole {
                owner: add.owner,
                description: add.description,
                enabled: !add.disabled,
                ..NewRole::new(add.code, add.name)
            };
            let created = gatehouse
                .create_role(role)
                .await
                .context("Failed to create role")?;
            session.say(format!("Created role {}", describe(&created)));
        }
        RoleAction::Update(update) => {
            let id = RoleId(update.id);
            let patch = RolePatch {
                name: update.name,
                code: update.code,
                owner: nullable(update.owner, update.clear_owner),
                description: nullable(update.description, update.clear_description),
                enabled: update.enabled,
            };
            let updated = gatehouse
                .update_role(id, patch)
                .await
                .with_context(|| format!("Failed to update role {id}"))?;
            session.say(format!("Updated role {}", describe(&updated)));
        }
        RoleAction::Remove { id } => {
            gatehouse
                .delete_role(RoleId(id))
                .await
                .with_context(|| format!("Failed to remove role {id}"))?;
            session.say(format!("Removed role #{id}"));
        }
        RoleAction::Menus { id } => {
            let menus = gatehouse
                .role_menus(RoleId(id))
                .await
                .with_context(|| format!("Failed to read menus of role {id}"))?;
            println!("{}", join(&menus));
        }
        RoleAction::Permissions { id } => {
            let permissions = gatehouse
                .role_permissions(RoleId(id))
                .await
                .with_context(|| format!("Failed to read permissions of role {id}"))?;
            println!("{}", join(&permissions));
        }
        RoleAction::SetMenus { id, menus } => {
            let menus: Vec<MenuId> = menus.into_iter().map(MenuId).collect();
            let count = gatehouse
                .set_role_menus(RoleId(id), &menus)
                .await
                .with_context(|| format!("Failed to set menus of role {id}"))?;
            session.say(format!("Role #{id} now has {count} menus"));
        }
        RoleAction::SetPermissions { id, permissions } => {
            let permissions: Vec<PermissionId> =
                permissions.into_iter().map(PermissionId).collect();
            let count = gatehouse
                .set_role_permissions(RoleId(id), &permissions)
                .await
                .with_context(|| format!("Failed to set permissions of role {id}"))?;
            session.say(format!("Role #{id} now has {count} permissions"));
        }
    }
    Ok(())
}
