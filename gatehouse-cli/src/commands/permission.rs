use anyhow::Context;
use clap::{Args, Subcommand};

use gatehouse_core::types::{
    NewPermission, Permission, PermissionId, PermissionLevel, PermissionPatch,
};

use super::{Session, nullable, on_off, print_forest, print_json};

#[derive(Args, Debug)]
pub struct PermissionArgs {
    #[command(subcommand)]
    pub action: PermissionAction,
}

#[derive(Subcommand, Debug)]
pub enum PermissionAction {
    /// List every permission in sibling order
    List {
        #[arg(long)]
        json: bool,
    },
    /// Print classes with their methods
    Tree,
    /// Create a permission (class by default, method with --parent)
    Add(AddArgs),
    /// Change fields of an existing permission
    Update(UpdateArgs),
    /// Delete a permission (a class takes its methods with it)
    Remove { id: i64 },
    /// Renumber siblings in the given order (sort = 10, 20, 30, ...)
    Reorder {
        /// Common parent class (omit for classes)
        #[arg(long)]
        parent: Option<i64>,
        ids: Vec<i64>,
    },
}

#[derive(Args, Debug)]
pub struct AddArgs {
    pub code: String,
    pub name: String,
    /// Parent class; makes this a method permission unless --level says otherwise
    #[arg(long)]
    pub parent: Option<i64>,
    /// `class` or `method`
    #[arg(long)]
    pub level: Option<PermissionLevel>,
    /// Route or resource the permission guards
    #[arg(long)]
    pub path: Option<String>,
    #[arg(long)]
    pub description: Option<String>,
    #[arg(long, default_value_t = 0)]
    pub sort: i64,
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
    #[arg(long)]
    pub level: Option<PermissionLevel>,
    #[arg(long, conflicts_with = "no_parent")]
    pub parent: Option<i64>,
    /// Clear the parent (required when promoting a method to a class)
    #[arg(long)]
    pub no_parent: bool,
    #[arg(long, conflicts_with = "clear_path")]
    pub path: Option<String>,
    #[arg(long)]
    pub clear_path: bool,
    #[arg(long, conflicts_with = "clear_description")]
    pub description: Option<String>,
    #[arg(long)]
    pub clear_description: bool,
    #[arg(long)]
    pub sort: Option<i64>,
    #[arg(long, action = clap::ArgAction::Set)]
    pub enabled: Option<bool>,
}

impl AddArgs {
    fn into_new(self) -> NewPermission {
        let level = self.level.unwrap_or(if self.parent.is_some() {
            PermissionLevel::Method
        } else {
            PermissionLevel::Class
        });
        NewPermission {
            parent_id: self.parent.map(PermissionId),
            level,
            path: self.path,
            description: self.description,
            sort: self.sort,
            enabled: !self.disabled,
            ..NewPermission::class(self.code, self.name)
        }
    }
}

impl UpdateArgs {
    fn into_patch(self) -> (PermissionId, PermissionPatch) {
        let parent_id = if self.no_parent {
            Some(None)
        } else {
            self.parent.map(|p| Some(PermissionId(p)))
        };
        let patch = PermissionPatch {
            parent_id,
            level: self.level,
            name: self.name,
            code: self.code,
            path: nullable(self.path, self.clear_path),
            description: nullable(self.description, self.clear_description),
            sort: self.sort,
            enabled: self.enabled,
        };
        (PermissionId(self.id), patch)
    }
}

fn describe(p: &Permission) -> String {
    format!("{} [{}] #{} ({})", p.name, p.code, p.id, p.level)
}

pub async fn run(args: PermissionArgs, session: &Session) -> anyhow::Result<()> {
    let gatehouse = session.gatehouse().await?;
    match args.action {
        PermissionAction::List { json } => {
            let permissions = gatehouse
                .permissions()
                .await
                .context("Failed to list permissions")?;
            if json {
                return print_json(&permissions);
            }
            println!(
                "{:>6}  {:>6}  {:<6}  {:>5}  {:<3}  {:<24}  NAME",
                "ID", "PARENT", "LEVEL", "SORT", "ON", "CODE"
            );
            for p in &permissions {
                println!(
                    "{:>6}  {:>6}  {:<6}  {:>5}  {:<3}  {:<24}  {}",
                    p.id,
                    p.parent_id.map_or_else(|| "-".to_string(), |id| id.to_string()),
                    p.level.as_str(),
                    p.sort,
                    on_off(p.enabled),
                    p.code,
                    p.name
                );
            }
        }
        PermissionAction::Tree => {
            let forest = gatehouse
                .permission_tree()
                .await
                .context("Failed to load permissions")?;
            print_forest(&forest, describe);
        }
        PermissionAction::Add(add) => {
            let created = gatehouse
                .create_permission(add.into_new())
                .await
                .context("Failed to create permission")?;
            session.say(format!("Created permission {}", describe(&created)));
        }
        PermissionAction::Update(update) => {
            let (id, patch) = update.into_patch();
            let updated = gatehouse
                .update_permission(id, patch)
                .await
                .with_context(|| format!("Failed to update permission {id}"))?;
            session.say(format!("Updated permission {}", describe(&updated)));
        }
        PermissionAction::Remove { id } => {
            gatehouse
                .delete_permission(PermissionId(id))
                .await
                .with_context(|| format!("Failed to remove permission {id}"))?;
            session.say(format!("Removed permission #{id}"));
        }
        PermissionAction::Reorder { parent, ids } => {
            let ids: Vec<PermissionId> = ids.into_iter().map(PermissionId).collect();
            gatehouse
                .reorder_permissions(parent.map(PermissionId), &ids)
                .await
                .context("Failed to reorder permissions")?;
            session.say(format!("Reordered {} permissions", ids.len()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn add(parent: Option<i64>, level: Option<PermissionLevel>) -> AddArgs {
        AddArgs {
            code: "c".into(),
            name: "n".into(),
            parent,
            level,
            path: None,
            description: None,
            sort: 0,
            disabled: false,
        }
    }

    #[test]
    fn level_follows_parent_unless_given() {
        assert_eq!(add(None, None).into_new().level, PermissionLevel::Class);
        assert_eq!(add(Some(1), None).into_new().level, PermissionLevel::Method);
        assert_eq!(
            add(Some(1), Some(PermissionLevel::Class)).into_new().level,
            PermissionLevel::Class
        );
    }
}
