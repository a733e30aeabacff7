use anyhow::Context;
use clap::{Args, Subcommand};

use gatehouse_core::types::{Menu, MenuId, MenuPatch, NewMenu};

use super::{Session, nullable, on_off, print_forest, print_json};

#[derive(Args, Debug)]
pub struct MenuArgs {
    #[command(subcommand)]
    pub action: MenuAction,
}

#[derive(Subcommand, Debug)]
pub enum MenuAction {
    /// List every menu in sibling order
    List {
        /// Print rows as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the menu forest
    Tree,
    /// Create a menu
    Add(AddArgs),
    /// Change fields of an existing menu
    Update(UpdateArgs),
    /// Delete a menu and everything below it
    Remove {
        id: i64,
    },
    /// Renumber siblings in the given order (sort = 10, 20, 30, ...)
    Reorder {
        /// Common parent of the listed menus (omit for roots)
        #[arg(long)]
        parent: Option<i64>,
        /// Menu ids in their new order
        ids: Vec<i64>,
    },
}

#[derive(Args, Debug)]
pub struct AddArgs {
    /// Unique code
    pub code: String,
    /// Display name
    pub name: String,
    #[arg(long)]
    pub parent: Option<i64>,
    #[arg(long)]
    pub path: Option<String>,
    #[arg(long)]
    pub icon: Option<String>,
    #[arg(long, default_value_t = 0)]
    pub sort: i64,
    /// Create the menu disabled
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
    /// Move under another menu
    #[arg(long, conflicts_with = "root")]
    pub parent: Option<i64>,
    /// Move to the top level
    #[arg(long)]
    pub root: bool,
    #[arg(long, conflicts_with = "clear_path")]
    pub path: Option<String>,
    #[arg(long)]
    pub clear_path: bool,
    #[arg(long, conflicts_with = "clear_icon")]
    pub icon: Option<String>,
    #[arg(long)]
    pub clear_icon: bool,
    #[arg(long)]
    pub sort: Option<i64>,
    #[arg(long, action = clap::ArgAction::Set)]
    pub enabled: Option<bool>,
}

impl UpdateArgs {
    fn into_patch(self) -> (MenuId, MenuPatch) {
        let parent_id = if self.root {
            Some(None)
        } else {
            self.parent.map(|p| Some(MenuId(p)))
        };
        let patch = MenuPatch {
            parent_id,
            name: self.name,
            code: self.code,
            path: nullable(self.path, self.clear_path),
            icon: nullable(self.icon, self.clear_icon),
            sort: self.sort,
            enabled: self.enabled,
        };
        (MenuId(self.id), patch)
    }
}

fn describe(menu: &Menu) -> String {
    format!("{} [{}] #{}", menu.name, menu.code, menu.id)
}

pub async fn run(args: MenuArgs, session: &Session) -> anyhow::Result<()> {
    let gatehouse = session.gatehouse().await?;
    match args.action {
        MenuAction::List { json } => {
            let menus = gatehouse.menus().await.context("Failed to list menus")?;
            if json {
                return print_json(&menus);
            }
            println!(
                "{:>6}  {:>6}  {:>5}  {:<3}  {:<20}  {:<24}  PATH",
                "ID", "PARENT", "SORT", "ON", "CODE", "NAME"
            );
            for m in &menus {
                println!(
                    "{:>6}  {:>6}  {:>5}  {:<3}  {:<20}  {:<24}  {}",
                    m.id,
                    m.parent_id.map_or_else(|| "-".to_string(), |p| p.to_string()),
                    m.sort,
                    on_off(m.enabled),
                    m.code,
                    m.name,
                    m.path.as_deref().unwrap_or("")
                );
            }
        }
        MenuAction::Tree => {
            let forest = gatehouse.menu_tree().await.context("Failed to load menus")?;
            print_forest(&forest, |m: &Menu| {
                if m.enabled {
                    describe(m)
                } else {
                    format!("{} (disabled)", describe(m))
                }
            });
        }
        MenuAction::Add(add) => {
            let menu = NewMenu {
                parent_id: add.parent.map(MenuId),
                path: add.path,
                icon: add.icon,
                sort: add.sort,
                enabled: !add.disabled,
                ..NewMenu::new(add.code, add.name)
            };
            let created = gatehouse
                .create_menu(menu)
                .await
                .context("Failed to create menu")?;
            session.say(format!("Created menu {}", describe(&created)));
        }
        MenuAction::Update(update) => {
            let (id, patch) = update.into_patch();
            let updated = gatehouse
                .update_menu(id, patch)
                .await
                .with_context(|| format!("Failed to update menu {id}"))?;
            session.say(format!("Updated menu {}", describe(&updated)));
        }
        MenuAction::Remove { id } => {
            gatehouse
                .delete_menu(MenuId(id))
                .await
                .with_context(|| format!("Failed to remove menu {id}"))?;
            session.say(format!("Removed menu #{id}"));
        }
        MenuAction::Reorder { parent, ids } => {
            let ids: Vec<MenuId> = ids.into_iter().map(MenuId).collect();
            gatehouse
                .reorder_menus(parent.map(MenuId), &ids)
                .await
                .context("Failed to reorder menus")?;
            session.say(format!("Reordered {} menus", ids.len()));
        }
    }
    Ok(())
}
