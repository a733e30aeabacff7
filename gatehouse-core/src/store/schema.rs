/// Full SQL schema for the Gatehouse `SQLite` database.
///
/// Every statement is idempotent; the batch runs on every open.
pub const SCHEMA_SQL: &str = r"
-- Navigation menus (self-referential forest)
CREATE TABLE IF NOT EXISTS menu (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    parent_id INTEGER REFERENCES menu(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    code TEXT NOT NULL UNIQUE,
    path TEXT,
    icon TEXT,
    sort INTEGER NOT NULL DEFAULT 0,
    enabled INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now')),
    updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now'))
);
CREATE INDEX IF NOT EXISTS idx_menu_parent ON menu(parent_id);

-- Permissions (class -> method, two levels)
CREATE TABLE IF NOT EXISTS permission (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    parent_id INTEGER REFERENCES permission(id) ON DELETE CASCADE,
    level TEXT NOT NULL CHECK (level IN ('class', 'method')),
    name TEXT NOT NULL,
    code TEXT NOT NULL UNIQUE,
    path TEXT,
    description TEXT,
    sort INTEGER NOT NULL DEFAULT 0,
    enabled INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now')),
    updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now'))
);
CREATE INDEX IF NOT EXISTS idx_permission_parent ON permission(parent_id);

-- Roles (flat)
CREATE TABLE IF NOT EXISTS role (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    code TEXT NOT NULL UNIQUE,
    owner TEXT,
    description TEXT,
    enabled INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now')),
    updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now'))
);

-- Role <-> menu links
CREATE TABLE IF NOT EXISTS role_menu (
    role_id INTEGER NOT NULL REFERENCES role(id) ON DELETE CASCADE,
    menu_id INTEGER NOT NULL REFERENCES menu(id) ON DELETE CASCADE,
    PRIMARY KEY (role_id, menu_id)
);
CREATE INDEX IF NOT EXISTS idx_role_menu_menu ON role_menu(menu_id);

-- Role <-> permission links
CREATE TABLE IF NOT EXISTS role_permission (
    role_id INTEGER NOT NULL REFERENCES role(id) ON DELETE CASCADE,
    permission_id INTEGER NOT NULL REFERENCES permission(id) ON DELETE CASCADE,
    PRIMARY KEY (role_id, permission_id)
);
CREATE INDEX IF NOT EXISTS idx_role_permission_permission ON role_permission(permission_id);
";

/// Columns each table must carry for this build to operate on an existing file.
pub const REQUIRED_COLUMNS: &[(&str, &[&str])] = &[
    (
        "menu",
        &[
            "id",
            "parent_id",
            "name",
            "code",
            "path",
            "icon",
            "sort",
            "enabled",
            "created_at",
            "updated_at",
        ],
    ),
    (
        "permission",
        &[
            "id",
            "parent_id",
            "level",
            "name",
            "code",
            "path",
            "description",
            "sort",
            "enabled",
            "created_at",
            "updated_at",
        ],
    ),
    (
        "role",
        &[
            "id",
            "name",
            "code",
            "owner",
            "description",
            "enabled",
            "created_at",
            "updated_at",
        ],
    ),
    ("role_menu", &["role_id", "menu_id"]),
    ("role_permission", &["role_id", "permission_id"]),
];
