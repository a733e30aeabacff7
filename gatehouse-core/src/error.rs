/// Machine-checkable classification of a [`GatehouseError`].
///
/// Callers branch on the kind rather than matching message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Input violates a domain invariant (cycle, level, unknown ids, ...).
    Validation,
    /// The store rejected a write on a constraint that was not pre-checked.
    Conflict,
    /// The addressed entity does not exist.
    NotFound,
    /// Store I/O failed; the transaction was rolled back.
    Transient,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Conflict => "conflict",
            Self::NotFound => "not_found",
            Self::Transient => "transient",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Top-level Gatehouse error type.
///
/// All fallible operations in `gatehouse-core` return [`Result<T, GatehouseError>`](Result).
#[derive(thiserror::Error, Debug)]
pub enum GatehouseError {
    /// Caller input violates a domain invariant.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The addressed menu, permission or role does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Error from the store layer (`SQLite` operations, schema checks).
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Error decoding or encoding a configuration snapshot.
    #[error("Snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),

    /// Error in configuration parsing or validation.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl GatehouseError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Classify this error for callers.
    ///
    /// Constraint violations reported by `SQLite` become [`ErrorKind::Conflict`];
    /// every other store failure is [`ErrorKind::Transient`].
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) | Self::Snapshot(_) | Self::Config(_) => ErrorKind::Validation,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Store(StoreError::Sqlite(err)) if is_constraint_violation(err) => {
                ErrorKind::Conflict
            }
            Self::Store(StoreError::SchemaMismatch(_)) => ErrorKind::Validation,
            Self::Store(_) => ErrorKind::Transient,
        }
    }
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err.sqlite_error_code(),
        Some(rusqlite::ErrorCode::ConstraintViolation)
    )
}

/// Errors from the SQLite-backed store.
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    /// Underlying `SQLite` operation failed.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// An existing database file does not carry the expected columns.
    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    /// The connection mutex was poisoned by a panicking holder.
    #[error("Store connection poisoned")]
    Poisoned,

    /// Filesystem I/O error preparing the database location.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors decoding or encoding a snapshot document.
#[derive(thiserror::Error, Debug)]
pub enum SnapshotError {
    /// The document is not valid JSON for the snapshot shape.
    #[error("Invalid snapshot JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The top-level JSON value is an array or scalar.
    #[error("Snapshot must be a JSON object, found {0}")]
    NotAnObject(&'static str),

    /// The document declares a version newer than this build understands.
    #[error("Unsupported snapshot version {found} (supported: {supported})")]
    UnsupportedVersion {
        /// Version declared by the document.
        found: i64,
        /// Highest version this build can import.
        supported: i64,
    },
}

/// Errors in Gatehouse configuration parsing and validation.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// The configuration file does not exist at the expected path.
    #[error("Config file not found: {0}")]
    NotFound(String),

    /// Configuration values are present but semantically invalid.
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// Configuration file syntax could not be parsed (TOML error).
    #[error("Parse error: {0}")]
    Parse(String),
}

/// Convenience alias for `Result<T, GatehouseError>`.
pub type Result<T> = std::result::Result<T, GatehouseError>;
