//! Store handle, schema, and the exclusive-writer serializer.
//!
//! Every mutation in the crate is a [`UnitOfWork`] executed through
//! [`Store::run_exclusive`]; plain reads go straight to the [`Store`].

pub mod schema;
pub mod serializer;
pub mod sqlite;

pub use serializer::{SerializerStats, UnitOfWork, WriteSerializer};
pub use sqlite::{Execution, LazyStore, Store};
