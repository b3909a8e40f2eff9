mod transaction;
mod versioned_schema;

pub use transaction::{ScopedConnection, TransactionMode, TransactionScope};
pub use versioned_schema::*;
