//! Browse queries: option bags and rule sets translated into SQL
//! predicates over the library views.

mod browse;
mod builder;
mod options;
mod predicate;
mod rules;

pub use browse::{BrowseResult, ItemSummary, LibraryBrowse, MISSING_ARTIST_LABEL_KEY};
pub use builder::{combine_credits, QueryBuilder, QueryPlan};
pub(crate) use builder::label_column;
pub use options::{BrowseOptions, EntityKind, IdOrName, Page, RoleFilter, SortField, SortSpec};
pub use predicate::{escape_like, CompareOp, Predicate};
pub use rules::{Rule, RuleField, RuleOperator, RuleSet};
