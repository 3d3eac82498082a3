pub mod catalog;
pub mod config;
pub mod errors;
pub mod routing;

pub use catalog::schema::{ColumnInfo, QueryResult, TableInfo};
pub use catalog::{
    load_catalog, Catalog, CatalogEntry, CatalogEntryDraft, CatalogError, EntryOrigin, Measure,
};
pub use errors::DomainError;
pub use routing::{
    interpret_answer, plan_route, LexicalIndex, NotFoundReason, RoutePlan, RouteSource,
    RouterSettings, RoutingOutcome,
};
