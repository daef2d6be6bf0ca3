//! Application services and ports.

#![forbid(unsafe_code)]

mod generic_repository;
mod generic_service;
mod query_compiler;
mod session;
mod store_ports;
mod user_service;

#[cfg(test)]
mod test_support;

pub use generic_repository::{FieldFilters, GenericRepository, ListOptions, RelationPath};
pub use generic_service::{EntityInput, GenericService};
pub use query_compiler::{
    Combinator, apply_condition_filter, apply_equality_filters, apply_search_filter,
};
pub use session::{Propagation, Session};
pub use store_ports::{
    FieldPath, PendingWrite, Predicate, QueryPlan, SessionBackend, SessionFactory, SortKey, Window,
};
pub use user_service::{SignInData, UserChanges, UserService};
