mod query_plan;
mod session_backend;

pub use query_plan::{FieldPath, Predicate, QueryPlan, SortKey, Window};
pub use session_backend::{PendingWrite, SessionBackend, SessionFactory};
