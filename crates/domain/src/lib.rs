//! Domain entities, entity descriptors and the list query model.

#![forbid(unsafe_code)]

mod entity;
mod query;
mod tenant;
mod user;

pub use entity::{
    Entity, EntityRow, EntitySchema, FieldDefinition, FieldGetter, FieldRegistry, FieldSetter,
    FieldType, FieldValue, FromFieldValue, RelationAttacher, RelationCardinality,
    RelationDefinition, assign,
};
pub use query::{
    DEFAULT_PAGE_LIMIT, FilterItem, FilterSchema, FilterValue, MAX_PAGE_LIMIT, PaddingSchema,
    ScalarValue, SearchItem, SearchSchema, SearchValue, SortSchema,
};
pub use tenant::{Tenant, validate_slug};
pub use user::{EmailAddress, SocialProvider, Timezone, User};
