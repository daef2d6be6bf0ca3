use tessera_core::AppResult;
use tessera_domain::{
    EntitySchema, FieldDefinition, FieldValue, RelationCardinality, RelationDefinition,
};

/// Attribute reference resolved against entity schemas.
#[derive(Debug, Clone, Copy)]
pub enum FieldPath {
    /// Attribute of the queried entity.
    Root(&'static FieldDefinition),
    /// Attribute of an entity reached through one relation.
    Related {
        /// Traversed relation.
        relation: &'static RelationDefinition,
        /// Owner-side join attribute.
        local: &'static FieldDefinition,
        /// Target-side join attribute.
        remote: &'static FieldDefinition,
        /// Compared attribute on the target entity.
        field: &'static FieldDefinition,
    },
}

impl FieldPath {
    /// Resolves an attribute of the root entity.
    pub fn root(schema: &'static EntitySchema, name: &str) -> AppResult<Self> {
        Ok(Self::Root(schema.field(name)?))
    }

    /// Resolves an attribute reached through a relation of the root entity.
    pub fn related(schema: &'static EntitySchema, relation: &str, name: &str) -> AppResult<Self> {
        let relation = schema.relation(relation)?;
        let target = relation.target();

        Ok(Self::Related {
            relation,
            local: schema.field(relation.local_field())?,
            remote: target.field(relation.remote_field())?,
            field: target.field(name)?,
        })
    }

    /// Returns the compared attribute.
    #[must_use]
    pub fn field(&self) -> &'static FieldDefinition {
        match self {
            Self::Root(field) | Self::Related { field, .. } => field,
        }
    }

    /// Returns whether the path fans out over a to-many relation.
    #[must_use]
    pub fn is_to_many(&self) -> bool {
        matches!(
            self,
            Self::Related { relation, .. }
                if relation.cardinality() == RelationCardinality::ToMany
        )
    }
}

/// Boolean condition over the rows of a query plan.
#[derive(Debug, Clone)]
pub enum Predicate {
    /// Equality; a `Null` value matches missing values.
    Equals {
        /// Compared attribute.
        path: FieldPath,
        /// Expected value.
        value: FieldValue,
    },
    /// Case-sensitive substring containment on the text rendering of the value.
    Contains {
        /// Compared attribute.
        path: FieldPath,
        /// Substring looked for.
        needle: String,
    },
    /// Membership of a root attribute in a value set.
    OneOf {
        /// Compared attribute.
        field: &'static FieldDefinition,
        /// Accepted values.
        values: Vec<FieldValue>,
    },
    /// Every child must hold; an empty list holds.
    All(Vec<Predicate>),
    /// Any child must hold; an empty list does not hold.
    Any(Vec<Predicate>),
}

/// Ordering instruction.
#[derive(Debug, Clone)]
pub enum SortKey {
    /// Order by an attribute; missing values sort last ascending and first descending.
    Field {
        /// Sorted attribute.
        field: &'static FieldDefinition,
        /// Descending direction.
        descending: bool,
    },
    /// Rows whose key appears in `ids` come first in list order; other rows follow.
    KeyPriority {
        /// Primary key attribute.
        key: &'static FieldDefinition,
        /// Prioritised primary keys.
        ids: Vec<i64>,
    },
}

/// Offset pagination window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    /// Rows skipped.
    pub offset: u64,
    /// Maximum rows returned.
    pub limit: u32,
}

/// Store-independent description of a read over one entity table.
#[derive(Debug, Clone)]
pub struct QueryPlan {
    /// Queried entity.
    pub entity: &'static EntitySchema,
    /// Conditions conjoined onto the query.
    pub predicates: Vec<Predicate>,
    /// Each root row is returned at most once.
    pub distinct: bool,
    /// Optional pagination window.
    pub window: Option<Window>,
    /// Ordering keys, most significant first.
    pub ordering: Vec<SortKey>,
}

impl QueryPlan {
    /// Creates an unfiltered plan over an entity.
    #[must_use]
    pub fn new(entity: &'static EntitySchema) -> Self {
        Self {
            entity,
            predicates: Vec::new(),
            distinct: false,
            window: None,
            ordering: Vec::new(),
        }
    }

    /// Conjoins a predicate onto the plan.
    pub fn and_where(&mut self, predicate: Predicate) {
        self.predicates.push(predicate);
    }
}
