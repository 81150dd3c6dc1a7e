//! GraphDB core: an embeddable triple store with lazy chain queries.
//!
//! Layers, leaves first:
//!
//! 1. **Interning** ([`IdentityStore`]): every distinct value becomes one
//!    stable [`ItemId`]; equal values always resolve to the same id.
//! 2. **Relation indexes** ([`RelationIndex`]): `(subject, predicate, object)`
//!    triples with a forward `(subject, predicate) -> objects` index and a
//!    mirrored reverse `(object, predicate) -> subjects` index.
//! 3. **Query chains** ([`QueryChain`]): immutable, lazily evaluated
//!    expand/filter pipelines over the indexes.
//! 4. **Facade** ([`GraphStore`]): value-level API, idempotent mutation,
//!    optional mirroring into a [`PersistentBackend`].
//!
//! ```
//! use graphdb_core::{GraphStore, Value};
//!
//! let mut db = GraphStore::new();
//! db.store_relation(Value::from(1), "precedes", Value::from(2)).unwrap();
//! db.store_relation(Value::from(2), "precedes", Value::from(3)).unwrap();
//!
//! let two_hops: Vec<Value> = db
//!     .chain(&Value::from(1))
//!     .expand("precedes")
//!     .expand("precedes")
//!     .collect_into(&db)
//!     .unwrap();
//! assert_eq!(two_hops, vec![Value::from(3)]);
//! ```

pub mod backend;
pub mod error;
pub mod identity;
pub mod query;
pub mod relation_index;
pub mod shared;
pub mod store;
pub mod value;

pub use backend::{PersistentBackend, Snapshot};
pub use error::{GraphError, Result};
pub use identity::{IdentityStore, ItemId};
pub use query::{QueryChain, Step, ValuePredicate, Values};
pub use relation_index::RelationIndex;
pub use shared::SharedGraphStore;
pub use store::{GraphStore, StoreOptions};
pub use value::Value;
