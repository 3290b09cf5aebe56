//! geodepot Storage - Concurrency-Safe Access Layer
//!
//! Mediates every read, removal, reload and disposal of a backing store
//! shared by many request threads. The store itself is an external
//! collaborator behind the [`Store`] trait; this crate owns the locking
//! protocol, the name-indexed view cache and the provider facade.

pub mod cache;
pub mod guard;
pub mod memory;
pub mod provider;
pub mod resource_set;
pub mod store;
pub mod view;

pub use cache::{CacheEntry, CacheStats, ResourceCache};
pub use guard::{AccessGuard, GuardSnapshot, ReadSession, Session, SessionMode, WriteSession};
pub use memory::{MemoryResource, MemoryStore, RemovalMode};
pub use provider::Provider;
pub use resource_set::ResourceSet;
pub use store::{
    AggregateWriter, FeatureSet, FeatureType, FeatureWriter, FileSet, GridGeometry,
    GridGeometryError, GridResource, Resource, Store, StoreSupplier,
};
pub use view::{FeatureView, GridView, OpaqueView, View, ViewHeader};
