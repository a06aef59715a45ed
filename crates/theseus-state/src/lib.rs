//! theseus-state — embedded entity store for Theseus.
//!
//! Backed by [redb](https://docs.rs/redb), provides durable storage for the
//! container, host machine, user, team, and organization records.
//!
//! # Architecture
//!
//! The [`EntityStore`] is an untyped layer: five fixed collections of
//! `&str` key → `&[u8]` value pairs with atomic `update`, point `read`, and
//! snapshot `scan`. On top of it, a [`Repository`] per entity kind owns the
//! JSON encoding and turns missing or undecodable records into
//! [`StateError::NotFound`] and [`StateError::CorruptRecord`].
//!
//! redb allows one writer at a time and any number of readers, each against
//! its own snapshot. The store handle is `Clone` + `Send` + `Sync` (backed by
//! `Arc<Database>`) and is meant to be opened once per process and passed
//! explicitly to whoever needs it.

pub mod error;
pub mod repository;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use repository::{Entity, Repositories, Repository};
pub use store::EntityStore;
pub use tables::Collection;
pub use types::*;
