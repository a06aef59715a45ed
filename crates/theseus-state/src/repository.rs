//! Typed repositories over the entity store.
//!
//! A [`Repository<E>`] owns the JSON encoding of one entity kind. Reads are
//! strict: a missing key is [`StateError::NotFound`], and bytes that do not
//! decode into `E` (or decode to a record filed under a different key) are
//! [`StateError::CorruptRecord`]. `list_all` fails as a whole on the first
//! corrupt record instead of returning a partial result.

use std::marker::PhantomData;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::error::{StateError, StateResult};
use crate::store::EntityStore;
use crate::tables::Collection;
use crate::types::*;

/// A record persisted under a natural key in a fixed collection.
pub trait Entity: Serialize + DeserializeOwned {
    const COLLECTION: Collection;
    /// Label used in errors and logs.
    const KIND: &'static str;

    fn key(&self) -> &str;
}

impl Entity for Container {
    const COLLECTION: Collection = Collection::Containers;
    const KIND: &'static str = "container";

    fn key(&self) -> &str {
        &self.id
    }
}

impl Entity for HostMachine {
    const COLLECTION: Collection = Collection::HostMachines;
    const KIND: &'static str = "host machine";

    fn key(&self) -> &str {
        &self.id
    }
}

impl Entity for User {
    const COLLECTION: Collection = Collection::Users;
    const KIND: &'static str = "user";

    fn key(&self) -> &str {
        &self.username
    }
}

impl Entity for Team {
    const COLLECTION: Collection = Collection::Teams;
    const KIND: &'static str = "team";

    fn key(&self) -> &str {
        &self.name
    }
}

impl Entity for Organization {
    const COLLECTION: Collection = Collection::Organizations;
    const KIND: &'static str = "organization";

    fn key(&self) -> &str {
        &self.name
    }
}

/// Save / get / list for one entity kind.
pub struct Repository<E> {
    store: EntityStore,
    _entity: PhantomData<fn() -> E>,
}

// Manual impl: a derive would require `E: Clone`.
impl<E> Clone for Repository<E> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            _entity: PhantomData,
        }
    }
}

impl<E: Entity> Repository<E> {
    pub fn new(store: EntityStore) -> Self {
        Self {
            store,
            _entity: PhantomData,
        }
    }

    /// Insert or overwrite `entity` under its natural key (last writer wins).
    pub fn save(&self, entity: &E) -> StateResult<()> {
        let key = entity.key();
        let value = serde_json::to_vec(entity).map_err(|e| StateError::Serialize {
            kind: E::KIND,
            key: key.to_string(),
            reason: e.to_string(),
        })?;
        self.store.update(E::COLLECTION, key, &value)?;
        debug!(kind = E::KIND, %key, "entity saved");
        Ok(())
    }

    /// Fetch the entity stored under `key`.
    pub fn get_by_key(&self, key: &str) -> StateResult<E> {
        let bytes = self
            .store
            .read(E::COLLECTION, key)?
            .ok_or_else(|| StateError::NotFound {
                kind: E::KIND,
                key: key.to_string(),
            })?;
        decode(key, &bytes)
    }

    /// Every entity in the collection, in key order.
    pub fn list_all(&self) -> StateResult<Vec<E>> {
        self.store
            .scan(E::COLLECTION)?
            .iter()
            .map(|(key, bytes)| decode(key, bytes))
            .collect()
    }
}

fn decode<E: Entity>(key: &str, bytes: &[u8]) -> StateResult<E> {
    let corrupt = |reason: String| {
        warn!(kind = E::KIND, %key, %reason, "corrupt record");
        StateError::CorruptRecord {
            kind: E::KIND,
            key: key.to_string(),
            reason,
        }
    };
    let entity: E = serde_json::from_slice(bytes).map_err(|e| corrupt(e.to_string()))?;
    if entity.key() != key {
        return Err(corrupt(format!("record carries key {:?}", entity.key())));
    }
    Ok(entity)
}

/// One repository per entity kind, all sharing a single store handle.
#[derive(Clone)]
pub struct Repositories {
    pub containers: Repository<Container>,
    pub hosts: Repository<HostMachine>,
    pub users: Repository<User>,
    pub teams: Repository<Team>,
    pub organizations: Repository<Organization>,
}

impl Repositories {
    pub fn new(store: &EntityStore) -> Self {
        Self {
            containers: Repository::new(store.clone()),
            hosts: Repository::new(store.clone()),
            users: Repository::new(store.clone()),
            teams: Repository::new(store.clone()),
            organizations: Repository::new(store.clone()),
        }
    }
}
