//! redb table definitions for the Theseus entity store.
//!
//! Each collection is one table with `&str` keys (the entity's natural key)
//! and `&[u8]` values (the JSON-encoded entity).

use std::fmt;

use redb::TableDefinition;

/// Containers keyed by `{id}`.
pub const CONTAINERS: TableDefinition<&str, &[u8]> = TableDefinition::new("Containers");

/// Host machines keyed by `{id}`.
pub const HOST_MACHINES: TableDefinition<&str, &[u8]> = TableDefinition::new("HostMachines");

/// Users keyed by `{username}`.
pub const USERS: TableDefinition<&str, &[u8]> = TableDefinition::new("Users");

/// Teams keyed by `{name}`.
pub const TEAMS: TableDefinition<&str, &[u8]> = TableDefinition::new("Teams");

/// Organizations keyed by `{name}`.
pub const ORGANIZATIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("Organizations");

/// The fixed set of collections every store carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Containers,
    HostMachines,
    Users,
    Teams,
    Organizations,
}

impl Collection {
    pub const ALL: [Collection; 5] = [
        Collection::Containers,
        Collection::HostMachines,
        Collection::Users,
        Collection::Teams,
        Collection::Organizations,
    ];

    pub fn definition(self) -> TableDefinition<'static, &'static str, &'static [u8]> {
        match self {
            Collection::Containers => CONTAINERS,
            Collection::HostMachines => HOST_MACHINES,
            Collection::Users => USERS,
            Collection::Teams => TEAMS,
            Collection::Organizations => ORGANIZATIONS,
        }
    }

    /// On-disk table name.
    pub fn name(self) -> &'static str {
        match self {
            Collection::Containers => "Containers",
            Collection::HostMachines => "HostMachines",
            Collection::Users => "Users",
            Collection::Teams => "Teams",
            Collection::Organizations => "Organizations",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
