//! Tables, field names and key-value index layout.
//!
//! On the key-value store every table carries a constant [`DATA_TYPE_ATTRIBUTE`]
//! discriminator. Every secondary index is partitioned by that discriminator,
//! so "all rows of a table" is an index query rather than a full table scan.
//! Indexes other than [`DATA_TYPE_INDEX`] add a sort key that filters can bind.

/// Primary key field on the document store.
pub const DOCUMENT_ID_FIELD: &str = "_id";
/// Partition key attribute on the key-value store.
pub const KEY_VALUE_ID_ATTRIBUTE: &str = "ID";
/// Entity-type discriminator attribute on the key-value store.
pub const DATA_TYPE_ATTRIBUTE: &str = "dataType";
/// Index partitioned by the discriminator alone.
pub const DATA_TYPE_INDEX: &str = "DataTypeGSI";

/// Persisted field names.
pub mod fields {
    pub const ID: &str = "id";
    pub const TITLE: &str = "title";
    pub const DESCRIPTION: &str = "description";
    pub const DUE_DATE: &str = "dueDate";
    pub const COMPLETED: &str = "completed";
    pub const ASSIGNED_TO: &str = "assignedTo";
    pub const PROJECT_ID: &str = "projectID";
    pub const NAME: &str = "name";
    pub const USER_ID: &str = "userID";
    pub const TASKS: &str = "tasks";
    pub const EMAIL: &str = "email";
    pub const ENCRYPTED_PASSWORD: &str = "encryptedPassword";
    pub const ENABLED: &str = "enabled";
    pub const AUTH_UUID: &str = "authUUID";
    pub const EXPIRATION_TIME: &str = "expirationTime";
}

/// A table on the key-value store, or a collection on the document store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Tasks,
    Projects,
    Users,
    Auths,
}

impl Table {
    /// Table or collection name.
    pub fn name(&self) -> &'static str {
        match self {
            Table::Tasks => "tasks",
            Table::Projects => "projects",
            Table::Users => "users",
            Table::Auths => "auths",
        }
    }

    /// Value of the discriminator attribute for rows of this table.
    pub fn data_type(&self) -> &'static str {
        match self {
            Table::Tasks => "task",
            Table::Projects => "project",
            Table::Users => "user",
            Table::Auths => "auth",
        }
    }

    pub fn schema(&self) -> &'static TableSchema {
        match self {
            Table::Tasks => &TASKS_SCHEMA,
            Table::Projects => &PROJECTS_SCHEMA,
            Table::Users => &USERS_SCHEMA,
            Table::Auths => &AUTHS_SCHEMA,
        }
    }
}

/// A secondary index partitioned by the discriminator and sorted by `sort_key`.
#[derive(Debug)]
pub struct SecondaryIndex {
    pub name: &'static str,
    pub sort_key: &'static str,
}

/// Index layout of one table.
#[derive(Debug)]
pub struct TableSchema {
    pub table: Table,
    pub indexes: &'static [SecondaryIndex],
}

impl TableSchema {
    /// Returns the index sorted by `field`, if any.
    pub fn index_for(&self, field: &str) -> Option<&'static SecondaryIndex> {
        self.indexes
            .iter()
            .find(|index| index.sort_key == field)
    }

    /// Returns `true` if `field` is part of an index key on this table.
    pub fn is_index_key(&self, field: &str) -> bool {
        field == DATA_TYPE_ATTRIBUTE || self.index_for(field).is_some()
    }
}

static TASKS_SCHEMA: TableSchema = TableSchema {
    table: Table::Tasks,
    indexes: &[
        SecondaryIndex { name: "AssignedToGSI", sort_key: fields::ASSIGNED_TO },
        SecondaryIndex { name: "ProjectGSI", sort_key: fields::PROJECT_ID },
    ],
};

static PROJECTS_SCHEMA: TableSchema = TableSchema {
    table: Table::Projects,
    indexes: &[],
};

static USERS_SCHEMA: TableSchema = TableSchema {
    table: Table::Users,
    indexes: &[SecondaryIndex { name: "EmailGSI", sort_key: fields::EMAIL }],
};

static AUTHS_SCHEMA: TableSchema = TableSchema {
    table: Table::Auths,
    indexes: &[SecondaryIndex { name: "AuthUserGSI", sort_key: fields::USER_ID }],
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_lookup() {
        let schema = Table::Tasks.schema();

        assert_eq!(schema.index_for(fields::ASSIGNED_TO).map(|i| i.name), Some("AssignedToGSI"));
        assert!(schema.index_for(fields::COMPLETED).is_none());
        assert!(schema.is_index_key(DATA_TYPE_ATTRIBUTE));
        assert!(!Table::Projects.schema().is_index_key(fields::TASKS));
    }
}
