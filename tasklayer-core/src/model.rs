//! Domain entities.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    entity::Entity,
    id::Id,
    schema::{Table, fields},
};

/// A unit of work, optionally assigned to a user and part of a project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    #[serde(default)]
    pub id: Id,
    pub title: String,
    pub description: String,
    pub due_date: DateTime<Utc>,
    pub completed: bool,
    // Unset references are left out of the record so they never land in a
    // secondary index as an empty key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<Id>,
    #[serde(rename = "projectID", default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<Id>,
}

impl Task {
    pub fn new(title: impl Into<String>, description: impl Into<String>, due_date: DateTime<Utc>) -> Self {
        Self {
            id: Id::default(),
            title: title.into(),
            description: description.into(),
            due_date,
            completed: false,
            assigned_to: None,
            project_id: None,
        }
    }
}

impl Entity for Task {
    const TABLE: Table = Table::Tasks;
    const REFERENCE_FIELDS: &'static [&'static str] = &[fields::ASSIGNED_TO, fields::PROJECT_ID];

    fn id(&self) -> &Id {
        &self.id
    }

    fn set_id(&mut self, id: Id) {
        self.id = id;
    }
}

/// A named group of tasks owned by a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    #[serde(default)]
    pub id: Id,
    pub name: String,
    pub description: String,
    #[serde(rename = "userID", default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<Id>,
    pub tasks: Vec<Id>,
}

impl Project {
    /// Creates a project with an initialized, empty task list.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: Id::default(),
            name: name.into(),
            description: description.into(),
            user_id: None,
            tasks: Vec::new(),
        }
    }

    pub fn with_owner(mut self, user: Id) -> Self {
        self.user_id = Some(user);
        self
    }

    pub fn contains_task(&self, task: &Id) -> bool {
        self.tasks.contains(task)
    }
}

impl Entity for Project {
    const TABLE: Table = Table::Projects;
    const REFERENCE_FIELDS: &'static [&'static str] = &[fields::USER_ID, fields::TASKS];

    fn id(&self) -> &Id {
        &self.id
    }

    fn set_id(&mut self, id: Id) {
        self.id = id;
    }
}

/// An account. The password arrives already encrypted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(default)]
    pub id: Id,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub encrypted_password: String,
    pub is_admin: bool,
    pub enabled: bool,
}

impl User {
    pub fn new(
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        email: impl Into<String>,
        encrypted_password: impl Into<String>,
    ) -> Self {
        Self {
            id: Id::default(),
            first_name: first_name.into(),
            last_name: last_name.into(),
            email: email.into(),
            encrypted_password: encrypted_password.into(),
            is_admin: false,
            enabled: true,
        }
    }
}

impl Entity for User {
    const TABLE: Table = Table::Users;
    const REFERENCE_FIELDS: &'static [&'static str] = &[];

    fn id(&self) -> &Id {
        &self.id
    }

    fn set_id(&mut self, id: Id) {
        self.id = id;
    }
}

/// A login session of a user.
///
/// `auth_uuid` is the secret shared with the issued token; together with the
/// user it identifies the session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Auth {
    #[serde(default)]
    pub id: Id,
    #[serde(rename = "userID")]
    pub user_id: Id,
    #[serde(rename = "authUUID")]
    pub auth_uuid: String,
    #[serde(rename = "expirationTime")]
    pub expiration_time: DateTime<Utc>,
}

impl Auth {
    /// Opens a session for `user` with a fresh random UUID.
    pub fn new(user_id: Id, expiration_time: DateTime<Utc>) -> Self {
        Self {
            id: Id::default(),
            user_id,
            auth_uuid: Uuid::new_v4().hyphenated().to_string(),
            expiration_time,
        }
    }

    /// The lookup key of this session.
    pub fn filter(&self) -> AuthFilter {
        AuthFilter {
            user_id: self.user_id.clone(),
            auth_uuid: self.auth_uuid.clone(),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiration_time <= now
    }
}

impl Entity for Auth {
    const TABLE: Table = Table::Auths;
    const REFERENCE_FIELDS: &'static [&'static str] = &[fields::USER_ID];

    fn id(&self) -> &Id {
        &self.id
    }

    fn set_id(&mut self, id: Id) {
        self.id = id;
    }
}

/// Identifies a session by its user and UUID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthFilter {
    pub user_id: Id,
    pub auth_uuid: String,
}
