use serde::{Deserialize, Serialize};

use super::claims::Role;
use crate::store::{Collection, Document, DocumentStore, Query};

pub const USERS: &str = "users";

/// User record; the document id is the uid.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub email: String,
    #[serde(default)]
    pub display_name: Option<String>,
    pub password_hash: String,
    #[serde(default)]
    pub role: Role,
    pub created_at: String,
}

pub fn users(store: &dyn DocumentStore) -> Collection<'_, User> {
    Collection::new(store, USERS)
}

impl User {
    /// Find a user by (already normalized) email.
    pub async fn find_by_email(
        store: &dyn DocumentStore,
        email: &str,
    ) -> anyhow::Result<Option<Document<User>>> {
        let q = Query::new().filter("email", email).page(1, 0);
        Ok(users(store).find(&q).await?.into_iter().next())
    }

    pub async fn find_by_id(
        store: &dyn DocumentStore,
        uid: &str,
    ) -> anyhow::Result<Option<Document<User>>> {
        users(store).get(uid).await
    }

    pub async fn create(store: &dyn DocumentStore, user: User) -> anyhow::Result<Document<User>> {
        users(store).add(user).await
    }
}
