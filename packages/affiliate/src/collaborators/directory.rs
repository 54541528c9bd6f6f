//! Read-only view of the user accounts the ledger refers to.

use std::collections::HashMap;

use async_trait::async_trait;
use sea_orm::{
    ColumnTrait, Condition, DatabaseConnection, EntityTrait, QueryFilter, QuerySelect,
    prelude::Expr,
    sea_query::{Func, LikeExpr, SimpleExpr},
};
use serde::{Deserialize, Serialize};

use crate::entity::user;
use crate::error::Result;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DirectoryUser {
    pub id: String,
    pub name: String,
    pub email: String,
    pub referral_code: Option<String>,
}

impl From<user::Model> for DirectoryUser {
    fn from(model: user::Model) -> Self {
        Self {
            id: model.id,
            name: model.name,
            email: model.email,
            referral_code: model.referral_code,
        }
    }
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_user(&self, user_id: &str) -> Result<Option<DirectoryUser>>;

    /// Batch lookup keyed by user id. Unknown ids are absent from the map.
    async fn find_users(&self, user_ids: &[String]) -> Result<HashMap<String, DirectoryUser>>;

    /// Case-insensitive substring match on name or email.
    async fn search_user_ids(&self, query: &str) -> Result<Vec<String>>;

    /// The non-disabled user owning `code`.
    async fn find_active_by_referral_code(&self, code: &str) -> Result<Option<DirectoryUser>>;
}

/// Reads the `users` table.
#[derive(Clone, Debug)]
pub struct DbUserDirectory {
    db: DatabaseConnection,
}

impl DbUserDirectory {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

const LIKE_ESCAPE: char = '\\';

/// Escapes `LIKE` wildcards so the text matches literally.
fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '%' | '_' | LIKE_ESCAPE) {
            escaped.push(LIKE_ESCAPE);
        }
        escaped.push(c);
    }
    escaped
}

fn lower_like(column: user::Column, pattern: &str) -> SimpleExpr {
    Expr::expr(Func::lower(Expr::col(column))).like(LikeExpr::new(pattern).escape(LIKE_ESCAPE))
}

#[async_trait]
impl UserDirectory for DbUserDirectory {
    async fn find_user(&self, user_id: &str) -> Result<Option<DirectoryUser>> {
        let user = user::Entity::find_by_id(user_id.to_string())
            .one(&self.db)
            .await?;
        Ok(user.map(DirectoryUser::from))
    }

    async fn find_users(&self, user_ids: &[String]) -> Result<HashMap<String, DirectoryUser>> {
        if user_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let users = user::Entity::find()
            .filter(user::Column::Id.is_in(user_ids.iter().cloned()))
            .all(&self.db)
            .await?;
        Ok(users
            .into_iter()
            .map(|u| (u.id.clone(), DirectoryUser::from(u)))
            .collect())
    }

    async fn search_user_ids(&self, query: &str) -> Result<Vec<String>> {
        let pattern = format!("%{}%", escape_like(&query.trim().to_lowercase()));
        let ids = user::Entity::find()
            .select_only()
            .column(user::Column::Id)
            .filter(
                Condition::any()
                    .add(lower_like(user::Column::Name, &pattern))
                    .add(lower_like(user::Column::Email, &pattern)),
            )
            .into_tuple::<String>()
            .all(&self.db)
            .await?;
        Ok(ids)
    }

    async fn find_active_by_referral_code(&self, code: &str) -> Result<Option<DirectoryUser>> {
        let user = user::Entity::find()
            .filter(user::Column::ReferralCode.eq(code))
            .filter(user::Column::DisabledAt.is_null())
            .one(&self.db)
            .await?;
        Ok(user.map(DirectoryUser::from))
    }
}
