use std::sync::Arc;

use chrono::Utc;
use sea_orm::{ActiveModelTrait, Set};
use serde::Deserialize;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    auth::password::hash_password,
    db::DbPool,
    entities::{user, UserRole},
    errors::ServiceError,
};

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct NewUser {
    #[validate(length(min = 1, max = 120))]
    pub name: String,
    #[validate(length(min = 3, max = 60))]
    pub login: String,
    #[validate(length(min = 8, max = 128))]
    pub password: String,
    pub role: UserRole,
    #[validate(length(min = 1, max = 60))]
    pub department: String,
}

/// Operator accounts. Logins are stored lowercased.
#[derive(Clone)]
pub struct UserService {
    db_pool: Arc<DbPool>,
}

impl UserService {
    pub fn new(db_pool: Arc<DbPool>) -> Self {
        Self { db_pool }
    }

    #[instrument(skip(self, input), fields(login = %input.login))]
    pub async fn create_user(&self, input: NewUser) -> Result<user::Model, ServiceError> {
        input.validate()?;
        let login = input.login.trim().to_lowercase();
        let password_hash = hash_password(&input.password)?;
        let now = Utc::now();

        let created = user::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(input.name.trim().to_string()),
            login: Set(login.clone()),
            password_hash: Set(password_hash),
            role: Set(input.role),
            department: Set(input.department.trim().to_string()),
            active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db_pool)
        .await
        .map_err(|e| {
            ServiceError::from_write_error(e, || {
                ServiceError::Conflict(format!("Login {} is already taken", login))
            })
        })?;

        info!(user_id = %created.id, role = %created.role, "user created");
        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{auth::password::verify_password, services::test_support::test_db};
    use assert_matches::assert_matches;

    fn new_user(login: &str) -> NewUser {
        NewUser {
            name: "Maria Souza".into(),
            login: login.into(),
            password: "correct-horse".into(),
            role: UserRole::Operator,
            department: "EXPEDICAO".into(),
        }
    }

    #[tokio::test]
    async fn logins_are_unique_case_insensitively() {
        let db = test_db().await;
        let service = UserService::new(db.pool.clone());

        let created = service.create_user(new_user("Maria")).await.unwrap();
        assert_eq!(created.login, "maria");
        assert!(verify_password("correct-horse", &created.password_hash));

        assert_matches!(
            service.create_user(new_user("MARIA")).await,
            Err(ServiceError::Conflict(_))
        );
    }

    #[tokio::test]
    async fn short_passwords_are_rejected() {
        let db = test_db().await;
        let service = UserService::new(db.pool.clone());
        let mut input = new_user("joao");
        input.password = "123".into();
        assert_matches!(
            service.create_user(input).await,
            Err(ServiceError::ValidationError(_))
        );
    }
}
