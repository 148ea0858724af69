use chrono::{DateTime, Utc};
use sea_orm::{DatabaseConnection, SqlErr};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use zel_core::prelude::*;

use crate::{
    entity::prelude::*,
    error::internal,
    ids::UserId,
    service::identities::node_bytes,
    validation::{self, ValidationError},
};

pub const NAME_MAX: usize = 100;

fn is_unique_violation(error: &DbErr) -> bool {
    matches!(error.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}

#[derive(Debug, Error)]
pub enum UsersServiceError {
    #[error("fatal database error")]
    DbError(#[from] DbErr),

    #[error(transparent)]
    Invalid(#[from] ValidationError),

    #[error("user not found")]
    UserNotFound,

    #[error("username is already taken")]
    UsernameTaken,

    #[error("this node is already registered")]
    AlreadyRegistered,
}

impl From<UsersServiceError> for ResourceError {
    fn from(error: UsersServiceError) -> Self {
        match error {
            UsersServiceError::DbError(error) => internal(error),
            UsersServiceError::Invalid(_) => ResourceError::app(error),
            UsersServiceError::UserNotFound => ResourceError::app(error),
            UsersServiceError::UsernameTaken => ResourceError::app(error),
            UsersServiceError::AlreadyRegistered => ResourceError::app(error),
        }
    }
}

/// Public face of a user. The email address stays private.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserView {
    pub id: UserId,
    pub name: String,
    pub username: String,
    pub created_at: DateTime<Utc>,
}

impl From<UserModel> for UserView {
    fn from(user: UserModel) -> Self {
        Self {
            id: user.id,
            name: user.name,
            username: user.username,
            created_at: user.created_at,
        }
    }
}

#[derive(Clone)]
pub struct UsersService {
    db: DatabaseConnection,
}

impl UsersService {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Create a user and bind `node_id` to it
    pub async fn _register(
        &self,
        node_id: Vec<u8>,
        name: String,
        username: String,
        email: String,
    ) -> Result<UserView, UsersServiceError> {
        validation::required_text("name", &name, NAME_MAX)?;
        validation::username(&username)?;
        validation::email(&email)?;

        let bound = Identity::find_by_id(node_id.clone())
            .one(&self.db)
            .await?
            .is_some();

        if bound {
            return Err(UsersServiceError::AlreadyRegistered);
        }

        let taken = User::find()
            .filter(UserColumn::Username.eq(username.as_str()))
            .one(&self.db)
            .await?
            .is_some();

        if taken {
            return Err(UsersServiceError::UsernameTaken);
        }

        self.insert_user(node_id, name, username, email).await
    }

    /// Inserts the user and its identity in one transaction.
    ///
    /// The username check in `_register` can lose a race against another
    /// registration; the unique index still decides and is reported as
    /// `UsernameTaken`.
    async fn insert_user(
        &self,
        node_id: Vec<u8>,
        name: String,
        username: String,
        email: String,
    ) -> Result<UserView, UsersServiceError> {
        let txn = self.db.begin().await?;

        let user = UserActiveModel {
            id: NotSet,
            name: Set(name),
            username: Set(username),
            email: Set(email),
            created_at: Set(Utc::now()),
        };
        let user = match User::insert(user).exec_with_returning(&txn).await {
            Ok(user) => user,
            Err(error) if is_unique_violation(&error) => {
                return Err(UsersServiceError::UsernameTaken)
            }
            Err(error) => return Err(error.into()),
        };

        let identity = IdentityActiveModel {
            node_id: Set(node_id),
            user_id: Set(user.id),
        };
        Identity::insert(identity).exec(&txn).await?;

        txn.commit().await?;

        tracing::info!(user_id = %user.id, username = %user.username, "registered user");
        Ok(user.into())
    }

    /// The user bound to `node_id`, if any
    pub async fn _whoami(&self, node_id: Vec<u8>) -> Result<Option<UserView>, UsersServiceError> {
        let found = Identity::find_by_id(node_id)
            .find_also_related(User)
            .one(&self.db)
            .await?;

        Ok(found.and_then(|(_, user)| user).map(UserView::from))
    }

    pub async fn _get_user(&self, user_id: UserId) -> Result<UserView, UsersServiceError> {
        User::find_by_id(user_id)
            .one(&self.db)
            .await?
            .map(UserView::from)
            .ok_or(UsersServiceError::UserNotFound)
    }
}

#[zel_service(name = "users")]
trait Users {
    #[doc = "Create a user bound to the calling node"]
    #[method(name = "register")]
    async fn register(
        &self,
        name: String,
        username: String,
        email: String,
    ) -> Result<UserView, ResourceError>;

    #[doc = "The user bound to the calling node"]
    #[method(name = "whoami")]
    async fn whoami(&self) -> Result<Option<UserView>, ResourceError>;

    #[doc = "Get a user by ID"]
    #[method(name = "get_user")]
    async fn get_user(&self, user_id: UserId) -> Result<UserView, ResourceError>;
}

#[async_trait]
impl UsersServer for UsersService {
    async fn register(
        &self,
        ctx: RequestContext,
        name: String,
        username: String,
        email: String,
    ) -> Result<UserView, ResourceError> {
        let node_id = node_bytes(&ctx.connection().remote_id());
        Ok(self._register(node_id, name, username, email).await?)
    }

    async fn whoami(&self, ctx: RequestContext) -> Result<Option<UserView>, ResourceError> {
        let node_id = node_bytes(&ctx.connection().remote_id());
        Ok(self._whoami(node_id).await?)
    }

    async fn get_user(
        &self,
        _ctx: RequestContext,
        user_id: UserId,
    ) -> Result<UserView, ResourceError> {
        Ok(self._get_user(user_id).await?)
    }
}
