use chrono::{DateTime, Utc};
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use zel_core::prelude::*;

use crate::{
    config::Limits,
    entity::prelude::*,
    error::internal,
    ids::{PostId, UserId},
    service::identities::{caller_user_id, node_bytes},
    validation::{self, ValidationError},
};

#[derive(Debug, Error)]
pub enum PostsServiceError {
    #[error("fatal database error")]
    DbError(#[from] DbErr),

    #[error(transparent)]
    Invalid(#[from] ValidationError),

    #[error("post not found")]
    PostNotFound,

    #[error("user not found")]
    UserNotFound,

    #[error("unauthenticated: this node is not registered")]
    Unauthenticated,

    #[error("post {0} references an author that does not exist")]
    MissingAuthor(PostId),
}

impl From<PostsServiceError> for ResourceError {
    fn from(error: PostsServiceError) -> Self {
        match error {
            PostsServiceError::DbError(error) => internal(error),
            PostsServiceError::MissingAuthor(_) => internal(error),
            PostsServiceError::Invalid(_) => ResourceError::app(error),
            PostsServiceError::PostNotFound => ResourceError::app(error),
            PostsServiceError::UserNotFound => ResourceError::app(error),
            PostsServiceError::Unauthenticated => ResourceError::app(error),
        }
    }
}

/// A post joined with its author's display name.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostView {
    pub id: PostId,
    pub user_id: UserId,
    pub user_name: String,
    pub title: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PostView {
    fn from_row(post: PostModel, author: Option<UserModel>) -> Result<Self, PostsServiceError> {
        let author = author.ok_or(PostsServiceError::MissingAuthor(post.id))?;

        Ok(Self {
            id: post.id,
            user_id: post.user_id,
            user_name: author.name,
            title: post.title,
            content: post.content,
            created_at: post.created_at,
            updated_at: post.updated_at,
        })
    }
}

#[derive(Clone)]
pub struct PostsService {
    db: DatabaseConnection,
    limits: Limits,
}

impl PostsService {
    pub fn new(db: DatabaseConnection, limits: Limits) -> Self {
        Self { db, limits }
    }

    /// Create a new post
    pub async fn _create_post(
        &self,
        user_id: UserId,
        title: String,
        content: String,
    ) -> Result<PostView, PostsServiceError> {
        validation::required_text("title", &title, self.limits.title_max)?;
        validation::required_text("content", &content, self.limits.post_body_max)?;

        // Verify user exists
        let user_exists = User::find_by_id(user_id)
            .one(&self.db)
            .await?
            .is_some();

        if !user_exists {
            return Err(PostsServiceError::UserNotFound);
        }

        let now = Utc::now();
        let post = PostActiveModel {
            id: NotSet,
            user_id: Set(user_id),
            title: Set(title),
            content: Set(content),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let post_id = Post::insert(post).exec(&self.db).await?.last_insert_id;
        tracing::info!(%post_id, %user_id, "created post");

        self._get_post(post_id).await
    }

    /// Get a specific post by ID
    pub async fn _get_post(&self, post_id: PostId) -> Result<PostView, PostsServiceError> {
        let (post, author) = Post::find_by_id(post_id)
            .find_also_related(User)
            .one(&self.db)
            .await?
            .ok_or(PostsServiceError::PostNotFound)?;

        PostView::from_row(post, author)
    }

    /// List posts, newest first, optionally only those whose title contains `search`.
    ///
    /// The match is literal and ignores case, including outside ASCII.
    pub async fn _list_posts(
        &self,
        search: Option<String>,
    ) -> Result<Vec<PostView>, PostsServiceError> {
        let needle = search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_lowercase);

        let rows = Post::find()
            .find_also_related(User)
            .order_by_desc(PostColumn::CreatedAt)
            .order_by_desc(PostColumn::Id)
            .all(&self.db)
            .await?;

        let posts = rows
            .into_iter()
            .filter(|(post, _)| match &needle {
                Some(needle) => post.title.to_lowercase().contains(needle.as_str()),
                None => true,
            })
            .map(|(post, author)| PostView::from_row(post, author))
            .collect::<Result<Vec<_>, _>>()?;

        tracing::debug!(posts = posts.len(), ?search, "listed posts");
        Ok(posts)
    }

    async fn caller(&self, ctx: &RequestContext) -> Result<UserId, PostsServiceError> {
        let node_id = node_bytes(&ctx.connection().remote_id());
        caller_user_id(&self.db, &node_id)
            .await?
            .ok_or(PostsServiceError::Unauthenticated)
    }
}

#[zel_service(name = "posts")]
trait Posts {
    #[doc = "Create a new post authored by the calling user"]
    #[method(name = "create_post")]
    async fn create_post(
        &self,
        title: String,
        content: String,
    ) -> Result<PostView, ResourceError>;

    #[doc = "Get a specific post by ID"]
    #[method(name = "get_post")]
    async fn get_post(&self, post_id: PostId) -> Result<PostView, ResourceError>;

    #[doc = "List posts newest first, optionally filtered by title"]
    #[method(name = "list_posts")]
    async fn list_posts(&self, search: Option<String>) -> Result<Vec<PostView>, ResourceError>;
}

#[async_trait]
impl PostsServer for PostsService {
    async fn create_post(
        &self,
        ctx: RequestContext,
        title: String,
        content: String,
    ) -> Result<PostView, ResourceError> {
        let user_id = self.caller(&ctx).await?;
        Ok(self._create_post(user_id, title, content).await?)
    }

    async fn get_post(
        &self,
        _ctx: RequestContext,
        post_id: PostId,
    ) -> Result<PostView, ResourceError> {
        Ok(self._get_post(post_id).await?)
    }

    async fn list_posts(
        &self,
        _ctx: RequestContext,
        search: Option<String>,
    ) -> Result<Vec<PostView>, ResourceError> {
        Ok(self._list_posts(search).await?)
    }
}
