use chrono::Utc;
use sea_orm::DatabaseConnection;
use thiserror::Error;
use zel_core::prelude::*;

use crate::{
    config::Limits,
    entity::prelude::*,
    error::internal,
    ids::{PostId, ReplyId, UserId},
    service::identities::{caller_user_id, node_bytes},
    thread::{OrphanPolicy, ReplyNode, ReplyTreeBuilder, ReplyView, TreeError},
    validation::{self, ValidationError},
};

#[derive(Debug, Error)]
pub enum RepliesServiceError {
    #[error("fatal database error")]
    DbError(#[from] DbErr),

    #[error(transparent)]
    Invalid(#[from] ValidationError),

    #[error("post not found")]
    PostNotFound,

    #[error("reply not found")]
    ReplyNotFound,

    #[error("parent reply not found")]
    ParentNotFound,

    #[error("parent reply belongs to a different post")]
    ParentInOtherPost,

    #[error("user not found")]
    UserNotFound,

    #[error("unauthenticated: this node is not registered")]
    Unauthenticated,

    #[error(transparent)]
    Integrity(#[from] TreeError),
}

impl From<RepliesServiceError> for ResourceError {
    fn from(error: RepliesServiceError) -> Self {
        match error {
            RepliesServiceError::DbError(error) => internal(error),
            RepliesServiceError::Integrity(error) => internal(error),
            RepliesServiceError::Invalid(_) => ResourceError::app(error),
            RepliesServiceError::PostNotFound => ResourceError::app(error),
            RepliesServiceError::ReplyNotFound => ResourceError::app(error),
            RepliesServiceError::ParentNotFound => ResourceError::app(error),
            RepliesServiceError::ParentInOtherPost => ResourceError::app(error),
            RepliesServiceError::UserNotFound => ResourceError::app(error),
            RepliesServiceError::Unauthenticated => ResourceError::app(error),
        }
    }
}

#[derive(Clone)]
pub struct RepliesService {
    db: DatabaseConnection,
    builder: ReplyTreeBuilder,
    limits: Limits,
}

impl RepliesService {
    pub fn new(db: DatabaseConnection, orphan_policy: OrphanPolicy, limits: Limits) -> Self {
        Self {
            db,
            builder: ReplyTreeBuilder::new(orphan_policy),
            limits,
        }
    }

    /// Every reply on a post, threaded.
    ///
    /// Does not check that the post exists: an unknown post simply has no
    /// replies.
    pub async fn _list_replies(
        &self,
        post_id: PostId,
    ) -> Result<Vec<ReplyNode>, RepliesServiceError> {
        let rows = Reply::find()
            .filter(ReplyColumn::PostId.eq(post_id))
            .find_also_related(User)
            .order_by_asc(ReplyColumn::CreatedAt)
            .order_by_asc(ReplyColumn::Id)
            .all(&self.db)
            .await?;

        let fetched = rows.len();
        let forest = self.builder.build_from_rows(rows)?;

        tracing::debug!(%post_id, replies = fetched, roots = forest.len(), "listed replies");
        Ok(forest)
    }

    /// A single reply as a leaf; descendants are not loaded.
    pub async fn _get_reply(&self, reply_id: ReplyId) -> Result<ReplyNode, RepliesServiceError> {
        let (reply, author) = Reply::find_by_id(reply_id)
            .find_also_related(User)
            .one(&self.db)
            .await?
            .ok_or(RepliesServiceError::ReplyNotFound)?;

        Ok(ReplyNode::leaf(ReplyView::from_row(reply, author)?))
    }

    /// Attach a new reply to a post, or under `parent_id` within that post.
    ///
    /// Checks run in order and the first failure wins: body, post, parent,
    /// author. The response is re-read from the database after the insert.
    pub async fn _create_reply(
        &self,
        post_id: PostId,
        parent_id: Option<ReplyId>,
        user_id: UserId,
        body: String,
    ) -> Result<ReplyNode, RepliesServiceError> {
        validation::required_text("reply", &body, self.limits.reply_body_max)?;

        let post_exists = Post::find_by_id(post_id)
            .one(&self.db)
            .await?
            .is_some();

        if !post_exists {
            return Err(RepliesServiceError::PostNotFound);
        }

        if let Some(parent_id) = parent_id {
            let parent = Reply::find_by_id(parent_id)
                .one(&self.db)
                .await?
                .ok_or(RepliesServiceError::ParentNotFound)?;

            if parent.post_id != post_id {
                tracing::info!(
                    %post_id,
                    %parent_id,
                    parent_post_id = %parent.post_id,
                    "rejected reply to a parent in another post"
                );
                return Err(RepliesServiceError::ParentInOtherPost);
            }
        }

        self.insert_reply(post_id, parent_id, user_id, body).await
    }

    /// Reply under an existing reply, inheriting its post.
    pub async fn _reply_to_reply(
        &self,
        parent_id: ReplyId,
        user_id: UserId,
        body: String,
    ) -> Result<ReplyNode, RepliesServiceError> {
        validation::required_text("reply", &body, self.limits.reply_body_max)?;

        let parent = Reply::find_by_id(parent_id)
            .one(&self.db)
            .await?
            .ok_or(RepliesServiceError::ReplyNotFound)?;

        // The parent row's foreign key guarantees its post exists.
        self.insert_reply(parent.post_id, Some(parent.id), user_id, body)
            .await
    }

    /// Final author check, insert, and read back. Body, post and parent must
    /// already have been checked.
    async fn insert_reply(
        &self,
        post_id: PostId,
        parent_id: Option<ReplyId>,
        user_id: UserId,
        body: String,
    ) -> Result<ReplyNode, RepliesServiceError> {
        let user_exists = User::find_by_id(user_id)
            .one(&self.db)
            .await?
            .is_some();

        if !user_exists {
            return Err(RepliesServiceError::UserNotFound);
        }

        let now = Utc::now();
        let reply = ReplyActiveModel {
            id: NotSet,
            post_id: Set(post_id),
            parent_id: Set(parent_id),
            user_id: Set(user_id),
            body: Set(body),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let reply_id = Reply::insert(reply).exec(&self.db).await?.last_insert_id;
        tracing::info!(%reply_id, %post_id, ?parent_id, %user_id, "created reply");

        self._get_reply(reply_id).await
    }

    async fn caller(&self, ctx: &RequestContext) -> Result<UserId, RepliesServiceError> {
        self.user_for_node(&node_bytes(&ctx.connection().remote_id()))
            .await
    }

    async fn user_for_node(&self, node_id: &[u8]) -> Result<UserId, RepliesServiceError> {
        caller_user_id(&self.db, node_id)
            .await?
            .ok_or(RepliesServiceError::Unauthenticated)
    }
}

#[zel_service(name = "replies")]
trait Replies {
    #[doc = "All replies on a post as a forest of threads"]
    #[method(name = "list_replies")]
    async fn list_replies(&self, post_id: PostId) -> Result<Vec<ReplyNode>, ResourceError>;

    #[doc = "A single reply, without its descendants"]
    #[method(name = "get_reply")]
    async fn get_reply(&self, reply_id: ReplyId) -> Result<ReplyNode, ResourceError>;

    #[doc = "Reply directly to a post"]
    #[method(name = "create_reply")]
    async fn create_reply(
        &self,
        post_id: PostId,
        body: String,
    ) -> Result<ReplyNode, ResourceError>;

    #[doc = "Reply to another reply"]
    #[method(name = "reply_to_reply")]
    async fn reply_to_reply(
        &self,
        reply_id: ReplyId,
        body: String,
    ) -> Result<ReplyNode, ResourceError>;
}

#[async_trait]
impl RepliesServer for RepliesService {
    async fn list_replies(
        &self,
        _ctx: RequestContext,
        post_id: PostId,
    ) -> Result<Vec<ReplyNode>, ResourceError> {
        Ok(self._list_replies(post_id).await?)
    }

    async fn get_reply(
        &self,
        _ctx: RequestContext,
        reply_id: ReplyId,
    ) -> Result<ReplyNode, ResourceError> {
        Ok(self._get_reply(reply_id).await?)
    }

    async fn create_reply(
        &self,
        ctx: RequestContext,
        post_id: PostId,
        body: String,
    ) -> Result<ReplyNode, ResourceError> {
        let user_id = self.caller(&ctx).await?;
        Ok(self._create_reply(post_id, None, user_id, body).await?)
    }

    async fn reply_to_reply(
        &self,
        ctx: RequestContext,
        reply_id: ReplyId,
        body: String,
    ) -> Result<ReplyNode, ResourceError> {
        let user_id = self.caller(&ctx).await?;
        Ok(self._reply_to_reply(reply_id, user_id, body).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{create_test_post, create_test_user, setup_test_db};

    async fn setup_test_service() -> RepliesService {
        RepliesService::new(
            setup_test_db().await,
            OrphanPolicy::Promote,
            Limits::default(),
        )
    }

    async fn reply(
        service: &RepliesService,
        post_id: PostId,
        parent_id: Option<ReplyId>,
        user_id: UserId,
        body: &str,
    ) -> ReplyNode {
        service
            ._create_reply(post_id, parent_id, user_id, body.to_string())
            .await
            .expect("Failed to create reply")
    }

    fn count(forest: &[ReplyNode]) -> usize {
        forest.iter().map(ReplyNode::size).sum()
    }

    #[tokio::test]
    async fn test_thread_end_to_end() {
        let service = setup_test_service().await;

        let u1 = create_test_user(&service.db, "u1").await;
        let u2 = create_test_user(&service.db, "u2").await;
        let u3 = create_test_user(&service.db, "u3").await;
        let post_id = create_test_post(&service.db, u1, "P").await;

        let r1 = reply(&service, post_id, None, u2, "first!").await;
        assert!(r1.children.is_empty());
        assert_eq!(r1.reply.parent_id, None);
        assert_eq!(r1.reply.user_name, "u2 display");

        let r2 = service
            ._reply_to_reply(r1.reply.id, u3, "replying to first".to_string())
            .await
            .unwrap();
        assert_eq!(r2.reply.post_id, post_id);

        let forest = service._list_replies(post_id).await.unwrap();
        assert_eq!(forest.len(), 1);
        assert_eq!(forest[0].reply.id, r1.reply.id);
        assert_eq!(forest[0].children.len(), 1);
        assert_eq!(forest[0].children[0].reply.id, r2.reply.id);

        let fetched = service._get_reply(r2.reply.id).await.unwrap();
        assert_eq!(fetched.reply.parent_id, Some(r1.reply.id));
        assert!(fetched.children.is_empty());
        assert_eq!(fetched, r2);
    }

    #[tokio::test]
    async fn test_get_reply_is_repeatable() {
        let service = setup_test_service().await;
        let user_id = create_test_user(&service.db, "alice").await;
        let post_id = create_test_post(&service.db, user_id, "P").await;
        let created = reply(&service, post_id, None, user_id, "hello").await;

        let first = service._get_reply(created.reply.id).await.unwrap();
        let second = service._get_reply(created.reply.id).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first, created);
    }

    #[tokio::test]
    async fn test_get_missing_reply() {
        let service = setup_test_service().await;
        let result = service._get_reply(ReplyId::from_i64(404)).await;
        assert!(matches!(result, Err(RepliesServiceError::ReplyNotFound)));
    }

    #[tokio::test]
    async fn test_list_replies_deep_thread() {
        let service = setup_test_service().await;
        let user_id = create_test_user(&service.db, "alice").await;
        let post_id = create_test_post(&service.db, user_id, "P").await;

        let root = reply(&service, post_id, None, user_id, "root").await;
        let mut parent = root.reply.id;
        for depth in 1..=4 {
            let child = reply(&service, post_id, Some(parent), user_id, &format!("d{depth}")).await;
            parent = child.reply.id;
        }
        reply(&service, post_id, None, user_id, "second root").await;

        let forest = service._list_replies(post_id).await.unwrap();
        assert_eq!(forest.len(), 2);
        assert_eq!(forest[0].depth(), 5);
        assert_eq!(forest[1].depth(), 1);
        assert_eq!(count(&forest), 6);
    }

    #[tokio::test]
    async fn test_list_replies_scoped_to_post() {
        let service = setup_test_service().await;
        let user_id = create_test_user(&service.db, "alice").await;
        let p1 = create_test_post(&service.db, user_id, "P1").await;
        let p2 = create_test_post(&service.db, user_id, "P2").await;

        reply(&service, p1, None, user_id, "on p1").await;
        reply(&service, p2, None, user_id, "on p2").await;
        reply(&service, p2, None, user_id, "also on p2").await;

        assert_eq!(count(&service._list_replies(p1).await.unwrap()), 1);
        assert_eq!(count(&service._list_replies(p2).await.unwrap()), 2);
    }

    #[tokio::test]
    async fn test_list_replies_unknown_post_is_empty() {
        let service = setup_test_service().await;
        let forest = service._list_replies(PostId::from_i64(404)).await.unwrap();
        assert!(forest.is_empty());
    }

    #[tokio::test]
    async fn test_reply_body_boundary() {
        let service = setup_test_service().await;
        let user_id = create_test_user(&service.db, "alice").await;
        let post_id = create_test_post(&service.db, user_id, "P").await;

        let accepted = service
            ._create_reply(post_id, None, user_id, "a".repeat(500))
            .await;
        assert!(accepted.is_ok());

        let rejected = service
            ._create_reply(post_id, None, user_id, "a".repeat(501))
            .await;
        assert!(matches!(
            rejected,
            Err(RepliesServiceError::Invalid(ValidationError::TooLong { max: 500, .. }))
        ));

        let blank = service
            ._create_reply(post_id, None, user_id, "   ".to_string())
            .await;
        assert!(matches!(
            blank,
            Err(RepliesServiceError::Invalid(ValidationError::Required { .. }))
        ));
    }

    #[tokio::test]
    async fn test_validation_checked_before_lookups() {
        let service = setup_test_service().await;

        // Neither post nor user exist, but the empty body is reported first
        let result = service
            ._create_reply(PostId::from_i64(1), None, UserId::from_i64(1), String::new())
            .await;
        assert!(matches!(result, Err(RepliesServiceError::Invalid(_))));
    }

    #[tokio::test]
    async fn test_create_reply_missing_post() {
        let service = setup_test_service().await;
        let user_id = create_test_user(&service.db, "alice").await;

        let result = service
            ._create_reply(PostId::from_i64(404), None, user_id, "hi".to_string())
            .await;
        assert!(matches!(result, Err(RepliesServiceError::PostNotFound)));
    }

    #[tokio::test]
    async fn test_create_reply_missing_parent() {
        let service = setup_test_service().await;
        let user_id = create_test_user(&service.db, "alice").await;
        let post_id = create_test_post(&service.db, user_id, "P").await;

        let result = service
            ._create_reply(post_id, Some(ReplyId::from_i64(9999)), user_id, "hi".to_string())
            .await;
        assert!(matches!(result, Err(RepliesServiceError::ParentNotFound)));
    }

    #[tokio::test]
    async fn test_parent_must_share_post() {
        let service = setup_test_service().await;
        let user_id = create_test_user(&service.db, "alice").await;
        let p5 = create_test_post(&service.db, user_id, "P5").await;
        let p7 = create_test_post(&service.db, user_id, "P7").await;

        let on_p7 = reply(&service, p7, None, user_id, "on p7").await;

        let result = service
            ._create_reply(p5, Some(on_p7.reply.id), user_id, "sneaky".to_string())
            .await;
        assert!(matches!(result, Err(RepliesServiceError::ParentInOtherPost)));
        assert!(service._list_replies(p5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_reply_unknown_author() {
        let service = setup_test_service().await;
        let user_id = create_test_user(&service.db, "alice").await;
        let post_id = create_test_post(&service.db, user_id, "P").await;

        let result = service
            ._create_reply(post_id, None, UserId::from_i64(404), "hi".to_string())
            .await;
        assert!(matches!(result, Err(RepliesServiceError::UserNotFound)));
    }

    #[tokio::test]
    async fn test_reply_to_missing_reply() {
        let service = setup_test_service().await;
        let user_id = create_test_user(&service.db, "alice").await;

        let result = service
            ._reply_to_reply(ReplyId::from_i64(404), user_id, "hi".to_string())
            .await;
        assert!(matches!(result, Err(RepliesServiceError::ReplyNotFound)));
    }

    #[tokio::test]
    async fn test_siblings_in_creation_order() {
        let service = setup_test_service().await;
        let user_id = create_test_user(&service.db, "alice").await;
        let post_id = create_test_post(&service.db, user_id, "P").await;

        let root = reply(&service, post_id, None, user_id, "root").await;
        let mut expected = Vec::new();
        for i in 0..3 {
            let child = reply(&service, post_id, Some(root.reply.id), user_id, &format!("c{i}")).await;
            expected.push(child.reply.id);
        }

        let forest = service._list_replies(post_id).await.unwrap();
        let children: Vec<_> = forest[0].children.iter().map(|c| c.reply.id).collect();
        assert_eq!(children, expected);
    }

    async fn insert_raw_reply(
        db: &DatabaseConnection,
        post_id: PostId,
        parent_id: Option<ReplyId>,
        user_id: UserId,
    ) -> ReplyId {
        let now = Utc::now();
        let reply = ReplyActiveModel {
            id: NotSet,
            post_id: Set(post_id),
            parent_id: Set(parent_id),
            user_id: Set(user_id),
            body: Set("raw".to_string()),
            created_at: Set(now),
            updated_at: Set(now),
        };
        Reply::insert(reply).exec(db).await.unwrap().last_insert_id
    }

    #[tokio::test]
    async fn test_cross_post_parent_is_promoted() {
        let service = setup_test_service().await;
        let user_id = create_test_user(&service.db, "alice").await;
        let p1 = create_test_post(&service.db, user_id, "P1").await;
        let p2 = create_test_post(&service.db, user_id, "P2").await;

        let elsewhere = reply(&service, p2, None, user_id, "on p2").await;
        reply(&service, p1, None, user_id, "on p1").await;
        let stray = insert_raw_reply(&service.db, p1, Some(elsewhere.reply.id), user_id).await;

        let forest = service._list_replies(p1).await.unwrap();
        assert_eq!(forest.len(), 2);
        assert_eq!(forest[1].reply.id, stray);
        assert_eq!(count(&forest), 2);
    }

    #[tokio::test]
    async fn test_cross_post_parent_is_dropped() {
        let db = setup_test_db().await;
        let service = RepliesService::new(db, OrphanPolicy::Drop, Limits::default());
        let user_id = create_test_user(&service.db, "alice").await;
        let p1 = create_test_post(&service.db, user_id, "P1").await;
        let p2 = create_test_post(&service.db, user_id, "P2").await;

        let elsewhere = reply(&service, p2, None, user_id, "on p2").await;
        let kept = reply(&service, p1, None, user_id, "on p1").await;
        insert_raw_reply(&service.db, p1, Some(elsewhere.reply.id), user_id).await;

        let forest = service._list_replies(p1).await.unwrap();
        assert_eq!(forest.len(), 1);
        assert_eq!(forest[0].reply.id, kept.reply.id);
        assert_eq!(count(&forest), 1);
    }

    #[tokio::test]
    async fn test_unregistered_node_is_unauthenticated() {
        let service = setup_test_service().await;

        assert_eq!(caller_user_id(&service.db, &[9; 32]).await.unwrap(), None);

        let result = service.user_for_node(&[9; 32]).await;
        assert!(matches!(result, Err(RepliesServiceError::Unauthenticated)));
    }

    #[tokio::test]
    async fn test_registered_node_resolves_to_user() {
        let service = setup_test_service().await;
        let user_id = create_test_user(&service.db, "alice").await;

        let identity = IdentityActiveModel {
            node_id: Set(vec![3; 32]),
            user_id: Set(user_id),
        };
        Identity::insert(identity).exec(&service.db).await.unwrap();

        assert_eq!(service.user_for_node(&[3; 32]).await.unwrap(), user_id);
    }

    fn callback_parts(error: ResourceError) -> (String, zel_core::ErrorSeverity) {
        match error {
            ResourceError::CallbackError {
                message, severity, ..
            } => (message, severity),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_internal_failures_reach_callers_as_generic() {
        let integrity = RepliesServiceError::Integrity(TreeError::MissingAuthor(
            ReplyId::from_i64(77),
        ));
        let (message, severity) = callback_parts(integrity.into());
        assert_eq!(message, "internal error, please try again later");
        assert!(matches!(severity, zel_core::ErrorSeverity::Infrastructure));

        let db = RepliesServiceError::DbError(DbErr::Custom("no such table: reply".to_string()));
        let (message, severity) = callback_parts(db.into());
        assert_eq!(message, "internal error, please try again later");
        assert!(!message.contains("reply"));
        assert!(matches!(severity, zel_core::ErrorSeverity::Infrastructure));
    }

    #[test]
    fn test_client_errors_keep_their_message() {
        let (message, severity) = callback_parts(RepliesServiceError::ParentInOtherPost.into());
        assert_eq!(message, "parent reply belongs to a different post");
        assert!(matches!(severity, zel_core::ErrorSeverity::Application));

        let (message, _) = callback_parts(RepliesServiceError::Unauthenticated.into());
        assert_eq!(message, "unauthenticated: this node is not registered");
    }
}
