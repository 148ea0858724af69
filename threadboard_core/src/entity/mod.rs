// SeaORM entities backing the board: users, the node identities bound to
// them, posts, and the replies threaded under posts.

pub mod identity;
pub mod post;
pub mod reply;
pub mod user;


pub mod prelude {
    // Re-export all entities for convenience
    pub use super::identity::{
        ActiveModel as IdentityActiveModel, Column as IdentityColumn, Entity as Identity,
        Model as IdentityModel,
    };
    pub use super::post::{
        ActiveModel as PostActiveModel, Column as PostColumn, Entity as Post, Model as PostModel,
    };
    pub use super::reply::{
        ActiveModel as ReplyActiveModel, Column as ReplyColumn, Entity as Reply,
        Model as ReplyModel,
    };
    pub use super::user::{
        ActiveModel as UserActiveModel, Column as UserColumn, Entity as User, Model as UserModel,
    };

    // Re-export commonly used SeaORM types and traits
    pub use sea_orm::{
        ActiveModelTrait,
        ColumnTrait,
        ConnectionTrait,

        // Database and connection types
        Database,
        DatabaseConnection,
        DbConn,
        DbErr,

        // Core traits
        EntityTrait,
        ModelTrait,
        NotSet,
        PaginatorTrait,
        QueryFilter,
        QueryOrder,
        QuerySelect,
        Related,
        RelationTrait,

        // Active model helpers
        Set,
        TransactionTrait,
    };
}
