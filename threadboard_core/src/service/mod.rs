pub mod identities;
pub mod posts;
pub mod replies;
pub mod users;
