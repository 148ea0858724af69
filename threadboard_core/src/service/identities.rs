use sea_orm::ConnectionTrait;

use crate::{entity::prelude::*, ids::UserId};

/// Resolves the user an authenticated node key is bound to.
///
/// The transport has already proven the caller holds `node_id`; `None` means
/// the node never registered.
pub async fn caller_user_id<C>(db: &C, node_id: &[u8]) -> Result<Option<UserId>, DbErr>
where
    C: ConnectionTrait,
{
    let identity = Identity::find_by_id(node_id.to_vec()).one(db).await?;
    Ok(identity.map(|identity| identity.user_id))
}

/// The raw bytes stored in the identity table for a remote node.
pub fn node_bytes(node_id: &iroh::PublicKey) -> Vec<u8> {
    node_id.as_bytes().to_vec()
}
