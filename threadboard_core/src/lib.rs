pub mod entity;
pub mod ids;
pub mod models;
pub mod thread;
pub mod validation;

use std::time::Duration;

use iroh::Endpoint;
use zel_core::{prelude::RpcServerBuilder, protocol::RpcClient, IrohBundle};

use crate::service::{
    posts::{PostsClient, PostsServer, PostsService},
    replies::{RepliesClient, RepliesServer, RepliesService},
    users::{UsersClient, UsersServer, UsersService},
};

pub mod service;

pub mod error;

pub mod config;

#[cfg(test)]
mod test_utils;

static ALPN: &[u8] = b"threadboard::0.1.0";

/// Main runtime handle for a board node.
pub struct BoardCore {
    pub config: config::BoardConfig,

    /// Server bundle that accepts inbound RPC traffic.
    pub server: IrohBundle,

    /// Client-side endpoint used to talk to the local server.
    pub client_endpoint: Endpoint,

    /// Typed clients for the local server.
    pub users: UsersClient,
    pub posts: PostsClient,
    pub replies: RepliesClient,
}

impl BoardCore {
    /// Start with the config from the platform data directory.
    pub async fn start() -> Result<Self, Box<dyn std::error::Error>> {
        let config = config::get_or_init().await?;
        Self::start_with(config).await
    }

    pub async fn start_with(
        config: config::BoardConfig,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        tracing::debug!(
            orphan_policy = ?config.orphan_policy,
            limits = ?config.limits,
            "starting board"
        );

        // ----------------
        // Server endpoint
        // ----------------
        let mut server_builder = IrohBundle::builder(Some(config.secret_key.clone())).await?;
        let server_endpoint = server_builder.endpoint().clone();

        // DB + migrations
        let db = models::open_or_create_db(&config).await?;
        models::migrate_up(&db).await?;

        let users_service = UsersService::new(db.clone());
        let posts_service = PostsService::new(db.clone(), config.limits);
        let replies_service = RepliesService::new(db.clone(), config.orphan_policy, config.limits);

        // Register RPC servers
        let rpc_server_builder = RpcServerBuilder::new(ALPN, server_endpoint.clone());

        let rpc_server_builder = users_service.register_service(rpc_server_builder);
        let rpc_server_builder = posts_service.register_service(rpc_server_builder);
        let rpc_server_builder = replies_service.register_service(rpc_server_builder);

        let rpc_server = rpc_server_builder.build();

        let server = server_builder.accept(ALPN, rpc_server).finish().await;

        server.wait_online().await;
        tracing::info!("board server online");

        // ----------------
        // Client endpoint
        // ----------------
        let client_endpoint = Endpoint::builder()
            .secret_key(config.client_secret_key.clone())
            .alpns(vec![ALPN.to_vec()])
            .bind()
            .await?;

        client_endpoint.online().await;

        // Connect client endpoint -> server endpoint
        let conn = client_endpoint
            .connect(server.endpoint.addr(), ALPN)
            .await?;

        let users = UsersClient::new(RpcClient::new(conn.clone()).await?);
        let posts = PostsClient::new(RpcClient::new(conn.clone()).await?);
        let replies = RepliesClient::new(RpcClient::new(conn).await?);

        // The local client acts as the node's own user.
        if users.whoami().await?.is_none() {
            match users
                .register(
                    "Local user".to_string(),
                    "local".to_string(),
                    "local@localhost".to_string(),
                )
                .await
            {
                Ok(user) => tracing::info!(user_id = %user.id, "registered local user"),
                Err(error) => tracing::warn!(%error, "could not register local user"),
            }
        }

        Ok(Self {
            config,
            server,
            client_endpoint,
            users,
            posts,
            replies,
        })
    }

    pub async fn shutdown(self) -> Result<(), Box<dyn std::error::Error>> {
        // Close client endpoint
        self.client_endpoint.close().await;

        // Shutdown server bundle
        self.server.shutdown(Duration::from_secs(5)).await?;
        tracing::info!("board stopped");
        Ok(())
    }
}

pub mod prelude {
    pub use super::config;
    pub use super::entity;
    pub use super::error;
    pub use super::ids;
    pub use super::models;
    pub use super::service;
    pub use super::thread;

    pub use zel_core;
}
