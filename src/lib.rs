use config::Config;
use invite::InviteService;
use sqlx::PgPool;

pub mod config;
pub mod error;
pub mod invite;
pub mod middleware;
pub mod router;
pub mod routes;
pub mod utils;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Config,
    pub invites: InviteService,
}
