pub mod cache;
pub mod client;
pub mod config;
pub mod database;
pub mod error;
pub mod events;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod permissions;
pub mod routes;
pub mod seed;
pub mod state;
pub mod store;
pub mod utils;
pub mod ws;

pub use config::Config;
pub use error::ApiError;
pub use routes::create_router;
pub use state::AppState;
