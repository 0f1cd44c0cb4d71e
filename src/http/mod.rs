//! HTTP API for agent execution.

mod handlers;
mod response;
mod server;
mod state;

pub use handlers::{router, RATE_LIMIT_LIMIT, RATE_LIMIT_REMAINING, RATE_LIMIT_WINDOW};
pub use response::ErrorBody;
pub use server::HttpServer;
pub use state::{AppState, Tenant, API_KEY_HEADER};
