//! HTTP gateway: server, router, and the token broker middleware

pub mod broker;
pub mod router;
pub mod server;

pub use broker::{HubToken, IDENTITY_SENTINEL};
pub use router::{AppState, create_router};
pub use server::HubGateway;
