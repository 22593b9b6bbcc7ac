pub mod auth;
pub mod bridge;
pub mod conversations;
pub mod error;
pub mod events;
mod fanout;
pub mod messages;
pub mod rpc;
pub mod state;
mod views;

pub use error::ServiceError;
pub use state::{AppState, AppStateInner, ServiceConfig};
