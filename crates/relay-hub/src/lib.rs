pub mod connection;
pub mod error;
pub mod handler;
pub mod hub;
pub mod message;
mod registry;

pub use connection::serve_ws;
pub use error::HubError;
pub use handler::InboundHandler;
pub use hub::{Hub, HubHandle};
pub use message::{ConnectionId, Message};
