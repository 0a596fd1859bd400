pub mod client;
pub mod config;
pub mod dispatcher;
pub mod server;
pub mod session;

pub use config::ServerConfig;
pub use dispatcher::{Delivery, DeliveryReport, Dispatcher};
pub use server::{start, ServerHandle};
