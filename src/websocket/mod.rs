pub mod handler;
pub mod protocol;
pub mod server;

pub use server::run_websocket_server;
