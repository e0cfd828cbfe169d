mod handlers;
mod server;
#[cfg(test)]
mod tests;
mod ws;

pub use handlers::ApiError;
pub use server::{ServerState, StreamServer, StreamServerBuilder};
pub use ws::{ClientCommand, EventQuery, CONNECTED_MESSAGE};
