//! WebSocket transport: connection handles, the dashboard set, the socket
//! pump, and the four endpoint handlers.

pub mod connection;
pub mod dispatchers;
pub mod handler;
pub mod routes;
