pub mod config;
pub mod db;
pub mod gate;
pub mod log;
pub mod receipt;
pub mod rejection;
pub mod server;
pub mod services;
pub mod span;
pub mod validation;
pub mod websocket;
