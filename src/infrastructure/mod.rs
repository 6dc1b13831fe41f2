pub mod config;
pub mod error;
pub mod gemini_client;
pub mod session_storage;
pub mod transport;
