pub mod chat_stream;
pub mod config;
pub mod decoder;
pub mod generation;
pub mod message;
pub mod pipeline;
pub mod request;
pub mod session;
pub mod share;
pub mod transport;
pub mod verification;
