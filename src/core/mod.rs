pub mod config;
pub mod relay;
pub mod sse;
pub mod store;
pub mod terminal;
