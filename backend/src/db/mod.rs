pub mod connection;
pub mod executor;
