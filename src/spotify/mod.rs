pub mod auth;
pub mod cache;
pub mod client;
pub mod error;
pub mod pages;
pub mod payload;
pub mod transport;
