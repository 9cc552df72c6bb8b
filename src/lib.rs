// Library exports for Instabuy
// This allows integration tests and the binary to share the same modules

pub mod auth;
pub mod blobs;
pub mod config;
pub mod db;
pub mod error;
pub mod extractors;
pub mod request;
pub mod routes;
pub mod search;
pub mod state;
pub mod tasks;
