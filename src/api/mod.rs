//! HTTP API Module
//!
//! The volume server's request boundary: needle upload, read and delete,
//! plus status endpoints.

mod http;

pub use http::{AppState, HttpServer};
