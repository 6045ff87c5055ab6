//! HTTP client functionality for loadgen
//!
//! A small request/response model over reqwest. Callers build [`HttpRequest`]s
//! against paths relative to the target base URL and get back the status and
//! raw body, so scenario code decides what counts as success.

pub mod client;
pub mod config;
pub mod errors;
pub mod types;

pub use client::{HttpClient, HttpManager};
pub use config::HttpConfig;
pub use errors::HttpError;
pub use types::{HttpMethod, HttpRequest, HttpResponse};
