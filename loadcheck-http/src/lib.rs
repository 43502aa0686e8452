#![forbid(unsafe_code)]

mod client;
mod error;
mod types;
mod wire;

pub use client::{ClientConfig, HttpClient};
pub use error::{Error, ErrorKind, Result};
pub use types::{HttpRequest, HttpResponse};
pub use wire::estimate_request_bytes;
