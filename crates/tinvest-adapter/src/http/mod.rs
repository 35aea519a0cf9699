/*
[INPUT]:  HTTP client configuration and access token
[OUTPUT]: Authenticated REST calls returning unwrapped payloads
[POS]:    HTTP layer - REST API communication
[UPDATE]: When changing client behavior or error mapping
*/

pub mod client;

pub use client::{ClientConfig, OpenApiClient, PRODUCTION_API_URL, Query, SANDBOX_API_URL};
