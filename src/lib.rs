//! # SSI API client
//!
//! This crate is an idiomatic Rust client for the SSI HTTP/WebSocket API.
//! It supports:
//!
//! - Configuration from explicit values or `SSI_API_*` environment variables
//! - Authenticated calls (`X-Paf-Token` / `X-Paf-Project` headers)
//! - Synchronous-style calls with JSON or multipart bodies
//! - Background calls with success and error callbacks
//! - Streaming file downloads with optional progress reporting
//! - JSON websockets (one JSON document per text frame)
//!
//! Non-200 responses are turned into classified [`error::Error::Api`]
//! values carrying the HTTP status and a resolved message.
//!
//! For usage examples, see `demos/simple.rs`.

pub mod client;
pub mod config;
pub mod error;
pub mod ws;
