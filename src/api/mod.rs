//! API Module
//!
//! HTTP handlers and routing for the cache admin surface.
//!
//! # Endpoints
//! - `PUT /cache` - Store a JSON value
//! - `GET /cache` - List live keys, optionally filtered by `?pattern=`
//! - `DELETE /cache` - Remove every entry
//! - `GET /cache/:key` - Read a value and its remaining TTL
//! - `DELETE /cache/:key` - Delete a key
//! - `POST /invalidate` - Delete keys matching a glob
//! - `POST /invalidate-tags` - Bump a tag set version
//! - `GET /stats` - Cache statistics
//! - `GET /health` - Health check endpoint

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
