#![forbid(unsafe_code)]

//! Public entry point for the TubeCast backend crate.
//!
//! The crate holds everything the `backend` binary needs to serve the
//! platform API: configuration loading, the SQLite-backed record store, the
//! credential layer, local object storage for uploaded media, and the domain
//! operations for accounts, videos, playlists and comments.

pub mod accounts;
pub mod auth;
pub mod comments;
pub mod config;
pub mod error;
pub mod media;
pub mod playlists;
pub mod security;
pub mod store;
pub mod videos;
