//! REST client for the dashboard backend.
//!
//! This module provides the `BackendClient` for signing in and for making
//! bearer-authenticated calls to the users, products, orders, categories,
//! and files endpoints on behalf of a verified session.

pub mod client;
pub mod error;

pub use client::{BackendClient, FileResponse, LoginResponse, Resource};
pub use error::ApiError;
