//! Storefront Session - client-side session lifecycle for the grocery-delivery storefront
//!
//! This library owns the customer's session against the storefront REST API:
//! token persistence, identity resolution, inactivity and expiry enforcement.

pub mod api;
pub mod config;
pub mod session;
pub mod storage;
pub mod types;
