//! Core library for the TopFive client: credential storage, the authenticated API
//! client with single-flight token refresh, the session layer and the game services.

pub mod auth;
pub mod config;
pub mod http;
pub mod models;
pub mod services;
