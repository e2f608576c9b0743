//! ABOUTME: Middleware modules for authentication and rate limiting
//! ABOUTME: JWT bearer authentication and per-IP sliding-window limits for Actix Web

pub mod auth;
pub mod ratelimit;
