//! ABOUTME: HTTP route handlers grouped by API area

pub mod auth;
pub mod explore;
pub mod images;
pub mod social;
pub mod users;
