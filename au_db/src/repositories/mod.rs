//! ABOUTME: Repository modules providing type-safe database operations
//! ABOUTME: Each repository handles queries for one table or aggregate

pub mod auras;
pub mod follows;
pub mod images;
pub mod leaderboard;
pub mod likes;
pub mod otps;
pub mod shares;
pub mod users;
