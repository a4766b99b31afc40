pub mod api;
pub mod comments;
pub mod config;
pub mod identity;
pub mod models;
pub mod session;
pub mod storage;
pub mod visits;
