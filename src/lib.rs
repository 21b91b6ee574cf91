pub mod auth;
pub mod chat;
pub mod cli;
pub mod config;
pub mod conversation;
pub mod models;
pub mod storage;
pub mod transport;
