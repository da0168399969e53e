pub mod cache;
pub mod config;
pub mod evaluate;
pub mod inference;
pub mod routes;
pub mod storage;
