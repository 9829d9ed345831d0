pub mod auth;
pub mod config;
pub mod engine;
pub mod limits;
pub mod model;
pub mod notify;
pub mod observability;
pub mod repository;
pub mod scheduler;
pub mod status;
pub mod tenant;
