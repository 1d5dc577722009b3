pub mod acl;
pub mod app;
pub mod authz;
pub mod config;
pub mod csv;
pub mod db;
pub mod docs;
pub mod effects;
pub mod errors;
pub mod events;
pub mod extract;
pub mod ident;
pub mod jobs;
pub mod jwt;
pub mod models;
pub mod query;
pub mod routes;
pub mod seed;
pub mod storage;
pub mod utils;

// Re-export commonly used items for tests
pub use app::create_app;
