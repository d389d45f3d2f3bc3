pub mod best_pair;
pub mod config;
pub mod db_connect;
pub mod env_loader;
pub mod models;
pub mod pg_store;
pub mod pipeline;
pub mod resolver;
pub mod rows;
pub mod run_report;
pub mod sources;
pub mod statistics;
pub mod store;
pub mod store_schema;
pub mod vote_graph;
