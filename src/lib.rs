pub mod config;
pub mod database;
pub mod errors;
pub mod http_client;
pub mod messaging;
pub mod models;
pub mod orchestrator;
pub mod queue;
pub mod rate_limiter;
pub mod routes;
pub mod task_store;
pub mod worker_processing;
pub mod worker_scheduler;
