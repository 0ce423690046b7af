pub mod config;
pub mod logger;
pub mod model;
pub mod routes;
pub mod state;
