pub mod memory;
pub mod models;
pub mod postgres;
pub mod queries;
pub mod store;
