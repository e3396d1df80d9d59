pub mod common;
pub mod content;
pub mod organization;
pub mod research;
pub mod services;
pub mod training;
pub mod user;
