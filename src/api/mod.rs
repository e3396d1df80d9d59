pub mod accounts;
pub mod content;
pub mod health;
pub mod organization;
pub mod research;
pub mod services;
pub mod summer;
pub mod training;
