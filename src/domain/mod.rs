pub mod actor;
pub mod admission;
pub mod comment_target;
pub mod workflow;
