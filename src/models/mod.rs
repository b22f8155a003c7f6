// Request/Response models
pub mod admin;
pub mod common;
pub mod credit_batch_ext; // Extension methods for entity::credit_batches
pub mod credits;
pub mod orders;
pub mod payments;
