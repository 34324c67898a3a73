pub mod batch;
pub mod callback;
pub mod collector;
pub mod dependencies;
pub mod gateway;
pub mod handlers;
pub mod models;
pub mod positions;
pub mod prompts;
pub mod workflow;
