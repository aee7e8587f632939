pub mod generator;
pub mod handlers;
#[cfg(test)]
pub mod memory;
pub mod models;
pub mod prompts;
pub mod service;
pub mod store;
