pub mod account;
pub mod api_client;
pub mod assistant;
pub mod commands;
pub mod refresh;
pub mod session;
pub mod task_service;
pub mod tools;
