pub mod agent;
pub mod config;
pub mod llm;
pub mod models;
pub mod push;
pub mod repos;
pub mod timeparse;
pub mod timezone;
pub mod tools;
pub mod turn;
