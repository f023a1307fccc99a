// src/lib.rs
pub mod command;
pub mod config;
pub mod consumer;
pub mod logging;
pub mod rabbitmq;
