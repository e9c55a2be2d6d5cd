//! Dayflow — personal task scheduling engine.

pub mod config;
pub mod coordinator;
pub mod error;
pub mod notify;
pub mod planner;
pub mod store;
pub mod tasks;
