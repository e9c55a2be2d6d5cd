//! Error types for dayflow.

use uuid::Uuid;

/// Top-level error type for the scheduling engine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    #[error("Planner error: {0}")]
    Planner(#[from] PlannerError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Notification scheduler errors.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("Notification {id} not found")]
    NotFound { id: Uuid },

    #[error("Failed to load pending notifications: {0}")]
    LoadFailed(String),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

/// Day planner errors.
#[derive(Debug, thiserror::Error)]
pub enum PlannerError {
    #[error("Invalid working hours: {0}")]
    InvalidWindow(String),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

/// Result type alias for the scheduling engine.
pub type Result<T> = std::result::Result<T, Error>;
