// Access control: permissions, roles, sessions
pub mod access;

// Agent output types
pub mod analysis;

// Domain-specific error types
pub mod errors;

// Gateway input events
pub mod events;

// Portfolio snapshot model and analytics
pub mod portfolio;

// Repository ports
pub mod ports;

// Scenarios, conflicts, coordinator output
pub mod scenario;

// Utility weights and scores
pub mod scoring;

// Core enums
pub mod types;
