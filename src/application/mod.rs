// Specialist analyzers and the coordinator
pub mod agents;

// Event gateway and scheduler
pub mod gateway;

// Persona router
pub mod routing;

// Utility scoring engine
pub mod scoring;

// Session lifecycle and permission gate
pub mod session_manager;

// Analysis state machine
pub mod state_machine;
