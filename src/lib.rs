// Inbound report model and validation
pub mod report;

// Agent registry and fleet statistics
pub mod registry;

// Realtime fan-out hub
pub mod hub;

// Background monitoring loops
pub mod monitor;

// Report history persistence
pub mod storage;

// HTTP and WebSocket APIs
pub mod api;

// Configuration
pub mod config;
