//! Shared building blocks for the keiba crates:
//! - **Configuration**: connection parameters and cache location (`config`).
//! - **Telemetry**: tracing subscriber setup (`telemetry`).
pub mod config;
pub mod telemetry;
