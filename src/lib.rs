pub mod app_config;
pub mod certificate;
pub mod diagnostics;
pub mod domain;
pub mod pikvm;
pub mod polling;
pub mod registry;
pub mod setup;
pub mod telemetry;
