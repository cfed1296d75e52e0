//! Library crate for ssh-pass-scan exposing reusable modules.
pub mod logging;
pub mod probe;
pub mod report;
pub mod scanner;
pub mod targets;
pub mod transport;
pub mod types;
