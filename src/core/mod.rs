//! Core module - Session state machine, configuration, and events

pub mod config;
pub mod events;
pub mod session;
pub mod state;
