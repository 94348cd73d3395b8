//! Shared types for the mako agent bridge: conversation messages, tool
//! capabilities, model provider contract, and session update events.

pub mod errors;
pub mod events;
pub mod ids;
pub mod messages;
pub mod provider;
pub mod tools;
