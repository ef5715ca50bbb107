#![deny(unsafe_code)]

/// Terminal front-end: backend assembly, input parsing and rendering.
pub mod app;
/// Chat session state, commands and events.
pub mod chat;
/// Layered settings persisted as JSON.
pub mod settings;
