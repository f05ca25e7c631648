//! clockr: describe your work in plain text, review the AI's project
//! allocations in the terminal, and log them to Clockify.

pub mod ai;
pub mod clockify;
pub mod config;
pub mod fuzzy;
pub mod model;
pub mod schedule;
pub mod store;
pub mod submit;
pub mod tui;
