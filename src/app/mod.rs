//! Console front end: application state, input events, and notification rendering.

pub mod event;
pub mod handler;
pub mod state;
