//! Command handlers
//!
//! Entry points a host application calls. Errors are returned as
//! `ErrorResponse` so they can cross an IPC boundary.

pub mod recording;
