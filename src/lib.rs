//! culvert: SSH tunnel manager for out-of-band management interfaces
//! reachable only through an SSH gateway.

pub mod catalog;
pub mod config;
pub mod profile;
pub mod tunnel;
