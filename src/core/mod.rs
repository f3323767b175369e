//! Archive loading, configuration and time helpers

pub mod config;
pub mod conversation;
pub mod paths;
pub mod timeline;
