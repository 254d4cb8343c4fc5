//! vpsmon: a VPS monitoring dashboard server. Users store named WebSocket
//! probe endpoints; the server keeps one persistent push connection per
//! endpoint, decodes the metric samples it receives, and serves the latest
//! state over an HTTP API.

pub mod auth;
pub mod conn;
pub mod db;
pub mod format;
pub mod http;
pub mod manager;
pub mod readmodel;
pub mod sample;
