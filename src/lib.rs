//! fwvpnd Library
//!
//! This crate provides the core functionality for the fwvpnd WireGuard
//! access daemon: stateless HMAC token authentication, peer/IP-lease
//! management against a tunnel device, and the Unix socket control
//! surface that ties them together.

pub mod auth;
pub mod config;
pub mod error;
pub mod protocol;
pub mod service;
pub mod socket;
pub mod vpn;
