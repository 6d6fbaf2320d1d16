//! lint-cli library crate
//!
//! The conversation loop, its tools and the pieces around them. The binary in
//! `main.rs` only parses flags and wires a terminal to a [`session::Session`].

pub mod commands;
pub mod config;
pub mod conversation;
pub mod gateway;
pub mod memory;
pub mod prompt;
pub mod repl;
pub mod sandbox;
pub mod session;
pub mod spinner;
pub mod tools;
