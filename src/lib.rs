/*
 * Chatter - Discord Auto-Chat & Auto-Reply Companion
 * File Path: src/lib.rs
 * Responsibility: Shared library modules
 */

pub mod config;
pub mod corpus;
pub mod cursor;
pub mod discord;
pub mod gateway;
pub mod llm;
pub mod persona;
pub mod responder;
pub mod retry;
pub mod runner;
pub mod session;
