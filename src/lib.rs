/*
 * Tinker - Sandboxed Tool-Calling Agent
 * File Path: src/lib.rs
 * Responsibility: Shared library modules
 */

pub mod agent_loop;
pub mod config;
pub mod dispatch;
pub mod llm;
pub mod logging;
pub mod prompt;
pub mod registry;
pub mod sandbox;
pub mod tools;
