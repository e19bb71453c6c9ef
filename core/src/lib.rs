//! ReadyStackGo — Deployment & Runtime Control Plane for multi-container
//! application stacks over a Docker-compatible engine.
//!
//! This crate is the pure-library core (§1, §13): a REST/SignalR/auth/
//! persistence layer is expected to sit on top of [`service`] and own the
//! repositories it needs.

#[macro_use]
extern crate tracing;

pub mod cancellation;
pub mod clock;
pub mod config;
pub mod deployment;
pub mod duration;
pub mod engine;
pub mod entities;
pub mod error;
pub mod executor;
pub mod health;
pub mod id;
pub mod image_ref;
pub mod manifest;
pub mod notify;
pub mod observer;
pub mod plan;
pub mod planner;
pub mod registry_probe;
pub mod scheduler;
pub mod service;
pub mod variables;
