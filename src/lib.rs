//! PaintBid Core Library
//!
//! This crate provides the core pipeline of the PaintBid estimating app:
//! guided room-capture sessions, estimate assembly, and durable bid storage.

pub mod estimate;
pub mod persistence;
pub mod telemetry;
pub mod walkthrough;
