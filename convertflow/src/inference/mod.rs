//! Model service access.
//!
//! This module provides:
//! - Request/response types for the model service
//! - A blocking transport trait and its HTTP implementation
//! - The continuation-aware inference client
//! - Fragment stitching policies

mod client;
mod stitch;
mod transport;
mod types;

pub use client::InferenceClient;
pub use stitch::{continuation_prefill, Concatenate, DropLastLine, StitchPolicy};
#[cfg(feature = "http")]
pub use transport::HttpTransport;
pub use transport::ModelTransport;
pub use types::{
    Generation, GenerationParams, InferenceRequest, InferenceResponse, Role, StopReason, Turn,
};
