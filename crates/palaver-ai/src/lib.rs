//! palaver-ai: Message vocabulary shared by agents and the orchestrator
//!
//! This crate defines the transcript entries exchanged between conversational
//! agents and the errors a reply-generation backend may surface. It owns no
//! wire format; providers translate to and from these types.

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::*;
