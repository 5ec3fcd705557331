//! Specialist invocation for Compass.
//!
//! The [`SpecialistAdapter`] wraps any [`CompletionService`](compass_core::CompletionService)
//! with timeouts, a single reduced-prompt retry and response normalization.
//! [`OpenAiCompatService`] is the HTTP-backed service used by the CLI.

pub mod adapter;
pub mod normalize;
pub mod openai_compat;

pub use adapter::{FALLBACK_MESSAGE, InvocationContext, InvocationOutcome, SpecialistAdapter};
pub use normalize::{Normalized, normalize};
pub use openai_compat::OpenAiCompatService;
