//! Adapters for the hosted and local AI services, and the router that
//! falls through them in preference order.

pub mod duckduckgo;
pub mod fallback;
pub mod gemini;
pub mod ollama;
pub mod openai;
pub mod provider;
pub mod router;
pub mod sse;

pub use provider::{ChatProvider, ImageInput, VisionProvider};
pub use router::{Generation, ProviderRouter, FALLBACK_PROVIDER};
