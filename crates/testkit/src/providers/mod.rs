//! Provider Simulator.
//!
//! Stands in for hosted generative-AI APIs. Instances are memoized per
//! `(provider, credential)` by a [`ProviderRegistry`] owned by one
//! orchestrator, and answer according to their active [`ScenarioConfig`].

mod content;
mod kind;
mod registry;
mod request;
mod response;
mod scenario;

pub use content::{estimate_tokens, CannedContent};
pub use kind::ProviderKind;
pub use registry::{InvocationRecord, ProviderInstance, ProviderRegistry, RegistryKey};
pub use request::{ChatMessage, MessageRole, ProviderRequest};
pub use response::ProviderResponse;
pub use scenario::{decide, InvocationContext, Outcome, Scenario, ScenarioConfig};
