//! Ragline web crate - the outward-facing collaborators of the engine.
//!
//! HTTP corpus fetching and paragraph extraction, URL list loading, the
//! extractive response composer, and delivery of composed responses to a
//! chat endpoint.

pub mod delivery;
pub mod response;
pub mod source;
pub mod urls;

pub use delivery::{BotpressDelivery, ConfiguredDelivery, DeliveryChannel, LogDelivery};
pub use response::{compose_response, NO_RESULTS_MESSAGE};
pub use source::HttpCorpusSource;
pub use urls::load_identifiers;
