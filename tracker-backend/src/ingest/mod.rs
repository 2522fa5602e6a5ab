//! Event ingestion: decoding lifecycle messages and applying them to the store.

pub mod event;
pub mod pipeline;
pub mod queue;

pub use event::{DecodeError, Envelope, PlayerEvent};
pub use pipeline::{LocationWriter, Outcome, Pipeline};
pub use queue::{Delivery, EventSource, MemoryConsumer, MemoryPublisher, PublishError, memory_queue};
