//! Event Hubs publishing helpers.

pub mod buffered;
pub mod partition;

pub use buffered::{
    BufferedProducer, BufferedProducerOptions, EventData, EventDataBatch, PartitionSender,
    SendOptions,
};
pub use partition::PartitionResolver;
