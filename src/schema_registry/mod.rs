//! Schema Registry: schema storage and Avro encoding.

pub mod avro;
pub mod client;

pub use avro::{AvroEncoder, MessageContent, MessageType};
pub use client::{Schema, SchemaFormat, SchemaProperties, SchemaRegistryClient};
