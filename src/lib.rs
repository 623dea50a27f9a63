//! azsdk -- clients for Azure REST services.
//!
//! Every client is built on the same [`pipeline::Pipeline`]: standard
//! headers, credential policies, retries, and typed errors.  Long-running
//! operations are driven by [`poller::Poller`] and list operations by
//! [`pager::Pager`].  Service families live in their own modules:
//! storage (files, page blobs, Data Lake, change feed), Schema Registry,
//! language services, Form Recognizer, Service Bus administration,
//! Event Hubs buffered publishing, and Resource Manager.

pub mod auth;
pub mod config;
pub mod connection_string;
pub mod errors;
pub mod eventhub;
pub mod form_recognizer;
pub mod language;
pub mod metrics;
pub mod mgmt;
pub mod pager;
pub mod pipeline;
pub mod poller;
pub mod schema_registry;
pub mod servicebus;
pub mod storage;
pub mod xml;

pub use errors::{Error, Result};
