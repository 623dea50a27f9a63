//! Buffered event publishing.
//!
//! Events are queued per partition and sent in batches by a background task
//! per partition: a partition is flushed when its buffer reaches
//! `max_buffer_length` or when `max_wait_time` has passed since its last
//! send.  Results are reported only through the `on_success` / `on_error`
//! callbacks.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::future::BoxFuture;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::partition::PartitionResolver;
use crate::errors::{Error, Result};
use crate::metrics;

/// Default per-partition buffer size (events).
pub const DEFAULT_MAX_BUFFER_LENGTH: usize = 1500;

/// Default time a partition may hold events before sending.
pub const DEFAULT_MAX_WAIT_TIME: Duration = Duration::from_secs(1);

/// Default batch payload limit.
pub const DEFAULT_MAX_BATCH_SIZE_BYTES: usize = 1024 * 1024;

/// Upper bound on the background check interval.
const MAX_CHECK_INTERVAL: Duration = Duration::from_secs(5);

// ── Events ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventData {
    pub body: Bytes,
    pub properties: HashMap<String, String>,
    /// Set when the event was routed by partition key.
    pub partition_key: Option<String>,
}

impl EventData {
    pub fn new(body: impl Into<Bytes>) -> Self {
        Self {
            body: body.into(),
            ..Default::default()
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Approximate encoded size.
    pub fn size_in_bytes(&self) -> usize {
        self.body.len()
            + self
                .properties
                .iter()
                .map(|(k, v)| k.len() + v.len())
                .sum::<usize>()
            + self.partition_key.as_ref().map_or(0, String::len)
    }
}

/// Where to send an event or batch.  Setting both fields is an error.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendOptions {
    pub partition_id: Option<String>,
    pub partition_key: Option<String>,
}

/// Events sent together to one partition.
#[derive(Debug, Clone)]
pub struct EventDataBatch {
    events: Vec<EventData>,
    size_in_bytes: usize,
    max_size_in_bytes: usize,
    options: SendOptions,
}

impl EventDataBatch {
    fn new(max_size_in_bytes: usize, options: SendOptions) -> Self {
        Self {
            events: Vec::new(),
            size_in_bytes: 0,
            max_size_in_bytes,
            options,
        }
    }

    /// Add an event; fails when the batch would exceed its size limit.
    pub fn add(&mut self, event: EventData) -> Result<()> {
        let size = event.size_in_bytes();
        if self.size_in_bytes + size > self.max_size_in_bytes {
            return Err(Error::invalid(format!(
                "event of {} bytes does not fit in the batch ({} of {} bytes used)",
                size, self.size_in_bytes, self.max_size_in_bytes
            )));
        }
        self.size_in_bytes += size;
        self.events.push(event);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn size_in_bytes(&self) -> usize {
        self.size_in_bytes
    }

    fn take(&mut self) -> Vec<EventData> {
        self.size_in_bytes = 0;
        std::mem::take(&mut self.events)
    }
}

// ── Transport seam ──────────────────────────────────────────────────

/// Delivers batches to an Event Hub partition.
pub trait PartitionSender: Send + Sync + 'static {
    fn get_partition_ids(&self) -> BoxFuture<'_, Result<Vec<String>>>;

    fn send<'a>(&'a self, partition_id: &'a str, events: &'a [EventData])
        -> BoxFuture<'a, Result<()>>;

    fn max_batch_size_in_bytes(&self) -> usize {
        DEFAULT_MAX_BATCH_SIZE_BYTES
    }
}

pub type OnSuccess = Arc<dyn Fn(&[EventData], &str) + Send + Sync>;
pub type OnError = Arc<dyn Fn(&[EventData], &str, &Error) + Send + Sync>;

#[derive(Clone)]
pub struct BufferedProducerOptions {
    pub max_buffer_length: usize,
    pub max_wait_time: Duration,
    pub on_success: OnSuccess,
    pub on_error: OnError,
}

impl std::fmt::Debug for BufferedProducerOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferedProducerOptions")
            .field("max_buffer_length", &self.max_buffer_length)
            .field("max_wait_time", &self.max_wait_time)
            .finish_non_exhaustive()
    }
}

impl BufferedProducerOptions {
    pub fn new(on_success: OnSuccess, on_error: OnError) -> Self {
        Self {
            max_buffer_length: DEFAULT_MAX_BUFFER_LENGTH,
            max_wait_time: DEFAULT_MAX_WAIT_TIME,
            on_success,
            on_error,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.max_buffer_length == 0 {
            return Err(Error::invalid("'max_buffer_length' must be an integer greater than 0"));
        }
        if self.max_wait_time.is_zero() {
            return Err(Error::invalid("'max_wait_time' must be a float greater than 0"));
        }
        Ok(())
    }
}

// ── Per-partition buffer ────────────────────────────────────────────

struct BufferState {
    queue: VecDeque<Vec<EventData>>,
    current: EventDataBatch,
    last_send: Instant,
}

struct PartitionBuffer<S: PartitionSender> {
    partition_id: String,
    sender: Arc<S>,
    options: BufferedProducerOptions,
    buffered: AtomicUsize,
    state: Mutex<BufferState>,
}

impl<S: PartitionSender> PartitionBuffer<S> {
    fn new(partition_id: String, sender: Arc<S>, options: BufferedProducerOptions) -> Self {
        let max = sender.max_batch_size_in_bytes();
        Self {
            partition_id,
            sender,
            options,
            buffered: AtomicUsize::new(0),
            state: Mutex::new(BufferState {
                queue: VecDeque::new(),
                current: EventDataBatch::new(max, SendOptions::default()),
                last_send: Instant::now(),
            }),
        }
    }

    fn buffered(&self) -> usize {
        self.buffered.load(Ordering::SeqCst)
    }

    /// Queue single events, flushing first if they would overflow the buffer.
    async fn put_events(&self, events: Vec<EventData>) {
        let mut state = self.state.lock().await;
        if self.buffered() + events.len() > self.options.max_buffer_length {
            self.flush_locked(&mut state).await;
        }
        let count = events.len();
        for event in events {
            if state.current.add(event.clone()).is_err() {
                let full = state.current.take();
                state.queue.push_back(full);
                if state.current.add(event.clone()).is_err() {
                    // Larger than an empty batch: sent on its own.
                    state.queue.push_back(vec![event]);
                }
            }
        }
        self.buffered.fetch_add(count, Ordering::SeqCst);
    }

    /// Queue a prepared batch as its own unit.
    async fn put_batch(&self, events: Vec<EventData>) {
        let mut state = self.state.lock().await;
        if self.buffered() + events.len() > self.options.max_buffer_length {
            self.flush_locked(&mut state).await;
        }
        if !state.current.is_empty() {
            let pending = state.current.take();
            state.queue.push_back(pending);
        }
        let count = events.len();
        state.queue.push_back(events);
        self.buffered.fetch_add(count, Ordering::SeqCst);
    }

    async fn flush(&self) {
        let mut state = self.state.lock().await;
        self.flush_locked(&mut state).await;
    }

    async fn flush_locked(&self, state: &mut BufferState) {
        if !state.current.is_empty() {
            let pending = state.current.take();
            state.queue.push_back(pending);
        }
        while let Some(batch) = state.queue.pop_front() {
            if batch.is_empty() {
                continue;
            }
            match self.sender.send(&self.partition_id, &batch).await {
                Ok(()) => {
                    debug!("Sent {} event(s) to partition {}", batch.len(), self.partition_id);
                    metrics::record_events_sent(&self.partition_id, batch.len());
                    (self.options.on_success)(&batch, &self.partition_id);
                }
                Err(e) => {
                    warn!(
                        "Failed to send {} event(s) to partition {}: {}",
                        batch.len(),
                        self.partition_id,
                        e
                    );
                    let error = Error::EventSend {
                        partition_id: self.partition_id.clone(),
                        message: e.to_string(),
                    };
                    (self.options.on_error)(&batch, &self.partition_id, &error);
                }
            }
            self.buffered.fetch_sub(batch.len(), Ordering::SeqCst);
        }
        state.last_send = Instant::now();
    }

    /// Drop everything still buffered.
    async fn discard(&self) -> usize {
        let mut state = self.state.lock().await;
        state.current.take();
        state.queue.clear();
        self.buffered.swap(0, Ordering::SeqCst)
    }

    /// Background flush loop; exits when `shutdown` flips to true.
    async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let interval = self.options.max_wait_time.min(MAX_CHECK_INTERVAL);
        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
            if self.buffered() == 0 {
                continue;
            }
            let mut state = self.state.lock().await;
            let waited = state.last_send.elapsed() >= self.options.max_wait_time;
            if waited || self.buffered() >= self.options.max_buffer_length {
                self.flush_locked(&mut state).await;
            }
        }
        debug!("Stopped flush task for partition {}", self.partition_id);
    }
}

// ── Producer ────────────────────────────────────────────────────────

/// Publishes events through per-partition buffers.
pub struct BufferedProducer<S: PartitionSender> {
    sender: Arc<S>,
    resolver: PartitionResolver,
    buffers: HashMap<String, Arc<PartitionBuffer<S>>>,
    shutdown: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl<S: PartitionSender> std::fmt::Debug for BufferedProducer<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferedProducer")
            .field("partitions", &self.resolver.partitions())
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl<S: PartitionSender> BufferedProducer<S> {
    /// Discover partitions and start one flush task per partition.
    pub async fn new(sender: Arc<S>, options: BufferedProducerOptions) -> Result<Self> {
        options.validate()?;
        let partition_ids = sender.get_partition_ids().await?;
        let (shutdown, _) = watch::channel(false);

        let mut buffers = HashMap::with_capacity(partition_ids.len());
        let mut tasks = Vec::with_capacity(partition_ids.len());
        for pid in &partition_ids {
            let buffer = Arc::new(PartitionBuffer::new(
                pid.clone(),
                Arc::clone(&sender),
                options.clone(),
            ));
            tasks.push(tokio::spawn(Arc::clone(&buffer).run(shutdown.subscribe())));
            buffers.insert(pid.clone(), buffer);
        }
        info!(
            "Started buffered producer over {} partition(s)",
            partition_ids.len()
        );

        Ok(Self {
            sender,
            resolver: PartitionResolver::new(partition_ids),
            buffers,
            shutdown,
            tasks: Mutex::new(tasks),
            closed: AtomicBool::new(false),
        })
    }

    pub fn partition_ids(&self) -> &[String] {
        self.resolver.partitions()
    }

    /// An empty batch bound for the given partition or key.
    pub fn create_batch(&self, options: SendOptions) -> Result<EventDataBatch> {
        self.resolve(&options)?;
        Ok(EventDataBatch::new(
            self.sender.max_batch_size_in_bytes(),
            options,
        ))
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::invalid("the buffered producer has been closed"));
        }
        Ok(())
    }

    fn resolve(&self, options: &SendOptions) -> Result<&Arc<PartitionBuffer<S>>> {
        let pid = match (&options.partition_id, &options.partition_key) {
            (Some(_), Some(_)) => {
                return Err(Error::invalid(
                    "partition_id and partition_key cannot be set at the same time",
                ))
            }
            (Some(pid), None) => pid.as_str(),
            (None, Some(key)) => self
                .resolver
                .partition_id_for_key(key)
                .ok_or_else(|| Error::invalid("the event hub has no partitions"))?,
            (None, None) => self
                .resolver
                .next_partition_id()
                .ok_or_else(|| Error::invalid("the event hub has no partitions"))?,
        };
        self.buffers
            .get(pid)
            .ok_or_else(|| Error::invalid(format!("invalid partition id '{}'", pid)))
    }

    /// Buffer one event.
    pub async fn send_event(&self, mut event: EventData, options: SendOptions) -> Result<()> {
        self.ensure_open()?;
        let buffer = self.resolve(&options)?;
        if let Some(key) = options.partition_key {
            event.partition_key = Some(key);
        }
        buffer.put_events(vec![event]).await;
        Ok(())
    }

    /// Buffer a batch; it is sent as one unit.
    pub async fn send_batch(&self, mut batch: EventDataBatch) -> Result<()> {
        self.ensure_open()?;
        if batch.is_empty() {
            return Ok(());
        }
        let buffer = self.resolve(&batch.options)?;
        let key = batch.options.partition_key.clone();
        let mut events = batch.take();
        if key.is_some() {
            for event in &mut events {
                event.partition_key = key.clone();
            }
        }
        buffer.put_batch(events).await;
        Ok(())
    }

    /// Events waiting for `partition_id`; unknown partitions report 0.
    pub fn buffered_event_count(&self, partition_id: &str) -> usize {
        self.buffers
            .get(partition_id)
            .map_or(0, |buffer| buffer.buffered())
    }

    pub fn total_buffered_event_count(&self) -> usize {
        self.buffers.values().map(|b| b.buffered()).sum()
    }

    /// Send everything buffered, reporting through the callbacks.
    pub async fn flush(&self) {
        for buffer in self.buffers.values() {
            buffer.flush().await;
        }
    }

    /// Stop the flush tasks; buffered events are sent when `flush` is true
    /// and dropped otherwise.
    pub async fn close(&self, flush: bool) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if flush {
            self.flush().await;
        } else {
            let mut dropped = 0;
            for buffer in self.buffers.values() {
                dropped += buffer.discard().await;
            }
            if dropped > 0 {
                warn!("Dropped {} buffered event(s) on close", dropped);
            }
        }
        let _ = self.shutdown.send(true);
        let tasks = std::mem::take(&mut *self.tasks.lock().await);
        for task in tasks {
            if let Err(e) = task.await {
                warn!("Flush task ended abnormally: {}", e);
            }
        }
        info!("Closed buffered producer");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct RecordingSender {
        partitions: usize,
        sent: StdMutex<Vec<(String, usize)>>,
        fail_partition: Option<String>,
    }

    impl PartitionSender for RecordingSender {
        fn get_partition_ids(&self) -> BoxFuture<'_, Result<Vec<String>>> {
            let ids = (0..self.partitions).map(|i| i.to_string()).collect();
            Box::pin(async move { Ok(ids) })
        }

        fn send<'a>(
            &'a self,
            partition_id: &'a str,
            events: &'a [EventData],
        ) -> BoxFuture<'a, Result<()>> {
            Box::pin(async move {
                if self.fail_partition.as_deref() == Some(partition_id) {
                    return Err(Error::invalid("link detached"));
                }
                self.sent
                    .lock()
                    .unwrap()
                    .push((partition_id.to_string(), events.len()));
                Ok(())
            })
        }
    }

    fn counting_options(
        successes: Arc<AtomicUsize>,
        failures: Arc<AtomicUsize>,
    ) -> BufferedProducerOptions {
        BufferedProducerOptions::new(
            Arc::new(move |events, _| {
                successes.fetch_add(events.len(), Ordering::SeqCst);
            }),
            Arc::new(move |events, _, _| {
                failures.fetch_add(events.len(), Ordering::SeqCst);
            }),
        )
    }

    fn total_sent(sender: &RecordingSender) -> usize {
        sender.sent.lock().unwrap().iter().map(|(_, n)| n).sum()
    }

    #[tokio::test]
    async fn test_options_validated() {
        let sender = Arc::new(RecordingSender {
            partitions: 1,
            ..Default::default()
        });
        let mut options = counting_options(Arc::default(), Arc::default());
        options.max_buffer_length = 0;
        assert!(BufferedProducer::new(Arc::clone(&sender), options).await.is_err());

        let mut options = counting_options(Arc::default(), Arc::default());
        options.max_wait_time = Duration::ZERO;
        assert!(BufferedProducer::new(sender, options).await.is_err());
    }

    #[tokio::test]
    async fn test_buffer_length_triggers_flush() {
        let sender = Arc::new(RecordingSender {
            partitions: 2,
            ..Default::default()
        });
        let successes = Arc::new(AtomicUsize::new(0));
        let mut options = counting_options(Arc::clone(&successes), Arc::default());
        options.max_buffer_length = 10;
        options.max_wait_time = Duration::from_secs(1000);
        let producer = BufferedProducer::new(Arc::clone(&sender), options).await.unwrap();
        let to_zero = SendOptions {
            partition_id: Some("0".into()),
            ..Default::default()
        };

        for _ in 0..7 {
            producer
                .send_event(EventData::new("data"), to_zero.clone())
                .await
                .unwrap();
        }
        assert_eq!(total_sent(&sender), 0);
        assert_eq!(producer.buffered_event_count("0"), 7);

        let mut batch = producer.create_batch(to_zero.clone()).unwrap();
        for _ in 0..9 {
            batch.add(EventData::new("9")).unwrap();
        }
        producer.send_batch(batch).await.unwrap();
        assert_eq!(total_sent(&sender), 7);

        for _ in 0..5 {
            producer
                .send_event(EventData::new("data"), to_zero.clone())
                .await
                .unwrap();
        }
        assert_eq!(total_sent(&sender), 17);
        assert_eq!(producer.total_buffered_event_count(), 4);

        producer.flush().await;
        assert_eq!(total_sent(&sender), 21);
        assert_eq!(successes.load(Ordering::SeqCst), 21);
        assert_eq!(producer.total_buffered_event_count(), 0);
        producer.close(true).await;
    }

    #[tokio::test]
    async fn test_wait_time_triggers_flush() {
        let sender = Arc::new(RecordingSender {
            partitions: 1,
            ..Default::default()
        });
        let mut options = counting_options(Arc::default(), Arc::default());
        options.max_wait_time = Duration::from_millis(50);
        let producer = BufferedProducer::new(Arc::clone(&sender), options).await.unwrap();
        producer
            .send_event(EventData::new("x"), SendOptions::default())
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(total_sent(&sender), 1);
        producer.close(false).await;
    }

    #[tokio::test]
    async fn test_round_robin_and_key_routing() {
        let sender = Arc::new(RecordingSender {
            partitions: 3,
            ..Default::default()
        });
        let mut options = counting_options(Arc::default(), Arc::default());
        options.max_wait_time = Duration::from_secs(1000);
        let producer = BufferedProducer::new(Arc::clone(&sender), options).await.unwrap();
        for _ in 0..6 {
            producer
                .send_event(EventData::new("rr"), SendOptions::default())
                .await
                .unwrap();
        }
        for pid in ["0", "1", "2"] {
            assert_eq!(producer.buffered_event_count(pid), 2);
        }

        let keyed = SendOptions {
            partition_key: Some("tenant-7".into()),
            ..Default::default()
        };
        producer.send_event(EventData::new("k"), keyed.clone()).await.unwrap();
        producer.send_event(EventData::new("k"), keyed).await.unwrap();
        let expected = PartitionResolver::new(vec!["0".into(), "1".into(), "2".into()])
            .partition_id_for_key("tenant-7")
            .unwrap()
            .to_string();
        assert_eq!(producer.buffered_event_count(&expected), 4);

        let both = SendOptions {
            partition_id: Some("0".into()),
            partition_key: Some("k".into()),
        };
        assert!(producer.send_event(EventData::new("x"), both).await.is_err());
        producer.close(false).await;
        assert_eq!(producer.total_buffered_event_count(), 0);
        assert_eq!(total_sent(&sender), 0);
    }

    #[tokio::test]
    async fn test_send_failure_reports_on_error() {
        let sender = Arc::new(RecordingSender {
            partitions: 2,
            fail_partition: Some("1".into()),
            ..Default::default()
        });
        let successes = Arc::new(AtomicUsize::new(0));
        let failures = Arc::new(AtomicUsize::new(0));
        let mut options = counting_options(Arc::clone(&successes), Arc::clone(&failures));
        options.max_wait_time = Duration::from_secs(1000);
        let producer = BufferedProducer::new(sender, options).await.unwrap();
        for pid in ["0", "1", "1"] {
            producer
                .send_event(
                    EventData::new("e"),
                    SendOptions {
                        partition_id: Some(pid.into()),
                        ..Default::default()
                    },
                )
                .await
                .unwrap();
        }
        producer.close(true).await;
        assert_eq!(successes.load(Ordering::SeqCst), 1);
        assert_eq!(failures.load(Ordering::SeqCst), 2);
        assert!(producer
            .send_event(EventData::new("late"), SendOptions::default())
            .await
            .is_err());
    }
}
