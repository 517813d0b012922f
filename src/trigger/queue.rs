// Trigger queue - Lock-free hand-off of trigger requests to an audio thread

use super::{TriggerBackend, TriggerError, TriggerRequest};
use ringbuf::traits::{Producer, Split};
use ringbuf::HeapRb;

pub type TriggerProducer = ringbuf::HeapProd<TriggerRequest>;
pub type TriggerConsumer = ringbuf::HeapCons<TriggerRequest>;

/// Backend that enqueues requests into a single-producer ring buffer
///
/// The consumer half lives wherever sound is produced (usually an audio
/// callback) and pops requests when their scheduled time comes up.
pub struct QueueBackend {
    producer: TriggerProducer,
    dropped: u64,
}

impl QueueBackend {
    /// Requests rejected because the queue was full
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

/// Create a queue backend and the consumer half of its ring buffer
pub fn trigger_queue(capacity: usize) -> (QueueBackend, TriggerConsumer) {
    let rb = HeapRb::<TriggerRequest>::new(capacity.max(1));
    let (producer, consumer) = rb.split();
    (
        QueueBackend {
            producer,
            dropped: 0,
        },
        consumer,
    )
}

impl TriggerBackend for QueueBackend {
    fn trigger(&mut self, request: &TriggerRequest) -> Result<(), TriggerError> {
        self.producer.try_push(request.clone()).map_err(|_| {
            self.dropped += 1;
            TriggerError::QueueFull
        })
    }
}
