use std::{
    collections::BTreeSet,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Weak,
    },
    time::Duration,
};

use futures::{stream::FuturesUnordered, StreamExt};
use tokio::{sync::Mutex, task::JoinHandle};
use tracing::{debug, error, info, warn};

use crate::{
    ack::{Acknowledgment, StatusSummary},
    batch::{BatchId, BatchPayload, Trigger},
    item::{Item, Recipient},
    metrics::{AggregatorMetrics, NoopMetrics},
    sink::{BatchSink, BoxError, StatusNotifier},
};

#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    /// Item count at which an epoch is finalized immediately.
    pub max_size: usize,
    /// Time since the first item of an epoch after which it is finalized.
    pub max_wait: Duration,
    /// Upper bound for a single status notification.
    pub notify_timeout: Duration,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            max_size: 20,
            max_wait: Duration::from_secs(10),
            notify_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
/// Result of a single finalize that did real work.
pub struct FlushReport {
    pub batch_id: BatchId,
    pub trigger: Trigger,
    pub expected_count: usize,
    pub outcome: Result<Acknowledgment, String>,
    pub notified: usize,
    pub notify_failures: usize,
}

/// State of the currently open epoch. `batch_id` is `None` while no epoch is open.
#[derive(Default)]
struct Epoch {
    batch_id: Option<BatchId>,
    items: Vec<Item>,
    recipients: BTreeSet<Recipient>,
    timer: Option<JoinHandle<()>>,
}

/// Buffers items from concurrent producers and hands them to a [`BatchSink`]
/// once either `max_size` items are buffered or `max_wait` has passed since
/// the first item of the epoch.
///
/// The epoch lock is held for the whole finalize, including the downstream
/// call and the status fan-out. Producers calling [`Aggregator::add`] in the
/// meantime wait and then open the next epoch.
pub struct Aggregator {
    config: AggregatorConfig,
    sink: Arc<dyn BatchSink>,
    notifier: Arc<dyn StatusNotifier>,
    metrics: Arc<dyn AggregatorMetrics>,
    epoch: Mutex<Epoch>,
    buffered: AtomicUsize,
}

impl Aggregator {
    pub fn new(
        config: AggregatorConfig,
        sink: Arc<dyn BatchSink>,
        notifier: Arc<dyn StatusNotifier>,
    ) -> Arc<Self> {
        Self::with_metrics(config, sink, notifier, Arc::new(NoopMetrics))
    }

    pub fn with_metrics(
        config: AggregatorConfig,
        sink: Arc<dyn BatchSink>,
        notifier: Arc<dyn StatusNotifier>,
        metrics: Arc<dyn AggregatorMetrics>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            sink,
            notifier,
            metrics,
            epoch: Mutex::new(Epoch::default()),
            buffered: AtomicUsize::new(0),
        })
    }

    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    /// Number of items in the open epoch. Does not wait for a running finalize.
    pub fn pending(&self) -> usize {
        self.buffered.load(Ordering::Relaxed)
    }

    /// Appends `item` to the open epoch, opening a new one if necessary.
    ///
    /// When the epoch reaches `max_size` it is finalized before this returns,
    /// which includes the downstream call.
    pub async fn add(self: &Arc<Self>, item: Item) {
        let mut epoch = self.epoch.lock().await;

        if epoch.batch_id.is_none() {
            let batch_id = BatchId::generate();
            debug!("Opening epoch {}", batch_id);
            epoch.timer = Some(self.arm_timer(batch_id.clone()));
            epoch.batch_id = Some(batch_id);
        }

        if let Some(recipient) = &item.recipient {
            epoch.recipients.insert(recipient.clone());
        }
        epoch.items.push(item);
        self.buffered.store(epoch.items.len(), Ordering::Relaxed);
        self.metrics.inc_items_added();

        if epoch.items.len() >= self.config.max_size.max(1) {
            self.finalize(&mut epoch, Trigger::Size).await;
        }
    }

    /// Finalizes whatever is buffered right now. Used on shutdown.
    pub async fn flush(&self) -> Option<FlushReport> {
        let mut epoch = self.epoch.lock().await;
        self.finalize(&mut epoch, Trigger::Shutdown).await
    }

    fn arm_timer(self: &Arc<Self>, batch_id: BatchId) -> JoinHandle<()> {
        let aggregator: Weak<Self> = Arc::downgrade(self);
        let max_wait = self.config.max_wait;

        tokio::spawn(async move {
            tokio::time::sleep(max_wait).await;
            if let Some(aggregator) = aggregator.upgrade() {
                aggregator.finalize_expired(&batch_id).await;
            }
        })
    }

    async fn finalize_expired(&self, batch_id: &BatchId) -> Option<FlushReport> {
        let mut epoch = self.epoch.lock().await;

        if epoch.batch_id.as_ref() != Some(batch_id) {
            debug!("Timer for {} fired after its epoch was finalized", batch_id);
            return None;
        }

        self.finalize(&mut epoch, Trigger::Timer).await
    }

    /// Must be called with the epoch lock held. Whichever trigger gets here
    /// first takes the epoch; any later caller finds it empty and returns `None`.
    #[tracing::instrument(skip(self, epoch))]
    async fn finalize(&self, epoch: &mut Epoch, trigger: Trigger) -> Option<FlushReport> {
        let Epoch {
            batch_id,
            items,
            recipients,
            timer,
        } = std::mem::take(epoch);
        self.buffered.store(0, Ordering::Relaxed);

        // The timer task is the one running us when trigger is Timer.
        if let Some(timer) = timer {
            if trigger != Trigger::Timer {
                timer.abort();
            }
        }

        let batch_id = match batch_id {
            Some(batch_id) if !items.is_empty() => batch_id,
            _ => return None,
        };

        let payload = BatchPayload::new(batch_id, items);
        let expected_count = payload.expected_count;
        info!(
            "Finalizing {} ({} items, {} recipients, trigger: {})",
            payload.batch_id,
            expected_count,
            recipients.len(),
            trigger
        );

        let outcome = match self.sink.send(&payload).await {
            Ok(ack) => {
                info!(
                    batch_id = %payload.batch_id,
                    status = ?ack.status,
                    processed_messages = ?ack.processed_messages,
                    rollback = ?ack.rollback,
                    "Batch delivered"
                );
                Ok(ack)
            }
            Err(e) => {
                error!(
                    "Sending {} downstream failed, dropping {} items: {}",
                    payload.batch_id, expected_count, e
                );
                self.metrics.inc_finalize_failures();
                Err(e.to_string())
            }
        };
        self.metrics.inc_batches_finalized(trigger, expected_count);

        let (notified, notify_failures) = self
            .notify_recipients(&payload.batch_id, &outcome, &recipients)
            .await;

        Some(FlushReport {
            batch_id: payload.batch_id,
            trigger,
            expected_count,
            outcome,
            notified,
            notify_failures,
        })
    }

    async fn notify_recipients(
        &self,
        batch_id: &BatchId,
        outcome: &Result<Acknowledgment, String>,
        recipients: &BTreeSet<Recipient>,
    ) -> (usize, usize) {
        if recipients.is_empty() {
            return (0, 0);
        }

        let text = StatusSummary {
            batch_id,
            outcome: outcome.as_ref().map_err(String::as_str),
        }
        .to_string();

        let mut tasks = recipients
            .iter()
            .map(|recipient| {
                let text = text.as_str();
                async move {
                    let notification = self.notifier.notify(recipient, text);
                    let result: Result<(), BoxError> =
                        match tokio::time::timeout(self.config.notify_timeout, notification).await {
                            Ok(result) => result,
                            Err(_) => Err("notification timed out".into()),
                        };
                    (recipient, result)
                }
            })
            .collect::<FuturesUnordered<_>>();

        let mut succeeded = 0;
        let mut failed = 0;
        while let Some((recipient, result)) = tasks.next().await {
            match result {
                Ok(()) => {
                    debug!("Notified {} about {}", recipient, batch_id);
                    succeeded += 1;
                }
                Err(e) => {
                    warn!("Notifying {} about {} failed: {}", recipient, batch_id, e);
                    failed += 1;
                }
            }
        }

        self.metrics.inc_notifications(succeeded, failed);
        (succeeded, failed)
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashSet,
        sync::{Arc, Mutex},
        time::Duration,
    };

    use async_trait::async_trait;

    use super::{Aggregator, AggregatorConfig};
    use crate::{
        ack::Acknowledgment,
        batch::{BatchPayload, Trigger},
        item::{Item, Recipient},
        sink::{BatchSink, BoxError, StatusNotifier},
    };

    #[derive(Default)]
    struct CountingSink {
        batches: Mutex<Vec<BatchPayload>>,
    }

    #[async_trait]
    impl BatchSink for CountingSink {
        async fn send(&self, payload: &BatchPayload) -> Result<Acknowledgment, BoxError> {
            self.batches.lock().unwrap().push(payload.clone());
            tokio::task::yield_now().await;
            Ok(Acknowledgment::default())
        }
    }

    struct SilentNotifier;

    #[async_trait]
    impl StatusNotifier for SilentNotifier {
        async fn notify(&self, _recipient: &Recipient, _text: &str) -> Result<(), BoxError> {
            Ok(())
        }
    }

    fn aggregator(max_size: usize, max_wait: Duration) -> (Arc<Aggregator>, Arc<CountingSink>) {
        let sink = Arc::new(CountingSink::default());
        let config = AggregatorConfig {
            max_size,
            max_wait,
            notify_timeout: Duration::from_secs(1),
        };
        (
            Aggregator::new(config, sink.clone(), Arc::new(SilentNotifier)),
            sink,
        )
    }

    async fn open_batch_id(aggregator: &Aggregator) -> crate::batch::BatchId {
        aggregator
            .epoch
            .lock()
            .await
            .batch_id
            .clone()
            .expect("open epoch")
    }

    #[tokio::test]
    async fn test_flush_on_empty_state_is_noop() {
        let (aggregator, sink) = aggregator(3, Duration::from_secs(60));

        assert_eq!(aggregator.flush().await, None);
        assert_eq!(aggregator.flush().await, None);
        assert!(sink.batches.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_size_trigger_wins_race_against_timer() {
        let (aggregator, sink) = aggregator(2, Duration::from_secs(60));
        aggregator.add(Item::new("a")).await;
        let batch_id = open_batch_id(&aggregator).await;

        let (_, timer_report) = tokio::join!(
            aggregator.add(Item::new("b")),
            aggregator.finalize_expired(&batch_id)
        );

        assert_eq!(timer_report, None);
        let batches = sink.batches.lock().unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].expected_count, 2);
        assert_eq!(aggregator.pending(), 0);
    }

    #[tokio::test]
    async fn test_timer_wins_race_against_size_trigger() {
        let (aggregator, sink) = aggregator(2, Duration::from_secs(60));
        aggregator.add(Item::new("a")).await;
        let batch_id = open_batch_id(&aggregator).await;

        let (timer_report, _) = tokio::join!(
            aggregator.finalize_expired(&batch_id),
            aggregator.add(Item::new("b"))
        );

        let report = timer_report.expect("timer finalized the epoch");
        assert_eq!(report.trigger, Trigger::Timer);
        assert_eq!(report.expected_count, 1);

        // "b" lost the race and opened the next epoch instead.
        assert_eq!(sink.batches.lock().unwrap().len(), 1);
        assert_eq!(aggregator.pending(), 1);
        assert_ne!(open_batch_id(&aggregator).await, batch_id);
    }

    #[tokio::test]
    async fn test_stale_timer_does_not_touch_next_epoch() {
        let (aggregator, sink) = aggregator(1, Duration::from_secs(60));
        aggregator.add(Item::new("a")).await;
        let first = sink.batches.lock().unwrap()[0].batch_id.clone();

        aggregator.add(Item::new("b")).await;
        aggregator.add(Item::new("c")).await;
        assert_eq!(aggregator.finalize_expired(&first).await, None);
        assert_eq!(sink.batches.lock().unwrap().len(), 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_producers_lose_and_duplicate_nothing() {
        let (aggregator, sink) = aggregator(7, Duration::from_millis(5));

        let producers = (0..8)
            .map(|producer| {
                let aggregator = aggregator.clone();
                tokio::spawn(async move {
                    for n in 0..25 {
                        aggregator
                            .add(Item::new(format!("{producer}-{n}")))
                            .await;
                        if n % 6 == 0 {
                            tokio::time::sleep(Duration::from_millis(3)).await;
                        }
                    }
                })
            })
            .collect::<Vec<_>>();
        for producer in producers {
            producer.await.unwrap();
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        aggregator.flush().await;

        let batches = sink.batches.lock().unwrap();
        let ids = batches
            .iter()
            .flat_map(|b| b.messages.iter().map(|m| m.id.clone()))
            .collect::<Vec<_>>();
        assert_eq!(ids.len(), 200);
        assert_eq!(ids.iter().collect::<HashSet<_>>().len(), 200);

        let batch_ids = batches.iter().map(|b| &b.batch_id).collect::<HashSet<_>>();
        assert_eq!(batch_ids.len(), batches.len());
        assert!(batches
            .iter()
            .all(|b| b.expected_count == b.messages.len() && b.expected_count <= 7));
    }
}
