//! Per-channel outbound message queue.
//!
//! Producers enqueue without blocking; a single consumer task drains the
//! queue, batches consecutive text into as few Discord messages as the
//! length limit allows, and sends embeds in order. When the queue is full
//! the oldest unconsumed message is dropped.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serenity::builder::CreateEmbed;
use serenity::model::id::ChannelId;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::bridge::pool::ChannelResource;
use crate::common::messages::OutboundMessage;
use crate::discord::transport::ChatTransport;

/// Separator between messages merged into one batch.
const BATCH_SEPARATOR: &str = "\n";

struct Shared {
    items: Mutex<VecDeque<OutboundMessage>>,
    notify: Notify,
    closed: CancellationToken,
    capacity: usize,
}

impl Shared {
    fn items(&self) -> MutexGuard<'_, VecDeque<OutboundMessage>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Handle to a channel's outbound queue. Cheap to share behind an `Arc`.
pub struct OutboundQueue {
    channel_id: ChannelId,
    shared: Arc<Shared>,
}

impl OutboundQueue {
    /// Create the queue and spawn its consumer task.
    pub fn spawn(
        channel_id: ChannelId,
        transport: Arc<dyn ChatTransport>,
        capacity: usize,
        max_message_length: usize,
    ) -> Self {
        let shared = Arc::new(Shared {
            items: Mutex::new(VecDeque::with_capacity(capacity.min(64))),
            notify: Notify::new(),
            closed: CancellationToken::new(),
            capacity: capacity.max(1),
        });

        let consumer = Consumer {
            channel_id,
            shared: shared.clone(),
            transport,
            max_message_length,
            batch: String::new(),
        };
        tokio::spawn(consumer.run());
        debug!(channel_id = %channel_id, "Outbound queue started");

        Self { channel_id, shared }
    }

    /// Queue a message. Never blocks; a no-op once the queue is disposed.
    pub fn enqueue(&self, text: Option<String>, embed: Option<CreateEmbed>) {
        if text.is_none() && embed.is_none() {
            return;
        }
        if self.shared.closed.is_cancelled() {
            return;
        }

        {
            let mut items = self.shared.items();
            while items.len() >= self.shared.capacity {
                items.pop_front();
                warn!(channel_id = %self.channel_id, "Outbound queue full, dropped oldest message");
            }
            items.push_back(OutboundMessage { text, embed });
        }
        self.shared.notify.notify_one();
    }

    /// Number of messages waiting for the consumer.
    pub fn pending(&self) -> usize {
        self.shared.items().len()
    }

    pub fn is_disposed(&self) -> bool {
        self.shared.closed.is_cancelled()
    }
}

impl ChannelResource for OutboundQueue {
    /// Close the queue and discard anything not yet consumed.
    fn dispose(&self) {
        if self.shared.closed.is_cancelled() {
            return;
        }
        self.shared.closed.cancel();
        self.shared.items().clear();
        debug!(channel_id = %self.channel_id, "Outbound queue disposed");
    }
}

struct Consumer {
    channel_id: ChannelId,
    shared: Arc<Shared>,
    transport: Arc<dyn ChatTransport>,
    max_message_length: usize,
    batch: String,
}

impl Consumer {
    async fn run(mut self) {
        loop {
            let drained: Vec<OutboundMessage> = {
                let mut items = self.shared.items();
                if self.shared.closed.is_cancelled() {
                    break;
                }
                items.drain(..).collect()
            };

            if drained.is_empty() {
                tokio::select! {
                    _ = self.shared.closed.cancelled() => break,
                    _ = self.shared.notify.notified() => continue,
                }
            }

            for message in drained {
                self.process(message).await;
            }

            // Don't hold a partial batch until the next burst
            if !self.batch.is_empty() {
                self.flush(None).await;
            }
        }

        debug!(channel_id = %self.channel_id, "Outbound queue consumer exited");
    }

    async fn process(&mut self, message: OutboundMessage) {
        if let Some(embed) = message.embed {
            self.flush(Some(embed)).await;
        }

        if let Some(text) = message.text {
            if !self.try_append(&text) {
                self.flush(None).await;
                self.batch = text;
            }
        }
    }

    /// Append text to the current batch if the result stays within the limit.
    fn try_append(&mut self, text: &str) -> bool {
        let batch_len = self.batch.chars().count();
        let text_len = text.chars().count();

        if batch_len == 0 {
            if text_len > self.max_message_length {
                return false;
            }
            self.batch.push_str(text);
            return true;
        }

        if batch_len + BATCH_SEPARATOR.len() + text_len > self.max_message_length {
            return false;
        }
        self.batch.push_str(BATCH_SEPARATOR);
        self.batch.push_str(text);
        true
    }

    /// Send the current batch, together with an embed if given.
    async fn flush(&mut self, embed: Option<CreateEmbed>) {
        let text = if self.batch.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.batch))
        };
        if text.is_none() && embed.is_none() {
            return;
        }

        if let Err(e) = self.transport.send_message(self.channel_id, text, embed).await {
            error!(channel_id = %self.channel_id, "Failed to send message batch: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::testing::RecordingTransport;
    use std::time::Duration;

    const CHANNEL: ChannelId = ChannelId::new(100);

    /// With the clock paused the sleep only ends once every task is idle,
    /// so the consumer has drained whatever it could.
    async fn settle() {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_is_batched() {
        let transport = Arc::new(RecordingTransport::new());
        let queue = OutboundQueue::spawn(CHANNEL, transport.clone(), 16, 2000);

        queue.enqueue(Some("one".to_string()), None);
        queue.enqueue(Some("two".to_string()), None);
        queue.enqueue(Some("three".to_string()), None);
        settle().await;

        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].text.as_deref(), Some("one\ntwo\nthree"));
        assert!(sent[0].embed_title.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_batch_overflow_starts_new_batch() {
        let transport = Arc::new(RecordingTransport::new());
        let queue = OutboundQueue::spawn(CHANNEL, transport.clone(), 16, 10);

        queue.enqueue(Some("aaaa".to_string()), None);
        queue.enqueue(Some("bbbb".to_string()), None);
        queue.enqueue(Some("cccc".to_string()), None);
        settle().await;

        let texts: Vec<_> = transport.sent().into_iter().filter_map(|m| m.text).collect();
        assert_eq!(texts, vec!["aaaa\nbbbb".to_string(), "cccc".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_embed_flushes_pending_batch_with_it() {
        let transport = Arc::new(RecordingTransport::new());
        let queue = OutboundQueue::spawn(CHANNEL, transport.clone(), 16, 2000);

        queue.enqueue(Some("before".to_string()), None);
        queue.enqueue(None, Some(CreateEmbed::new().title("crash")));
        queue.enqueue(Some("after".to_string()), None);
        settle().await;

        let sent = transport.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].text.as_deref(), Some("before"));
        assert_eq!(sent[0].embed_title.as_deref(), Some("crash"));
        assert_eq!(sent[1].text.as_deref(), Some("after"));
        assert!(sent[1].embed_title.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_text_and_embed_in_one_item() {
        let transport = Arc::new(RecordingTransport::new());
        let queue = OutboundQueue::spawn(CHANNEL, transport.clone(), 16, 2000);

        queue.enqueue(Some("before".to_string()), None);
        queue.enqueue(
            Some("caption".to_string()),
            Some(CreateEmbed::new().title("crash")),
        );
        settle().await;

        // The embed leaves with the pending batch, its own text follows
        let sent = transport.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].text.as_deref(), Some("before"));
        assert_eq!(sent[0].embed_title.as_deref(), Some("crash"));
        assert_eq!(sent[1].text.as_deref(), Some("caption"));
        assert!(sent[1].embed_title.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_embed_alone_is_sent_without_text() {
        let transport = Arc::new(RecordingTransport::new());
        let queue = OutboundQueue::spawn(CHANNEL, transport.clone(), 16, 2000);

        queue.enqueue(None, Some(CreateEmbed::new().title("status")));
        settle().await;

        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].text.is_none());
        assert_eq!(sent[0].embed_title.as_deref(), Some("status"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_queue_drops_oldest() {
        let transport = Arc::new(RecordingTransport::new());
        transport.hold_sends();
        let queue = OutboundQueue::spawn(CHANNEL, transport.clone(), 4, 2000);

        // The consumer takes the first message and stalls on its send
        queue.enqueue(None, Some(CreateEmbed::new().title("first")));
        settle().await;

        for i in 0..10 {
            queue.enqueue(Some(format!("m{}", i)), None);
        }
        assert_eq!(queue.pending(), 4);

        transport.release_sends();
        settle().await;

        let sent = transport.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].embed_title.as_deref(), Some("first"));
        assert_eq!(sent[1].text.as_deref(), Some("m6\nm7\nm8\nm9"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_failure_does_not_stop_consumer() {
        let transport = Arc::new(RecordingTransport::new());
        transport.fail_sends(true);
        let queue = OutboundQueue::spawn(CHANNEL, transport.clone(), 16, 2000);

        queue.enqueue(Some("lost".to_string()), None);
        settle().await;
        assert!(transport.sent().is_empty());

        transport.fail_sends(false);
        queue.enqueue(Some("delivered".to_string()), None);
        settle().await;

        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].text.as_deref(), Some("delivered"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_separate_bursts_are_separate_messages() {
        let transport = Arc::new(RecordingTransport::new());
        let queue = OutboundQueue::spawn(CHANNEL, transport.clone(), 16, 2000);

        queue.enqueue(Some("first".to_string()), None);
        settle().await;
        queue.enqueue(Some("second".to_string()), None);
        settle().await;

        assert_eq!(transport.sent().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispose_is_idempotent_and_silences_queue() {
        let transport = Arc::new(RecordingTransport::new());
        let queue = OutboundQueue::spawn(CHANNEL, transport.clone(), 16, 2000);

        queue.dispose();
        queue.dispose();
        assert!(queue.is_disposed());

        queue.enqueue(Some("ignored".to_string()), None);
        assert_eq!(queue.pending(), 0);
        settle().await;

        assert!(transport.sent().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispose_discards_unconsumed() {
        let transport = Arc::new(RecordingTransport::new());
        transport.hold_sends();
        let queue = OutboundQueue::spawn(CHANNEL, transport.clone(), 16, 2000);

        queue.enqueue(None, Some(CreateEmbed::new().title("in flight")));
        settle().await;
        queue.enqueue(Some("never sent".to_string()), None);

        queue.dispose();
        transport.release_sends();
        settle().await;

        // The in-flight send completes, the rest is discarded
        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].embed_title.as_deref(), Some("in flight"));
    }
}
