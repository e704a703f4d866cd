//! # Pub/Sub Store
//!
//! The bus runs on top of any store offering channel publish and pattern
//! subscription with at-most-once delivery. [`PubSubStore`] is that seam;
//! [`InMemoryPubSub`] implements it in-process with the same glob rules and
//! delivery semantics as a Redis `PSUBSCRIBE`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::DEFAULT_SUBSCRIPTION_BUFFER;

/// A payload received on a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreMessage {
    /// Pattern that matched, as passed to `psubscribe`.
    pub pattern: Arc<str>,
    pub channel: String,
    pub payload: Vec<u8>,
}

/// Channel-based publish/subscribe primitives of the underlying store.
#[async_trait]
pub trait PubSubStore: Send + Sync + 'static {
    /// Publish `payload` on `channel`.
    ///
    /// Returns the number of subscriptions the payload was handed to.
    async fn publish(&self, channel: &str, payload: Vec<u8>) -> Result<usize, StoreError>;

    /// Subscribe to every channel matching a glob `pattern`.
    async fn psubscribe(&self, pattern: &str) -> Result<PatternSubscription, StoreError>;
}

/// Receiving end of a pattern subscription.
///
/// Backends feed it through the `mpsc::Sender` paired with the receiver.
/// Dropping it ends the subscription.
pub struct PatternSubscription {
    pattern: Arc<str>,
    receiver: mpsc::Receiver<StoreMessage>,
}

impl PatternSubscription {
    pub fn new(pattern: impl Into<Arc<str>>, receiver: mpsc::Receiver<StoreMessage>) -> Self {
        Self {
            pattern: pattern.into(),
            receiver,
        }
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Next message, or `None` once the store closed the subscription.
    pub async fn recv(&mut self) -> Option<StoreMessage> {
        self.receiver.recv().await
    }

    /// Next message if one is buffered.
    ///
    /// # Errors
    ///
    /// `StoreError::Closed` once the store closed the subscription.
    pub fn try_recv(&mut self) -> Result<Option<StoreMessage>, StoreError> {
        match self.receiver.try_recv() {
            Ok(message) => Ok(Some(message)),
            Err(mpsc::error::TryRecvError::Empty) => Ok(None),
            Err(mpsc::error::TryRecvError::Disconnected) => Err(StoreError::Closed),
        }
    }

    #[must_use]
    pub fn into_stream(self) -> ReceiverStream<StoreMessage> {
        ReceiverStream::new(self.receiver)
    }
}

/// Redis-style glob: `*`, `?`, `[abc]`, `[^abc]`, `[a-z]` and `\` escapes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobPattern {
    pattern: Vec<char>,
}

impl GlobPattern {
    /// # Errors
    ///
    /// `StoreError::InvalidPattern` for an unterminated `[` class or a
    /// trailing `\`.
    pub fn new(pattern: &str) -> Result<Self, StoreError> {
        let chars: Vec<char> = pattern.chars().collect();
        let mut i = 0;
        while i < chars.len() {
            match chars[i] {
                '\\' if i + 1 == chars.len() => {
                    return Err(StoreError::InvalidPattern {
                        pattern: pattern.to_string(),
                        reason: "trailing escape".to_string(),
                    });
                }
                '\\' => i += 2,
                '[' => match class_end(&chars, i) {
                    Some(end) => i = end + 1,
                    None => {
                        return Err(StoreError::InvalidPattern {
                            pattern: pattern.to_string(),
                            reason: "unterminated character class".to_string(),
                        });
                    }
                },
                _ => i += 1,
            }
        }
        Ok(Self { pattern: chars })
    }

    pub fn matches(&self, text: &str) -> bool {
        let text: Vec<char> = text.chars().collect();
        glob_match(&self.pattern, &text)
    }
}

/// Index of the `]` closing the class opened at `start`.
fn class_end(pattern: &[char], start: usize) -> Option<usize> {
    let mut i = start + 1;
    if pattern.get(i) == Some(&'^') {
        i += 1;
    }
    // A leading `]` is a literal member.
    if pattern.get(i) == Some(&']') {
        i += 1;
    }
    while i < pattern.len() {
        match pattern[i] {
            '\\' => i += 2,
            ']' => return Some(i),
            _ => i += 1,
        }
    }
    None
}

fn class_matches(class: &[char], c: char) -> bool {
    let (negated, class) = match class.split_first() {
        Some(('^', rest)) => (true, rest),
        _ => (false, class),
    };

    let mut found = false;
    let mut i = 0;
    while i < class.len() {
        let (low, consumed) = if class[i] == '\\' && i + 1 < class.len() {
            (class[i + 1], 2)
        } else {
            (class[i], 1)
        };
        i += consumed;

        if i + 1 < class.len() && class[i] == '-' {
            let high = class[i + 1];
            let (low, high) = if low <= high { (low, high) } else { (high, low) };
            if (low..=high).contains(&c) {
                found = true;
            }
            i += 2;
        } else if low == c {
            found = true;
        }
    }
    found != negated
}

fn glob_match(pattern: &[char], text: &[char]) -> bool {
    let (mut p, mut t) = (0, 0);
    // Position to resume from after the most recent `*`.
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        let step = match pattern.get(p) {
            Some('*') => {
                backtrack = Some((p, t));
                p += 1;
                continue;
            }
            Some('?') => Some(p + 1),
            Some('[') => match class_end(pattern, p) {
                Some(end) if class_matches(&pattern[p + 1..end], text[t]) => Some(end + 1),
                _ => None,
            },
            Some('\\') if p + 1 < pattern.len() => (pattern[p + 1] == text[t]).then_some(p + 2),
            Some(&c) => (c == text[t]).then_some(p + 1),
            None => None,
        };

        match step {
            Some(next) => {
                p = next;
                t += 1;
            }
            None => match backtrack {
                Some((star, matched)) => {
                    p = star + 1;
                    t = matched + 1;
                    backtrack = Some((star, matched + 1));
                }
                None => return false,
            },
        }
    }

    pattern[p..].iter().all(|&c| c == '*')
}

struct PatternSubscriber {
    pattern: GlobPattern,
    raw: Arc<str>,
    sender: mpsc::Sender<StoreMessage>,
}

/// In-process pub/sub store.
///
/// Each subscription has a bounded buffer; a payload arriving while the
/// buffer is full is dropped for that subscription only, mirroring a store
/// that disconnects or discards for slow consumers. Nothing is persisted:
/// payloads published before a subscription exists are never seen by it.
pub struct InMemoryPubSub {
    subscribers: Mutex<Vec<PatternSubscriber>>,
    buffer: usize,
    published: AtomicU64,
    dropped: AtomicU64,
}

impl InMemoryPubSub {
    #[must_use]
    pub fn new() -> Self {
        Self::with_buffer(DEFAULT_SUBSCRIPTION_BUFFER)
    }

    /// Create a store whose subscriptions buffer up to `buffer` payloads.
    #[must_use]
    pub fn with_buffer(buffer: usize) -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
            buffer: buffer.max(1),
            published: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Open subscriptions.
    pub fn subscriber_count(&self) -> usize {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|s| !s.sender.is_closed());
        subscribers.len()
    }

    pub fn buffer(&self) -> usize {
        self.buffer
    }

    /// Total publish calls.
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    /// Payloads discarded because a subscription buffer was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Drop every subscription, ending their streams.
    pub fn close(&self) {
        let closed = std::mem::take(&mut *self.subscribers.lock());
        debug!(subscriptions = closed.len(), "Store closed");
    }
}

impl Default for InMemoryPubSub {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PubSubStore for InMemoryPubSub {
    async fn publish(&self, channel: &str, payload: Vec<u8>) -> Result<usize, StoreError> {
        self.published.fetch_add(1, Ordering::Relaxed);

        let mut delivered = 0;
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|subscriber| {
            if subscriber.sender.is_closed() {
                return false;
            }
            if !subscriber.pattern.matches(channel) {
                return true;
            }

            let message = StoreMessage {
                pattern: Arc::clone(&subscriber.raw),
                channel: channel.to_string(),
                payload: payload.clone(),
            };
            match subscriber.sender.try_send(message) {
                Ok(()) => {
                    delivered += 1;
                    true
                }
                Err(mpsc::error::TrySendError::Full(_)) => {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        channel = channel,
                        pattern = %subscriber.raw,
                        "Subscription buffer full, payload dropped"
                    );
                    true
                }
                Err(mpsc::error::TrySendError::Closed(_)) => false,
            }
        });

        Ok(delivered)
    }

    async fn psubscribe(&self, pattern: &str) -> Result<PatternSubscription, StoreError> {
        let glob = GlobPattern::new(pattern)?;
        let raw: Arc<str> = Arc::from(pattern);
        let (sender, receiver) = mpsc::channel(self.buffer);

        self.subscribers.lock().push(PatternSubscriber {
            pattern: glob,
            raw: Arc::clone(&raw),
            sender,
        });
        debug!(pattern = pattern, "Pattern subscription created");

        Ok(PatternSubscription::new(raw, receiver))
    }
}
