//! Event channel: typed publish/subscribe for render progress.
//!
//! The coordinator publishes into an [`EventBus`] without knowing who
//! listens. Listeners pick the event kinds they want with [`EventKinds`]
//! and receive events either through a callback or a channel.
//!
//! Callbacks run on the publishing thread, which during a render is one of
//! the per-worker driver threads, so they must be `Send + Sync` and may
//! run concurrently with each other.

use bitflags::bitflags;
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

bitflags! {
    /// Set of event kinds a subscriber is interested in.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct EventKinds: u8 {
        /// [`RenderEvent::SceneLoaded`]
        const SCENE_LOADED   = 0b0000_0001;
        /// [`RenderEvent::LineComputed`]
        const LINE_COMPUTED  = 0b0000_0010;
        /// [`RenderEvent::SceneRendered`]
        const SCENE_RENDERED = 0b0000_0100;
        /// [`RenderEvent::EvalError`]
        const EVAL_ERROR     = 0b0000_1000;
        /// [`RenderEvent::StdoutWritten`]
        const STDOUT_WRITTEN = 0b0001_0000;
        /// Everything a display surface needs.
        const RENDER = Self::SCENE_LOADED.bits()
            | Self::LINE_COMPUTED.bits()
            | Self::SCENE_RENDERED.bits();
    }
}

/// Something observable happened in the coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderEvent {
    /// A render started; the display should resize and clear.
    SceneLoaded {
        /// Scene width.
        width: u32,
        /// Scene height.
        height: u32,
    },

    /// One row finished. Rows arrive in completion order, not row order.
    LineComputed {
        /// Row index, 0 being the bottom of the image.
        row: u32,
        /// Scene width.
        width: u32,
        /// Scene height.
        height: u32,
        /// Packed `0x00RRGGBB` pixels of the row.
        colors: Arc<[u32]>,
    },

    /// The render finished or was cancelled.
    SceneRendered {
        /// Wall-clock time since the render started.
        elapsed: Duration,
    },

    /// Source text failed to evaluate on some worker.
    EvalError {
        /// Human-readable error.
        message: String,
    },

    /// The engine wrote text.
    StdoutWritten {
        /// The text, unbuffered.
        text: String,
    },
}

impl RenderEvent {
    /// The kind flag of this event.
    pub const fn kind(&self) -> EventKinds {
        match self {
            Self::SceneLoaded { .. } => EventKinds::SCENE_LOADED,
            Self::LineComputed { .. } => EventKinds::LINE_COMPUTED,
            Self::SceneRendered { .. } => EventKinds::SCENE_RENDERED,
            Self::EvalError { .. } => EventKinds::EVAL_ERROR,
            Self::StdoutWritten { .. } => EventKinds::STDOUT_WRITTEN,
        }
    }
}

/// Handle returned by [`EventBus::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

type Callback = Arc<dyn Fn(&RenderEvent) + Send + Sync>;

#[derive(Clone)]
enum Delivery {
    Callback(Callback),
    Channel(Sender<RenderEvent>),
}

#[derive(Clone)]
struct Subscriber {
    id: SubscriptionId,
    kinds: EventKinds,
    delivery: Delivery,
}

/// Multi-subscriber event bus.
#[derive(Default)]
pub struct EventBus {
    next_id: AtomicU64,
    subscribers: Mutex<Vec<Subscriber>>,
}

impl EventBus {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    fn subscribers(&self) -> MutexGuard<'_, Vec<Subscriber>> {
        self.subscribers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn add(&self, kinds: EventKinds, delivery: Delivery) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers().push(Subscriber { id, kinds, delivery });
        id
    }

    /// Call `listener` for every event whose kind is in `kinds`.
    pub fn subscribe(
        &self,
        kinds: EventKinds,
        listener: impl Fn(&RenderEvent) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.add(kinds, Delivery::Callback(Arc::new(listener)))
    }

    /// Receive events whose kind is in `kinds` through a channel.
    ///
    /// The subscription is removed on the first publish after the
    /// receiver is dropped.
    pub fn channel(&self, kinds: EventKinds) -> (SubscriptionId, Receiver<RenderEvent>) {
        let (tx, rx) = unbounded();
        (self.add(kinds, Delivery::Channel(tx)), rx)
    }

    /// Remove a subscription. Returns whether it existed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers();
        let before = subscribers.len();
        subscribers.retain(|s| s.id != id);
        subscribers.len() != before
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers().len()
    }

    /// Deliver `event` to every interested subscriber.
    ///
    /// Listeners run after the subscriber list is released, so they may
    /// subscribe, unsubscribe or publish themselves.
    pub fn publish(&self, event: &RenderEvent) {
        let kind = event.kind();
        let targets: Vec<Subscriber> = self
            .subscribers()
            .iter()
            .filter(|s| s.kinds.intersects(kind))
            .cloned()
            .collect();

        let mut closed = Vec::new();
        for target in targets {
            match target.delivery {
                Delivery::Callback(callback) => callback(event),
                Delivery::Channel(tx) => {
                    if tx.send(event.clone()).is_err() {
                        closed.push(target.id);
                    }
                }
            }
        }

        if !closed.is_empty() {
            self.subscribers().retain(|s| !closed.contains(&s.id));
        }
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
