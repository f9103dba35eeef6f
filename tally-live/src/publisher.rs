//! Series Publisher: owns the latest computed value and fans it out.
//!
//! A publish swaps in a new `Arc<T>`; the previous value is never touched,
//! so a renderer holding an older `Arc` keeps reading a complete value.
//! Each feed gets every publish exactly once, in publish order. Nothing here
//! waits on a renderer: delivery goes through unbounded channels.

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::lock;

/// One published value, tagged with its position in publish order.
#[derive(Debug)]
pub struct Published<T> {
    pub version: u64,
    pub value: Arc<T>,
}

impl<T> Clone for Published<T> {
    fn clone(&self) -> Self {
        Self {
            version: self.version,
            value: self.value.clone(),
        }
    }
}

struct State<T> {
    current: Arc<T>,
    version: u64,
    feeds: Vec<mpsc::UnboundedSender<Published<T>>>,
}

pub struct Publisher<T> {
    state: Arc<Mutex<State<T>>>,
}

impl<T> Clone for Publisher<T> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
        }
    }
}

impl<T: Default> Default for Publisher<T> {
    fn default() -> Self {
        Self::with_initial(T::default())
    }
}

impl<T: Default> Publisher<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the current value with the empty one.
    pub fn clear(&self) -> u64 {
        self.publish(T::default())
    }
}

impl<T> Publisher<T> {
    pub fn with_initial(value: T) -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                current: Arc::new(value),
                version: 0,
                feeds: Vec::new(),
            })),
        }
    }

    /// Atomically replace the current value and notify every feed.
    /// Returns the new version.
    pub fn publish(&self, value: T) -> u64 {
        let mut state = lock(&self.state);
        state.version += 1;
        state.current = Arc::new(value);
        let published = Published {
            version: state.version,
            value: state.current.clone(),
        };
        state.feeds.retain(|tx| tx.send(published.clone()).is_ok());
        log::debug!("published v{} to {} feed(s)", published.version, state.feeds.len());
        published.version
    }

    pub fn latest(&self) -> Arc<T> {
        lock(&self.state).current.clone()
    }

    /// Number of publishes so far (0 means only the initial value exists).
    pub fn version(&self) -> u64 {
        lock(&self.state).version
    }

    /// Register a renderer. The feed receives every later publish.
    pub fn subscribe(&self) -> Feed<T> {
        let (tx, rx) = mpsc::unbounded_channel();
        lock(&self.state).feeds.push(tx);
        Feed { rx }
    }
}

impl<T: Send + Sync + 'static> Publisher<T> {
    /// Run `render` on the tokio runtime once per publish, in publish order.
    pub fn subscribe_with<F>(&self, mut render: F) -> JoinHandle<()>
    where
        F: FnMut(&Published<T>) + Send + 'static,
    {
        let mut feed = self.subscribe();
        tokio::spawn(async move {
            while let Some(published) = feed.next().await {
                render(&published);
            }
        })
    }
}

/// Receiving side of a publisher subscription.
pub struct Feed<T> {
    rx: mpsc::UnboundedReceiver<Published<T>>,
}

impl<T> Feed<T> {
    /// Wait for the next publish. `None` once every publisher handle is gone.
    pub async fn next(&mut self) -> Option<Published<T>> {
        self.rx.recv().await
    }

    /// Next publish if one is already queued.
    pub fn try_next(&mut self) -> Option<Published<T>> {
        self.rx.try_recv().ok()
    }

    /// Drain everything queued.
    pub fn drain(&mut self) -> Vec<Published<T>> {
        let mut out = Vec::new();
        while let Some(p) = self.try_next() {
            out.push(p);
        }
        out
    }
}
