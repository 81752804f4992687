use std::collections::HashMap;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use futures::Stream;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use log::{info, warn};

use crate::config::{MAX_BROADCAST_CAPACITY, TICK_INTERVAL};
use crate::data::price::{PriceGenerator, PriceSample};
use crate::error::ServiceError;

/// What happens to a symbol's ticker once nobody is subscribed to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetentionPolicy {
    /// Ticker and registry entry live until process shutdown.
    KeepAlive,
    /// Ticker is stopped and the entry removed when the last subscriber leaves.
    StopWhenIdle,
}

impl RetentionPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            RetentionPolicy::KeepAlive => "keep_alive",
            RetentionPolicy::StopWhenIdle => "stop_when_idle",
        }
    }
}

impl FromStr for RetentionPolicy {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "keep_alive" => Ok(RetentionPolicy::KeepAlive),
            "stop_when_idle" => Ok(RetentionPolicy::StopWhenIdle),
            other => Err(ServiceError::Config(format!(
                "Unknown STREAM_RETENTION '{}': expected keep_alive or stop_when_idle", other
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RegistryStats {
    pub symbols: usize,
    pub subscribers: usize,
    pub streams_started: usize,
}

// One ticking source plus the sender its subscribers attach to
struct SymbolStream {
    tx: broadcast::Sender<PriceSample>,
    ticker: JoinHandle<()>,
}

type StreamMap = Arc<RwLock<HashMap<String, SymbolStream>>>;

/// Process-wide map of symbol -> shared price stream.
///
/// The first `subscribe` for a symbol spawns its ticker; every later call
/// attaches a new receiver to the same broadcast channel, so all subscribers
/// of a symbol see identical samples in identical order.
#[derive(Clone)]
pub struct SymbolStreamRegistry {
    streams: StreamMap,
    generator: PriceGenerator,
    channel_capacity: usize,
    tick_interval: Duration,
    retention: RetentionPolicy,
    streams_started: Arc<AtomicUsize>,
}

impl SymbolStreamRegistry {
    /// `channel_capacity` is clamped to `1..=MAX_BROADCAST_CAPACITY`.
    pub fn new(channel_capacity: usize, retention: RetentionPolicy) -> Self {
        Self {
            streams: Arc::new(RwLock::new(HashMap::new())),
            generator: PriceGenerator::new(),
            channel_capacity: channel_capacity.clamp(1, MAX_BROADCAST_CAPACITY),
            tick_interval: TICK_INTERVAL,
            retention,
            streams_started: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Attach to the stream for `symbol`, creating it if absent.
    ///
    /// Must be called from within a Tokio runtime, since the first call for a
    /// symbol spawns its ticker task.
    pub fn subscribe(&self, symbol: &str) -> PriceSubscription {
        let existing = self.streams.read()
            .get(symbol)
            .map(|stream| stream.tx.subscribe());

        let rx = match existing {
            Some(rx) => rx,
            None => self.get_or_create(symbol),
        };

        let release = match self.retention {
            RetentionPolicy::KeepAlive => None,
            RetentionPolicy::StopWhenIdle => Some(IdleRelease {
                streams: self.streams.clone(),
                symbol: symbol.to_string(),
            }),
        };

        PriceSubscription {
            symbol: symbol.to_string(),
            inner: Some(BroadcastStream::new(rx)),
            release,
        }
    }

    // Re-checks under the write lock: a racing caller may have inserted first.
    fn get_or_create(&self, symbol: &str) -> broadcast::Receiver<PriceSample> {
        let mut streams = self.streams.write();
        streams.entry(symbol.to_string())
            .or_insert_with(|| self.start_stream(symbol))
            .tx
            .subscribe()
    }

    fn start_stream(&self, symbol: &str) -> SymbolStream {
        let (tx, _) = broadcast::channel(self.channel_capacity);
        let ticker_tx = tx.clone();
        let generator = self.generator;
        let period = self.tick_interval;
        let start = Instant::now() + period;
        let ticker_symbol = symbol.to_string();

        let ticker = tokio::spawn(async move {
            let mut interval_timer = interval_at(start, period);
            interval_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                interval_timer.tick().await;
                // An error only means nobody is attached right now
                let _ = ticker_tx.send(generator.generate(&ticker_symbol));
            }
        });

        let started = self.streams_started.fetch_add(1, Ordering::Relaxed) + 1;
        info!("Created price stream for symbol: {} ({} streams started)", symbol, started);

        SymbolStream { tx, ticker }
    }

    pub fn subscriber_count(&self, symbol: &str) -> usize {
        self.streams.read()
            .get(symbol)
            .map(|stream| stream.tx.receiver_count())
            .unwrap_or(0)
    }

    pub fn symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.streams.read().keys().cloned().collect();
        symbols.sort();
        symbols
    }

    pub fn stats(&self) -> RegistryStats {
        let streams = self.streams.read();
        RegistryStats {
            symbols: streams.len(),
            subscribers: streams.values().map(|stream| stream.tx.receiver_count()).sum(),
            streams_started: self.streams_started.load(Ordering::Relaxed),
        }
    }

    pub fn retention(&self) -> RetentionPolicy {
        self.retention
    }

    /// Stop every ticker. Open subscriptions end once their buffered samples
    /// are drained.
    pub fn shutdown(&self) {
        let mut streams = self.streams.write();
        let count = streams.len();
        for (_, stream) in streams.drain() {
            stream.ticker.abort();
        }
        info!("Stopped {} price streams", count);
    }
}

struct IdleRelease {
    streams: StreamMap,
    symbol: String,
}

impl IdleRelease {
    // Runs after this subscriber's receiver is gone. Holding the write lock
    // excludes concurrent subscribes, so a zero count here is final.
    fn release(&self) {
        let mut streams = self.streams.write();
        let idle = streams.get(&self.symbol)
            .map(|stream| stream.tx.receiver_count() == 0)
            .unwrap_or(false);

        if idle {
            if let Some(stream) = streams.remove(&self.symbol) {
                stream.ticker.abort();
                info!("Stopped idle price stream for symbol: {}", self.symbol);
            }
        }
    }
}

/// A subscriber's handle onto a symbol's shared stream.
///
/// Dropping it detaches the subscriber from fan-out.
pub struct PriceSubscription {
    symbol: String,
    inner: Option<BroadcastStream<PriceSample>>,
    release: Option<IdleRelease>,
}

impl PriceSubscription {
    pub fn symbol(&self) -> &str {
        &self.symbol
    }
}

impl Stream for PriceSubscription {
    type Item = PriceSample;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        let Some(inner) = this.inner.as_mut() else {
            return Poll::Ready(None);
        };

        loop {
            match Pin::new(&mut *inner).poll_next(cx) {
                Poll::Ready(Some(Ok(sample))) => return Poll::Ready(Some(sample)),
                Poll::Ready(Some(Err(BroadcastStreamRecvError::Lagged(skipped)))) => {
                    warn!("Subscriber for {} lagged behind, skipped {} samples", this.symbol, skipped);
                }
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

impl Drop for PriceSubscription {
    fn drop(&mut self) {
        // Receiver must be dropped before the idle check counts receivers
        self.inner.take();
        if let Some(release) = self.release.take() {
            release.release();
        }
    }
}
