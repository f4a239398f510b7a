//! Polling streams over listing endpoints.
//!
//! A stream owns one background task. The task fetches the bound listing once
//! immediately and then on a fixed cadence, drops identifiers it has already
//! seen, and hands each new item to the consumer through a single-slot
//! channel. Consumers read with [`PollStream::recv`] (or as a
//! [`futures_util::Stream`]) and end the stream with [`PollStream::stop`].
//!
//! ```ignore
//! let mut stream = client.stream_links("nba", true).start();
//! while let Some(link) = stream.recv().await {
//!     println!("{}", link.title);
//! }
//! let exit = stream.stop().await;
//! ```

mod seen;
mod source;

pub use seen::SeenSet;
pub use source::{CommentSource, LinkSource, Source, StreamTarget};

use std::pin::Pin;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use futures_util::Stream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::client::Client;
use crate::error::TransportError;
use crate::models::Item;

/// Delay between poll cycles unless overridden with [`PollStream::with_interval`].
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Streams new comments under a link.
pub type CommentStream = PollStream<CommentSource>;

/// Streams new submissions in a subreddit.
pub type LinkStream = PollStream<LinkSource>;

/// Lifecycle of a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum StreamState {
    Created = 0,
    Running = 1,
    Stopping = 2,
    Stopped = 3,
}

impl StreamState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => StreamState::Created,
            1 => StreamState::Running,
            2 => StreamState::Stopping,
            _ => StreamState::Stopped,
        }
    }
}

/// Why a stream stopped producing items.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamExit {
    /// `stop` was called or the handle was dropped.
    Cancelled,
    /// A fetch failed. Streams never retry.
    Failed(TransportError),
    /// The polling task panicked.
    Aborted(String),
}

/// State shared between the handle and its polling task.
#[derive(Debug, Clone, Default)]
struct SharedState(Arc<AtomicU8>);

impl SharedState {
    fn get(&self) -> StreamState {
        StreamState::from_u8(self.0.load(Ordering::Acquire))
    }

    fn set(&self, state: StreamState) {
        self.0.store(state as u8, Ordering::Release);
    }

    /// Moves `from` -> `to`; no-op if the state has already moved on.
    fn advance(&self, from: StreamState, to: StreamState) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// Marks the stream `Stopped` when the polling task ends, panics included.
struct StoppedOnExit(SharedState);

impl Drop for StoppedOnExit {
    fn drop(&mut self) {
        self.0.set(StreamState::Stopped);
    }
}

/// Resolves once cancellation is requested or the handle is gone.
async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    let _ = cancel.wait_for(|stop| *stop).await;
}

/// The polling task. Sole owner of the seen set and sole sender of items.
struct Poller<S: Source> {
    source: S,
    only_new: bool,
    first_cycle: bool,
    seen: SeenSet,
    items: mpsc::Sender<S::Item>,
    cancel: watch::Receiver<bool>,
    state: SharedState,
}

impl<S: Source> Poller<S> {
    async fn run(mut self, interval: Duration) -> StreamExit {
        let _stopped = StoppedOnExit(self.state.clone());
        tracing::debug!(
            listing = %self.source.target(),
            only_new = self.only_new,
            interval_ms = interval.as_millis() as u64,
            "stream started"
        );

        let exit = self.poll_until_exit(interval).await;
        if let StreamExit::Failed(error) = &exit {
            tracing::warn!(
                listing = %self.source.target(),
                error = %error,
                "stream terminated by fetch failure"
            );
        }
        exit
    }

    async fn poll_until_exit(&mut self, interval: Duration) -> StreamExit {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancelled(&mut self.cancel) => return StreamExit::Cancelled,
                _ = ticker.tick() => {}
            }
            if let Err(exit) = self.cycle().await {
                return exit;
            }
        }
    }

    /// One fetch + filter + deliver pass. Returns the number of items handed off.
    async fn cycle(&mut self) -> Result<usize, StreamExit> {
        let fetched = tokio::select! {
            biased;
            _ = cancelled(&mut self.cancel) => return Err(StreamExit::Cancelled),
            fetched = self.source.fetch() => fetched,
        };
        let items = fetched.map_err(|error| {
            self.state.advance(StreamState::Running, StreamState::Stopping);
            StreamExit::Failed(error)
        })?;

        // The only_new flag shapes the first cycle alone.
        let baseline = std::mem::replace(&mut self.first_cycle, false) && self.only_new;

        let mut delivered = 0;
        for item in items {
            if !self.seen.insert(item.item_id()) || baseline {
                continue;
            }
            let permit = tokio::select! {
                biased;
                _ = cancelled(&mut self.cancel) => return Err(StreamExit::Cancelled),
                permit = self.items.reserve() => permit,
            };
            let Ok(permit) = permit else {
                return Err(StreamExit::Cancelled);
            };
            tracing::trace!(listing = %self.source.target(), id = item.item_id(), "delivering");
            permit.send(item);
            delivered += 1;
        }
        Ok(delivered)
    }
}

/// Handle to a polling stream.
///
/// Built in [`StreamState::Created`]; nothing is fetched until
/// [`start`](PollStream::start). Dropping the handle cancels the polling task
/// without waiting for it.
pub struct PollStream<S: Source> {
    target: StreamTarget,
    only_new: bool,
    interval: Duration,
    pending: Option<Poller<S>>,
    items: mpsc::Receiver<S::Item>,
    cancel: watch::Sender<bool>,
    state: SharedState,
    task: Option<JoinHandle<StreamExit>>,
    exit: Option<StreamExit>,
}

impl<S: Source> PollStream<S> {
    /// Binds a stream to `source`. With `only_new`, items present in the first
    /// fetch are recorded as seen but not delivered.
    pub fn new(source: S, only_new: bool) -> Self {
        let (tx, items) = mpsc::channel(1);
        let (cancel, cancel_rx) = watch::channel(false);
        let state = SharedState::default();
        let target = source.target().clone();
        let poller = Poller {
            source,
            only_new,
            first_cycle: true,
            seen: SeenSet::new(),
            items: tx,
            cancel: cancel_rx,
            state: state.clone(),
        };
        Self {
            target,
            only_new,
            interval: DEFAULT_POLL_INTERVAL,
            pending: Some(poller),
            items,
            cancel,
            state,
            task: None,
            exit: None,
        }
    }

    /// Sets the delay between poll cycles. Has no effect once started.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval.max(MIN_POLL_INTERVAL);
        self
    }

    /// Spawns the polling task on the current tokio runtime and returns
    /// immediately. Calling it again is a no-op.
    pub fn start(mut self) -> Self {
        let Some(poller) = self.pending.take() else {
            tracing::debug!(listing = %self.target, "stream already started");
            return self;
        };
        self.state.set(StreamState::Running);
        self.task = Some(tokio::spawn(poller.run(self.interval)));
        self
    }

    /// Next unseen item, or `None` once the stream has ended.
    pub async fn recv(&mut self) -> Option<S::Item> {
        self.items.recv().await
    }

    /// Cancels polling and waits for the task to exit.
    ///
    /// Any item the consumer has not received yet is discarded, so the stream
    /// yields nothing afterwards. Safe to call repeatedly; later calls return
    /// the first exit reason.
    pub async fn stop(&mut self) -> StreamExit {
        if let Some(exit) = &self.exit {
            return exit.clone();
        }

        self.pending = None;
        self.state.advance(StreamState::Running, StreamState::Stopping);
        self.cancel.send_replace(true);

        let exit = match self.task.take() {
            Some(task) => match task.await {
                Ok(exit) => exit,
                Err(join_error) => StreamExit::Aborted(join_error.to_string()),
            },
            None => StreamExit::Cancelled,
        };

        self.items.close();
        while self.items.try_recv().is_ok() {}
        self.state.set(StreamState::Stopped);

        tracing::debug!(listing = %self.target, exit = ?exit, "stream stopped");
        self.exit = Some(exit.clone());
        exit
    }

    pub fn state(&self) -> StreamState {
        self.state.get()
    }

    pub fn target(&self) -> &StreamTarget {
        &self.target
    }

    pub fn only_new(&self) -> bool {
        self.only_new
    }

    /// Exit reason, available once [`stop`](PollStream::stop) has returned.
    pub fn exit(&self) -> Option<&StreamExit> {
        self.exit.as_ref()
    }
}

// No field is structurally pinned.
impl<S: Source> Unpin for PollStream<S> {}

impl<S: Source> Stream for PollStream<S> {
    type Item = S::Item;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<S::Item>> {
        self.get_mut().items.poll_recv(cx)
    }
}

impl Client {
    /// Stream of comments posted under `link_id`. Call `start` to begin polling.
    pub fn stream_link_comments(&self, link_id: impl Into<String>, only_new: bool) -> CommentStream {
        PollStream::new(CommentSource::new(self.clone(), link_id), only_new)
    }

    /// Stream of new submissions in `subreddit`. Call `start` to begin polling.
    pub fn stream_links(&self, subreddit: impl Into<String>, only_new: bool) -> LinkStream {
        PollStream::new(LinkSource::new(self.clone(), subreddit), only_new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashSet, VecDeque};
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use futures_util::StreamExt;

    use crate::error::Result;
    use crate::models::Link;

    /// Replays one scripted response per fetch, then empty listings.
    struct Scripted {
        target: StreamTarget,
        cycles: Mutex<VecDeque<Result<Vec<Link>>>>,
        calls: Arc<AtomicUsize>,
    }

    impl Scripted {
        fn new(cycles: Vec<Result<Vec<Link>>>) -> (Self, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            let source = Self {
                target: StreamTarget::Subreddit("test".into()),
                cycles: Mutex::new(cycles.into()),
                calls: calls.clone(),
            };
            (source, calls)
        }
    }

    #[async_trait]
    impl Source for Scripted {
        type Item = Link;

        fn target(&self) -> &StreamTarget {
            &self.target
        }

        async fn fetch(&self) -> Result<Vec<Link>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.cycles
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(Vec::new()))
        }
    }

    fn links(ids: &[&str]) -> Vec<Link> {
        ids.iter()
            .map(|id| Link {
                id: id.to_string(),
                ..Link::default()
            })
            .collect()
    }

    fn unavailable() -> TransportError {
        TransportError::Status {
            status: 503,
            url: "http://test/r/test/new.json".into(),
        }
    }

    async fn next_id(stream: &mut PollStream<Scripted>) -> Option<String> {
        stream.recv().await.map(|link| link.id)
    }

    #[tokio::test]
    async fn baseline_cycle_records_without_delivering() {
        let (source, _) = Scripted::new(vec![Ok(links(&["a", "b", "c"]))]);
        let (tx, mut rx) = mpsc::channel(1);
        let (_cancel, cancel_rx) = watch::channel(false);
        let mut poller = Poller {
            source,
            only_new: true,
            first_cycle: true,
            seen: SeenSet::new(),
            items: tx,
            cancel: cancel_rx,
            state: SharedState::default(),
        };

        assert_eq!(poller.cycle().await, Ok(0));
        assert!(rx.try_recv().is_err());
        assert_eq!(poller.seen.len(), 3);
        for id in ["a", "b", "c"] {
            assert!(poller.seen.contains(id));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn first_cycle_replays_everything_in_order() {
        let (source, _) = Scripted::new(vec![Ok(links(&["a", "b", "c"]))]);
        let mut stream = PollStream::new(source, false).start();
        assert_eq!(stream.state(), StreamState::Running);

        assert_eq!(next_id(&mut stream).await.as_deref(), Some("a"));
        assert_eq!(next_id(&mut stream).await.as_deref(), Some("b"));
        assert_eq!(next_id(&mut stream).await.as_deref(), Some("c"));
        assert_eq!(stream.stop().await, StreamExit::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn only_unseen_items_are_delivered_after_baseline() {
        let (source, _) = Scripted::new(vec![
            Ok(links(&["a", "b"])),
            Ok(links(&["a", "b", "c"])),
            Ok(links(&["c", "b", "d", "e"])),
        ]);
        let mut stream = PollStream::new(source, true).start();

        assert_eq!(next_id(&mut stream).await.as_deref(), Some("c"));
        assert_eq!(next_id(&mut stream).await.as_deref(), Some("d"));
        assert_eq!(next_id(&mut stream).await.as_deref(), Some("e"));
        stream.stop().await;
        assert_eq!(stream.recv().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn no_identifier_is_delivered_twice() {
        let (source, _) = Scripted::new(vec![
            Ok(links(&["a", "b", "a"])),
            Ok(links(&["b", "c"])),
            Ok(links(&["c", "a", "d"])),
        ]);
        let stream = PollStream::new(source, false)
            .with_interval(Duration::from_millis(10))
            .start();

        let ids: Vec<String> = stream.take(4).map(|link| link.id).collect().await;
        assert_eq!(ids, ["a", "b", "c", "d"]);
        let unique: HashSet<&String> = ids.iter().collect();
        assert_eq!(unique.len(), ids.len());
    }

    #[tokio::test(start_paused = true)]
    async fn fetch_failure_ends_stream_without_further_polling() {
        let (source, calls) = Scripted::new(vec![
            Ok(links(&["a"])),
            Err(unavailable()),
            Ok(links(&["b"])),
        ]);
        let mut stream = PollStream::new(source, false).start();

        assert_eq!(next_id(&mut stream).await.as_deref(), Some("a"));
        assert_eq!(next_id(&mut stream).await, None);
        assert_eq!(stream.state(), StreamState::Stopped);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        assert_eq!(stream.stop().await, StreamExit::Failed(unavailable()));
        assert_eq!(stream.exit(), Some(&StreamExit::Failed(unavailable())));
    }

    #[tokio::test(start_paused = true)]
    async fn stop_returns_while_consumer_is_not_reading() {
        let (source, _) = Scripted::new(vec![Ok(links(&["a", "b", "c"]))]);
        let mut stream = PollStream::new(source, false).start();

        // Let the task fill the slot and block on the next send.
        tokio::time::sleep(Duration::from_millis(10)).await;

        let exit = tokio::time::timeout(Duration::from_secs(1), stream.stop())
            .await
            .expect("stop must not wait on the consumer");
        assert_eq!(exit, StreamExit::Cancelled);
        assert_eq!(stream.state(), StreamState::Stopped);
        assert_eq!(stream.recv().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_is_idempotent() {
        let (source, calls) = Scripted::new(vec![Ok(links(&["a"]))]);
        let mut stream = PollStream::new(source, true).start();
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(stream.stop().await, StreamExit::Cancelled);
        assert_eq!(stream.stop().await, StreamExit::Cancelled);
        assert_eq!(stream.state(), StreamState::Stopped);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stopping_an_unstarted_stream_never_fetches() {
        let (source, calls) = Scripted::new(vec![Ok(links(&["a"]))]);
        let mut stream = PollStream::new(source, false);
        assert_eq!(stream.state(), StreamState::Created);

        assert_eq!(stream.stop().await, StreamExit::Cancelled);
        assert_eq!(stream.state(), StreamState::Stopped);
        assert_eq!(stream.recv().await, None);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn starting_twice_spawns_one_task() {
        let (source, calls) = Scripted::new(vec![Ok(links(&["a"]))]);
        let mut stream = PollStream::new(source, true).start().start();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        stream.stop().await;
    }

    struct Exploding {
        target: StreamTarget,
    }

    #[async_trait]
    impl Source for Exploding {
        type Item = Link;

        fn target(&self) -> &StreamTarget {
            &self.target
        }

        async fn fetch(&self) -> Result<Vec<Link>> {
            panic!("listing decoder exploded");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_source_is_reported_as_aborted() {
        let source = Exploding {
            target: StreamTarget::Subreddit("test".into()),
        };
        let mut stream = PollStream::new(source, false).start();

        assert_eq!(stream.recv().await, None);
        assert_eq!(stream.state(), StreamState::Stopped);

        match stream.stop().await {
            StreamExit::Aborted(reason) => assert!(reason.contains("panicked"), "{reason}"),
            other => panic!("unexpected exit: {:?}", other),
        }
        assert_eq!(stream.state(), StreamState::Stopped);
        assert!(matches!(stream.exit(), Some(StreamExit::Aborted(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_handle_stops_polling() {
        let (source, calls) = Scripted::new(vec![Ok(links(&["a"]))]);
        let stream = PollStream::new(source, true).start();
        tokio::time::sleep(Duration::from_millis(10)).await;
        drop(stream);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
