//! Mock source for testing.
//!
//! Streams are scripted ahead of time and handed out in order. Calls that
//! find nothing scripted get a stream that ends immediately.

use super::{MeasurementSource, MeasurementStream};
use crate::ApiError;
use async_trait::async_trait;
use futures_util::future;
use futures_util::stream::{self, StreamExt};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use sync_types::{Measurement, Offset};

#[derive(Debug)]
enum Ending {
    Complete,
    Fail(ApiError),
    Hang,
}

#[derive(Debug)]
struct Script {
    items: Vec<Measurement>,
    ending: Ending,
}

impl Script {
    fn into_stream(self) -> MeasurementStream {
        let items = stream::iter(self.items.into_iter().map(Ok));
        match self.ending {
            Ending::Complete => items.boxed(),
            Ending::Fail(error) => items.chain(stream::once(future::ready(Err(error)))).boxed(),
            Ending::Hang => items.chain(stream::pending()).boxed(),
        }
    }
}

type Opening = Result<Script, ApiError>;

/// Mock measurement source.
///
/// Clones share state, so a test can keep one handle while the engine owns
/// another.
#[derive(Debug, Default)]
pub struct MockSource {
    inner: Arc<Mutex<MockSourceInner>>,
}

#[derive(Debug, Default)]
struct MockSourceInner {
    live: VecDeque<Opening>,
    replay: HashMap<(Offset, Offset), VecDeque<Opening>>,
    live_opens: usize,
    replay_requests: Vec<(Offset, Offset)>,
}

impl MockSource {
    /// Create a new mock source.
    pub fn new() -> Self {
        Self::default()
    }

    fn push_live(&self, opening: Opening) {
        self.inner.lock().unwrap().live.push_back(opening);
    }

    fn push_replay(&self, from: &Offset, to: &Offset, opening: Opening) {
        self.inner
            .lock()
            .unwrap()
            .replay
            .entry((from.clone(), to.clone()))
            .or_default()
            .push_back(opening);
    }

    /// Queue a live stream that yields `items` and then ends.
    pub fn queue_live(&self, items: Vec<Measurement>) {
        self.push_live(Ok(Script {
            items,
            ending: Ending::Complete,
        }));
    }

    /// Queue a live stream that yields `items` and then fails.
    pub fn queue_live_then_fail(&self, items: Vec<Measurement>, error: ApiError) {
        self.push_live(Ok(Script {
            items,
            ending: Ending::Fail(error),
        }));
    }

    /// Queue a live stream that yields `items` and then stays open.
    pub fn queue_live_then_hang(&self, items: Vec<Measurement>) {
        self.push_live(Ok(Script {
            items,
            ending: Ending::Hang,
        }));
    }

    /// Cause the next `live()` call to fail with `error`.
    pub fn fail_next_live(&self, error: ApiError) {
        self.push_live(Err(error));
    }

    /// Queue a replay of `(from, to)` that yields `items` and completes.
    pub fn queue_replay(&self, from: &Offset, to: &Offset, items: Vec<Measurement>) {
        self.push_replay(
            from,
            to,
            Ok(Script {
                items,
                ending: Ending::Complete,
            }),
        );
    }

    /// Queue a replay of `(from, to)` that yields `items` and then fails.
    pub fn queue_replay_then_fail(
        &self,
        from: &Offset,
        to: &Offset,
        items: Vec<Measurement>,
        error: ApiError,
    ) {
        self.push_replay(
            from,
            to,
            Ok(Script {
                items,
                ending: Ending::Fail(error),
            }),
        );
    }

    /// Queue a replay of `(from, to)` that yields `items` and then stays open.
    pub fn queue_replay_then_hang(&self, from: &Offset, to: &Offset, items: Vec<Measurement>) {
        self.push_replay(
            from,
            to,
            Ok(Script {
                items,
                ending: Ending::Hang,
            }),
        );
    }

    /// Cause the next replay of `(from, to)` to fail on open with `error`.
    pub fn fail_replay(&self, from: &Offset, to: &Offset, error: ApiError) {
        self.push_replay(from, to, Err(error));
    }

    /// Number of times `live()` was called.
    pub fn live_opens(&self) -> usize {
        self.inner.lock().unwrap().live_opens
    }

    /// Every `(from, to)` passed to `replay()`, in call order.
    pub fn replay_requests(&self) -> Vec<(Offset, Offset)> {
        self.inner.lock().unwrap().replay_requests.clone()
    }
}

impl Clone for MockSource {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[async_trait]
impl MeasurementSource for MockSource {
    async fn live(&self) -> Result<MeasurementStream, ApiError> {
        let mut inner = self.inner.lock().unwrap();
        inner.live_opens += 1;

        match inner.live.pop_front() {
            Some(opening) => opening.map(Script::into_stream),
            None => Ok(stream::empty().boxed()),
        }
    }

    async fn replay(&self, from: &Offset, to: &Offset) -> Result<MeasurementStream, ApiError> {
        let mut inner = self.inner.lock().unwrap();
        let key = (from.clone(), to.clone());
        inner.replay_requests.push(key.clone());

        match inner.replay.get_mut(&key).and_then(VecDeque::pop_front) {
            Some(opening) => opening.map(Script::into_stream),
            None => Ok(stream::empty().boxed()),
        }
    }
}
