// Copyright 2023 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! This module is for parallel encoding. Only compiled when "par" feature is enabled.

use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::Mutex;
use std::thread;

use super::coding;
use super::component::AdpcmChannel;
use super::config;
use super::constant::envvar_key;
use super::constant::panic_msg;
use super::error::SourceError;
use super::source::Source;

use crossbeam_channel::Receiver;
use crossbeam_channel::Sender;

/// `Arc::into_inner` with unwrapping.
///
/// This function is introduced for conditional compilation for lowering MSRV.
/// [`Arc::into_inner`] will be the future standard so we should delete the
/// second definition when we are ready to bump MSRV.
#[rustversion::since(1.70)]
#[inline]
fn destruct_arc<T: std::fmt::Debug>(ptr: Arc<T>) -> T {
    Arc::into_inner(ptr).expect(panic_msg::ARC_DESTRUCT_FAILED)
}

#[rustversion::before(1.70)]
#[inline]
fn destruct_arc<T: std::fmt::Debug>(ptr: Arc<T>) -> T {
    Arc::try_unwrap(ptr).expect(panic_msg::ARC_DESTRUCT_FAILED)
}

/// Sink object that stores encoding results.
///
/// This is currently just a `BTreeMap<usize, T>` with some utility functions.
#[derive(Debug)]
struct ParSink<T> {
    data: Mutex<BTreeMap<usize, T>>,
}

impl<T> ParSink<T> {
    /// Creates `ParSink` object.
    pub fn new() -> Self {
        Self {
            data: Mutex::new(BTreeMap::new()),
        }
    }

    /// Stores a computation result `element` with a serial id `idx`.
    pub fn push(&self, idx: usize, element: T) {
        let mut data = self.data.lock().expect(panic_msg::MUTEX_LOCK_FAILED);
        data.insert(idx, element);
    }

    /// Consumes `self` and calls `f` in the order of the serial id.
    pub fn finalize<F>(self, f: F)
    where
        F: FnMut(T),
    {
        let data = self.data.into_inner().expect(panic_msg::MUTEX_DROP_FAILED);
        data.into_values().for_each(f);
    }
}

/// Queue of channel indices to be encoded.
///
/// `None` in the queue tells a worker to stop.
struct ChannelQueue {
    queue: (Sender<Option<usize>>, Receiver<Option<usize>>),
}

impl ChannelQueue {
    /// Creates a queue filled with all channel indices followed by stop
    /// signals for each worker.
    pub fn new(channels: usize, workers: usize) -> Self {
        let queue = crossbeam_channel::bounded(channels + workers);
        for ch in 0..channels {
            queue.0.send(Some(ch)).expect(panic_msg::MPMC_SEND_FAILED);
        }
        for _i in 0..workers {
            queue.0.send(None).expect(panic_msg::MPMC_SEND_FAILED);
        }
        Self { queue }
    }

    /// Gets the next channel to be encoded.
    ///
    /// If this returns None, worker thread must immediately stop.
    #[inline]
    pub fn pop(&self) -> Option<usize> {
        self.queue.1.recv().expect(panic_msg::MPMC_RECV_FAILED)
    }
}

/// Determines worker counts considering various cues.
fn determine_worker_count(config: &config::Encoder) -> Result<usize, SourceError> {
    let default_parallelism = std::thread::available_parallelism()
        .map_err(SourceError::from_io_error)?
        .get();
    let default_parallelism = std::env::var(envvar_key::DEFAULT_PARALLELISM)
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .filter(|n| *n > 0)
        .unwrap_or(default_parallelism);
    Ok(config
        .workers
        .map_or(default_parallelism, NonZeroUsize::get))
}

/// Parallel version of the per-channel encoding loop.
///
/// Each channel is encoded independently on a worker thread, and results are
/// returned in the channel order. The output is identical to the
/// single-threaded encoding.
///
/// # Errors
///
/// This function returns `SourceError` when the available parallelism
/// cannot be determined.
///
/// # Panics
///
/// This function panics when an internal error regarding inter-thread
/// communication.
pub fn encode_channels<T: Source + ?Sized>(
    config: &config::Encoder,
    src: &T,
    loop_start: Option<usize>,
) -> Result<Vec<AdpcmChannel>, SourceError> {
    let channels = src.channels();
    let worker_count = determine_worker_count(config)?.clamp(1, channels.max(1));
    let inputs: Arc<Vec<Vec<i16>>> =
        Arc::new((0..channels).map(|ch| src.channel(ch).to_vec()).collect());
    let queue = Arc::new(ChannelQueue::new(channels, worker_count));
    let parsink: Arc<ParSink<AdpcmChannel>> = Arc::new(ParSink::new());

    let join_handles: Vec<_> = (0..worker_count)
        .map(|_n| {
            let inputs = Arc::clone(&inputs);
            let queue = Arc::clone(&queue);
            let parsink = Arc::clone(&parsink);
            thread::spawn(move || {
                while let Some(ch) = queue.pop() {
                    parsink.push(ch, coding::encode_channel(&inputs[ch], loop_start));
                }
            })
        })
        .collect();

    for h in join_handles {
        h.join().expect(panic_msg::THREAD_JOIN_FAILED);
    }

    #[cfg(feature = "log")]
    info!(
        target: "dspadpcm::par::jsonl",
        "{{ worker_count: {}, channel_count: {} }}",
        worker_count,
        channels,
    );

    let mut ret = Vec::with_capacity(channels);
    destruct_arc(parsink).finalize(|c: AdpcmChannel| ret.push(c));
    assert_eq!(ret.len(), channels, "{}", panic_msg::RESULT_MISSING);
    Ok(ret)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sigen;
    use crate::sigen::Signal;

    #[test]
    #[allow(clippy::field_reassign_with_default)]
    fn test_determine_worker_count() {
        // manually set by config
        let mut config = config::Encoder::default();
        config.workers = NonZeroUsize::new(8);
        let result = determine_worker_count(&config);
        assert!(result.is_ok());
        assert_eq!(result.unwrap(), 8);

        // default
        if std::env::var(envvar_key::DEFAULT_PARALLELISM).is_err() {
            let config = config::Encoder::default();
            let result = determine_worker_count(&config);
            assert!(result.is_ok());
            assert_eq!(
                result.unwrap(),
                std::thread::available_parallelism().unwrap().get()
            );
        }
    }

    #[test]
    fn par_sink_orders_results() {
        let sink = ParSink::new();
        sink.push(2, "c");
        sink.push(0, "a");
        sink.push(1, "b");
        let mut ret = vec![];
        sink.finalize(|x| ret.push(x));
        assert_eq!(ret, vec!["a", "b", "c"]);
    }

    #[test]
    fn channel_queue_stops_each_worker() {
        let queue = ChannelQueue::new(3, 2);
        assert_eq!(queue.pop(), Some(0));
        assert_eq!(queue.pop(), Some(1));
        assert_eq!(queue.pop(), Some(2));
        assert_eq!(queue.pop(), None);
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn parallel_encoding_matches_sequential() {
        let len = 3000;
        let signals: Vec<Box<dyn Signal>> = vec![
            Box::new(sigen::Sine::new(40, 0.5)),
            Box::new(sigen::Noise::with_seed(11, 0.3)),
            Box::new(sigen::Sine::new(97, 0.2).noise_with_seed(12, 0.1)),
            Box::new(sigen::Dc::new(0.0)),
            Box::new(sigen::Dc::new(-0.3).concat(1000, sigen::Sine::new(13, 0.8))),
        ];
        let refs: Vec<&dyn Signal> = signals.iter().map(|s| s.as_ref() as &dyn Signal).collect();
        let src = sigen::to_pcm_buffer(&refs, len, 32000);

        let mut config = config::Encoder::default();
        config.workers = NonZeroUsize::new(3);
        let par = encode_channels(&config, &src, Some(1234)).expect("should not fail");
        assert_eq!(par.len(), 5);
        for (ch, encoded) in par.iter().enumerate() {
            let seq = coding::encode_channel(src.channel(ch), Some(1234));
            assert_eq!(encoded, &seq);
        }
    }
}
