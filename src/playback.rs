//! Bounded playback queue and the single drain worker.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use bytes::Bytes;
use parking_lot::Mutex;

use crate::engine::EngineShared;
use crate::events::EngineEvent;
use crate::volume::RollingVolume;

/// Ordered, bounded queue of PCM chunks awaiting playback.
///
/// Never blocks the producer: when a push would exceed capacity the oldest
/// chunks are discarded first, trading completeness for latency — acceptable
/// for live speech.
pub struct PlaybackQueue {
    chunks: Mutex<VecDeque<Bytes>>,
    capacity: usize,
}

impl PlaybackQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            chunks: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// Append a chunk, discarding oldest entries while over capacity.
    /// Returns the number of chunks dropped.
    pub fn push(&self, chunk: Bytes) -> usize {
        let mut chunks = self.chunks.lock();
        let mut dropped = 0;
        while chunks.len() >= self.capacity {
            chunks.pop_front();
            dropped += 1;
        }
        chunks.push_back(chunk);
        dropped
    }

    pub fn pop(&self) -> Option<Bytes> {
        self.chunks.lock().pop_front()
    }

    pub fn clear(&self) {
        self.chunks.lock().clear();
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.lock().is_empty()
    }

    pub fn len(&self) -> usize {
        self.chunks.lock().len()
    }
}

/// Convert a little-endian PCM chunk to i16 samples.
pub(crate) fn pcm_from_bytes(data: &[u8]) -> Vec<i16> {
    if data.len() % 2 != 0 {
        log::warn!("odd-length PCM chunk ({} bytes), dropping trailing byte", data.len());
    }
    data.chunks_exact(2)
        .map(|b| i16::from_le_bytes([b[0], b[1]]))
        .collect()
}

/// Playback worker loop. Exactly one worker runs at a time, enforced by the
/// `worker_running` flag; playback order matches enqueue order and device
/// writes never overlap.
pub(crate) fn run_worker(shared: Arc<EngineShared>) {
    log::debug!("playback worker started");
    let mut level = RollingVolume::new();

    loop {
        if shared.shutdown.load(Ordering::Relaxed) || shared.suspended.load(Ordering::Relaxed) {
            shared.worker_running.store(false, Ordering::SeqCst);
            log::debug!("playback worker stopping");
            break;
        }

        let Some(chunk) = shared.queue.pop() else {
            shared.worker_running.store(false, Ordering::SeqCst);
            // A chunk may have landed between the pop and the flag reset; if
            // no new worker claimed the flag, keep draining it ourselves.
            if shared.queue.is_empty()
                || shared
                    .worker_running
                    .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                    .is_err()
            {
                let _ = shared.events.try_send(EngineEvent::OutputLevel(0.0));
                log::debug!("playback worker idle, exiting");
                break;
            }
            continue;
        };

        let samples = pcm_from_bytes(&chunk);
        if samples.is_empty() {
            continue;
        }

        write_to_sink(&shared, &samples);

        shared.ring.lock().write(&samples);

        if !shared.bypass.load(Ordering::Relaxed) {
            shared.echo.lock().playback(&samples);
        }

        let floats: Vec<f32> = samples.iter().map(|&s| s as f32 / 32768.0).collect();
        level.extend(&floats);
        let _ = shared
            .events
            .try_send(EngineEvent::OutputLevel(level.level()));
    }
}

/// Write one chunk to the output device with short-write and XRUN recovery.
/// 底层持续跟不上写入速度时，丢弃剩余帧防止死循环。
fn write_to_sink(shared: &EngineShared, samples: &[i16]) {
    let mut guard = shared.sink.lock();
    let Some(sink) = guard.as_mut() else {
        return;
    };

    let mut written = 0;
    let mut retry_count = 0u32;
    while written < samples.len() {
        match sink.write(&samples[written..]) {
            Ok(n) => {
                written += n;
                retry_count = 0;
            }
            Err(e) => {
                log::warn!("playback write error: {e:#}, recovering...");
                retry_count += 1;

                if let Err(e2) = sink.recover() {
                    log::error!("failed to recover playback device: {e2:#}");
                    break;
                }

                if retry_count >= 3 {
                    log::error!(
                        "max recovery retries ({}) reached, dropping {} unwritten samples",
                        retry_count,
                        samples.len() - written,
                    );
                    break;
                }
            }
        }
    }
}
