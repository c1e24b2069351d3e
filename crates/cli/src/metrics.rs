use extract::ChunkReport;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

#[derive(Default)]
pub struct Metrics {
    // Counters
    documents_processed: AtomicUsize,
    chunks_processed: AtomicUsize,
    empty_chunks: AtomicUsize,
    triplets_extracted: AtomicUsize,
    stage_retries: AtomicUsize,
    panics_caught: AtomicUsize,

    // Timing (in microseconds)
    total_extract_time_us: AtomicU64,
}

impl Metrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn record_chunk(&self, report: &ChunkReport) {
        self.chunks_processed.fetch_add(1, Ordering::Relaxed);
        if report.triplets.is_empty() {
            self.empty_chunks.fetch_add(1, Ordering::Relaxed);
        }
        self.triplets_extracted
            .fetch_add(report.triplets.len(), Ordering::Relaxed);
        self.stage_retries
            .fetch_add(report.retry_count, Ordering::Relaxed);
        if report.panicked {
            self.panics_caught.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_document(&self, duration: Duration) {
        self.documents_processed.fetch_add(1, Ordering::Relaxed);
        self.total_extract_time_us
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let total_us = self.total_extract_time_us.load(Ordering::Relaxed);
        let chunks = self.chunks_processed.load(Ordering::Relaxed);
        MetricsSnapshot {
            documents_processed: self.documents_processed.load(Ordering::Relaxed),
            chunks_processed: chunks,
            empty_chunks: self.empty_chunks.load(Ordering::Relaxed),
            triplets_extracted: self.triplets_extracted.load(Ordering::Relaxed),
            stage_retries: self.stage_retries.load(Ordering::Relaxed),
            panics_caught: self.panics_caught.load(Ordering::Relaxed),
            total_extract_time_ms: total_us as f64 / 1000.0,
            avg_chunk_time_ms: avg_time_ms(total_us, chunks),
        }
    }
}

fn avg_time_ms(total_us: u64, count: usize) -> f64 {
    if count > 0 {
        total_us as f64 / count as f64 / 1000.0 // Convert to ms
    } else {
        0.0
    }
}

#[derive(Debug, Serialize)]
pub struct MetricsSnapshot {
    pub documents_processed: usize,
    pub chunks_processed: usize,
    pub empty_chunks: usize,
    pub triplets_extracted: usize,
    pub stage_retries: usize,
    pub panics_caught: usize,
    pub total_extract_time_ms: f64,
    pub avg_chunk_time_ms: f64,
}

pub struct TimedOperation {
    start: Instant,
}

impl TimedOperation {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}
