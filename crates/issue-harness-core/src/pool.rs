//! Bounded-concurrency async map.
//!
//! [`WorkerPool`] runs one future per input with at most `workers` in
//! flight. Two shapes are offered:
//!
//! - [`map_ordered`](WorkerPool::map_ordered): results come back in input
//!   order (used where output order is observable, e.g. embedding chunks).
//! - [`map_unordered`](WorkerPool::map_unordered): results come back in
//!   completion order, each tagged with its input index.
//!
//! A pool is a value, not a set of threads: it is cheap to construct per
//! operation and drops nothing on completion.

use std::future::Future;

use futures::stream::{self, StreamExt};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerPool {
    workers: usize,
}

impl WorkerPool {
    /// A pool with `workers` concurrent slots. Zero is treated as one.
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Apply `f` to every item; results are returned in input order.
    pub async fn map_ordered<I, T, F, Fut, R>(&self, items: I, f: F) -> Vec<R>
    where
        I: IntoIterator<Item = T>,
        F: FnMut(T) -> Fut,
        Fut: Future<Output = R>,
    {
        stream::iter(items)
            .map(f)
            .buffered(self.workers)
            .collect()
            .await
    }

    /// Apply `f` to every item; results are returned as they complete,
    /// paired with the index of the input that produced them.
    pub async fn map_unordered<I, T, F, Fut, R>(&self, items: I, mut f: F) -> Vec<(usize, R)>
    where
        I: IntoIterator<Item = T>,
        F: FnMut(T) -> Fut,
        Fut: Future<Output = R>,
    {
        stream::iter(items.into_iter().enumerate())
            .map(|(i, item)| {
                let fut = f(item);
                async move { (i, fut.await) }
            })
            .buffer_unordered(self.workers)
            .collect()
            .await
    }
}
