//! Ordered set of open window buckets for the chromosome currently being counted.
//!
//! Buckets are created lazily as reads touch them and evicted from the low end once the
//! engine proves that no later read can reach them. Insertion happens near the tail and
//! eviction near the head, so a `BTreeMap` keyed by window index fits the access pattern.

use std::collections::BTreeMap;

use crate::bucket::WindowBucket;

#[derive(Debug)]
pub struct BucketMap {
    chr: Option<String>,
    chrom_size: Option<u32>,
    window_size: u32,
    buckets: BTreeMap<u32, WindowBucket>,
    /// Every window index below this one has been closed and emitted.
    closed_below: u32,
}

impl BucketMap {
    pub fn new(window_size: u32) -> Self {
        BucketMap {
            chr: None,
            chrom_size: None,
            window_size,
            buckets: BTreeMap::new(),
            closed_below: 0,
        }
    }

    pub fn chr(&self) -> Option<&str> {
        self.chr.as_deref()
    }

    pub fn chrom_size(&self) -> Option<u32> {
        self.chrom_size
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn window_index(&self, position: u32) -> u32 {
        position / self.window_size
    }

    ///
    /// Point the map at a new chromosome. All buckets must have been closed first.
    ///
    pub fn switch_chromosome(&mut self, chr: &str, chrom_size: Option<u32>) {
        debug_assert!(
            self.buckets.is_empty(),
            "switching chromosome with open buckets"
        );
        self.chr = Some(chr.to_string());
        self.chrom_size = chrom_size;
        self.closed_below = 0;
    }

    /// `[start, end)` of a window, with the end clipped to the chromosome size when known.
    pub fn window_bounds(&self, index: u32) -> (u32, u32) {
        let start = index.saturating_mul(self.window_size);
        let end = start.saturating_add(self.window_size);
        match self.chrom_size {
            Some(size) => (start, end.min(size)),
            None => (start, end),
        }
    }

    ///
    /// Whether a position can still be counted: it lies inside the chromosome and its
    /// window has not been closed yet.
    ///
    pub fn accepts(&self, position: u32) -> bool {
        if self.chrom_size.is_some_and(|size| position >= size) {
            return false;
        }
        self.window_index(position) >= self.closed_below
    }

    ///
    /// Look up the bucket that owns `position`, creating it if needed.
    ///
    /// `fetch_reference` is called with the window bounds only when a new bucket is made.
    /// Returns `None` for positions that [`BucketMap::accepts`] rejects.
    ///
    pub fn bucket_for<F>(&mut self, position: u32, fetch_reference: F) -> Option<&mut WindowBucket>
    where
        F: FnOnce(&str, u32, u32) -> Option<Vec<u8>>,
    {
        if !self.accepts(position) {
            return None;
        }
        let index = self.window_index(position);
        let (start, end) = self.window_bounds(index);
        let chr = self.chr.as_deref().unwrap_or_default();

        Some(self.buckets.entry(index).or_insert_with(|| {
            let reference = fetch_reference(chr, start, end);
            WindowBucket::new(index, start, end, reference)
        }))
    }

    ///
    /// Remove and return, in ascending window order, every bucket with index below `threshold`.
    ///
    pub fn close_before(&mut self, threshold: u32) -> Vec<WindowBucket> {
        let remaining = self.buckets.split_off(&threshold);
        let closing = std::mem::replace(&mut self.buckets, remaining);
        self.closed_below = self.closed_below.max(threshold);
        closing.into_values().collect()
    }

    ///
    /// Remove and return every open bucket, in ascending window order.
    ///
    pub fn close_all(&mut self) -> Vec<WindowBucket> {
        let closing = std::mem::take(&mut self.buckets);
        self.closed_below = u32::MAX;
        closing.into_values().collect()
    }
}
