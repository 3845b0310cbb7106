//! Sample Store Module
//!
//! Owns the raw sample buffers voices play back, keyed by sample ID, and
//! decouples sample *delivery* (which may lag voice creation when SF3
//! samples are being decoded asynchronously by the host) from voice
//! creation and rendering.
//!
//! The store never copies a payload: `dump` accepts an [`Arc<[f32]>`] clone
//! (a pointer and an atomic refcount bump, not the megabytes behind it) and
//! keeps it until the next [`SampleStore::reset`] or
//! [`SampleStore::clear_dumped_samples`]. This is the safe-Rust rendering of
//! spec.md's "non-owning handle whose lifetime the host guarantees" — the
//! store shares ownership via `Arc` instead of holding an unmanaged pointer,
//! so a sample can never be freed out from under a voice that is still
//! reading it, at the cost of (and no more than) a refcount.

use std::sync::Arc;

use log::warn;

/// A sample payload the store has received. Cloning is cheap (`Arc` clone).
#[derive(Debug, Clone)]
pub struct StoredSample {
    data: Arc<[f32]>,
    length: usize,
}

impl StoredSample {
    pub fn data(&self) -> &[f32] {
        &self.data[..self.length]
    }

    pub fn length(&self) -> usize {
        self.length
    }
}

/// A snapshot of a sample slot's state, returned by [`SampleStore::get`].
#[derive(Debug, Clone, Copy)]
pub struct SampleView<'a> {
    pub present: bool,
    pub data: Option<&'a [f32]>,
    pub length: usize,
}

impl SampleView<'_> {
    fn absent() -> Self {
        Self {
            present: false,
            data: None,
            length: 0,
        }
    }
}

/// Owns all sample payloads for one engine instance.
#[derive(Debug, Default)]
pub struct SampleStore {
    slots: Vec<Option<StoredSample>>,
}

impl SampleStore {
    /// Creates a store with `total` slots, all initially absent.
    pub fn new(total: usize) -> Self {
        Self {
            slots: vec![None; total],
        }
    }

    /// Discards all stored samples and reallocates capacity for `total`
    /// slots, all marked absent. This is a control-path operation; it must
    /// not be called while `render_audio` is in flight (spec.md §5).
    pub fn reset(&mut self, total: usize) {
        self.slots = vec![None; total];
    }

    /// Alias for [`SampleStore::reset`] matching the `clearDumpedSamples`
    /// control operation name (spec.md §6).
    pub fn clear_dumped_samples(&mut self, total: usize) {
        self.reset(total);
    }

    /// Marks slot `id` present with the given payload. `length` is clamped
    /// to the payload's actual length (spec.md §7: invalid sample geometry
    /// is clamped, never rejected).
    pub fn dump(&mut self, id: usize, data: Arc<[f32]>, length: usize) {
        let Some(slot) = self.slots.get_mut(id) else {
            warn!("sample store: dump to out-of-range id {id} (capacity {})", self.slots.len());
            return;
        };
        let clamped_length = length.min(data.len());
        *slot = Some(StoredSample {
            data,
            length: clamped_length,
        });
    }

    /// Reads a sample slot's current state. Returns `present: false` for
    /// out-of-range IDs as well as genuinely absent ones — never panics.
    pub fn get(&self, id: usize) -> SampleView<'_> {
        match self.slots.get(id).and_then(|s| s.as_ref()) {
            Some(sample) => SampleView {
                present: true,
                data: Some(sample.data()),
                length: sample.length(),
            },
            None => SampleView::absent(),
        }
    }

    /// Total slot count (for bounds checks at the control surface).
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }
}
