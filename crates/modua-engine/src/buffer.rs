// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! The live data buffer.
//!
//! One entry per tag, replaced wholesale on every update. Readers (the
//! OPC UA publish loop) never observe a partially written entry, and the
//! `update_count` lets them skip unchanged tags cheaply.

use dashmap::DashMap;

use modua_core::types::{DataQuality, LiveValue, TagId, TagValue};

/// Last known value and quality for every configured tag.
///
/// Thread-safe; schedulers write their own devices' tags and the bridge
/// reads everything, with per-shard locking underneath.
#[derive(Debug, Default)]
pub struct DataBuffer {
    entries: DashMap<TagId, LiveValue>,
}

impl DataBuffer {
    /// Creates an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a tag with the initial null/uncertain entry.
    ///
    /// Existing entries are left untouched, so a scheduler restart does
    /// not wipe the last known value.
    pub fn register(&self, tag: TagId) {
        self.entries.entry(tag).or_insert_with(LiveValue::initial);
    }

    /// Returns a copy of a tag's entry.
    pub fn get(&self, tag: &TagId) -> Option<LiveValue> {
        self.entries.get(tag).map(|e| e.clone())
    }

    /// Publishes a good value for a tag.
    pub fn publish(&self, tag: &TagId, value: TagValue) {
        self.update(tag, value, DataQuality::Good);
    }

    /// Publishes a value with an explicit quality.
    pub fn update(&self, tag: &TagId, value: TagValue, quality: DataQuality) {
        let mut entry = self
            .entries
            .entry(tag.clone())
            .or_insert_with(LiveValue::initial);
        let update_count = entry.update_count + 1;
        *entry = LiveValue {
            value,
            quality,
            timestamp: chrono::Utc::now(),
            update_count,
        };
    }

    /// Degrades a tag's quality while keeping its last value.
    pub fn set_quality(&self, tag: &TagId, quality: DataQuality) {
        if let Some(mut entry) = self.entries.get_mut(tag) {
            if entry.quality == quality {
                return;
            }
            entry.quality = quality;
            entry.timestamp = chrono::Utc::now();
            entry.update_count += 1;
        }
    }

    /// Degrades the quality of several tags at once.
    pub fn set_quality_many<'a>(
        &self,
        tags: impl IntoIterator<Item = &'a TagId>,
        quality: DataQuality,
    ) {
        for tag in tags {
            self.set_quality(tag, quality);
        }
    }

    /// Snapshot of every entry, for the publish loop.
    pub fn snapshot(&self) -> Vec<(TagId, LiveValue)> {
        self.entries
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }

    /// Number of registered tags.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no tags are registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// =============================================================================
// Tests
// =============================================================================
