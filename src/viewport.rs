//! Virtualized grid layout.
//!
//! Only items inside the visible rows (plus a buffer above and below) are
//! realized. Scrolling feeds the [`ScrollPredictor`] and yields directional
//! [`PreloadRequest`]s for the host to hand to the load coordinator.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::ops::{Range, RangeInclusive};
use std::path::PathBuf;
use std::time::Instant;

use crate::scroll::{ScrollDirection, ScrollPredictor};

/// Offset changes at or below this don't feed the predictor
pub const SCROLL_DEBOUNCE: f64 = 10.0;

/// Fixed item geometry of the grid
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridGeometry {
    pub item_width: f64,
    pub item_height: f64,
    /// Extra rows realized above and below the visible ones
    pub buffer_rows: usize,
}

impl Default for GridGeometry {
    fn default() -> Self {
        Self {
            item_width: 160.0,
            item_height: 160.0,
            buffer_rows: 8,
        }
    }
}

/// Where one realized item is drawn, relative to the viewport
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ItemPlacement {
    pub index: usize,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Result of one layout pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LayoutPass {
    /// Indices that became realized in this pass
    pub realized: Vec<usize>,
    /// Indices that left the range and can be recycled
    pub recycled: Vec<usize>,
    pub placements: Vec<ItemPlacement>,
}

/// Items worth loading ahead of the scroll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreloadRequest {
    pub direction: ScrollDirection,
    pub start: usize,
    pub count: usize,
}

impl PreloadRequest {
    pub fn range(&self) -> Range<usize> {
        self.start..self.start + self.count
    }

    /// The slice of `paths` this request covers
    pub fn paths<'a>(&self, paths: &'a [PathBuf]) -> &'a [PathBuf] {
        let start = self.start.min(paths.len());
        let end = (self.start + self.count).min(paths.len());
        &paths[start..end]
    }
}

pub struct VirtualGrid {
    geometry: GridGeometry,
    viewport_width: f64,
    viewport_height: f64,
    item_count: usize,
    offset: f64,
    /// Last offset handed to the predictor
    fed_offset: f64,
    realized: BTreeSet<usize>,
    predictor: ScrollPredictor,
}

impl VirtualGrid {
    pub fn new(
        geometry: GridGeometry,
        viewport_width: f64,
        viewport_height: f64,
        item_count: usize,
    ) -> Self {
        let mut predictor = ScrollPredictor::new();
        predictor.update(0.0);
        Self {
            geometry,
            viewport_width,
            viewport_height,
            item_count,
            offset: 0.0,
            fed_offset: 0.0,
            realized: BTreeSet::new(),
            predictor,
        }
    }

    pub fn items_per_row(&self) -> usize {
        ((self.viewport_width / self.geometry.item_width).floor() as usize).max(1)
    }

    pub fn row_count(&self) -> usize {
        self.item_count.div_ceil(self.items_per_row())
    }

    /// Total content height
    pub fn extent_height(&self) -> f64 {
        self.row_count() as f64 * self.geometry.item_height
    }

    pub fn max_offset(&self) -> f64 {
        (self.extent_height() - self.viewport_height).max(0.0)
    }

    pub fn offset(&self) -> f64 {
        self.offset
    }

    pub fn item_count(&self) -> usize {
        self.item_count
    }

    pub fn geometry(&self) -> &GridGeometry {
        &self.geometry
    }

    pub fn predictor(&self) -> &ScrollPredictor {
        &self.predictor
    }

    /// First row touching the viewport, without buffer
    fn first_visible_row(&self) -> usize {
        (self.offset / self.geometry.item_height).floor() as usize
    }

    /// Last row touching the viewport, without buffer
    fn last_visible_row(&self) -> usize {
        ((self.offset + self.viewport_height) / self.geometry.item_height).ceil() as usize
    }

    /// Indices to realize, buffer rows included; `None` for an empty grid
    pub fn visible_range(&self) -> Option<RangeInclusive<usize>> {
        if self.item_count == 0 {
            return None;
        }
        let ipr = self.items_per_row();
        let last_index = self.item_count - 1;
        let first_row = self.first_visible_row().saturating_sub(self.geometry.buffer_rows);
        let last_row = self.last_visible_row() + self.geometry.buffer_rows;

        let first = (first_row * ipr).min(last_index);
        let last = ((last_row + 1) * ipr - 1).min(last_index);
        Some(first..=last)
    }

    /// Realize what entered the range, recycle what left it, place everything
    pub fn layout(&mut self) -> LayoutPass {
        let Some(range) = self.visible_range() else {
            let recycled = std::mem::take(&mut self.realized).into_iter().collect();
            return LayoutPass {
                recycled,
                ..LayoutPass::default()
            };
        };

        let recycled: Vec<usize> = self
            .realized
            .iter()
            .copied()
            .filter(|index| !range.contains(index))
            .collect();
        for index in &recycled {
            self.realized.remove(index);
        }

        let ipr = self.items_per_row();
        let (width, height) = (self.geometry.item_width, self.geometry.item_height);
        let mut realized = Vec::new();
        let mut placements = Vec::with_capacity(range.clone().count());
        for index in range {
            if self.realized.insert(index) {
                realized.push(index);
            }
            let (row, col) = (index / ipr, index % ipr);
            placements.push(ItemPlacement {
                index,
                x: col as f64 * width,
                y: row as f64 * height - self.offset,
                width,
                height,
            });
        }

        LayoutPass {
            realized,
            recycled,
            placements,
        }
    }

    pub fn set_offset(&mut self, offset: f64) -> Option<PreloadRequest> {
        self.set_offset_at(offset, Instant::now())
    }

    /// Scroll to `offset` (clamped). Moves beyond the debounce threshold
    /// feed the predictor and may yield a preload request.
    pub fn set_offset_at(&mut self, offset: f64, now: Instant) -> Option<PreloadRequest> {
        self.offset = offset.clamp(0.0, self.max_offset());
        if (self.offset - self.fed_offset).abs() <= SCROLL_DEBOUNCE {
            return None;
        }
        self.fed_offset = self.offset;
        self.predictor.update_at(self.offset, now);
        self.preload_request()
    }

    /// Directional preload for the predictor's current state
    pub fn preload_request(&self) -> Option<PreloadRequest> {
        let ipr = self.items_per_row();
        let buffer = self.geometry.buffer_rows;
        let wanted = self.predictor.preload_count();
        let direction = self.predictor.direction();

        let start = match direction {
            ScrollDirection::None => return None,
            ScrollDirection::Forward => (self.last_visible_row() + buffer) * ipr,
            ScrollDirection::Backward => self
                .first_visible_row()
                .saturating_sub(buffer + wanted / ipr)
                * ipr,
        };
        if start >= self.item_count {
            return None;
        }
        let count = wanted.min(self.item_count - start);
        log::trace!("Preload {:?} {}+{}", direction, start, count);
        Some(PreloadRequest {
            direction,
            start,
            count,
        })
    }

    pub fn set_viewport_size(&mut self, width: f64, height: f64) {
        self.viewport_width = width;
        self.viewport_height = height;
        self.offset = self.offset.clamp(0.0, self.max_offset());
    }

    /// New item count, e.g. after a folder change; scroll state starts over
    pub fn set_item_count(&mut self, item_count: usize) {
        self.item_count = item_count;
        self.offset = self.offset.clamp(0.0, self.max_offset());
        self.fed_offset = self.offset;
        self.realized.clear();
        self.predictor.reset();
        self.predictor.update(self.offset);
    }
}
