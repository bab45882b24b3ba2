//! Height edits, applied directly or queued from other threads

use crate::error::{Result, TerrainError};
use crate::height_field::EditMode;
use crate::terrain::Terrain;
use crate::tile::TileId;
use glam::Vec2;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::trace;

/// One height edit at a world xz position
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HeightEdit {
    pub position: Vec2,
    /// New height, or delta for [`EditMode::Adjust`], in sample units
    pub value: f32,
    pub mode: EditMode,
}

impl HeightEdit {
    pub fn set(position: Vec2, height: f32) -> Self {
        Self {
            position,
            value: height,
            mode: EditMode::Override,
        }
    }

    pub fn adjust(position: Vec2, delta: f32) -> Self {
        Self {
            position,
            value: delta,
            mode: EditMode::Adjust,
        }
    }
}

pub(crate) type EditQueue = Arc<Mutex<Vec<HeightEdit>>>;

/// Cloneable handle for queueing edits from any thread
///
/// Queued edits are applied, in order, at the start of the next
/// [`Terrain::update`].
#[derive(Debug, Clone)]
pub struct TerrainEditor {
    queue: EditQueue,
}

impl TerrainEditor {
    pub(crate) fn new(queue: EditQueue) -> Self {
        Self { queue }
    }

    pub fn push(&self, edit: HeightEdit) {
        self.queue.lock().push(edit);
    }

    pub fn extend(&self, edits: impl IntoIterator<Item = HeightEdit>) {
        self.queue.lock().extend(edits);
    }

    pub fn set_height(&self, position: Vec2, height: f32) {
        self.push(HeightEdit::set(position, height));
    }

    pub fn adjust_height(&self, position: Vec2, delta: f32) {
        self.push(HeightEdit::adjust(position, delta));
    }

    /// Edits waiting for the next update
    pub fn pending(&self) -> usize {
        self.queue.lock().len()
    }
}

impl Terrain {
    /// Write one tile sample into every leaf holding it
    ///
    /// Returns `false` when no leaf holds the sample.
    pub fn edit_sample(
        &mut self,
        tile: TileId,
        x: u32,
        z: u32,
        value: f32,
        mode: EditMode,
    ) -> Result<bool> {
        let t = self.tiles.get(&tile).ok_or(TerrainError::UnknownTile(tile))?;
        let world = t.sample_to_world(x, z);
        let targets = self.locate(tile, x, z);
        if targets.is_empty() {
            return Ok(false);
        }

        // An adjust is computed once so shared samples stay identical
        let height = match mode {
            EditMode::Override => value,
            EditMode::Adjust => self.height_at_sample(tile, x, z).unwrap_or(0.0) + value,
        };
        for (leaf, col, row) in targets {
            if let Some(patch) = self.leaf_mut(leaf) {
                patch.write_height(col, row, height, EditMode::Override)?;
            }
        }
        self.mark_normals_dirty(tile, world)?;
        trace!("Tile {:?} sample ({}, {}) = {}", tile, x, z, height);
        Ok(true)
    }

    pub fn set_height_at_sample(&mut self, tile: TileId, x: u32, z: u32, height: f32) -> Result<bool> {
        self.edit_sample(tile, x, z, height, EditMode::Override)
    }

    pub fn adjust_height_at_sample(&mut self, tile: TileId, x: u32, z: u32, delta: f32) -> Result<bool> {
        self.edit_sample(tile, x, z, delta, EditMode::Adjust)
    }

    /// Apply an edit at the sample nearest to a world point
    ///
    /// Tiles sharing the sample all receive it; points off the terrain are
    /// skipped. Returns the number of tiles written.
    pub fn apply_edit(&mut self, edit: &HeightEdit) -> usize {
        // A point just outside a tile can still snap onto its border sample
        let targets: Vec<_> = self
            .tiles
            .values()
            .filter_map(|t| t.nearest_sample(edit.position).map(|s| (t.id(), s)))
            .collect();
        let mut written = 0;
        for (tile, (x, z)) in targets {
            if let Ok(true) = self.edit_sample(tile, x, z, edit.value, edit.mode) {
                written += 1;
            }
        }
        written
    }

    pub fn set_height(&mut self, position: Vec2, height: f32) -> usize {
        self.apply_edit(&HeightEdit::set(position, height))
    }

    pub fn adjust_height(&mut self, position: Vec2, delta: f32) -> usize {
        self.apply_edit(&HeightEdit::adjust(position, delta))
    }

    /// Apply a batch of edits in order
    pub fn edit_heights(&mut self, edits: &[HeightEdit]) -> usize {
        edits.iter().map(|e| self.apply_edit(e)).sum()
    }

    /// Drain the editor queue and apply it; returns the edits drained
    pub fn apply_pending_edits(&mut self) -> usize {
        let pending = std::mem::take(&mut *self.edits.lock());
        for edit in &pending {
            self.apply_edit(edit);
        }
        pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TerrainConfig;
    use std::thread;

    #[test]
    fn test_edit_reaches_every_sharer() {
        let mut terrain = Terrain::new(TerrainConfig::new(129, 65), None).unwrap();
        let tile = terrain.primary_tile();
        assert!(terrain.set_height_at_sample(tile, 64, 64, 3.0).unwrap());
        for (leaf, col, row) in terrain.locate(tile, 64, 64) {
            assert_eq!(terrain.leaf(leaf).unwrap().heights().get(col, row), Some(3.0));
        }

        // Adjusting a shared sample adds the delta once
        assert!(terrain.adjust_height_at_sample(tile, 64, 64, 2.0).unwrap());
        for (leaf, col, row) in terrain.locate(tile, 64, 64) {
            assert_eq!(terrain.leaf(leaf).unwrap().heights().get(col, row), Some(5.0));
        }

        assert!(!terrain.set_height_at_sample(tile, 129, 0, 1.0).unwrap());
        assert_eq!(
            terrain.set_height_at_sample(TileId(9), 0, 0, 1.0),
            Err(TerrainError::UnknownTile(TileId(9)))
        );
    }

    #[test]
    fn test_world_edits_skip_off_terrain() {
        let mut terrain = Terrain::new(TerrainConfig::new(129, 65), None).unwrap();
        assert_eq!(terrain.set_height(Vec2::new(0.2, -0.3), 7.0), 1);
        assert_eq!(terrain.heightmap_height(Vec2::ZERO), Some(7.0));
        assert_eq!(terrain.set_height(Vec2::new(500.0, 0.0), 7.0), 0);

        let edits = [
            HeightEdit::adjust(Vec2::new(1.0, 0.0), 1.0),
            HeightEdit::adjust(Vec2::new(1.0, 0.0), 1.0),
            HeightEdit::set(Vec2::new(900.0, 0.0), 1.0),
        ];
        assert_eq!(terrain.edit_heights(&edits), 2);
        assert_eq!(terrain.heightmap_height(Vec2::new(1.0, 0.0)), Some(2.0));
    }

    #[test]
    fn test_edit_marks_dirty_region() {
        let mut terrain = Terrain::new(TerrainConfig::new(129, 65), None).unwrap();
        let tile = terrain.primary_tile();
        terrain.set_height(Vec2::new(5.0, 5.0), 1.0);
        let dirty = *terrain.tile(tile).unwrap().dirty_region().unwrap();
        assert!(dirty.contains_point(glam::Vec3::new(5.0, 100.0, 5.0)));
        assert_eq!(dirty.max.x, 6.0);
    }

    #[test]
    fn test_queue_from_threads() {
        let mut terrain = Terrain::new(TerrainConfig::new(129, 65), None).unwrap();
        let editor = terrain.editor();
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let editor = editor.clone();
                thread::spawn(move || {
                    for _ in 0..10 {
                        editor.adjust_height(Vec2::new(i as f32 * 8.0, 0.0), 0.5);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(editor.pending(), 40);

        assert_eq!(terrain.apply_pending_edits(), 40);
        assert_eq!(editor.pending(), 0);
        for i in 0..4 {
            assert_eq!(terrain.heightmap_height(Vec2::new(i as f32 * 8.0, 0.0)), Some(5.0));
        }
    }
}
