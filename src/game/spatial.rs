//! Uniform spatial hash grid for neighborhood queries
//!
//! Each entity lives in exactly one cell keyed by
//! `floor(x / cell_size), floor(y / cell_size)`. The entity caches that key
//! so an update only touches the grid when the cell actually changes.
//! Queries scan `ceil(radius / cell_size)` rings of cells (broad phase)
//! and then filter by exact distance (narrow phase).

use hashbrown::HashMap;
use smallvec::SmallVec;

use crate::game::state::EntityId;
use crate::util::vec2::Vec2;

/// Grid cell key - (x, y) cell coordinates
pub type CellKey = (i32, i32);

/// Initial capacity for grid cells (number of expected non-empty cells)
const GRID_INITIAL_CAPACITY: usize = 256;

/// Anything that can be indexed by the grid
pub trait GridEntity {
    fn grid_id(&self) -> EntityId;
    fn grid_position(&self) -> Vec2;
    fn grid_cell(&self) -> Option<CellKey>;
    fn set_grid_cell(&mut self, cell: Option<CellKey>);
}

/// Entry stored in a cell
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridEntry {
    pub id: EntityId,
    pub position: Vec2,
}

type Cell = SmallVec<[GridEntry; 8]>;

pub struct SpatialGrid {
    cell_size: f32,
    /// Inverse cell size for fast position-to-cell conversion
    inv_cell_size: f32,
    cells: HashMap<CellKey, Cell>,
    len: usize,
}

impl SpatialGrid {
    pub fn new(cell_size: f32) -> Self {
        Self {
            cell_size,
            inv_cell_size: 1.0 / cell_size,
            cells: HashMap::with_capacity(GRID_INITIAL_CAPACITY),
            len: 0,
        }
    }

    #[inline]
    pub fn cell_size(&self) -> f32 {
        self.cell_size
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Convert world position to cell key
    #[inline]
    pub fn cell_of(&self, position: Vec2) -> CellKey {
        (
            (position.x * self.inv_cell_size).floor() as i32,
            (position.y * self.inv_cell_size).floor() as i32,
        )
    }

    /// Add an entity to the cell under its current position
    pub fn insert<E: GridEntity>(&mut self, entity: &mut E) {
        if entity.grid_cell().is_some() {
            self.remove(entity);
        }
        let key = self.cell_of(entity.grid_position());
        self.cells.entry(key).or_default().push(GridEntry {
            id: entity.grid_id(),
            position: entity.grid_position(),
        });
        entity.set_grid_cell(Some(key));
        self.len += 1;
    }

    /// Drop an entity from its cached cell. No-op if it is not indexed.
    pub fn remove<E: GridEntity>(&mut self, entity: &mut E) {
        let Some(key) = entity.grid_cell() else {
            return;
        };
        let id = entity.grid_id();
        if let Some(cell) = self.cells.get_mut(&key) {
            if let Some(i) = cell.iter().position(|e| e.id == id) {
                cell.swap_remove(i);
                self.len -= 1;
            }
            if cell.is_empty() {
                self.cells.remove(&key);
            }
        }
        entity.set_grid_cell(None);
    }

    /// Refresh an entity after it moved. Re-buckets only on cell change.
    pub fn update<E: GridEntity>(&mut self, entity: &mut E) {
        let key = self.cell_of(entity.grid_position());
        match entity.grid_cell() {
            Some(old) if old == key => {
                let id = entity.grid_id();
                if let Some(entry) = self
                    .cells
                    .get_mut(&key)
                    .and_then(|cell| cell.iter_mut().find(|e| e.id == id))
                {
                    entry.position = entity.grid_position();
                } else {
                    // Cached key without an entry: re-index
                    entity.set_grid_cell(None);
                    self.insert(entity);
                }
            }
            Some(_) => {
                self.remove(entity);
                self.insert(entity);
            }
            None => self.insert(entity),
        }
    }

    /// Visit every entry within `radius` of `(x, y)`
    pub fn for_each_nearby<F>(&self, x: f32, y: f32, radius: f32, mut visit: F)
    where
        F: FnMut(&GridEntry, f32),
    {
        let center = Vec2::new(x, y);
        let (cx, cy) = self.cell_of(center);
        let rings = (radius * self.inv_cell_size).ceil().max(0.0) as i32;
        let radius_sq = radius * radius;

        for gy in (cy - rings)..=(cy + rings) {
            for gx in (cx - rings)..=(cx + rings) {
                let Some(cell) = self.cells.get(&(gx, gy)) else {
                    continue;
                };
                for entry in cell {
                    let d_sq = entry.position.distance_sq_to(center);
                    if d_sq <= radius_sq {
                        visit(entry, d_sq);
                    }
                }
            }
        }
    }

    /// Ids within `radius` of `(x, y)`, unordered
    pub fn get_nearby(&self, x: f32, y: f32, radius: f32) -> Vec<EntityId> {
        let mut out = Vec::new();
        self.for_each_nearby(x, y, radius, |entry, _| out.push(entry.id));
        out
    }

    /// Nearest entry within `radius` passing `filter`
    pub fn nearest<F>(&self, position: Vec2, radius: f32, mut filter: F) -> Option<(EntityId, f32)>
    where
        F: FnMut(EntityId) -> bool,
    {
        let mut best: Option<(EntityId, f32)> = None;
        self.for_each_nearby(position.x, position.y, radius, |entry, d_sq| {
            let closer = match best {
                None => true,
                // Ties go to the lower id so results do not depend on cell order
                Some((best_id, best_d)) => d_sq < best_d || (d_sq == best_d && entry.id < best_id),
            };
            if closer && filter(entry.id) {
                best = Some((entry.id, d_sq));
            }
        });
        best.map(|(id, d_sq)| (id, d_sq.sqrt()))
    }

    pub fn clear(&mut self) {
        self.cells.clear();
        self.len = 0;
    }

    /// Get statistics about the grid
    pub fn stats(&self) -> SpatialGridStats {
        SpatialGridStats {
            non_empty_cells: self.cells.len(),
            total_entities: self.len,
            max_per_cell: self.cells.values().map(|c| c.len()).max().unwrap_or(0),
        }
    }
}

/// Statistics about the spatial grid
#[derive(Debug, Clone)]
pub struct SpatialGridStats {
    pub non_empty_cells: usize,
    pub total_entities: usize,
    pub max_per_cell: usize,
}
