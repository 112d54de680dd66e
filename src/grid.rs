//! Uniform broad-phase grid.
//!
//! Cells are square with an edge of one maximum particle diameter, so every
//! pair of overlapping circles sits in the same or an adjacent cell. The grid
//! is rebuilt from scratch each tick with a counting sort: count particles per
//! cell, prefix-sum the counts into offsets, then scatter particle indices.

use glam::{IVec2, UVec2, Vec2};
use log::trace;

use crate::config::Bounds;

#[derive(Debug, Clone)]
pub struct SpatialGrid {
    cell_size: f32,
    dimensions: UVec2,
    /// `cell_starts[c]..cell_starts[c + 1]` is the range of cell `c` in `entries`
    cell_starts: Vec<u32>,
    /// Particle indices ordered by cell, then by index
    entries: Vec<u32>,
    /// Cell of each particle during the last rebuild
    particle_cells: Vec<u32>,
    cursor: Vec<u32>,
}

impl SpatialGrid {
    pub fn new(cell_size: f32, bounds: Bounds) -> Self {
        let mut grid = Self {
            cell_size,
            dimensions: UVec2::ZERO,
            cell_starts: Vec::new(),
            entries: Vec::new(),
            particle_cells: Vec::new(),
            cursor: Vec::new(),
        };
        grid.resize(bounds);
        grid
    }

    pub fn cell_size(&self) -> f32 {
        self.cell_size
    }

    pub fn dimensions(&self) -> UVec2 {
        self.dimensions
    }

    /// Grows the cells to at least one diameter of `max_radius`, so every
    /// overlapping pair still shares or neighbours a cell. Never shrinks.
    pub fn fit_radius(&mut self, max_radius: f32, bounds: Bounds) {
        let diameter = max_radius * 2.0;
        if diameter > self.cell_size {
            trace!("Growing grid cells from {} to {diameter}", self.cell_size);
            self.cell_size = diameter;
            self.resize(bounds);
        }
    }

    fn resize(&mut self, bounds: Bounds) {
        let dimensions = (bounds.size() / self.cell_size)
            .ceil()
            .as_uvec2()
            .max(UVec2::ONE);

        if dimensions != self.dimensions {
            trace!("Resizing grid to {}x{} cells", dimensions.x, dimensions.y);
            self.dimensions = dimensions;
            self.cell_starts = vec![0; (dimensions.x * dimensions.y) as usize + 1];
        }
    }

    /// Cell coordinate of a position. Anything outside the bounds lands in the
    /// nearest edge cell, which keeps neighbouring positions in neighbouring
    /// cells.
    pub fn cell_of(&self, position: Vec2) -> UVec2 {
        let cell = (position / self.cell_size).floor();
        let max = (self.dimensions - UVec2::ONE).as_vec2();
        cell.clamp(Vec2::ZERO, max).as_uvec2()
    }

    fn flat(&self, cell: UVec2) -> usize {
        (cell.y * self.dimensions.x + cell.x) as usize
    }

    pub fn rebuild(&mut self, positions: &[Vec2], bounds: Bounds) {
        self.resize(bounds);

        self.cell_starts.fill(0);
        self.particle_cells.clear();
        self.particle_cells.reserve(positions.len());

        for &position in positions {
            let cell = self.flat(self.cell_of(position));
            self.particle_cells.push(cell as u32);
            self.cell_starts[cell + 1] += 1;
        }

        for c in 1..self.cell_starts.len() {
            self.cell_starts[c] += self.cell_starts[c - 1];
        }

        // Scatter in index order so each cell lists its particles ascending,
        // every backend then visits neighbours in the same order.
        self.entries.clear();
        self.entries.resize(positions.len(), 0);
        self.cursor.clone_from(&self.cell_starts);
        for (index, &cell) in self.particle_cells.iter().enumerate() {
            let slot = &mut self.cursor[cell as usize];
            self.entries[*slot as usize] = index as u32;
            *slot += 1;
        }
    }

    pub fn cell(&self, cell: UVec2) -> &[u32] {
        let c = self.flat(cell);
        &self.entries[self.cell_starts[c] as usize..self.cell_starts[c + 1] as usize]
    }

    /// Every particle in the 3x3 block of cells around `position`, each exactly
    /// once. Includes the querying particle itself.
    pub fn neighborhood(&self, position: Vec2) -> impl Iterator<Item = usize> + '_ {
        let center = self.cell_of(position).as_ivec2();
        let max = self.dimensions.as_ivec2();

        (-1..=1).flat_map(move |dy| {
            (-1..=1).flat_map(move |dx| {
                let cell = center + IVec2::new(dx, dy);
                let inside = cell.cmpge(IVec2::ZERO).all() && cell.cmplt(max).all();
                let bucket: &[u32] = if inside {
                    self.cell(cell.as_uvec2())
                } else {
                    &[]
                };
                bucket.iter().map(|&i| i as usize)
            })
        })
    }
}
