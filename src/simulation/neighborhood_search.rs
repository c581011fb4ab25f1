use ahash::AHashMap;
use log::trace;

use crate::{floating_type_mod::FT, simulation_parameters::SpatialIndexKind, V2, V2I};

/// Uniform grid over particle positions. A query returns every particle in the 3x3 block of cells
/// around a position, which is a superset of all particles closer than `cell_size`.
///
/// The index is rebuilt from scratch whenever particles have moved. It is never kept across stages.
pub struct SpatialIndex {
    cell_size: FT,
    cells: CellStorage,
}

enum CellStorage {
    /// Cells of a known bounded domain. Positions outside the domain are clamped into the border cells.
    Dense(CellGrid),

    /// Only occupied cells are stored, the domain is unbounded.
    Sparse(AHashMap<(i32, i32), Vec<usize>>),
}

/// Dense grids never hold more than this many cells per particle (or the minimum below). Larger grids
/// are built as sparse maps instead.
const MAX_DENSE_CELLS_PER_PARTICLE: usize = 4;
const MIN_DENSE_CELL_BUDGET: usize = 1 << 16;

// keeps `cell + offset` of neighbor queries inside the i32 range
const MAX_CELL_COORD: FT = (i32::MAX / 2) as FT;

#[inline(always)]
fn particle_to_cell_pos(particle_pos: V2, cell_size: FT) -> V2I {
    (particle_pos / cell_size).map(|x| x.floor().clamp(-MAX_CELL_COORD, MAX_CELL_COORD) as i32)
}

/// Cells per axis of a dense grid over `domain`, or `None` if the grid would be too large for
/// `num_particles`.
fn dense_grid_size(domain: V2, cell_size: FT, num_particles: usize) -> Option<(usize, usize)> {
    let budget = (num_particles.saturating_mul(MAX_DENSE_CELLS_PER_PARTICLE)).max(MIN_DENSE_CELL_BUDGET);
    let cells_per_axis = |extent: FT| {
        let n = (extent / cell_size).ceil().max(1.);
        if n.is_finite() && n <= budget as FT {
            Some(n as usize)
        } else {
            None
        }
    };

    let width = cells_per_axis(domain.x)?;
    let height = cells_per_axis(domain.y)?;
    match width.checked_mul(height) {
        Some(num_cells) if num_cells <= budget => Some((width, height)),
        _ => None,
    }
}

impl SpatialIndex {
    /// Bucket all positions into cells of size `cell_size`.
    ///
    /// `domain` is the extent `(width, height)` and is only used for dense storage. A dense grid that
    /// would need far more cells than there are particles (tiny cells or a huge domain) falls back to
    /// sparse storage.
    pub fn build(positions: &[V2], cell_size: FT, domain: V2, kind: SpatialIndexKind) -> SpatialIndex {
        assert!(cell_size > 0., "cell size must be positive");

        let dense_size = match kind {
            SpatialIndexKind::Dense => {
                let size = dense_grid_size(domain, cell_size, positions.len());
                if size.is_none() {
                    trace!(
                        "dense grid for domain {}x{} with cell size {} too large, using sparse storage",
                        domain.x,
                        domain.y,
                        cell_size
                    );
                }
                size
            }
            SpatialIndexKind::Sparse => None,
        };

        let cells = match dense_size {
            Some((width, height)) => {
                let mut grid = CellGrid::new(width, height);
                for (particle_id, position) in positions.iter().enumerate() {
                    let cell_pos = grid.clamp(particle_to_cell_pos(*position, cell_size));
                    grid.get_mut(cell_pos).push(particle_id);
                }
                CellStorage::Dense(grid)
            }
            None => {
                let mut map: AHashMap<(i32, i32), Vec<usize>> = AHashMap::new();
                for (particle_id, position) in positions.iter().enumerate() {
                    let cell_pos = particle_to_cell_pos(*position, cell_size);
                    map.entry((cell_pos.x, cell_pos.y)).or_default().push(particle_id);
                }
                CellStorage::Sparse(map)
            }
        };

        SpatialIndex { cell_size, cells }
    }

    /// Cell coordinate of a position, as it was used while building the index.
    pub fn cell_of(&self, position: V2) -> V2I {
        let cell_pos = particle_to_cell_pos(position, self.cell_size);
        match &self.cells {
            CellStorage::Dense(grid) => grid.clamp(cell_pos),
            CellStorage::Sparse(_) => cell_pos,
        }
    }

    /// Particle ids stored in a single cell.
    pub fn cell(&self, cell_pos: V2I) -> &[usize] {
        match &self.cells {
            CellStorage::Dense(grid) => {
                if grid.contains(cell_pos) {
                    grid.get(cell_pos)
                } else {
                    &[]
                }
            }
            CellStorage::Sparse(map) => map.get(&(cell_pos.x, cell_pos.y)).map(Vec::as_slice).unwrap_or(&[]),
        }
    }

    /// Candidate neighbors of `position`: all particles in its own cell and the 8 surrounding cells.
    /// The candidates include the particle at `position` itself if it is part of the index.
    pub fn neighbor_candidates<'a>(&'a self, position: V2) -> impl Iterator<Item = usize> + 'a {
        let center = self.cell_of(position);
        iterate_grid_neighbors(1).flat_map(move |offset| self.cell(center + offset).iter().copied())
    }

    pub fn num_occupied_cells(&self) -> usize {
        match &self.cells {
            CellStorage::Dense(grid) => grid.cells.iter().filter(|c| !c.is_empty()).count(),
            CellStorage::Sparse(map) => map.len(),
        }
    }
}

/// Offsets of the (2 * dist + 1)^2 block around a cell.
pub fn iterate_grid_neighbors(dist: i32) -> impl Iterator<Item = V2I> {
    (-dist..=dist).flat_map(move |y| (-dist..=dist).map(move |x| V2I::from([x, y])))
}

struct CellGrid {
    width: usize,
    height: usize,
    cells: Vec<Vec<usize>>,
}

impl CellGrid {
    fn new(width: usize, height: usize) -> CellGrid {
        CellGrid {
            width,
            height,
            cells: (0..width * height).map(|_| Vec::new()).collect(),
        }
    }

    fn clamp(&self, cell_pos: V2I) -> V2I {
        V2I::from([
            cell_pos.x.clamp(0, self.width as i32 - 1),
            cell_pos.y.clamp(0, self.height as i32 - 1),
        ])
    }

    fn contains(&self, cell_pos: V2I) -> bool {
        0 <= cell_pos.x && (cell_pos.x as usize) < self.width && 0 <= cell_pos.y && (cell_pos.y as usize) < self.height
    }

    fn pos_to_idx(&self, cell_pos: V2I) -> usize {
        debug_assert!(self.contains(cell_pos));
        cell_pos.y as usize * self.width + cell_pos.x as usize
    }

    fn get(&self, cell_pos: V2I) -> &[usize] {
        &self.cells[self.pos_to_idx(cell_pos)]
    }

    fn get_mut(&mut self, cell_pos: V2I) -> &mut Vec<usize> {
        let idx = self.pos_to_idx(cell_pos);
        &mut self.cells[idx]
    }
}

#[cfg(test)]
fn scattered_positions(n: usize, width: FT, height: FT) -> Vec<V2> {
    use rand::{rngs::StdRng, Rng, SeedableRng};

    let mut rng = StdRng::seed_from_u64(7);
    (0..n)
        .map(|_| crate::vec2f(rng.gen_range(0. ..width), rng.gen_range(0. ..height)))
        .collect()
}

#[test]
fn neighbor_candidates_contain_all_close_particles() {
    let domain = crate::vec2f(300., 200.);
    let positions = scattered_positions(500, domain.x, domain.y);

    for kind in [SpatialIndexKind::Dense, SpatialIndexKind::Sparse] {
        for cell_size in [7., 16., 45.] {
            let index = SpatialIndex::build(&positions, cell_size, domain, kind);

            for i in 0..positions.len() {
                let mut candidates: Vec<usize> = index.neighbor_candidates(positions[i]).collect();
                let num_candidates = candidates.len();
                candidates.sort();
                candidates.dedup();
                assert_eq!(num_candidates, candidates.len(), "duplicate candidates ({:?})", kind);
                assert!(candidates.contains(&i), "particle is not a candidate of itself");

                // check: brute force neighbors are a subset of the candidates
                for j in 0..positions.len() {
                    if (positions[i] - positions[j]).norm() < cell_size {
                        assert!(
                            candidates.binary_search(&j).is_ok(),
                            "missing neighbor {} of {} (cell size {}, {:?})",
                            j,
                            i,
                            cell_size,
                            kind
                        );
                    }
                }
            }
        }
    }
}

#[test]
fn dense_index_clamps_positions_outside_domain() {
    use crate::vec2f;

    let domain = vec2f(100., 100.);
    let positions = vec![vec2f(-30., 50.), vec2f(3., 50.), vec2f(250., 250.), vec2f(99., 99.)];
    let index = SpatialIndex::build(&positions, 10., domain, SpatialIndexKind::Dense);

    assert_eq!(index.cell_of(positions[0]), index.cell_of(positions[1]));
    assert_eq!(index.cell_of(positions[2]), index.cell_of(positions[3]));

    let candidates: Vec<usize> = index.neighbor_candidates(positions[0]).collect();
    assert!(candidates.contains(&0));
    assert!(candidates.contains(&1));
    assert!(!candidates.contains(&2));
}

#[test]
fn sparse_index_handles_unbounded_coordinates() {
    use crate::vec2f;

    let positions = vec![vec2f(-1000., -1000.), vec2f(-995., -1003.), vec2f(5000., 12.)];
    let index = SpatialIndex::build(&positions, 10., vec2f(1., 1.), SpatialIndexKind::Sparse);

    let candidates: Vec<usize> = index.neighbor_candidates(positions[0]).collect();
    assert!(candidates.contains(&1));
    assert!(!candidates.contains(&2));
    assert_eq!(index.num_occupied_cells(), 3);
}

#[test]
fn empty_index_has_no_candidates() {
    use crate::vec2f;

    for kind in [SpatialIndexKind::Dense, SpatialIndexKind::Sparse] {
        let index = SpatialIndex::build(&[], 10., vec2f(100., 100.), kind);
        assert_eq!(index.neighbor_candidates(vec2f(50., 50.)).count(), 0);
    }
}

#[test]
fn oversized_dense_grid_falls_back_to_sparse_storage() {
    use crate::vec2f;

    let positions = vec![vec2f(100., 100.), vec2f(100.03, 100.), vec2f(400., 300.)];

    // 0.04 wide cells over 800x600 would be 3 * 10^8 cells
    let index = SpatialIndex::build(&positions, 0.04, vec2f(800., 600.), SpatialIndexKind::Dense);
    assert!(matches!(index.cells, CellStorage::Sparse(_)));
    let candidates: Vec<usize> = index.neighbor_candidates(positions[0]).collect();
    assert!(candidates.contains(&1));
    assert!(!candidates.contains(&2));

    // cell count does not fit into usize
    let index = SpatialIndex::build(&positions, 16., vec2f(1e30, 1e30), SpatialIndexKind::Dense);
    assert!(matches!(index.cells, CellStorage::Sparse(_)));
    assert_eq!(index.num_occupied_cells(), 2);

    let index = SpatialIndex::build(&positions, 16., vec2f(800., 600.), SpatialIndexKind::Dense);
    assert!(matches!(index.cells, CellStorage::Dense(_)));
}

#[test]
fn far_away_positions_do_not_overflow_cell_coordinates() {
    use crate::vec2f;

    let positions = vec![vec2f(1e30, -1e30), vec2f(1e30, -1e30), vec2f(0., 0.)];
    let index = SpatialIndex::build(&positions, 1., vec2f(1e30, 1e30), SpatialIndexKind::Sparse);

    let candidates: Vec<usize> = index.neighbor_candidates(positions[0]).collect();
    assert_eq!(candidates, vec![0, 1]);
}
