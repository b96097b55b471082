// THEORY:
// The board is read as a 20x10 grid of cells. A cell is occupied when most
// of its pixels are. The raw grid still contains things that are not part of
// the settled stack: the falling piece, its ghost, flashing line-clear
// animations. All of those float above the floor.
//
// Reconstruction is a connected-component pass in the spirit of region
// growing: every occupied cell on the floor row is a seed, growth follows
// 8-neighbor adjacency through occupied cells, and anything the growth never
// reaches is cleared. The pass is a stateless utility with no memory of
// previous frames.

use crate::core_modules::mask::OccupancyMask;

pub const BOARD_ROWS: usize = 20;
pub const BOARD_COLS: usize = 10;

/// Row-major occupancy of the 20x10 playfield, row 0 at the top.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BoardGrid {
    cells: [[bool; BOARD_COLS]; BOARD_ROWS],
}

impl BoardGrid {
    /// Raw grid from the board mask. A cell is occupied when its occupied
    /// pixel fraction is above `fill_threshold`. The mask size must be a
    /// multiple of the grid size; leftover pixels are ignored.
    pub fn from_mask(mask: &OccupancyMask, fill_threshold: f64) -> Self {
        let cell_width = mask.width() / BOARD_COLS as u32;
        let cell_height = mask.height() / BOARD_ROWS as u32;
        let mut grid = BoardGrid::default();
        if cell_width == 0 || cell_height == 0 {
            return grid;
        }
        for row in 0..BOARD_ROWS {
            for col in 0..BOARD_COLS {
                let cell = mask.sub_mask(
                    col as u32 * cell_width,
                    row as u32 * cell_height,
                    cell_width,
                    cell_height,
                );
                grid.cells[row][col] = cell.occupied_fraction() > fill_threshold;
            }
        }
        grid
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> bool {
        self.cells[row][col]
    }

    #[inline]
    pub fn set(&mut self, row: usize, col: usize, value: bool) {
        self.cells[row][col] = value;
    }

    pub fn rows(&self) -> &[[bool; BOARD_COLS]; BOARD_ROWS] {
        &self.cells
    }

    pub fn occupied_count(&self) -> usize {
        self.cells.iter().flatten().filter(|&&c| c).count()
    }
}

pub mod flood_fill {
    use super::*;

    /// Keeps only the cells connected to the floor row.
    pub fn reconstruct(raw: &BoardGrid) -> BoardGrid {
        let floor = BOARD_ROWS - 1;
        let mut kept = BoardGrid::default();
        let mut queue: Vec<(usize, usize)> = Vec::new();

        // --- 1. Seeding ---
        for col in 0..BOARD_COLS {
            if raw.get(floor, col) {
                kept.set(floor, col, true);
                queue.push((floor, col));
            }
        }

        // --- 2. Region Growing ---
        // `kept` doubles as the visited set.
        while let Some((row, col)) = queue.pop() {
            for dy in -1i32..=1 {
                for dx in -1i32..=1 {
                    if dy == 0 && dx == 0 {
                        continue;
                    }
                    let ny = row as i32 + dy;
                    let nx = col as i32 + dx;
                    if ny < 0 || ny >= BOARD_ROWS as i32 || nx < 0 || nx >= BOARD_COLS as i32 {
                        continue;
                    }
                    let (ny, nx) = (ny as usize, nx as usize);
                    if raw.get(ny, nx) && !kept.get(ny, nx) {
                        kept.set(ny, nx, true);
                        queue.push((ny, nx));
                    }
                }
            }
        }

        kept
    }
}

#[cfg(test)]
mod tests {
    use super::flood_fill::reconstruct;
    use super::*;

    fn grid_from(cells: &[(usize, usize)]) -> BoardGrid {
        let mut grid = BoardGrid::default();
        for &(row, col) in cells {
            grid.set(row, col, true);
        }
        grid
    }

    /// Every kept cell must have a path of raw cells down to the floor.
    fn reaches_floor(raw: &BoardGrid, row: usize, col: usize) -> bool {
        let mut seen = [[false; BOARD_COLS]; BOARD_ROWS];
        let mut stack = vec![(row, col)];
        seen[row][col] = true;
        while let Some((r, c)) = stack.pop() {
            if r == BOARD_ROWS - 1 {
                return true;
            }
            for nr in r.saturating_sub(1)..=(r + 1).min(BOARD_ROWS - 1) {
                for nc in c.saturating_sub(1)..=(c + 1).min(BOARD_COLS - 1) {
                    if raw.get(nr, nc) && !seen[nr][nc] {
                        seen[nr][nc] = true;
                        stack.push((nr, nc));
                    }
                }
            }
        }
        false
    }

    #[test]
    fn overhang_piece_is_cleared() {
        let raw = grid_from(&[(5, 3), (19, 0), (19, 1), (18, 0), (19, 7)]);
        let board = reconstruct(&raw);
        assert!(!board.get(5, 3));
        assert!(board.get(19, 0) && board.get(18, 0) && board.get(19, 7));
        assert_eq!(board.occupied_count(), 4);
    }

    #[test]
    fn diagonal_neighbors_connect() {
        let raw = grid_from(&[(19, 2), (18, 3), (17, 4), (16, 5)]);
        assert_eq!(reconstruct(&raw), raw);
    }

    #[test]
    fn empty_floor_clears_everything() {
        let raw = grid_from(&[(10, 4), (11, 4), (18, 9)]);
        assert_eq!(reconstruct(&raw).occupied_count(), 0);
    }

    #[test]
    fn reconstruction_is_idempotent_and_reachable() {
        // Deterministic pseudo-random boards.
        let mut seed = 0x2545_f491_u32;
        for _ in 0..50 {
            let mut raw = BoardGrid::default();
            for row in 0..BOARD_ROWS {
                for col in 0..BOARD_COLS {
                    seed ^= seed << 13;
                    seed ^= seed >> 17;
                    seed ^= seed << 5;
                    raw.set(row, col, seed % 3 == 0);
                }
            }
            let once = reconstruct(&raw);
            assert_eq!(reconstruct(&once), once);
            for row in 0..BOARD_ROWS {
                for col in 0..BOARD_COLS {
                    if once.get(row, col) {
                        assert!(raw.get(row, col));
                        assert!(reaches_floor(&raw, row, col), "cell ({row}, {col})");
                    }
                }
            }
        }
    }

    #[test]
    fn cell_fill_uses_strict_threshold() {
        // 2x2 pixels per cell; fill the bottom-left cell fully and the one
        // next to it by three quarters.
        let mask = OccupancyMask::from_fn(20, 40, |x, y| {
            (y >= 38 && x < 2) || (y >= 38 && (2..4).contains(&x) && !(x == 3 && y == 38))
        });
        let grid = BoardGrid::from_mask(&mask, 0.75);
        assert!(grid.get(19, 0));
        assert!(!grid.get(19, 1));
        assert_eq!(grid.occupied_count(), 1);
    }
}
