// THEORY:
// `OccupancyMask` is the "dumb" data container of the perception layer: a
// boolean grid over a region's pixels, `true` meaning the classifier judged
// the pixel to belong to a piece. It knows how to summarize and reshape
// itself (counts, fractions, medians, row splits, erosion) but nothing about
// pieces, templates or time. Every higher module (identifier, stabilizer,
// board) consumes masks and produces something more symbolic.

/// A row-major boolean grid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OccupancyMask {
    width: u32,
    height: u32,
    cells: Vec<bool>,
}

impl OccupancyMask {
    /// An all-empty mask.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            cells: vec![false; (width * height) as usize],
        }
    }

    pub fn from_fn(width: u32, height: u32, mut f: impl FnMut(u32, u32) -> bool) -> Self {
        let mut cells = Vec::with_capacity((width * height) as usize);
        for y in 0..height {
            for x in 0..width {
                cells.push(f(x, y));
            }
        }
        Self { width, height, cells }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn area(&self) -> usize {
        self.cells.len()
    }

    #[inline]
    pub fn get(&self, x: u32, y: u32) -> bool {
        self.cells[(y * self.width + x) as usize]
    }

    #[inline]
    pub fn set(&mut self, x: u32, y: u32, value: bool) {
        self.cells[(y * self.width + x) as usize] = value;
    }

    pub fn occupied_count(&self) -> usize {
        self.cells.iter().filter(|&&c| c).count()
    }

    pub fn occupied_fraction(&self) -> f64 {
        if self.cells.is_empty() {
            return 0.0;
        }
        self.occupied_count() as f64 / self.cells.len() as f64
    }

    /// Number of positions where the two masks disagree. Masks of different
    /// shape disagree everywhere.
    pub fn diff_count(&self, other: &OccupancyMask) -> usize {
        if self.width != other.width || self.height != other.height {
            return self.area().max(other.area());
        }
        self.cells
            .iter()
            .zip(&other.cells)
            .filter(|(a, b)| a != b)
            .count()
    }

    /// Copies out the `width` x `height` window whose top-left is (`x`, `y`).
    pub fn sub_mask(&self, x: u32, y: u32, width: u32, height: u32) -> OccupancyMask {
        OccupancyMask::from_fn(width, height, |dx, dy| self.get(x + dx, y + dy))
    }

    /// Splits the mask into `parts` equal horizontal bands, top first.
    /// Any remainder rows at the bottom are left out.
    pub fn split_rows(&self, parts: u32) -> Vec<OccupancyMask> {
        let band = self.height / parts;
        (0..parts)
            .map(|i| self.sub_mask(0, i * band, self.width, band))
            .collect()
    }

    /// Median (row, column) of the occupied pixels, averaging the two middle
    /// values for an even count. `None` when nothing is occupied.
    pub fn median_occupied(&self) -> Option<(f64, f64)> {
        let mut rows = Vec::new();
        let mut cols = Vec::new();
        for y in 0..self.height {
            for x in 0..self.width {
                if self.get(x, y) {
                    rows.push(y);
                    cols.push(x);
                }
            }
        }
        if rows.is_empty() {
            return None;
        }
        // Row-major traversal leaves `rows` sorted already.
        cols.sort_unstable();
        Some((median_of_sorted(&rows), median_of_sorted(&cols)))
    }

    /// Binary erosion with a `kernel` x `kernel` square anchored at
    /// `kernel / 2`. Pixels outside the mask count as empty, so shapes
    /// touching the border shrink from that side too. A kernel of 1 is the
    /// identity.
    pub fn eroded(&self, kernel: u32) -> OccupancyMask {
        if kernel <= 1 {
            return self.clone();
        }
        let (w, h) = (self.width as i64, self.height as i64);
        let integral = self.integral();
        let before = (kernel / 2) as i64;
        let after = kernel as i64 - before - 1;
        let full = (kernel * kernel) as u32;

        OccupancyMask::from_fn(self.width, self.height, |x, y| {
            let (x, y) = (x as i64, y as i64);
            let (x0, y0, x1, y1) = (x - before, y - before, x + after, y + after);
            if x0 < 0 || y0 < 0 || x1 >= w || y1 >= h {
                return false;
            }
            window_sum(&integral, self.width, x0 as u32, y0 as u32, x1 as u32, y1 as u32) == full
        })
    }

    /// Summed-area table with one row and column of zero padding.
    fn integral(&self) -> Vec<u32> {
        let stride = (self.width + 1) as usize;
        let mut table = vec![0u32; stride * (self.height + 1) as usize];
        for y in 0..self.height as usize {
            let mut row_sum = 0u32;
            for x in 0..self.width as usize {
                row_sum += self.cells[y * self.width as usize + x] as u32;
                table[(y + 1) * stride + x + 1] = table[y * stride + x + 1] + row_sum;
            }
        }
        table
    }
}

/// Occupied count of the inclusive window (x0, y0)..=(x1, y1).
fn window_sum(table: &[u32], width: u32, x0: u32, y0: u32, x1: u32, y1: u32) -> u32 {
    let stride = (width + 1) as usize;
    let at = |x: u32, y: u32| table[y as usize * stride + x as usize];
    at(x1 + 1, y1 + 1) + at(x0, y0) - at(x0, y1 + 1) - at(x1 + 1, y0)
}

fn median_of_sorted(values: &[u32]) -> f64 {
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] as f64 + values[mid] as f64) / 2.0
    } else {
        values[mid] as f64
    }
}

#[cfg(test)]
pub(crate) fn mask_from_rows(rows: &[&str]) -> OccupancyMask {
    let height = rows.len() as u32;
    let width = rows.first().map_or(0, |r| r.len()) as u32;
    OccupancyMask::from_fn(width, height, |x, y| rows[y as usize].as_bytes()[x as usize] == b'#')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_and_fraction() {
        let mask = mask_from_rows(&["#..", ".#.", "..."]);
        assert_eq!(mask.occupied_count(), 2);
        assert!((mask.occupied_fraction() - 2.0 / 9.0).abs() < 1e-12);
    }

    #[test]
    fn diff_count_compares_positionally() {
        let a = mask_from_rows(&["##", ".."]);
        let b = mask_from_rows(&["#.", ".#"]);
        assert_eq!(a.diff_count(&b), 2);
        assert_eq!(a.diff_count(&a), 0);
        assert_eq!(a.diff_count(&OccupancyMask::new(3, 3)), 9);
    }

    #[test]
    fn split_rows_keeps_order() {
        let mask = mask_from_rows(&["#.", "#.", ".#", ".#", "##", ".."]);
        let bands = mask.split_rows(3);
        assert_eq!(bands.len(), 3);
        assert_eq!(bands[0], mask_from_rows(&["#.", "#."]));
        assert_eq!(bands[1], mask_from_rows(&[".#", ".#"]));
        assert_eq!(bands[2], mask_from_rows(&["##", ".."]));
    }

    #[test]
    fn median_averages_middle_pair() {
        let mask = mask_from_rows(&["....", ".##.", ".##.", "...."]);
        assert_eq!(mask.median_occupied(), Some((1.5, 1.5)));
        assert_eq!(OccupancyMask::new(2, 2).median_occupied(), None);
    }

    #[test]
    fn erosion_with_even_kernel_keeps_only_interior() {
        // 2x2 kernel anchored at 1 covers offsets -1..=0 on each axis.
        let mask = mask_from_rows(&["....", ".###", ".###", ".###"]);
        let eroded = mask.eroded(2);
        assert_eq!(eroded, mask_from_rows(&["....", "....", "..##", "..##"]));
    }

    #[test]
    fn erosion_treats_border_as_empty() {
        let mask = mask_from_rows(&["###", "###", "###"]);
        assert_eq!(mask.eroded(3), mask_from_rows(&["...", ".#.", "..."]));
        assert_eq!(mask.eroded(1), mask);
    }
}
