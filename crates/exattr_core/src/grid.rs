//! Cartesian-product iteration over per-axis offset ranges.

/// Iterator over every combination of per-axis indices `0..extents[i]`.
///
/// Offsets are produced in row-major order: the last axis varies fastest,
/// which is the order of the equivalent nested `for` loops. The grid works
/// for any number of axes; an empty extent list yields a single empty offset
/// and any zero extent yields nothing.
///
/// # Example
///
/// ```rust
/// use exattr_core::OffsetGrid;
///
/// let offsets: Vec<Vec<usize>> = OffsetGrid::new(&[1, 2, 2]).collect();
/// assert_eq!(offsets, vec![vec![0, 0, 0], vec![0, 0, 1], vec![0, 1, 0], vec![0, 1, 1]]);
/// ```
#[derive(Debug, Clone)]
pub struct OffsetGrid {
    extents: Vec<usize>,
    next: Option<Vec<usize>>,
    remaining: usize,
}

impl OffsetGrid {
    /// Create a grid over `0..extents[0] x 0..extents[1] x ...`.
    #[must_use]
    pub fn new(extents: &[usize]) -> Self {
        let remaining = extents.iter().product();
        let next = (remaining > 0).then(|| vec![0; extents.len()]);
        Self {
            extents: extents.to_vec(),
            next,
            remaining,
        }
    }

    /// Per-axis extents of the grid.
    #[must_use]
    pub fn extents(&self) -> &[usize] {
        &self.extents
    }
}

impl Iterator for OffsetGrid {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next.take()?;
        self.remaining -= 1;

        // Odometer increment, last axis first.
        let mut advanced = current.clone();
        for axis in (0..advanced.len()).rev() {
            advanced[axis] += 1;
            if advanced[axis] < self.extents[axis] {
                self.next = Some(advanced);
                return Some(current);
            }
            advanced[axis] = 0;
        }
        Some(current)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for OffsetGrid {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_len_is_product() {
        let grid = OffsetGrid::new(&[2, 3, 4]);
        assert_eq!(grid.len(), 24);
        assert_eq!(grid.count(), 24);
    }

    #[test]
    fn test_grid_row_major_order() {
        let offsets: Vec<Vec<usize>> = OffsetGrid::new(&[2, 3]).collect();
        let mut expected = Vec::new();
        for i in 0..2 {
            for j in 0..3 {
                expected.push(vec![i, j]);
            }
        }
        assert_eq!(offsets, expected);
    }

    #[test]
    fn test_grid_single_axis() {
        let offsets: Vec<Vec<usize>> = OffsetGrid::new(&[3]).collect();
        assert_eq!(offsets, vec![vec![0], vec![1], vec![2]]);
    }

    #[test]
    fn test_grid_all_ones_yields_once() {
        let offsets: Vec<Vec<usize>> = OffsetGrid::new(&[1, 1, 1, 1]).collect();
        assert_eq!(offsets, vec![vec![0, 0, 0, 0]]);
    }

    #[test]
    fn test_grid_empty_and_zero_extents() {
        assert_eq!(OffsetGrid::new(&[]).collect::<Vec<_>>(), vec![Vec::<usize>::new()]);
        assert_eq!(OffsetGrid::new(&[3, 0, 2]).count(), 0);
    }

    #[test]
    fn test_grid_beyond_four_axes() {
        let grid = OffsetGrid::new(&[2, 1, 2, 1, 2]);
        let offsets: Vec<Vec<usize>> = grid.collect();
        assert_eq!(offsets.len(), 8);
        assert_eq!(offsets.last(), Some(&vec![1, 0, 1, 0, 1]));
    }
}
