//! Generators for synthetic grids with predictable values.

/// Row-major grid split into four quadrants holding `values`
/// (north-west, north-east, south-west, south-east).
///
/// Odd dimensions give the extra row/column to the southern/eastern half.
pub fn create_quadrant_grid(width: usize, height: usize, values: [f32; 4]) -> Vec<f32> {
    let (half_w, half_h) = (width / 2, height / 2);
    let mut data = Vec::with_capacity(width * height);
    for row in 0..height {
        for col in 0..width {
            let index = (row >= half_h) as usize * 2 + (col >= half_w) as usize;
            data.push(values[index]);
        }
    }
    data
}

/// Cell-centre coordinates for `n` cells of size `step` starting at `start`.
///
/// A negative `step` produces a descending vector.
pub fn cell_centres(start: f64, step: f64, n: usize) -> Vec<f64> {
    (0..n).map(|i| start + step * (i as f64 + 0.5)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quadrant_grid() {
        #[rustfmt::skip]
        let expected = vec![
            1.0, 2.0,
            3.0, 4.0,
        ];
        assert_eq!(create_quadrant_grid(2, 2, [1.0, 2.0, 3.0, 4.0]), expected);
        let grid = create_quadrant_grid(4, 4, [1.0, 2.0, 3.0, 4.0]);
        assert_eq!(grid[5], 1.0);
        assert_eq!(grid[15], 4.0);
    }

    #[test]
    fn test_cell_centres() {
        assert_eq!(cell_centres(0.0, 2.0, 3), vec![1.0, 3.0, 5.0]);
        assert_eq!(cell_centres(10.0, -1.0, 2), vec![9.5, 8.5]);
    }
}
