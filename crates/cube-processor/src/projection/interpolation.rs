//! Interpolation kernels for grid resampling.
//!
//! Positions are fractional (col, row) indices where integer values are pixel
//! centres. Missing samples are NaN and propagate.

use crate::types::ResamplingMethod;

/// Nearest neighbor interpolation.
///
/// Returns the value of the nearest grid point.
pub fn nearest_interpolate(data: &[f32], width: usize, height: usize, x: f64, y: f64) -> f32 {
    let col = x.round();
    let row = y.round();

    if col < 0.0 || row < 0.0 || col >= width as f64 || row >= height as f64 {
        return f32::NAN;
    }

    data[row as usize * width + col as usize]
}

/// Bilinear interpolation.
///
/// Smoothly interpolates between the four nearest grid points. Positions
/// between the outermost pixel centre and the grid edge clamp to the edge.
pub fn bilinear_interpolate(data: &[f32], width: usize, height: usize, x: f64, y: f64) -> f32 {
    if width == 0 || height == 0 {
        return f32::NAN;
    }
    let x = x.clamp(0.0, (width - 1) as f64);
    let y = y.clamp(0.0, (height - 1) as f64);

    let x0 = x.floor() as usize;
    let y0 = y.floor() as usize;
    let xf = (x - x0 as f64) as f32;
    let yf = (y - y0 as f64) as f32;

    // Exact pixel centres only read the neighbours that carry weight
    let x1 = if xf > 0.0 { (x0 + 1).min(width - 1) } else { x0 };
    let y1 = if yf > 0.0 { (y0 + 1).min(height - 1) } else { y0 };

    let v00 = data[y0 * width + x0];
    let v10 = data[y0 * width + x1];
    let v01 = data[y1 * width + x0];
    let v11 = data[y1 * width + x1];

    // Handle NaN values - if any corner is NaN, return NaN
    if v00.is_nan() || v10.is_nan() || v01.is_nan() || v11.is_nan() {
        return f32::NAN;
    }

    let top = v00 * (1.0 - xf) + v10 * xf;
    let bottom = v01 * (1.0 - xf) + v11 * xf;
    top * (1.0 - yf) + bottom * yf
}

/// Bicubic interpolation.
///
/// Uses 16 surrounding points for smoother interpolation.
pub fn cubic_interpolate(data: &[f32], width: usize, height: usize, x: f64, y: f64) -> f32 {
    if width == 0 || height == 0 {
        return f32::NAN;
    }
    let x = x.clamp(0.0, (width - 1) as f64);
    let y = y.clamp(0.0, (height - 1) as f64);

    let xi = x.floor() as i64;
    let yi = y.floor() as i64;

    let xf = (x - xi as f64) as f32;
    let yf = (y - yi as f64) as f32;

    let mut values = [[0.0f32; 4]; 4];

    for j in 0..4 {
        for i in 0..4 {
            let px = (xi + i - 1).clamp(0, width as i64 - 1) as usize;
            let py = (yi + j - 1).clamp(0, height as i64 - 1) as usize;
            let v = data[py * width + px];

            // If any value is NaN, fall back to bilinear
            if v.is_nan() {
                return bilinear_interpolate(data, width, height, x, y);
            }
            values[j as usize][i as usize] = v;
        }
    }

    let mut row_values = [0.0f32; 4];
    for j in 0..4 {
        row_values[j] = cubic_1d(values[j][0], values[j][1], values[j][2], values[j][3], xf);
    }

    cubic_1d(row_values[0], row_values[1], row_values[2], row_values[3], yf)
}

/// 1D cubic interpolation using Catmull-Rom spline.
fn cubic_1d(p0: f32, p1: f32, p2: f32, p3: f32, t: f32) -> f32 {
    let t2 = t * t;
    let t3 = t2 * t;

    let a = -0.5 * p0 + 1.5 * p1 - 1.5 * p2 + 0.5 * p3;
    let b = p0 - 2.5 * p1 + 2.0 * p2 - 0.5 * p3;
    let c = -0.5 * p0 + 0.5 * p2;
    let d = p1;

    a * t3 + b * t2 + c * t + d
}

/// Sample `data` at a fractional position with the given method.
pub fn sample(
    method: ResamplingMethod,
    data: &[f32],
    width: usize,
    height: usize,
    x: f64,
    y: f64,
) -> f32 {
    match method {
        ResamplingMethod::Nearest => nearest_interpolate(data, width, height, x, y),
        ResamplingMethod::Bilinear => bilinear_interpolate(data, width, height, x, y),
        ResamplingMethod::Cubic => cubic_interpolate(data, width, height, x, y),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nearest_interpolate() {
        let data: Vec<f32> = vec![
            1.0, 2.0, 3.0,
            4.0, 5.0, 6.0,
            7.0, 8.0, 9.0,
        ];

        assert_eq!(nearest_interpolate(&data, 3, 3, 0.0, 0.0), 1.0);
        assert_eq!(nearest_interpolate(&data, 3, 3, 1.0, 1.0), 5.0);
        assert_eq!(nearest_interpolate(&data, 3, 3, 0.4, 0.4), 1.0);
        assert_eq!(nearest_interpolate(&data, 3, 3, 0.6, 0.6), 5.0);
        assert_eq!(nearest_interpolate(&data, 3, 3, -0.4, 2.4), 7.0);
        assert!(nearest_interpolate(&data, 3, 3, -0.6, 0.0).is_nan());
        assert!(nearest_interpolate(&data, 3, 3, 0.0, 2.6).is_nan());
    }

    #[test]
    fn test_bilinear_interpolate() {
        let data: Vec<f32> = vec![
            1.0, 2.0,
            3.0, 4.0,
        ];

        // Corners
        assert_eq!(bilinear_interpolate(&data, 2, 2, 0.0, 0.0), 1.0);
        assert_eq!(bilinear_interpolate(&data, 2, 2, 1.0, 0.0), 2.0);
        assert_eq!(bilinear_interpolate(&data, 2, 2, 0.0, 1.0), 3.0);
        assert_eq!(bilinear_interpolate(&data, 2, 2, 1.0, 1.0), 4.0);

        // Center
        let center = bilinear_interpolate(&data, 2, 2, 0.5, 0.5);
        assert!((center - 2.5).abs() < 0.001);

        // Half a pixel outside the first centre clamps to the edge
        assert_eq!(bilinear_interpolate(&data, 2, 2, -0.4, -0.4), 1.0);
    }

    #[test]
    fn test_bilinear_with_nan() {
        let data: Vec<f32> = vec![
            1.0, f32::NAN,
            3.0, 4.0,
        ];

        let result = bilinear_interpolate(&data, 2, 2, 0.5, 0.5);
        assert!(result.is_nan());
    }

    #[test]
    fn test_cubic_reproduces_linear_ramp() {
        let data: Vec<f32> = (0..16).map(|i| (i % 4) as f32).collect();
        let v = cubic_interpolate(&data, 4, 4, 1.5, 1.5);
        assert!((v - 1.5).abs() < 1e-5);
    }

    #[test]
    fn test_cubic_falls_back_on_nan() {
        let mut data: Vec<f32> = vec![1.0; 16];
        data[0] = f32::NAN;
        assert!(cubic_interpolate(&data, 4, 4, 0.5, 0.5).is_nan());
        assert_eq!(cubic_interpolate(&data, 4, 4, 2.5, 2.5), 1.0);
    }
}
