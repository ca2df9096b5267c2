use crate::error::WarpError;
use crate::grid_sampler::PeriodicGridSampler;

/// A single-channel intensity image in `[0,1]`, sampled from a material map.
///
/// Feature maps are read-only inputs to the multiresolution matcher; each
/// level works on a box-filtered copy at the level's resolution.
#[derive(Debug, Clone)]
pub struct FeatureMap {
    /// Intensities stored row by row in a single vector.
    data: Vec<f64>,
    width: usize,
    height: usize,
}

impl FeatureMap {
    /// Wraps a row-major intensity buffer of dimensions `width x height`.
    ///
    /// # Errors
    /// Returns [`WarpError::InvalidFeatureMap`] if a dimension is zero or
    /// the buffer length does not match.
    pub fn new(data: Vec<f64>, width: usize, height: usize) -> Result<FeatureMap, WarpError> {
        if width == 0 || height == 0 || data.len() != width * height {
            return Err(WarpError::InvalidFeatureMap(width, height));
        }
        Ok(FeatureMap {
            data,
            width,
            height,
        })
    }

    /// Builds a feature map from 8-bit grayscale pixels, mapping 255 to 1.0.
    pub fn from_luma8(pixels: &[u8], width: usize, height: usize) -> Result<FeatureMap, WarpError> {
        if width == 0 || height == 0 || pixels.len() != width * height {
            return Err(WarpError::InvalidFeatureMap(width, height));
        }
        let data = pixels.iter().map(|&p| p as f64 / 255.0).collect();
        Ok(FeatureMap {
            data,
            width,
            height,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Intensity at pixel `(x, y)`.
    ///
    /// # Panics
    /// Panics if `(x, y)` is out of bounds.
    pub fn value(&self, x: usize, y: usize) -> f64 {
        self.data[y * self.width + x]
    }

    /// Resamples the map to `new_width x new_height` with a box-average
    /// filter: every target pixel averages the block of source pixels its
    /// footprint rounds to.
    ///
    /// # Errors
    /// Returns [`WarpError::InvalidFeatureMap`] if a target dimension is
    /// zero; a resampling failure is fatal to the whole computation.
    pub fn resized(&self, new_width: usize, new_height: usize) -> Result<FeatureMap, WarpError> {
        if new_width == 0 || new_height == 0 {
            return Err(WarpError::InvalidFeatureMap(new_width, new_height));
        }

        let scale_x = new_width as f64 / self.width as f64;
        let scale_y = new_height as f64 / self.height as f64;
        let mut data = vec![0.0; new_width * new_height];

        for new_y in 0..new_height {
            let y_start = ((new_y as f64 / scale_y).round() as usize).min(self.height - 1);
            let y_end = (((new_y + 1) as f64 / scale_y).round() as usize)
                .min(self.height - 1)
                .max(y_start);
            for new_x in 0..new_width {
                let x_start = ((new_x as f64 / scale_x).round() as usize).min(self.width - 1);
                let x_end = (((new_x + 1) as f64 / scale_x).round() as usize)
                    .min(self.width - 1)
                    .max(x_start);

                let mut total = 0.0;
                let mut count = 0usize;
                for y in y_start..=y_end {
                    for x in x_start..=x_end {
                        total += self.data[y * self.width + x];
                        count += 1;
                    }
                }
                data[new_y * new_width + new_x] = total / count as f64;
            }
        }

        Ok(FeatureMap {
            data,
            width: new_width,
            height: new_height,
        })
    }

    /// A periodic bilinear sampler over this map's intensities.
    pub fn sampler(&self) -> PeriodicGridSampler<f64> {
        PeriodicGridSampler::new(self.data.clone(), self.width, self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_dimension_is_rejected() {
        assert!(FeatureMap::new(vec![], 0, 4).is_err());
        assert!(FeatureMap::new(vec![0.0; 8], 4, 4).is_err());
        let map = FeatureMap::new(vec![0.0; 16], 4, 4).unwrap();
        assert!(map.resized(0, 4).is_err());
    }

    #[test]
    fn from_luma8_normalizes_to_unit_range() {
        let map = FeatureMap::from_luma8(&[0, 51, 102, 255], 2, 2).unwrap();
        assert!((map.value(0, 0) - 0.0).abs() < 1e-12);
        assert!((map.value(1, 0) - 0.2).abs() < 1e-12);
        assert!((map.value(1, 1) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn constant_map_stays_constant_under_resampling() {
        let map = FeatureMap::new(vec![0.5; 16 * 16], 16, 16).unwrap();
        let small = map.resized(4, 4).unwrap();
        for y in 0..4 {
            for x in 0..4 {
                assert!((small.value(x, y) - 0.5).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn downsampling_averages_source_blocks() {
        // horizontal gradient: value(x, y) = x
        let mut data = Vec::new();
        for _y in 0..4 {
            for x in 0..4 {
                data.push(x as f64);
            }
        }
        let map = FeatureMap::new(data, 4, 4).unwrap();
        let small = map.resized(2, 2).unwrap();
        // target pixel 0 rounds to source columns 0..=2, pixel 1 to 2..=3
        assert!((small.value(0, 0) - 1.0).abs() < 1e-12);
        assert!((small.value(1, 0) - 2.5).abs() < 1e-12);
    }
}
