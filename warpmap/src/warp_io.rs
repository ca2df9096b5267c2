use std::fs;
use std::path::Path;

use log::info;

use crate::error::WarpError;
use crate::warp_grid::{Point2, WarpGrid};

/// Serializes a grid to the flat text format: first line the node count,
/// then one `x y` line per node in row-major order.
pub fn grid_to_text(grid: &WarpGrid) -> String {
    let mut out = String::with_capacity(grid.nodes().len() * 20 + 16);
    out.push_str(&format!("{}\n", grid.nodes().len()));
    for node in grid.nodes() {
        out.push_str(&format!("{} {}\n", node.x, node.y));
    }
    out
}

/// Writes the flat text serialization of `grid` to `path`.
pub fn write_grid_text(path: &Path, grid: &WarpGrid) -> Result<(), WarpError> {
    info!("writing warp grid to {}", path.display());
    fs::write(path, grid_to_text(grid))?;
    Ok(())
}

/// Parses the flat text point format: a node-count header followed by one
/// `x y` pair per line. Lines starting with `#` are comments and skipped.
pub fn parse_point_set(text: &str) -> Result<Vec<Point2>, WarpError> {
    let mut lines = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'));

    let header = lines
        .next()
        .ok_or_else(|| WarpError::MalformedInput("missing node-count header".into()))?;
    let count: usize = header
        .parse()
        .map_err(|_| WarpError::MalformedInput(format!("bad node count '{}'", header)))?;

    let mut points = Vec::with_capacity(count);
    for _ in 0..count {
        let line = lines.next().ok_or_else(|| {
            WarpError::MalformedInput(format!(
                "expected {} points, file ends after {}",
                count,
                points.len()
            ))
        })?;
        let mut fields = line.split_whitespace();
        let x = parse_coordinate(fields.next(), line)?;
        let y = parse_coordinate(fields.next(), line)?;
        points.push(Point2::new(x, y));
    }
    Ok(points)
}

fn parse_coordinate(field: Option<&str>, line: &str) -> Result<f64, WarpError> {
    field
        .ok_or_else(|| WarpError::MalformedInput(format!("incomplete point line '{}'", line)))?
        .parse()
        .map_err(|_| WarpError::MalformedInput(format!("bad coordinate in line '{}'", line)))
}

/// Loads a point set (source or target features) from a text file.
pub fn read_point_set(path: &Path) -> Result<Vec<Point2>, WarpError> {
    parse_point_set(&fs::read_to_string(path)?)
}

/// Loads a serialized grid back from a text file. The node count must be a
/// perfect square of a side length of at least 2.
pub fn read_grid_text(path: &Path) -> Result<WarpGrid, WarpError> {
    let points = read_point_set(path)?;
    let size = (points.len() as f64).sqrt().round() as usize;
    if size * size != points.len() {
        return Err(WarpError::MalformedInput(format!(
            "{} nodes do not form a square grid",
            points.len()
        )));
    }
    if size < 2 {
        return Err(WarpError::GridTooSmall(size));
    }
    Ok(WarpGrid::from_nodes(points, size))
}

/// A plain RGBA pixel buffer for the diagnostic rasters. Encoding to an
/// image file is left to the caller.
pub struct Raster {
    /// Pixel data in RGBA format, 4 bytes per pixel, row-major.
    pub pixels: Vec<u8>,
    pub width: usize,
    pub height: usize,
}

impl Raster {
    /// Creates a raster filled with the given color.
    pub fn filled(width: usize, height: usize, rgba: [u8; 4]) -> Raster {
        let mut pixels = Vec::with_capacity(width * height * 4);
        for _ in 0..width * height {
            pixels.extend_from_slice(&rgba);
        }
        Raster {
            pixels,
            width,
            height,
        }
    }

    /// Writes a pixel, mirrored vertically so that texture space (y up)
    /// matches image space (y down). Out-of-bounds coordinates are ignored.
    fn plot(&mut self, x: i64, y: i64, rgba: [u8; 4]) {
        if x < 0 || y < 0 || x >= self.width as i64 || y >= self.height as i64 {
            return;
        }
        let mirrored_y = self.height - 1 - y as usize;
        let index = (mirrored_y * self.width + x as usize) * 4;
        self.pixels[index..index + 4].copy_from_slice(&rgba);
    }

    /// Draws a straight line by uniform stepping between the endpoints.
    fn line(&mut self, x0: f64, y0: f64, x1: f64, y1: f64, rgba: [u8; 4]) {
        let steps = (x1 - x0).abs().max((y1 - y0).abs()).ceil() as usize + 1;
        for s in 0..=steps {
            let t = s as f64 / steps as f64;
            let x = x0 + (x1 - x0) * t;
            let y = y0 + (y1 - y0) * t;
            self.plot(x.round() as i64, y.round() as i64, rgba);
        }
    }
}

const WIRE_COLOR: [u8; 4] = [255, 0, 0, 255];
const BACKGROUND: [u8; 4] = [255, 255, 255, 255];

/// Renders the grid as a red wireframe mesh on a white background: every
/// node connects to its right and lower neighbor. Diagnostic only, not
/// required for correctness.
pub fn wireframe_image(grid: &WarpGrid, width: usize, height: usize) -> Raster {
    let mut raster = Raster::filled(width, height, BACKGROUND);
    let n = grid.size();
    let w = width as f64;
    let h = height as f64;

    for l in 0..n - 1 {
        for k in 0..n - 1 {
            let p1 = grid.node(k, l);
            let p2 = grid.node(k + 1, l);
            let p3 = grid.node(k, l + 1);
            raster.line(w * p1.x, h * p1.y, w * p2.x, h * p2.y, WIRE_COLOR);
            raster.line(w * p1.x, h * p1.y, w * p3.x, h * p3.y, WIRE_COLOR);
        }
    }
    raster
}

/// Packs the grid coordinates into the red/green channels of a
/// `size x size` raster, one pixel per node.
pub fn channel_image(grid: &WarpGrid) -> Raster {
    let n = grid.size();
    let mut raster = Raster::filled(n, n, [0, 0, 0, 255]);
    for y in 0..n {
        for x in 0..n {
            let node = grid.node(x, y);
            let index = (y * n + x) * 4;
            raster.pixels[index] = (255.0 * node.x.clamp(0.0, 1.0)) as u8;
            raster.pixels[index + 1] = (255.0 * node.y.clamp(0.0, 1.0)) as u8;
        }
    }
    raster
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_serialization_round_trips() {
        let grid = WarpGrid::cell_centers(4);
        let text = grid_to_text(&grid);
        let points = parse_point_set(&text).unwrap();
        assert_eq!(points.len(), 16);
        for (parsed, original) in points.iter().zip(grid.nodes()) {
            assert_eq!(parsed, original);
        }
    }

    #[test]
    fn header_counts_nodes_not_scalars() {
        let grid = WarpGrid::cell_centers(4);
        let text = grid_to_text(&grid);
        assert_eq!(text.lines().next().unwrap(), "16");
    }

    #[test]
    fn comments_and_blank_lines_are_skipped() {
        let text = "# warp grid\n\n2\n0.25 0.5\n# interior\n0.75 0.5\n";
        let points = parse_point_set(text).unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points[0], Point2::new(0.25, 0.5));
        assert_eq!(points[1], Point2::new(0.75, 0.5));
    }

    #[test]
    fn malformed_input_is_reported() {
        assert!(parse_point_set("").is_err());
        assert!(parse_point_set("not-a-count\n").is_err());
        assert!(parse_point_set("2\n0.5 0.5\n").is_err());
        assert!(parse_point_set("1\n0.5\n").is_err());
        assert!(parse_point_set("1\n0.5 oops\n").is_err());
    }

    #[test]
    fn wireframe_covers_the_grid_lines() {
        let grid = WarpGrid::cell_centers(4);
        let raster = wireframe_image(&grid, 64, 64);
        assert_eq!(raster.pixels.len(), 64 * 64 * 4);
        let red = raster
            .pixels
            .chunks(4)
            .filter(|p| p[0] == 255 && p[1] == 0)
            .count();
        assert!(red > 0, "expected wireframe pixels to be drawn");
    }

    #[test]
    fn channel_image_encodes_coordinates() {
        let grid = WarpGrid::cell_centers(2);
        let raster = channel_image(&grid);
        assert_eq!(raster.width, 2);
        // node (0, 0) sits at (0.25, 0.25)
        assert_eq!(raster.pixels[0], (255.0 * 0.25) as u8);
        assert_eq!(raster.pixels[1], (255.0 * 0.25) as u8);
    }
}
