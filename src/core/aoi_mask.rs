//! Area-of-interest mask with an inward buffer
//!
//! Pixels within `buffer` map units of the AOI boundary mix water and shore
//! backscatter, so each polygon is shrunk by a negative buffer (holes grow by
//! the same distance) and only pixel centers inside the result are kept.
//!
//! With the `geotiff` feature the buffer and the burn-in go through OGR/GDAL;
//! without it a planar point-membership test stands in.

use crate::types::{GeoTransform, SarError, SarResult};
use ndarray::Array2;

/// Closed ring of map coordinates; the closing vertex may be repeated or omitted
pub type Ring = Vec<(f64, f64)>;

/// Polygon with optional holes, in the raster CRS
#[derive(Debug, Clone, PartialEq)]
pub struct AoiPolygon {
    pub exterior: Ring,
    pub holes: Vec<Ring>,
}

impl AoiPolygon {
    pub fn new(exterior: Ring) -> Self {
        Self {
            exterior,
            holes: Vec::new(),
        }
    }

    pub fn with_hole(mut self, hole: Ring) -> Self {
        self.holes.push(hole);
        self
    }

    fn rings(&self) -> impl Iterator<Item = &Ring> {
        std::iter::once(&self.exterior).chain(self.holes.iter())
    }

    fn bounds(&self) -> (f64, f64, f64, f64) {
        self.exterior.iter().fold(
            (f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY),
            |(xmin, ymin, xmax, ymax), &(x, y)| (xmin.min(x), ymin.min(y), xmax.max(x), ymax.max(y)),
        )
    }
}

/// Read-only AOI mask shared by every frame of a run.
///
/// The inward buffer is computed once, at construction.
#[derive(Debug, Clone, PartialEq)]
pub struct AoiMask {
    polygons: Vec<AoiPolygon>,
    buffer: f64,
    /// Buffered polygons as WKT; polygons that vanish under the buffer are dropped
    #[cfg(feature = "geotiff")]
    buffered: Vec<String>,
}

impl AoiMask {
    pub fn new(polygons: Vec<AoiPolygon>, buffer: f64) -> SarResult<Self> {
        if polygons.is_empty() {
            return Err(SarError::EmptyIntersection(
                "AOI contains no polygons".to_string(),
            ));
        }
        if buffer < 0.0 || !buffer.is_finite() {
            return Err(SarError::InvalidConfig(format!(
                "AOI buffer must be a non-negative distance, got {}",
                buffer
            )));
        }

        #[cfg(feature = "geotiff")]
        let buffered = ogr::buffer_inward(&polygons, buffer)?;

        Ok(Self {
            polygons,
            buffer,
            #[cfg(feature = "geotiff")]
            buffered,
        })
    }

    pub fn buffer(&self) -> f64 {
        self.buffer
    }

    pub fn polygons(&self) -> &[AoiPolygon] {
        &self.polygons
    }

    /// Center of the bounding box of all polygons, used as the weather lookup location
    pub fn center(&self) -> (f64, f64) {
        let (xmin, ymin, xmax, ymax) = self.polygons.iter().map(AoiPolygon::bounds).fold(
            (f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY),
            |(a, b, c, d), (xmin, ymin, xmax, ymax)| (a.min(xmin), b.min(ymin), c.max(xmax), d.max(ymax)),
        );
        ((xmin + xmax) / 2.0, (ymin + ymax) / 2.0)
    }

    /// Whether the map point lies strictly inside the buffered AOI
    pub fn covers(&self, x: f64, y: f64) -> SarResult<bool> {
        #[cfg(feature = "geotiff")]
        return ogr::covers(&self.buffered, x, y);

        #[cfg(not(feature = "geotiff"))]
        return Ok(planar::covers(&self.polygons, self.buffer, x, y));
    }

    /// Rasterize the buffered AOI onto a grid: `true` marks pixels to keep.
    ///
    /// Fails with `EmptyIntersection` when no pixel center falls inside.
    pub fn rasterize(&self, transform: &GeoTransform, shape: (usize, usize)) -> SarResult<Array2<bool>> {
        #[cfg(feature = "geotiff")]
        let mask = ogr::rasterize(&self.buffered, transform, shape)?;

        #[cfg(not(feature = "geotiff"))]
        let mask = Array2::from_shape_fn(shape, |(row, col)| {
            let (x, y) = transform.pixel_center(row, col);
            planar::covers(&self.polygons, self.buffer, x, y)
        });

        let inside = mask.iter().filter(|&&keep| keep).count();
        if inside == 0 {
            return Err(SarError::EmptyIntersection(format!(
                "buffered AOI covers no pixel of a {}x{} grid",
                shape.0, shape.1
            )));
        }
        log::debug!("AOI mask keeps {}/{} pixels", inside, shape.0 * shape.1);
        Ok(mask)
    }
}

#[cfg(feature = "geotiff")]
mod ogr {
    use super::{AoiPolygon, Ring};
    use crate::types::{GeoTransform, SarError, SarResult};
    use gdal::raster::rasterize as burn;
    use gdal::vector::Geometry;
    use gdal::DriverManager;
    use ndarray::Array2;

    const QUADRANT_SEGMENTS: u32 = 8;

    fn ring_wkt(ring: &Ring) -> String {
        let mut points: Vec<String> = ring.iter().map(|(x, y)| format!("{} {}", x, y)).collect();
        if let (Some(first), Some(last)) = (ring.first(), ring.last()) {
            if first != last {
                points.push(format!("{} {}", first.0, first.1));
            }
        }
        format!("({})", points.join(", "))
    }

    fn polygon_wkt(polygon: &AoiPolygon) -> String {
        let rings: Vec<String> = polygon.rings().map(ring_wkt).collect();
        format!("POLYGON ({})", rings.join(", "))
    }

    pub fn buffer_inward(polygons: &[AoiPolygon], buffer: f64) -> SarResult<Vec<String>> {
        let mut buffered = Vec::with_capacity(polygons.len());
        for polygon in polygons {
            let geometry = Geometry::from_wkt(&polygon_wkt(polygon))?;
            let shrunk = if buffer > 0.0 {
                geometry.buffer(-buffer, QUADRANT_SEGMENTS)?
            } else {
                geometry
            };
            if shrunk.area() > 0.0 {
                buffered.push(shrunk.wkt()?);
            } else {
                log::warn!("AOI polygon vanishes under a {} inward buffer", buffer);
            }
        }
        Ok(buffered)
    }

    pub fn covers(buffered: &[String], x: f64, y: f64) -> SarResult<bool> {
        let point = Geometry::from_wkt(&format!("POINT ({} {})", x, y))?;
        for wkt in buffered {
            if Geometry::from_wkt(wkt)?.contains(&point) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Burn the buffered polygons into an in-memory byte grid (pixel-center rule)
    pub fn rasterize(buffered: &[String], transform: &GeoTransform, shape: (usize, usize)) -> SarResult<Array2<bool>> {
        let (rows, cols) = shape;
        if buffered.is_empty() || rows == 0 || cols == 0 {
            return Ok(Array2::from_elem(shape, false));
        }

        let driver = DriverManager::get_driver_by_name("MEM")?;
        let mut dataset = driver.create_with_band_type::<u8, _>("", cols as isize, rows as isize, 1)?;
        dataset.set_geo_transform(&transform.to_gdal())?;

        let geometries = buffered
            .iter()
            .map(|wkt| Geometry::from_wkt(wkt))
            .collect::<Result<Vec<_>, _>>()?;
        let burn_values = vec![1.0; geometries.len()];
        burn(&mut dataset, &[1], &geometries, &burn_values, None)?;

        let band = dataset
            .rasterband(1)?
            .read_as::<u8>((0, 0), (cols, rows), (cols, rows), None)?;
        let burned = Array2::from_shape_vec(shape, band.data)
            .map_err(|e| SarError::Processing(format!("Failed to reshape AOI mask: {}", e)))?;
        Ok(burned.mapv(|v| v != 0))
    }
}

#[cfg(not(feature = "geotiff"))]
mod planar {
    use super::{AoiPolygon, Ring};

    pub fn covers(polygons: &[AoiPolygon], buffer: f64, x: f64, y: f64) -> bool {
        polygons.iter().any(|polygon| {
            let (xmin, ymin, xmax, ymax) = polygon.bounds();
            if x <= xmin + buffer || x >= xmax - buffer || y <= ymin + buffer || y >= ymax - buffer {
                return false;
            }
            contains(polygon, x, y) && distance_to_boundary(polygon, x, y) > buffer
        })
    }

    /// Even-odd containment over exterior and holes
    fn contains(polygon: &AoiPolygon, x: f64, y: f64) -> bool {
        polygon.rings().filter(|ring| ring_crosses(ring, x, y)).count() % 2 == 1
    }

    fn distance_to_boundary(polygon: &AoiPolygon, x: f64, y: f64) -> f64 {
        polygon
            .rings()
            .flat_map(|ring| ring_edges(ring))
            .map(|(a, b)| segment_distance(a, b, (x, y)))
            .fold(f64::INFINITY, f64::min)
    }

    fn ring_edges(ring: &Ring) -> impl Iterator<Item = ((f64, f64), (f64, f64))> + '_ {
        let n = ring.len();
        (0..n).map(move |i| (ring[i], ring[(i + 1) % n]))
    }

    /// Odd number of edge crossings of a ray cast towards +x
    fn ring_crosses(ring: &Ring, x: f64, y: f64) -> bool {
        let mut inside = false;
        for ((x1, y1), (x2, y2)) in ring_edges(ring) {
            if (y1 > y) != (y2 > y) {
                let x_cross = x1 + (y - y1) * (x2 - x1) / (y2 - y1);
                if x < x_cross {
                    inside = !inside;
                }
            }
        }
        inside
    }

    fn segment_distance(a: (f64, f64), b: (f64, f64), p: (f64, f64)) -> f64 {
        let (dx, dy) = (b.0 - a.0, b.1 - a.1);
        let len2 = dx * dx + dy * dy;
        let t = if len2 > 0.0 {
            (((p.0 - a.0) * dx + (p.1 - a.1) * dy) / len2).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let (cx, cy) = (a.0 + t * dx, a.1 + t * dy);
        ((p.0 - cx).powi(2) + (p.1 - cy).powi(2)).sqrt()
    }
}
