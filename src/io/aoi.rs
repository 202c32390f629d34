//! AOI polygons from OGR vector files or WKT
//!
//! Geometries are taken as-is: they must already be in the raster CRS.

use crate::core::aoi_mask::{AoiPolygon, Ring};
use crate::types::{SarError, SarResult};
use gdal::vector::{Geometry, LayerAccess};
use gdal::Dataset;
use std::path::Path;

/// Polygons of every feature in the first layer of `path` (shapefile, GeoPackage, ...)
pub fn read_aoi<P: AsRef<Path>>(path: P) -> SarResult<Vec<AoiPolygon>> {
    let dataset = Dataset::open(path.as_ref())?;
    let mut layer = dataset.layer(0)?;

    let mut polygons = Vec::new();
    for (index, feature) in layer.features().enumerate() {
        match feature.geometry() {
            Some(geometry) => collect_polygons(geometry, &mut polygons),
            None => log::warn!("AOI feature {} has no geometry, skipping", index),
        }
    }

    log::info!("Read {} AOI polygon(s) from {}", polygons.len(), path.as_ref().display());
    non_empty(polygons)
}

/// Polygons of a single WKT geometry
pub fn aoi_from_wkt(wkt: &str) -> SarResult<Vec<AoiPolygon>> {
    let geometry = Geometry::from_wkt(wkt)?;
    let mut polygons = Vec::new();
    collect_polygons(&geometry, &mut polygons);
    non_empty(polygons)
}

fn non_empty(polygons: Vec<AoiPolygon>) -> SarResult<Vec<AoiPolygon>> {
    if polygons.is_empty() {
        return Err(SarError::EmptyIntersection(
            "AOI contains no polygon geometry".to_string(),
        ));
    }
    Ok(polygons)
}

fn collect_polygons(geometry: &Geometry, out: &mut Vec<AoiPolygon>) {
    let name = geometry.geometry_name().to_ascii_uppercase();
    match name.as_str() {
        "POLYGON" => {
            if let Some(polygon) = polygon_from(geometry) {
                out.push(polygon);
            }
        }
        "MULTIPOLYGON" | "GEOMETRYCOLLECTION" => {
            for i in 0..geometry.geometry_count() {
                collect_polygons(&geometry.get_geometry(i), out);
            }
        }
        other => log::warn!("Skipping non-polygon AOI geometry {}", other),
    }
}

fn polygon_from(geometry: &Geometry) -> Option<AoiPolygon> {
    let rings: Vec<Ring> = (0..geometry.geometry_count())
        .map(|i| {
            geometry
                .get_geometry(i)
                .get_point_vec()
                .into_iter()
                .map(|(x, y, _)| (x, y))
                .collect()
        })
        .collect();

    let mut rings = rings.into_iter();
    let exterior = rings.next().filter(|ring| ring.len() >= 3)?;
    Some(rings.fold(AoiPolygon::new(exterior), AoiPolygon::with_hole))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wkt_polygon_with_hole() {
        let polygons = aoi_from_wkt(
            "POLYGON ((0 0, 100 0, 100 100, 0 100, 0 0), (40 40, 60 40, 60 60, 40 60, 40 40))",
        )
        .unwrap();
        assert_eq!(polygons.len(), 1);
        assert_eq!(polygons[0].exterior.len(), 5);
        assert_eq!(polygons[0].holes.len(), 1);
    }

    #[test]
    fn test_wkt_multipolygon_and_non_polygon() {
        let polygons = aoi_from_wkt(
            "MULTIPOLYGON (((0 0, 1 0, 1 1, 0 0)), ((5 5, 6 5, 6 6, 5 5)))",
        )
        .unwrap();
        assert_eq!(polygons.len(), 2);

        assert!(matches!(
            aoi_from_wkt("LINESTRING (0 0, 1 1)"),
            Err(SarError::EmptyIntersection(_))
        ));
    }
}
