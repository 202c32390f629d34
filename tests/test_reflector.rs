use sarseries::config::ReflectorConfig;
use sarseries::core::reflector::{
    coarse_search, consensus, fine_search, ReflectorFix, ReflectorLocator, ReflectorObservation,
};
use sarseries::types::{DatedRaster, GeoTransform, Raster, RasterSeries};
use chrono::{Duration, NaiveDate};
use ndarray::Array2;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn start() -> NaiveDate {
    NaiveDate::from_ymd_opt(2021, 5, 1).unwrap()
}

fn bright_frame(d: NaiveDate, size: usize, at: (usize, usize)) -> DatedRaster {
    let mut vv = Array2::from_elem((size, size), -20.0f32);
    vv[at] = 10.0;
    let vh = Array2::zeros((size, size));
    let raster = Raster::from_bands(vh, vv, GeoTransform::north_up(0.0, size as f64, 1.0)).unwrap();
    DatedRaster::new(d, format!("{}_processed", d.format("%Y%m%d")), raster)
}

fn observation(i: usize, row: usize, col: usize) -> ReflectorObservation {
    ReflectorObservation {
        date: start() + Duration::days(12 * i as i64),
        row,
        col,
        neighborhood_mean: -10.0,
        vv: 0.0,
        vh: f32::NAN,
    }
}

#[test]
fn test_isolated_bright_pixel_is_found_exactly() {
    let frame = bright_frame(start(), 101, (50, 50));
    let vv = frame.raster.vv();

    let coarse = coarse_search(vv, 100.0).unwrap();
    assert_eq!(coarse, (50, 50));
    let climb = fine_search(vv, coarse, 10_000);
    assert_eq!((climb.row, climb.col), (50, 50));
    assert!(!climb.capped);

    let locator = ReflectorLocator::new(ReflectorConfig {
        upscale_factor: 1,
        ..ReflectorConfig::default()
    });
    let series = RasterSeries::from_frames(vec![frame]).unwrap();
    let fix = locator.locate(&series).unwrap();
    assert_eq!(fix.position, (50, 50));
    assert_eq!(fix.observations[0].vv, 10.0);
    assert!(fix.observations[0].vh.is_nan());
}

#[test]
fn test_outlier_flagged_but_kept_in_position() {
    let mut observations: Vec<ReflectorObservation> = (0..20)
        .map(|i| {
            let offset = i % 3; // rows/cols 49, 50, 51
            observation(i, 49 + offset, 49 + offset)
        })
        .collect();
    observations.push(observation(20, 5, 5));

    let (inliers, position) = consensus(&observations, 2.0).unwrap();
    assert!(inliers[..20].iter().all(|&keep| keep));
    assert!(!inliers[20]);

    // Mean row over all 21 observations is 1004 / 21 = 47.8
    assert_eq!(position, (48, 48));

    let fix = ReflectorFix {
        observations,
        inliers,
        position,
        upscale_factor: 10,
    };
    let filtered = fix.filtered();
    assert_eq!(filtered.len(), 20);
    assert!(filtered.iter().all(|obs| obs.row >= 49));
}

#[test]
fn test_locate_and_extract_on_upsampled_frames() {
    init_logging();
    let frames: Vec<DatedRaster> = (0..25)
        .map(|i| bright_frame(start() + Duration::days(12 * i), 21, (10, 10)))
        .collect();
    let series = RasterSeries::from_frames(frames).unwrap();

    let locator = ReflectorLocator::new(ReflectorConfig::default());
    let fix = locator.locate(&series).unwrap();

    // Only the latest frame_count frames are observed
    assert_eq!(fix.observations.len(), 20);
    assert_eq!(fix.observations[0].date, start() + Duration::days(12 * 5));
    assert!((103..=106).contains(&fix.position.0), "row {}", fix.position.0);
    assert!((103..=106).contains(&fix.position.1), "col {}", fix.position.1);

    let samples = locator.extract(&series, fix.position).unwrap();
    assert_eq!(samples.len(), 25);
    assert!(samples.iter().all(|s| s.vv > 0.0 && s.vh.is_nan()));

    let outside = locator.extract(&series, (500, 500)).unwrap();
    assert!(outside.iter().all(|s| s.vv.is_nan()));
}
