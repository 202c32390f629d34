use sarseries::config::IceConfig;
use sarseries::core::ice_threshold::{inflection_point, IceThresholdEstimator, SeasonalState};
use sarseries::types::{DatedRaster, GeoTransform, Raster, RasterSeries};
use approx::assert_abs_diff_eq;
use chrono::NaiveDate;
use ndarray::Array2;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// 70% of pixels around `water`, 30% around `ice`, with a small spread
fn bimodal(water: f32, ice: f32) -> Array2<f32> {
    Array2::from_shape_fn((10, 100), |(r, c)| {
        let jitter = ((c % 11) as f32 - 5.0) * 0.1;
        if r < 7 {
            water + jitter
        } else {
            ice + jitter
        }
    })
}

fn frame(d: NaiveDate, vv: Array2<f32>) -> DatedRaster {
    let vh = vv.mapv(|v| v - 6.0);
    let raster = Raster::from_bands(vh, vv, GeoTransform::north_up(0.0, 100.0, 1.0)).unwrap();
    DatedRaster::new(d, format!("{}_processed", d.format("%Y%m%d")), raster)
}

#[test]
fn test_bimodal_inflection_between_clusters() {
    let vv = bimodal(-20.0, -10.0);
    let point = inflection_point(vv.view(), 100).unwrap();
    assert!(point > -20.0 && point < -10.0, "inflection point {}", point);
}

#[test]
fn test_season_mean_of_inflection_points() {
    let config = IceConfig::default();
    let mut state = SeasonalState::new(config.initial_threshold);
    let season = [
        (date(2020, 7, 2), -19.0),
        (date(2020, 8, 7), -18.0),
        (date(2020, 9, 12), -17.0),
        (date(2020, 10, 18), -18.0),
    ];
    for (d, point) in season {
        state = state.step(d, &config, || Ok(point)).unwrap();
        // The threshold only moves when the season closes
        assert_eq!(state.frozen_threshold, -18.0);
    }
    assert_eq!(state.accumulator_count, 4);

    state = state
        .step(date(2020, 11, 1), &config, || panic!("not in the accumulation window"))
        .unwrap();
    assert_abs_diff_eq!(state.frozen_threshold, -18.0);
    assert!(!state.accumulating);
}

#[test]
fn test_second_july_frame_does_not_reset() {
    let config = IceConfig::default();
    let state = SeasonalState::new(-18.0)
        .step(date(2021, 7, 1), &config, || Ok(-20.0))
        .unwrap()
        .step(date(2021, 7, 13), &config, || Ok(-22.0))
        .unwrap();
    assert_eq!(state.accumulator_count, 2);
    assert_abs_diff_eq!(state.accumulator_sum, -42.0);

    let closed = state.step(date(2021, 12, 1), &config, || Ok(0.0)).unwrap();
    assert_abs_diff_eq!(closed.frozen_threshold, -21.0);
}

#[test]
fn test_estimator_applies_threshold_after_season() {
    init_logging();
    let summer = bimodal(-22.0, -14.0);
    let expected = inflection_point(summer.view(), 100).unwrap();

    let frames = vec![
        frame(date(2020, 7, 3), summer.clone()),
        frame(date(2020, 9, 1), summer.clone()),
        frame(date(2020, 11, 2), Array2::from_elem((10, 100), -5.0)),
        frame(date(2021, 1, 20), Array2::from_elem((10, 100), -30.0)),
    ];
    let series = RasterSeries::from_frames(frames).unwrap();
    let ice = IceThresholdEstimator::new(IceConfig::default()).run(&series).unwrap();

    let thresholds: Vec<f64> = ice.frames.iter().map(|f| f.threshold).collect();
    assert_eq!(thresholds[0], -18.0);
    assert_eq!(thresholds[1], -18.0);
    assert_abs_diff_eq!(thresholds[2], expected, epsilon = 1e-9);
    assert_abs_diff_eq!(thresholds[3], expected, epsilon = 1e-9);

    assert_eq!(ice.frames[2].mean_fraction, 1.0);
    assert_eq!(ice.frames[3].mean_fraction, 0.0);
    assert_eq!(ice.final_state.accumulator_count, 2);
}
