use sarseries::config::FreezeConfig;
use sarseries::core::freeze_detection::FreezeDateDetector;
use chrono::NaiveDate;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

#[test]
fn test_single_onset_in_winter() {
    let detector = FreezeDateDetector::new(FreezeConfig::default());
    let observations = vec![
        (date(2020, 12, 1), 0.3),
        (date(2020, 12, 13), 0.55),
        (date(2020, 12, 25), 0.6),
        (date(2021, 1, 6), 0.2),
    ];
    let events = detector.detect(&observations);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].onset_date, date(2020, 12, 13));
}

#[test]
fn test_one_onset_per_winter() {
    let detector = FreezeDateDetector::new(FreezeConfig {
        cooldown: 2,
        ..FreezeConfig::default()
    });
    let mut observations = Vec::new();
    for year in [2019, 2020] {
        observations.push((date(year, 9, 1), 0.0));
        observations.push((date(year, 10, 20), 0.9)); // autumn, outside the window
        observations.push((date(year, 11, 5), 0.8));
        observations.push((date(year, 11, 17), 0.95));
        observations.push((date(year, 11, 29), 1.0));
        observations.push((date(year, 12, 11), 1.0));
        observations.push((date(year + 1, 2, 15), 0.1)); // break-up
    }
    let onsets: Vec<NaiveDate> = detector.detect(&observations).iter().map(|e| e.onset_date).collect();
    assert_eq!(onsets, vec![date(2019, 11, 5), date(2020, 11, 5)]);
}

#[test]
fn test_threshold_is_strict() {
    let detector = FreezeDateDetector::new(FreezeConfig::default());
    let observations = vec![(date(2021, 1, 1), 0.5), (date(2021, 1, 13), 0.5)];
    assert!(detector.detect(&observations).is_empty());
}
