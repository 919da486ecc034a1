use inspect_io::{Camera, CameraConfig, DefectClassifier, SyntheticCamera, ThresholdClassifier};
use std::fs::File;
use std::io::Read;

fn camera(seed: u64) -> SyntheticCamera {
    SyntheticCamera::new(CameraConfig::default(), Some(seed))
}

#[test]
fn detects_defect_in_normal_lighting() {
    let classifier = ThresholdClassifier::default();
    for seed in 0..20 {
        let frame = camera(seed).capture(true, false);
        assert!(classifier.predict(&frame), "seed {seed}: defect missed");
    }
}

#[test]
fn detects_defect_in_low_lighting() {
    let classifier = ThresholdClassifier::default();
    for seed in 0..20 {
        let frame = camera(seed).capture(true, true);
        assert!(classifier.predict(&frame), "seed {seed}: defect missed");
    }
}

#[test]
fn clean_frames_pass_in_both_lightings() {
    let classifier = ThresholdClassifier::default();
    for seed in 0..20 {
        let mut camera = camera(seed);
        assert!(!classifier.predict(&camera.capture(false, false)), "seed {seed}");
        assert!(!classifier.predict(&camera.capture(false, true)), "seed {seed}");
    }
}

#[test]
fn detection_overlaps_injected_patch() {
    let classifier = ThresholdClassifier::default();
    let mut camera = camera(11);
    let frame = camera.capture(true, true);
    let site = camera.last_defect().expect("defect injected");
    let found = classifier.detect(&frame).expect("defect detected");

    assert!(found.top <= site.row + 1 && found.bottom + 1 >= site.row + 9);
    assert!(found.left <= site.col + 1 && found.right + 1 >= site.col + 9);
}

#[test]
fn saved_frame_round_trips_pixels() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("frame.pgm");
    let frame = camera(5).capture(true, false);
    frame.write_pgm(File::create(&path).unwrap()).unwrap();

    let mut bytes = Vec::new();
    File::open(&path).unwrap().read_to_end(&mut bytes).unwrap();
    let header = b"P5\n100 100\n255\n";
    assert_eq!(&bytes[..header.len()], header);
    assert_eq!(&bytes[header.len()..], frame.pixels());
}
