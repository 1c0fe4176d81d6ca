mod common;

use common::{jpeg_with_gps, mapping, plain_jpeg, FakeEngine};
use geophoto::processing;
use geophoto::recognition::EngineKind;
use geophoto::records::write_output;
use geophoto::{CoordinateSource, RecognitionBudget, Resolver, ResolverPolicy};
use serde_json::Value;
use std::fs;
use std::sync::Arc;

#[test]
fn directory_run_mixes_metadata_and_recognition() {
    let dir = tempfile::tempdir().unwrap();
    let photos = dir.path().join("photos");
    fs::create_dir_all(photos.join("nested")).unwrap();

    fs::write(
        photos.join("a_tagged.jpg"),
        jpeg_with_gps(("N", [(48, 1), (51, 1), (0, 1)]), ("E", [(2, 1), (21, 1), (0, 1)])),
    )
    .unwrap();
    fs::write(photos.join("b_stamped.JPG"), plain_jpeg()).unwrap();
    fs::write(photos.join("c_notes.txt"), "S10°30'00\" E110°30'00\"").unwrap();
    fs::write(photos.join("nested").join("d_deep.jpg"), plain_jpeg()).unwrap();

    let local = Arc::new(FakeEngine::reading(EngineKind::Local, &["S10°30'00\" E110°30'00\""]));
    let resolver = Resolver::new(
        mapping(),
        ResolverPolicy::default(),
        Arc::new(RecognitionBudget::unlimited()),
    )
    .with_local(local.clone());

    let summary = processing::run(&resolver, &photos, false, 2).unwrap();

    let names: Vec<&str> = summary.records.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, ["a_tagged.jpg", "b_stamped.JPG"]);
    assert_eq!(summary.records[0].coordinate_source, CoordinateSource::Metadata);
    assert_eq!(summary.records[1].coordinate_source, CoordinateSource::RecognitionPrimary);
    assert_eq!(summary.stats.total, 2);
    assert_eq!(summary.stats.from_metadata, 1);
    assert_eq!(summary.stats.from_primary, 1);
    assert_eq!(summary.stats.remote_calls, 0);
    assert_eq!(local.calls(), 1);

    let recursive = processing::run(&resolver, &photos, true, 1).unwrap();
    assert_eq!(recursive.records.len(), 3);

    let output = dir.path().join("out").join("gps.json");
    write_output(&output, &photos, &summary.records, &summary.stats, true).unwrap();
    let report: Value = serde_json::from_str(&fs::read_to_string(&output).unwrap()).unwrap();
    let rows = report["records"].as_array().unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["coordinate_source"], Value::from("METADATA"));
    assert!((rows[0]["latitude"].as_f64().unwrap() - 48.85).abs() < 1e-9);
    assert!(rows[0]["maps_url"].as_str().unwrap().contains("query=48.8"));
    assert_eq!(rows[1]["lat"], Value::from(-10.5));
    assert!(rows[1]["photo_path"].as_str().unwrap().ends_with("b_stamped.JPG"));
}

#[test]
fn shared_budget_holds_across_workers() {
    let dir = tempfile::tempdir().unwrap();
    for i in 0..6 {
        fs::write(dir.path().join(format!("photo_{i}.jpg")), plain_jpeg()).unwrap();
    }

    let remote = Arc::new(FakeEngine::reading(EngineKind::Remote, &["-6.175392, 106.827153"]));
    let policy = ResolverPolicy {
        primary: EngineKind::Remote,
        ..Default::default()
    };
    let resolver = Resolver::new(mapping(), policy, Arc::new(RecognitionBudget::new(Some(2))))
        .with_remote(remote.clone());

    let summary = processing::run(&resolver, dir.path(), false, 4).unwrap();

    assert_eq!(remote.calls(), 2);
    assert_eq!(summary.stats.from_primary, 2);
    assert_eq!(summary.stats.unresolved, 4);
    assert_eq!(summary.stats.remote_calls, 2);
}

#[test]
fn ocr_disabled_run_never_calls_engines() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("x.png"), b"not really a png").unwrap();

    let local = Arc::new(FakeEngine::reading(EngineKind::Local, &["10.123456,110.654321"]));
    let policy = ResolverPolicy {
        ocr_disabled: true,
        ..Default::default()
    };
    let resolver = Resolver::new(mapping(), policy, Arc::new(RecognitionBudget::unlimited())).with_local(local.clone());

    let summary = processing::run(&resolver, dir.path(), false, 1).unwrap();

    assert_eq!(summary.stats.unresolved, 1);
    assert_eq!(local.calls(), 0);
    assert!(!summary.records[0].diagnostics.is_empty());
}
