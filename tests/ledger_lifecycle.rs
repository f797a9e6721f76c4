use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use glyph_audit::AuditError;
use glyph_audit::auto_annotate::annotate_manifest;
use glyph_audit::ledger::{
    self, AUTO_NOTES, AUTO_UNCERTAINTY, Direction, HANDCOPY_ONLY, ManualObservation,
    MergeOutcome, ObservationRecord, SignObservation, add_sign_observation, build_observations,
    build_prior_readings, merge_auto_annotations, rebuild,
};
use glyph_audit::manifest::Manifest;
use glyph_audit::segment::SegmentConfig;
use image::{GrayImage, Luma};
use serde_json::json;

fn init_logs() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn manifest(lines: &[(&str, &[&str])]) -> Manifest {
    let lines: Vec<_> = lines
        .iter()
        .map(|(id, ev)| json!({"line_id": id, "label": id, "evidence_ids": ev}))
        .collect();
    serde_json::from_value(json!({
        "sources": [{
            "source_id": "local",
            "items": [{
                "item_id": "item1",
                "evidence": [
                    {"evidence_id": "ev1", "output_path": "evidence/l1.png"},
                    {"evidence_id": "ev2", "output_path": "evidence/l2.png"}
                ]
            }]
        }],
        "corpus": [{"label": "Relief A", "lines": lines}]
    }))
    .unwrap()
}

fn ledger_path(dir: &Path) -> PathBuf {
    dir.join("ledger/observations.jsonl")
}

#[test]
fn rebuild_creates_defaults_and_is_idempotent() {
    init_logs();
    let dir = tempfile::tempdir().unwrap();
    let path = ledger_path(dir.path());
    let m = manifest(&[("L1", &["ev1"]), ("L2", &["ev2"])]);

    let first = build_observations(&m, &path).unwrap();
    assert_eq!(first.len(), 2);
    assert_eq!(first[0], ObservationRecord::new("L1", vec!["ev1".into()]));
    assert!(first[1].observed_signs.is_empty());
    assert_eq!(first[1].uncertainty, 1.0);
    assert!(first[1].observed_only);
    assert_eq!(first[1].directionality.value, Direction::Unknown);

    let bytes = fs::read(&path).unwrap();
    build_observations(&m, &path).unwrap();
    assert_eq!(fs::read(&path).unwrap(), bytes);
}

#[test]
fn rebuild_keeps_manual_work_and_refreshes_evidence() {
    let mut kept = ObservationRecord::new("L1", vec!["old".into()]);
    kept.observed_signs.push(SignObservation::new("S1", "bird"));
    kept.notes = "checked on site".into();
    let orphan = ObservationRecord::new("gone", vec![]);

    let m = manifest(&[("L1", &["ev1"]), ("L1", &["ev2"]), ("L2", &["ev2"])]);
    let records = rebuild(&m, vec![orphan, kept]);

    let ids: Vec<&str> = records.iter().map(|r| r.line_id.as_str()).collect();
    assert_eq!(ids, ["L1", "L2"]);
    assert_eq!(records[0].evidence_ids, ["ev1"]);
    assert_eq!(records[0].observed_signs[0].sign_id, "S1");
    assert_eq!(records[0].notes, "checked on site");
}

#[test]
fn merge_respects_existing_signs_unless_overwriting() {
    let mut records = vec![ObservationRecord::new("L1", vec![])];
    records[0].observed_signs.push(SignObservation::new("S1", "manual"));
    let detected = vec![SignObservation::new("auto-L1-1", "")];

    let outcome = merge_auto_annotations(&mut records, "L1", detected.clone(), false).unwrap();
    assert_eq!(outcome, MergeOutcome::Protected);
    assert_eq!(records[0].observed_signs[0].sign_id, "S1");

    let outcome = merge_auto_annotations(&mut records, "L1", detected, true).unwrap();
    assert_eq!(outcome, MergeOutcome::Applied);
    assert_eq!(records[0].observed_signs.len(), 1);
    assert!(records[0].observed_signs[0].is_auto());
    assert_eq!(records[0].notes, AUTO_NOTES);
    assert_eq!(records[0].uncertainty, AUTO_UNCERTAINTY);

    assert!(matches!(
        merge_auto_annotations(&mut records, "L9", vec![], true),
        Err(AuditError::NotFound(_))
    ));
}

#[test]
fn manual_observation_appends_and_sets_direction() {
    let dir = tempfile::tempdir().unwrap();
    let path = ledger_path(dir.path());
    build_observations(&manifest(&[("L1", &["ev1"])]), &path).unwrap();

    let obs = ManualObservation {
        bbox: Some([1.0, 2.0, 30.5, 40.0]),
        confidence: Some(0.7),
        direction: Some(Direction::RightToLeft),
        ..ManualObservation::new("S1", "seated figure")
    };
    let record = add_sign_observation(&path, "L1", &obs).unwrap();
    assert_eq!(record.observed_signs.len(), 1);
    assert_eq!(record.directionality.value, Direction::RightToLeft);
    assert_eq!(record.directionality.basis, "manual");
    assert_eq!(record.uncertainty, 1.0);

    let stored = ledger::load_observations(&path).unwrap();
    assert_eq!(stored[0], record);
    assert_eq!(
        stored[0].observed_signs[0].bbox_coords().unwrap().unwrap(),
        [1.0, 2.0, 30.5, 40.0]
    );
}

#[test]
fn unknown_line_leaves_ledger_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let path = ledger_path(dir.path());
    build_observations(&manifest(&[("L1", &["ev1"])]), &path).unwrap();
    let before = fs::read(&path).unwrap();

    let err = add_sign_observation(&path, "L404", &ManualObservation::new("S1", "x"));
    assert!(matches!(err, Err(AuditError::NotFound(id)) if id == "L404"));
    assert_eq!(fs::read(&path).unwrap(), before);

    let bad = ManualObservation {
        confidence: Some(1.5),
        ..ManualObservation::new("S1", "x")
    };
    assert!(matches!(
        add_sign_observation(&path, "L1", &bad),
        Err(AuditError::Configuration(_))
    ));
    assert_eq!(fs::read(&path).unwrap(), before);
}

#[test]
fn unknown_fields_survive_ledger_passes() {
    let dir = tempfile::tempdir().unwrap();
    let path = ledger_path(dir.path());
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(
        &path,
        "{\"line_id\":\"L1\",\"evidence_ids\":[],\"reviewer\":\"mk\",\"observed_signs\":[{\"sign_id\":\"S1\",\"bbox\":[1,2,3]}]}\n",
    )
    .unwrap();

    let records = build_observations(&manifest(&[("L1", &["ev1"])]), &path).unwrap();
    assert_eq!(records[0].extra["reviewer"], json!("mk"));
    let text = fs::read_to_string(&path).unwrap();
    assert!(text.contains("\"reviewer\":\"mk\""));
    assert!(text.contains("\"bbox\":[1,2,3]"));
}

#[test]
fn bulk_annotation_protects_manual_lines() {
    init_logs();
    let dir = tempfile::tempdir().unwrap();
    let path = ledger_path(dir.path());
    let image_path = dir.path().join("l2.png");
    GrayImage::from_fn(120, 60, |x, y| {
        Luma([if (30..=70).contains(&x) && (10..=50).contains(&y) { 0 } else { 255 }])
    })
    .save(&image_path)
    .unwrap();

    let m = manifest(&[("L1", &["ev1"]), ("L2", &["ev2"]), ("L3", &[])]);
    build_observations(&m, &path).unwrap();
    add_sign_observation(&path, "L1", &ManualObservation::new("S1", "manual")).unwrap();

    let resolver: HashMap<String, PathBuf> = [
        ("ev1".to_string(), dir.path().join("never-read.png")),
        ("ev2".to_string(), image_path),
    ]
    .into_iter()
    .collect();
    let summary = annotate_manifest(&m, &resolver, &path, &SegmentConfig::default(), false).unwrap();
    assert_eq!(summary.protected, 1);
    assert_eq!(summary.annotated, 1);
    assert_eq!(summary.missing_evidence, 1);
    assert_eq!(summary.failed, 0);

    let records = ledger::load_observations(&path).unwrap();
    assert_eq!(records[0].observed_signs[0].sign_id, "S1");
    assert_eq!(records[1].observed_signs.len(), 1);
    assert_eq!(records[1].observed_signs[0].sign_id, "auto-L2-1");
    assert_eq!(records[1].uncertainty, AUTO_UNCERTAINTY);
    assert!(records[2].observed_signs.is_empty());
}

#[test]
fn rebuild_after_manual_observation_keeps_it_verbatim() {
    let dir = tempfile::tempdir().unwrap();
    let path = ledger_path(dir.path());
    build_observations(&manifest(&[("L1", &["ev1"])]), &path).unwrap();
    let obs = ManualObservation {
        bbox: Some([3.0, 4.0, 10.0, 12.0]),
        ..ManualObservation::new("S7", "j\u{e4}ger")
    };
    let added = add_sign_observation(&path, "L1", &obs).unwrap();

    let rebuilt = build_observations(&manifest(&[("L1", &["ev2"]), ("L2", &[])]), &path).unwrap();
    assert_eq!(rebuilt[0].observed_signs, added.observed_signs);
    assert_eq!(rebuilt[0].evidence_ids, ["ev2"]);
    assert!(fs::read_to_string(&path).unwrap().is_ascii());
}

#[test]
fn prior_readings_ledger_flattens_readings_and_marks_bare_lines() {
    let m: Manifest = serde_json::from_value(json!({
        "corpus": [{
            "label": "Relief A",
            "source_id": "museum",
            "source_item_id": "plate-4",
            "lines": [
                {"line_id": "L1", "prior_readings": [
                    {"reading_id": "r1", "source_id": "pub", "source_item_id": "p1", "page": 7,
                     "reading_type": "transliteration", "text": "nfr", "tokens": ["nfr"]},
                    {"reading_id": "r2", "reading_type": "translation", "notes": "partial"}
                ]},
                {"line_id": "L2"}
            ]
        }]
    }))
    .unwrap();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ledger/prior_readings.jsonl");

    let written = build_prior_readings(&m, &path).unwrap();
    assert_eq!(ledger::load_prior_readings(&path).unwrap(), written);
    assert_eq!(written.len(), 3);

    assert_eq!(written[0].reading_id.as_deref(), Some("r1"));
    assert_eq!(written[0].page, Some(7));
    assert_eq!(written[0].text, "nfr");
    assert_eq!(written[1].notes, "partial");
    assert!(!written[1].is_placeholder());

    let bare = &written[2];
    assert_eq!(bare.line_id, "L2");
    assert!(bare.is_placeholder());
    assert_eq!(bare.reading_type.as_deref(), Some(HANDCOPY_ONLY));
    assert_eq!(bare.reading_id, None);
    assert_eq!(bare.source_id.as_deref(), Some("museum"));
    assert_eq!(bare.source_item_id.as_deref(), Some("plate-4"));

    let raw: Vec<serde_json::Value> = ledger::jsonl::read_jsonl(&path).unwrap();
    assert!(raw[2]["page"].is_null());
}
