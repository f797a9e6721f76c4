use glyph_audit::auto_annotate::{AUTO_CONFIDENCE, AUTO_DESCRIPTION, auto_annotate_line};
use glyph_audit::segment::{SegmentConfig, segment_glyph_clusters};
use image::{DynamicImage, GrayImage, Luma};

fn init_logs() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// White 200x100 page with two dark blocks, the right one taller.
fn two_blocks() -> DynamicImage {
    let img = GrayImage::from_fn(200, 100, |x, y| {
        let left = (20..=50).contains(&x) && (30..=70).contains(&y);
        let right = (120..=160).contains(&x) && (20..=80).contains(&y);
        Luma([if left || right { 10 } else { 245 }])
    });
    DynamicImage::ImageLuma8(img)
}

#[test]
fn two_blocks_give_two_ordered_clusters() {
    init_logs();
    let boxes = segment_glyph_clusters(&two_blocks(), &SegmentConfig::default()).unwrap();
    assert_eq!(boxes.len(), 2, "{boxes:?}");
    assert!(boxes[0].x1 < boxes[1].x1);

    let (left, right) = (boxes[0], boxes[1]);
    assert!(left.x1 <= 20 && left.x2 >= 50 && left.y1 <= 30 && left.y2 >= 70);
    assert!(right.x1 <= 120 && right.x2 >= 160 && right.y1 <= 20 && right.y2 >= 80);
    assert!(left.x2 < right.x1);
    for b in &boxes {
        assert!(b.x1 <= b.x2 && b.y1 <= b.y2);
        assert!(b.x2 < 200 && b.y2 < 100);
    }
}

#[test]
fn blank_page_has_no_clusters() {
    let blank = DynamicImage::ImageLuma8(GrayImage::from_pixel(64, 64, Luma([255])));
    assert!(segment_glyph_clusters(&blank, &SegmentConfig::default()).unwrap().is_empty());
}

#[test]
fn min_area_filters_specks() {
    let specks = DynamicImage::ImageLuma8(GrayImage::from_fn(100, 100, |x, y| {
        Luma([if x % 25 == 0 && y % 25 == 0 { 0 } else { 255 }])
    }));
    let boxes = segment_glyph_clusters(&specks, &SegmentConfig::default()).unwrap();
    assert!(boxes.is_empty(), "{boxes:?}");
}

#[test]
fn auto_annotation_numbers_clusters_from_one() {
    init_logs();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("line.png");
    two_blocks().save(&path).unwrap();

    let signs = auto_annotate_line(&path, "L1", &SegmentConfig::default()).unwrap();
    let ids: Vec<&str> = signs.iter().map(|s| s.sign_id.as_str()).collect();
    assert_eq!(ids, ["auto-L1-1", "auto-L1-2"]);
    for sign in &signs {
        assert!(sign.is_auto());
        assert_eq!(sign.description, AUTO_DESCRIPTION);
        assert_eq!(sign.confidence, Some(AUTO_CONFIDENCE));
        assert!(matches!(sign.bbox_coords(), Some(Ok(_))));
        assert!(sign.crop_path.is_none());
    }
}

#[test]
fn auto_annotation_rejects_bad_config_before_reading() {
    let cfg = SegmentConfig {
        dilation: 2,
        ..SegmentConfig::default()
    };
    let err = auto_annotate_line(std::path::Path::new("does/not/exist.png"), "L1", &cfg);
    assert!(matches!(err, Err(glyph_audit::AuditError::Configuration(_))));
}

#[test]
fn unscaled_rectangles_map_to_exact_boxes() {
    let img = DynamicImage::ImageLuma8(GrayImage::from_fn(80, 40, |x, y| {
        let ink = ((10..20).contains(&x) || (50..60).contains(&x)) && (10..20).contains(&y);
        Luma([if ink { 40 } else { 230 }])
    }));
    let cfg = SegmentConfig {
        threshold: 128,
        scale: 1.0,
        min_area: 0,
        dilation: 1,
        margin: 0,
    };
    let boxes = segment_glyph_clusters(&img, &cfg).unwrap();
    let arrays: Vec<[u32; 4]> = boxes.iter().map(|b| b.as_array()).collect();
    let expected: Vec<[u32; 4]> = vec![[10, 10, 19, 19], [50, 10, 59, 19]];
    assert_eq!(arrays, expected);
}
