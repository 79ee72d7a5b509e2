//
// dicom_workflows.rs
// Dicom-Harmonize
//
// Integration-style tests covering vendor resolution, pixel normalization, protocol export, transforms and batch runs on real DICOM files.
//
// Thales Matheus Mendonça Santos - November 2025

use std::path::{Path, PathBuf};

use dicom::core::{DataElement, PrimitiveValue, Tag, VR};
use dicom::dictionary_std::StandardDataDictionary;
use dicom::object::{FileDicomObject, FileMetaTableBuilder, InMemDicomObject};
use dicom::transfer_syntax::entries::EXPLICIT_VR_LITTLE_ENDIAN;
use dicom_harmonize::batch::{self, BatchTask};
use dicom_harmonize::image::PngVisualizer;
use dicom_harmonize::protocol::{self, ParameterValue};
use dicom_harmonize::{
    stats, ExportFormat, ProcessingError, ProcessingSession, SessionConfig, WindowSettings,
};
use tempfile::tempdir;

type Object = InMemDicomObject<StandardDataDictionary>;

fn put(obj: &mut Object, tag: Tag, vr: VR, value: PrimitiveValue) {
    obj.put(DataElement::new(tag, vr, value));
}

/// Tiny 2x2 8-bit Secondary Capture with rescale -1024/2 and the given manufacturer.
fn write_test_dicom(path: &Path, manufacturer: &str, extra: impl FnOnce(&mut Object)) {
    let mut obj = InMemDicomObject::new_empty_with_dict(StandardDataDictionary);
    put(&mut obj, Tag(0x0010, 0x0010), VR::PN, PrimitiveValue::from("Test^Patient"));
    put(&mut obj, Tag(0x0010, 0x0020), VR::LO, PrimitiveValue::from("PAT123"));
    put(&mut obj, Tag(0x0008, 0x0060), VR::CS, PrimitiveValue::from("OT"));
    put(&mut obj, Tag(0x0008, 0x0020), VR::DA, PrimitiveValue::from("20240101"));
    put(&mut obj, Tag(0x0008, 0x0070), VR::LO, PrimitiveValue::from(manufacturer));
    put(
        &mut obj,
        Tag(0x0008, 0x0016),
        VR::UI,
        PrimitiveValue::from("1.2.840.10008.5.1.4.1.1.7"),
    );
    put(
        &mut obj,
        Tag(0x0008, 0x0018),
        VR::UI,
        PrimitiveValue::from("1.2.826.0.1.3680043.2.1125.1"),
    );

    put(&mut obj, Tag(0x0028, 0x0010), VR::US, PrimitiveValue::from(2_u16)); // Rows
    put(&mut obj, Tag(0x0028, 0x0011), VR::US, PrimitiveValue::from(2_u16)); // Columns
    put(&mut obj, Tag(0x0028, 0x0002), VR::US, PrimitiveValue::from(1_u16)); // Samples per pixel
    put(&mut obj, Tag(0x0028, 0x0100), VR::US, PrimitiveValue::from(8_u16)); // Bits Allocated
    put(&mut obj, Tag(0x0028, 0x0101), VR::US, PrimitiveValue::from(8_u16)); // Bits Stored
    put(&mut obj, Tag(0x0028, 0x0102), VR::US, PrimitiveValue::from(7_u16)); // High Bit
    put(&mut obj, Tag(0x0028, 0x0103), VR::US, PrimitiveValue::from(0_u16)); // Pixel Representation
    put(&mut obj, Tag(0x0028, 0x0004), VR::CS, PrimitiveValue::from("MONOCHROME2"));
    put(&mut obj, Tag(0x0028, 0x1052), VR::DS, PrimitiveValue::from("-1024")); // Rescale Intercept
    put(&mut obj, Tag(0x0028, 0x1053), VR::DS, PrimitiveValue::from("2")); // Rescale Slope
    put(
        &mut obj,
        Tag(0x7fe0, 0x0010),
        VR::OB,
        PrimitiveValue::from(vec![0_u8, 64, 128, 255]),
    );

    extra(&mut obj);

    let meta = FileMetaTableBuilder::new()
        .transfer_syntax(EXPLICIT_VR_LITTLE_ENDIAN.uid())
        .media_storage_sop_class_uid("1.2.840.10008.5.1.4.1.1.7")
        .media_storage_sop_instance_uid("1.2.826.0.1.3680043.2.1125.1")
        .build()
        .expect("meta");

    let mut file_obj = FileDicomObject::new_empty_with_dict_and_meta(StandardDataDictionary, meta);
    for elem in obj {
        file_obj.put(elem);
    }
    file_obj.write_to_file(path).expect("write test dicom");
}

fn ge_file(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    write_test_dicom(&path, "GE MEDICAL SYSTEMS", |obj| {
        put(obj, Tag(0x0018, 0x1030), VR::LO, PrimitiveValue::from("BRAIN ROUTINE"));
        put(obj, Tag(0x0019, 0x109C), VR::LO, PrimitiveValue::from("epi2"));
    });
    path
}

fn garbage_file(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, b"definitely not a DICOM file").expect("write garbage");
    path
}

fn float_values(session: &ProcessingSession) -> Vec<f32> {
    session
        .pixel_data()
        .and_then(|p| p.as_float())
        .expect("float pixels")
        .iter()
        .copied()
        .collect()
}

#[test]
fn ge_file_resolves_and_normalizes() {
    let dir = tempdir().expect("tempdir");
    let path = ge_file(dir.path(), "ge.dcm");

    let mut session = ProcessingSession::default();
    session.load(&path).expect("load");

    assert_eq!(session.adapter_name(), Some("GE"));
    assert_eq!(float_values(&session), vec![-1024.0, -896.0, -768.0, -514.0]);

    let protocol = session.protocol().expect("protocol");
    let value = |name: &str| protocol.get(name).map(|p| p.value.clone());
    assert_eq!(value("Vendor"), Some(ParameterValue::Text("GE".into())));
    assert_eq!(value("PatientID"), Some(ParameterValue::Text("PAT123".into())));
    assert_eq!(value("StudyDate"), Some(ParameterValue::Text("2024-01-01".into())));
    assert_eq!(value("Modality"), Some(ParameterValue::Text("OT".into())));
    assert_eq!(value("ProtocolName"), Some(ParameterValue::Text("BRAIN ROUTINE".into())));
    assert_eq!(value("PulseSequenceName"), Some(ParameterValue::Text("epi2".into())));
    assert_eq!(value("Rows"), Some(ParameterValue::Number(2.0)));
    assert!(!protocol.contains("EchoTime"));
}

#[test]
fn protocol_export_round_trips_in_both_formats() {
    let dir = tempdir().expect("tempdir");
    let path = ge_file(dir.path(), "ge.dcm");
    let mut session = ProcessingSession::default();
    session.load(&path).expect("load");

    for format in [ExportFormat::Json, ExportFormat::Xml] {
        let document = session.get_protocol_info(format).expect("export");
        let parsed = protocol::deserialize(&document, format).expect("parse back");
        assert_eq!(Some(&parsed), session.protocol(), "{format} round trip");
    }
}

#[test]
fn unparsable_file_fails_and_nothing_is_loaded() {
    let dir = tempdir().expect("tempdir");
    let path = garbage_file(dir.path(), "broken.dcm");

    let mut session = ProcessingSession::default();
    assert!(matches!(
        session.load(&path),
        Err(ProcessingError::InvalidDicom { .. })
    ));
    assert!(matches!(
        session.get_protocol_info(ExportFormat::Json),
        Err(ProcessingError::NotLoaded)
    ));
}

#[test]
fn failed_load_keeps_the_previous_dataset() {
    let dir = tempdir().expect("tempdir");
    let good = ge_file(dir.path(), "ge.dcm");
    let broken = garbage_file(dir.path(), "broken.dcm");

    let mut session = ProcessingSession::default();
    session.load(&good).expect("load");
    assert!(session.load(&broken).is_err());

    assert_eq!(session.source(), Some(good.display().to_string().as_str()));
    assert_eq!(session.adapter_name(), Some("GE"));
    assert!(session.get_protocol_info(ExportFormat::Xml).is_ok());
}

#[test]
fn unknown_manufacturer_needs_the_fallback() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("hitachi.dcm");
    write_test_dicom(&path, "Hitachi", |_| {});

    let mut strict = ProcessingSession::default();
    match strict.load(&path) {
        Err(ProcessingError::UnsupportedVendor { manufacturer }) => {
            assert_eq!(manufacturer.as_deref(), Some("Hitachi"));
        }
        other => panic!("expected UnsupportedVendor, got {other:?}"),
    }

    let mut lenient = ProcessingSession::new(SessionConfig {
        fallback_adapter: true,
        ..SessionConfig::default()
    });
    lenient.load(&path).expect("load with fallback");
    assert_eq!(lenient.adapter_name(), Some("Generic"));
}

#[test]
fn philips_private_scale_is_divided_out() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("philips.dcm");
    write_test_dicom(&path, "Philips Medical Systems", |obj| {
        put(obj, Tag(0x2005, 0x100E), VR::FL, PrimitiveValue::from(4.0_f32));
    });

    let mut session = ProcessingSession::default();
    session.load(&path).expect("load");
    assert_eq!(session.adapter_name(), Some("Philips"));
    // (stored * 2 - 1024) / (2 * 4)
    assert_eq!(float_values(&session), vec![-128.0, -112.0, -96.0, -64.25]);
    assert_eq!(
        session.protocol().and_then(|p| p.get("ScaleSlope")).map(|p| p.value.clone()),
        Some(ParameterValue::Number(4.0))
    );
}

#[test]
fn monochrome1_is_inverted() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("siemens.dcm");
    write_test_dicom(&path, "SIEMENS", |obj| {
        put(obj, Tag(0x0028, 0x0004), VR::CS, PrimitiveValue::from("MONOCHROME1"));
        put(obj, Tag(0x0028, 0x1052), VR::DS, PrimitiveValue::from("0"));
        put(obj, Tag(0x0028, 0x1053), VR::DS, PrimitiveValue::from("1"));
    });

    let mut session = ProcessingSession::default();
    session.load(&path).expect("load");
    assert_eq!(session.adapter_name(), Some("Siemens"));
    assert_eq!(float_values(&session), vec![255.0, 191.0, 127.0, 0.0]);
}

#[test]
fn signed_12_bit_pixels_are_sign_extended_from_a_real_file() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("signed.dcm");
    // 0x0FFF is -1 in 12 bits with the upper nibble left clear; 0xF830 is -2000 already extended.
    let words: [u16; 4] = [0x0FFF, 0xF830, 100, 2047];
    let bytes: Vec<u8> = words.iter().flat_map(|w| w.to_le_bytes()).collect();
    write_test_dicom(&path, "SIEMENS", |obj| {
        put(obj, Tag(0x0028, 0x0100), VR::US, PrimitiveValue::from(16_u16));
        put(obj, Tag(0x0028, 0x0101), VR::US, PrimitiveValue::from(12_u16));
        put(obj, Tag(0x0028, 0x0102), VR::US, PrimitiveValue::from(11_u16));
        put(obj, Tag(0x0028, 0x0103), VR::US, PrimitiveValue::from(1_u16));
        put(obj, Tag(0x0028, 0x1052), VR::DS, PrimitiveValue::from("0"));
        put(obj, Tag(0x0028, 0x1053), VR::DS, PrimitiveValue::from("1"));
        put(obj, Tag(0x7fe0, 0x0010), VR::OW, PrimitiveValue::from(bytes));
    });

    let mut session = ProcessingSession::default();
    session.load(&path).expect("load");
    assert_eq!(float_values(&session), vec![-1.0, -2000.0, 100.0, 2047.0]);
}

#[test]
fn ge_padding_value_takes_the_minimum_of_the_real_pixels() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("ge_padded.dcm");
    write_test_dicom(&path, "GE MEDICAL SYSTEMS", |obj| {
        put(obj, Tag(0x0028, 0x0120), VR::US, PrimitiveValue::from(0_u16));
    });

    let mut session = ProcessingSession::default();
    session.load(&path).expect("load");
    assert_eq!(session.adapter_name(), Some("GE"));
    // Stored 0 is padding; the rest rescale to -896, -768, -514.
    assert_eq!(float_values(&session), vec![-896.0, -896.0, -768.0, -514.0]);
}

#[test]
fn window_is_deterministic_and_leaves_the_cache_alone() {
    let dir = tempdir().expect("tempdir");
    let path = ge_file(dir.path(), "ge.dcm");
    let mut session = ProcessingSession::default();
    session.load(&path).expect("load");

    let first = session.adjust_window(600.0, -800.0).expect("window");
    let second = session.adjust_window(600.0, -800.0).expect("window");
    assert_eq!(first, second);
    let values: Vec<u8> = first.as_u8().expect("u8 output").iter().copied().collect();
    assert_eq!(values, vec![32, 87, 141, 249]);
    assert_eq!(float_values(&session), vec![-1024.0, -896.0, -768.0, -514.0]);
}

#[test]
fn segmentation_and_visualization_on_a_loaded_file() {
    let dir = tempdir().expect("tempdir");
    let path = ge_file(dir.path(), "ge.dcm");
    let mut session = ProcessingSession::default();
    session.load(&path).expect("load");

    let masks = session.segment_gray_white_matter().expect("segment");
    assert_eq!(masks.gray_matter.shape(), &[2, 2]);
    assert_eq!(masks.overlap_count(), 0);

    let out = dir.path().join("png");
    session
        .visualize_results(&PngVisualizer::new(&out, "ge"))
        .expect("visualize");
    assert!(out.join("ge_original.png").exists());
    assert!(out.join("ge_segmentation.png").exists());
}

#[test]
fn stats_and_histogram_use_normalized_pixels() {
    let dir = tempdir().expect("tempdir");
    let path = ge_file(dir.path(), "ge.dcm");
    let mut session = ProcessingSession::default();
    session.load(&path).expect("load");
    let pixels = session.pixel_data().expect("pixels");

    let summary = stats::pixel_statistics(pixels);
    assert_eq!(summary.total_pixels, 4);
    assert!((summary.min - -1024.0).abs() < f32::EPSILON);
    assert!((summary.max - -514.0).abs() < f32::EPSILON);
    assert!((summary.mean - -800.5).abs() < 0.1);

    let histogram = stats::histogram_for_buffer(pixels, 8);
    assert_eq!(histogram.bins.iter().sum::<u64>(), 4);
}

#[test]
fn batch_keeps_going_past_broken_files() {
    let dir = tempdir().expect("tempdir");
    let input = dir.path().join("in");
    std::fs::create_dir_all(input.join("nested")).expect("mkdir");
    ge_file(&input, "a.dcm");
    ge_file(&input.join("nested"), "b.dcm");
    garbage_file(&input, "c.dcm");
    std::fs::write(input.join("notes.txt"), "ignored").expect("write txt");

    let output = dir.path().join("out");
    let summary = batch::process_directory(
        &input,
        &output,
        BatchTask::Protocol(ExportFormat::Json),
        &SessionConfig::default(),
    )
    .expect("batch");

    assert_eq!(summary.processed, 2);
    assert_eq!(summary.failed.len(), 1);
    assert!(summary.failed[0].path.ends_with("c.dcm"));
    assert!(output.join("a.json").exists());
    assert!(output.join("nested").join("b.json").exists());

    let windowed = dir.path().join("windowed");
    let summary = batch::process_directory(
        &input,
        &windowed,
        BatchTask::Window(WindowSettings::new(400.0, 40.0)),
        &SessionConfig::default(),
    )
    .expect("batch");
    assert_eq!(summary.total(), 3);
    assert!(windowed.join("a_windowed.png").exists());
}

#[test]
fn same_named_files_in_different_folders_keep_separate_outputs() {
    let dir = tempdir().expect("tempdir");
    let input = dir.path().join("in");
    for series in ["series1", "series2"] {
        std::fs::create_dir_all(input.join(series)).expect("mkdir");
    }
    ge_file(&input.join("series1"), "IM0001.dcm");
    let second = input.join("series2").join("IM0001.dcm");
    write_test_dicom(&second, "SIEMENS", |_| {});

    let output = dir.path().join("out");
    let summary = batch::process_directory(
        &input,
        &output,
        BatchTask::Protocol(ExportFormat::Json),
        &SessionConfig::default(),
    )
    .expect("batch");
    assert_eq!(summary.processed, 2);

    let vendor_of = |series: &str| {
        let document = std::fs::read_to_string(output.join(series).join("IM0001.json"))
            .expect("protocol written");
        let parsed = protocol::deserialize(&document, ExportFormat::Json).expect("parse");
        parsed.get("Vendor").map(|p| p.value.clone())
    };
    assert_eq!(vendor_of("series1"), Some(ParameterValue::Text("GE".into())));
    assert_eq!(vendor_of("series2"), Some(ParameterValue::Text("Siemens".into())));
    assert!(!output.join("IM0001.json").exists());
}
