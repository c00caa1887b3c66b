extern crate pneumo_detect;

use std::io::Cursor;

use chrono::{Local, TimeZone};
use dicom_core::{DataElement, PrimitiveValue, VR};
use dicom_dictionary_std::{tags, uids};
use dicom_object::{FileDicomObject, FileMetaTableBuilder, InMemDicomObject};
use image::{DynamicImage, GenericImageView, GrayImage, ImageFormat, Luma};

use pneumo_detect::common::Modality;
use pneumo_detect::data::{HistoryLog, HistoryRecord};
use pneumo_detect::pipeline::ImageLoader;
use pneumo_detect::Error;

mod stubs;

fn encoded(image: DynamicImage, format: ImageFormat) -> Vec<u8> {
    let mut bytes = Cursor::new(Vec::new());
    image.write_to(&mut bytes, format).unwrap();
    bytes.into_inner()
}

/// 16-bit MONOCHROME2 slice, 4x4, values `0, 1000, ..., 15000` in row-major order.
fn monochrome_slice() -> FileDicomObject<InMemDicomObject> {
    let values: Vec<u16> = (0..16).map(|i| i * 1000).collect();

    let mut obj = InMemDicomObject::new_empty();
    obj.put(DataElement::new(tags::SOP_CLASS_UID, VR::UI, PrimitiveValue::from(uids::SECONDARY_CAPTURE_IMAGE_STORAGE)));
    obj.put(DataElement::new(tags::SOP_INSTANCE_UID, VR::UI, PrimitiveValue::from("1.2.826.0.1.3680043.2.1143.1")));
    obj.put(DataElement::new(tags::SAMPLES_PER_PIXEL, VR::US, PrimitiveValue::from(1_u16)));
    obj.put(DataElement::new(tags::PHOTOMETRIC_INTERPRETATION, VR::CS, PrimitiveValue::from("MONOCHROME2")));
    obj.put(DataElement::new(tags::ROWS, VR::US, PrimitiveValue::from(4_u16)));
    obj.put(DataElement::new(tags::COLUMNS, VR::US, PrimitiveValue::from(4_u16)));
    obj.put(DataElement::new(tags::BITS_ALLOCATED, VR::US, PrimitiveValue::from(16_u16)));
    obj.put(DataElement::new(tags::BITS_STORED, VR::US, PrimitiveValue::from(16_u16)));
    obj.put(DataElement::new(tags::HIGH_BIT, VR::US, PrimitiveValue::from(15_u16)));
    obj.put(DataElement::new(tags::PIXEL_REPRESENTATION, VR::US, PrimitiveValue::from(0_u16)));
    obj.put(DataElement::new(tags::PIXEL_DATA, VR::OW, PrimitiveValue::U16(values.into())));

    obj.with_meta(
        FileMetaTableBuilder::new()
            .transfer_syntax(uids::EXPLICIT_VR_LITTLE_ENDIAN)
            .media_storage_sop_class_uid(uids::SECONDARY_CAPTURE_IMAGE_STORAGE)
            .media_storage_sop_instance_uid("1.2.826.0.1.3680043.2.1143.1"),
    )
    .unwrap()
}

fn assert_stretched_slice(image: &pneumo_detect::common::XrayImage) {
    assert_eq!(image.modality(), Modality::MedicalVolume);
    assert_eq!(image.dimensions(), (4, 4));
    assert_eq!(image.get_pixel(0, 0).0, [0, 0, 0]);
    assert_eq!(image.get_pixel(3, 3).0, [255, 255, 255]);

    // Row-major ramp stays monotonic after the stretch.
    let ramp: Vec<u8> = image.pixels().map(|p| p.0[0]).collect();
    assert!(ramp.windows(2).all(|w| w[0] < w[1]), "{ramp:?}");
}

#[test]
fn dicom_bytes_load_as_medical_volume() {
    let mut bytes = Vec::new();
    monochrome_slice().write_all(&mut bytes).unwrap();
    assert!(ImageLoader::is_dicom(&bytes));

    let image = ImageLoader::from_bytes(&bytes).unwrap();
    assert_stretched_slice(&image);
}

#[test]
fn dcm_file_loads_as_medical_volume() {
    let path = stubs::temp_path("slice.dcm");
    monochrome_slice().write_to_file(&path).unwrap();

    let image = ImageLoader::from_path(&path);
    std::fs::remove_file(&path).ok();

    assert_stretched_slice(&image.unwrap());
}

#[test]
fn png_bytes_load_as_standard_rgb() {
    let gray = GrayImage::from_fn(37, 21, |x, y| Luma([(x * 5 + y) as u8]));
    let image = ImageLoader::from_bytes(&encoded(DynamicImage::ImageLuma8(gray.clone()), ImageFormat::Png)).unwrap();

    assert_eq!(image.modality(), Modality::Standard);
    assert_eq!(image.dimensions(), (37, 21));
    assert_eq!(image.display().dimensions(), (37, 21));
    // Gray expands to three equal channels.
    let p = image.get_pixel(10, 3);
    assert_eq!(p.0, [gray.get_pixel(10, 3)[0]; 3]);
}

#[test]
fn jpeg_file_round_trips() {
    let path = stubs::temp_path("gray.jpg");
    GrayImage::from_pixel(100, 100, Luma([128])).save(&path).unwrap();

    let image = ImageLoader::from_path(&path).unwrap();
    std::fs::remove_file(&path).ok();

    assert_eq!(image.dimensions(), (100, 100));
    let p = image.get_pixel(50, 50);
    assert!(p.0.iter().all(|&c| (126..=130).contains(&c)));
}

#[test]
fn undecodable_bytes_are_fatal() {
    let err = ImageLoader::from_bytes(b"definitely not an image").unwrap_err();
    assert!(matches!(err, Error::UnsupportedImageFormat(_)));
    assert!(err.is_fatal());
}

#[test]
fn truncated_png_is_rejected() {
    let bytes = encoded(DynamicImage::new_rgb8(16, 16), ImageFormat::Png);
    let err = ImageLoader::from_bytes(&bytes[..bytes.len() / 2]).unwrap_err();
    assert!(err.is_fatal());
}

#[test]
fn missing_file_is_an_io_error() {
    let err = ImageLoader::from_path(stubs::temp_path("nope.png")).unwrap_err();
    assert!(matches!(err, Error::Io(_)));
}

#[test]
fn empty_raster_is_rejected() {
    assert!(ImageLoader::from_dynamic(DynamicImage::new_luma8(0, 0)).is_err());
}

#[test]
fn dicom_magic_is_detected_after_preamble() {
    let mut bytes = vec![0u8; 128];
    bytes.extend_from_slice(b"DICM");
    assert!(ImageLoader::is_dicom(&bytes));
    assert!(!ImageLoader::is_dicom(&bytes[..130]));
    assert!(!ImageLoader::is_dicom(&encoded(DynamicImage::new_rgb8(4, 4), ImageFormat::Png)));
}

#[test]
fn broken_dicom_is_unsupported() {
    let mut bytes = vec![0u8; 128];
    bytes.extend_from_slice(b"DICM");
    bytes.extend_from_slice(&[0xFF; 16]);
    let err = ImageLoader::from_bytes(&bytes).unwrap_err();
    assert!(matches!(err, Error::UnsupportedImageFormat(_)));
}

#[test]
fn slice_rescale_clips_negatives_and_stretches() {
    let values = [-50.0, 0.0, 1000.0, 2000.0];
    let gray = ImageLoader::rescale_slice(&values, 2, 2, 1).unwrap();
    assert_eq!(gray.as_raw(), &vec![0, 0, 127, 255]);
}

#[test]
fn slice_rescale_keeps_first_sample() {
    let values = [10.0, 99.0, 99.0, 20.0, 0.0, 0.0];
    let gray = ImageLoader::rescale_slice(&values, 2, 1, 3).unwrap();
    assert_eq!(gray.as_raw(), &vec![127, 255]);
}

#[test]
fn blank_slice_stays_black() {
    let gray = ImageLoader::rescale_slice(&[-1.0; 6], 3, 2, 1).unwrap();
    assert!(gray.as_raw().iter().all(|&v| v == 0));
}

#[test]
fn degenerate_slices_are_corrupt() {
    assert!(matches!(
        ImageLoader::rescale_slice(&[], 0, 0, 1),
        Err(Error::CorruptOrEmptyImage(_))
    ));
    assert!(matches!(
        ImageLoader::rescale_slice(&[1.0, 2.0], 2, 2, 1),
        Err(Error::CorruptOrEmptyImage(_))
    ));
    assert!(matches!(
        ImageLoader::rescale_slice(&[1.0, f32::INFINITY], 2, 1, 1),
        Err(Error::CorruptOrEmptyImage(_))
    ));
}

#[test]
fn history_line_layout() {
    let record = HistoryRecord {
        timestamp: Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap(),
        case_id: "case-7".to_string(),
        label: "viral".to_string(),
        confidence: 91.234,
        tier: "gradcam".to_string(),
    };
    assert_eq!(record.to_line('-'), "20240309T140507-case_7-viral-91.23%-gradcam");
    assert_eq!(record.to_line(';'), "20240309T140507;case-7;viral;91.23%;gradcam");
}

#[test]
fn history_appends_lines() {
    let path = stubs::temp_path("history.csv");
    std::fs::remove_file(&path).ok();

    let screener = pneumo_detect::screening::Screener::with_engine(stubs::engine_with(stubs::StubNetwork::new(&[
        0.1, 0.8, 0.1,
    ])));
    let report = screener.screen(&stubs::gray_image(32, 32, 70)).unwrap();

    let log = HistoryLog::new(&path);
    log.append(&HistoryRecord::from_report("p1", &report)).unwrap();
    log.append(&HistoryRecord::from_report("p2", &report)).unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    std::fs::remove_file(&path).ok();

    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].ends_with("-p1-normal-80.00%-gradcam"), "{}", lines[0]);
    assert!(lines[1].ends_with("-p2-normal-80.00%-gradcam"), "{}", lines[1]);
}
