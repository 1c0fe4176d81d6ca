#![allow(dead_code)]

use exif::experimental::Writer;
use exif::{Field, In, Rational, Tag, Value};
use geophoto::error::RecognitionError;
use geophoto::exif_parser::TagMapping;
use geophoto::preprocess::Preprocessor;
use geophoto::recognition::{EngineKind, TextRecognizer};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// A recognition engine that replays a fixed answer and counts its calls.
pub struct FakeEngine {
    kind: EngineKind,
    name: &'static str,
    answer: Result<Vec<String>, String>,
    calls: AtomicUsize,
    seen: Mutex<Vec<Vec<u8>>>,
}

impl FakeEngine {
    pub fn reading(kind: EngineKind, blocks: &[&str]) -> Self {
        Self::with_answer(kind, Ok(blocks.iter().map(|b| b.to_string()).collect()))
    }

    pub fn failing(kind: EngineKind, reason: &str) -> Self {
        Self::with_answer(kind, Err(reason.to_string()))
    }

    fn with_answer(kind: EngineKind, answer: Result<Vec<String>, String>) -> Self {
        FakeEngine {
            kind,
            name: match kind {
                EngineKind::Local => "fake-local",
                EngineKind::Remote => "fake-remote",
            },
            answer,
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn seen(&self) -> Vec<Vec<u8>> {
        self.seen.lock().unwrap().clone()
    }
}

impl TextRecognizer for FakeEngine {
    fn kind(&self) -> EngineKind {
        self.kind
    }

    fn name(&self) -> &str {
        self.name
    }

    fn recognize(&self, image: &[u8]) -> Result<Vec<String>, RecognitionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(image.to_vec());
        self.answer.clone().map_err(RecognitionError::Api)
    }
}

/// Replaces the image with fixed bytes, or fails.
pub struct FakePreprocessor(pub Option<&'static [u8]>);

impl Preprocessor for FakePreprocessor {
    fn prepare(&self, _name: &str, _image: &[u8]) -> anyhow::Result<Option<Vec<u8>>> {
        match self.0 {
            Some(bytes) => Ok(Some(bytes.to_vec())),
            None => anyhow::bail!("cannot decode"),
        }
    }
}

pub fn mapping() -> TagMapping {
    [("date", "DateTimeOriginal"), ("lat", "GPSLatitude"), ("lon", "GPSLongitude")]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn rationals(parts: [(u32, u32); 3]) -> Value {
    Value::Rational(parts.iter().map(|&(num, denom)| Rational { num, denom }).collect())
}

fn ascii(text: &str) -> Value {
    Value::Ascii(vec![text.as_bytes().to_vec()])
}

/// A small JPEG whose APP1 segment carries the given GPS tags.
pub fn jpeg_with_gps(lat: (&str, [(u32, u32); 3]), lon: (&str, [(u32, u32); 3])) -> Vec<u8> {
    let fields = vec![
        Field {
            tag: Tag::DateTimeOriginal,
            ifd_num: In::PRIMARY,
            value: ascii("2024:03:12 09:15:00"),
        },
        Field {
            tag: Tag::GPSLatitudeRef,
            ifd_num: In::PRIMARY,
            value: ascii(lat.0),
        },
        Field {
            tag: Tag::GPSLatitude,
            ifd_num: In::PRIMARY,
            value: rationals(lat.1),
        },
        Field {
            tag: Tag::GPSLongitudeRef,
            ifd_num: In::PRIMARY,
            value: ascii(lon.0),
        },
        Field {
            tag: Tag::GPSLongitude,
            ifd_num: In::PRIMARY,
            value: rationals(lon.1),
        },
    ];
    let mut writer = Writer::new();
    for field in &fields {
        writer.push_field(field);
    }
    let mut tiff = Cursor::new(Vec::new());
    writer.write(&mut tiff, false).unwrap();
    let tiff = tiff.into_inner();

    let plain = plain_jpeg();
    let mut out = vec![0xFF, 0xD8, 0xFF, 0xE1];
    out.extend_from_slice(&((2 + 6 + tiff.len()) as u16).to_be_bytes());
    out.extend_from_slice(b"Exif\0\0");
    out.extend_from_slice(&tiff);
    out.extend_from_slice(&plain[2..]);
    out
}

/// A small JPEG without metadata.
pub fn plain_jpeg() -> Vec<u8> {
    let mut buf = Vec::new();
    DynamicImage::ImageRgb8(RgbImage::from_pixel(8, 8, Rgb([200, 200, 200])))
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Jpeg)
        .unwrap();
    buf
}
