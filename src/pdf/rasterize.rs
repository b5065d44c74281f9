//! Page-to-image conversion using lopdf.
//!
//! Scanned pages carry their pixels as an image XObject; the default
//! rasterizer pulls that image straight out of the page instead of rendering
//! PDF content. JPEG (DCTDecode), embedded image files (TIFF/PNG behind
//! FlateDecode) and raw pixel streams are all handled.

use image::DynamicImage;
use lopdf::{Document, Object, ObjectId};

use crate::batch::PipelineError;

/// Converts one PDF page into a page image for OCR.
///
/// `dpi` is part of the contract for implementations that synthesize pixels
/// from vector content; the embedded-scan implementation returns the scan at
/// its stored resolution and ignores it.
pub trait PageRasterizer: Send + Sync {
    fn rasterize(
        &self,
        doc: &Document,
        page_index: usize,
        dpi: u32,
    ) -> Result<DynamicImage, PipelineError>;
}

/// Default rasterizer: extract the largest image XObject on the page.
///
/// On a scanned page the largest image is the page scan itself; smaller
/// XObjects (stamps, logos) are skipped by size.
pub struct EmbeddedScanRasterizer;

impl PageRasterizer for EmbeddedScanRasterizer {
    fn rasterize(
        &self,
        doc: &Document,
        page_index: usize,
        _dpi: u32,
    ) -> Result<DynamicImage, PipelineError> {
        let page_ids: Vec<ObjectId> = doc.page_iter().collect();
        let &page_id = page_ids.get(page_index).ok_or_else(|| {
            PipelineError::Rasterize(format!(
                "page {} not found (document has {} pages)",
                page_index + 1,
                page_ids.len()
            ))
        })?;

        let img = largest_page_image(doc, page_id)?;

        tracing::debug!(
            page = page_index + 1,
            width = img.width(),
            height = img.height(),
            "extracted page scan"
        );
        Ok(img)
    }
}

/// Walk page dict → /Resources → /XObject and decode the largest
/// /Subtype /Image stream. Candidates are compared by stored stream length,
/// so only the winner is ever decoded.
fn largest_page_image(doc: &Document, page_id: ObjectId) -> Result<DynamicImage, PipelineError> {
    let page_dict = doc
        .get_object(page_id)
        .and_then(Object::as_dict)
        .map_err(|e| PipelineError::Rasterize(format!("bad page object: {e}")))?;

    let resources = resolve_dict_entry(doc, page_dict, b"Resources")?;
    let xobjects = resolve_dict_entry(doc, resources, b"XObject")?;

    let mut largest: Option<&lopdf::Stream> = None;
    for (_name, obj_ref) in xobjects.iter() {
        let xobj = match obj_ref {
            Object::Reference(id) => match doc.get_object(*id) {
                Ok(obj) => obj,
                Err(_) => continue,
            },
            other => other,
        };
        let stream = match xobj {
            Object::Stream(ref s) => s,
            _ => continue,
        };
        if !is_image_subtype(&stream.dict) {
            continue;
        }
        if largest.map_or(true, |prev| stream.content.len() > prev.content.len()) {
            largest = Some(stream);
        }
    }

    let stream =
        largest.ok_or_else(|| PipelineError::Rasterize("no scan image on page".into()))?;
    decode_image_stream(doc, stream)
}

fn is_image_subtype(dict: &lopdf::Dictionary) -> bool {
    dict.get(b"Subtype")
        .map(|obj| matches!(obj, Object::Name(ref n) if n == b"Image"))
        .unwrap_or(false)
}

/// Decode a /Subtype /Image stream: JPEG (DCTDecode) and embedded image
/// files (TIFF/PNG behind FlateDecode) go through `image`'s format sniffing;
/// anything it cannot read is treated as a raw pixel stream.
fn decode_image_stream(
    doc: &Document,
    stream: &lopdf::Stream,
) -> Result<DynamicImage, PipelineError> {
    let content = stream
        .decompressed_content()
        .unwrap_or_else(|_| stream.content.clone());

    match image::load_from_memory(&content) {
        Ok(img) => Ok(img),
        Err(_) => reconstruct_raw_pixels(doc, &stream.dict, &content),
    }
}

/// Rebuild an image from a raw pixel stream using /Width, /Height,
/// /BitsPerComponent and /ColorSpace.
fn reconstruct_raw_pixels(
    doc: &Document,
    dict: &lopdf::Dictionary,
    raw: &[u8],
) -> Result<DynamicImage, PipelineError> {
    let width = get_int(dict, b"Width")? as u32;
    let height = get_int(dict, b"Height")? as u32;
    let bpc = get_int(dict, b"BitsPerComponent").unwrap_or(8) as u32;
    let channels = color_channels(doc, dict);

    let expected = (width * height * channels * bpc / 8) as usize;
    if raw.len() < expected {
        return Err(PipelineError::Rasterize(format!(
            "raw pixel stream too small: {} bytes, expected {expected}",
            raw.len()
        )));
    }

    match channels {
        1 => image::GrayImage::from_raw(width, height, raw.to_vec())
            .map(DynamicImage::ImageLuma8),
        3 => image::RgbImage::from_raw(width, height, raw.to_vec()).map(DynamicImage::ImageRgb8),
        // CMYK treated as 4-channel; OCR does not care about color fidelity.
        4 => image::RgbaImage::from_raw(width, height, raw.to_vec()).map(DynamicImage::ImageRgba8),
        n => {
            return Err(PipelineError::Rasterize(format!(
                "unsupported channel count: {n}"
            )))
        }
    }
    .ok_or_else(|| PipelineError::Rasterize("raw pixel buffer shape mismatch".into()))
}

/// Channel count from /ColorSpace; defaults to RGB when unrecognized.
fn color_channels(doc: &Document, dict: &lopdf::Dictionary) -> u32 {
    let cs = match dict.get(b"ColorSpace") {
        Ok(obj) => resolve_object(doc, obj),
        Err(_) => return 3,
    };
    match cs {
        Object::Name(ref n) => match n.as_slice() {
            b"DeviceGray" => 1,
            b"DeviceRGB" => 3,
            b"DeviceCMYK" => 4,
            _ => 3,
        },
        Object::Array(ref arr) if !arr.is_empty() => match &arr[0] {
            Object::Name(ref n) if n == b"ICCBased" => {
                if let Some(Object::Reference(id)) = arr.get(1) {
                    if let Ok(Object::Stream(ref s)) = doc.get_object(*id) {
                        return get_int(&s.dict, b"N").unwrap_or(3) as u32;
                    }
                }
                3
            }
            Object::Name(ref n) if n == b"Indexed" => 1,
            _ => 3,
        },
        _ => 3,
    }
}

fn resolve_object<'a>(doc: &'a Document, obj: &'a Object) -> &'a Object {
    match obj {
        Object::Reference(id) => doc.get_object(*id).unwrap_or(obj),
        _ => obj,
    }
}

fn resolve_dict_entry<'a>(
    doc: &'a Document,
    dict: &'a lopdf::Dictionary,
    key: &[u8],
) -> Result<&'a lopdf::Dictionary, PipelineError> {
    let obj = dict.get(key).map_err(|_| {
        PipelineError::Rasterize(format!("missing /{}", String::from_utf8_lossy(key)))
    })?;
    resolve_object(doc, obj).as_dict().map_err(|_| {
        PipelineError::Rasterize(format!("/{} is not a dictionary", String::from_utf8_lossy(key)))
    })
}

fn get_int(dict: &lopdf::Dictionary, key: &[u8]) -> Result<i64, PipelineError> {
    dict.get(key)
        .and_then(Object::as_i64)
        .map_err(|_| {
            PipelineError::Rasterize(format!(
                "missing or non-integer /{}",
                String::from_utf8_lossy(key)
            ))
        })
}
