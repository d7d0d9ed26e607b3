//! Page image post-processing: trim, contrast enhancement and thumbnails.
//!
//! Each stage writes a sibling file next to its input and reports a
//! [`StageOutcome`]. A failed stage never aborts the pipeline: it reports
//! `Skipped` with the reason and hands the unmodified input path onward.

use crate::errors::ProcessingError;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, ImageFormat, ImageReader, RgbImage};
use serde::{Deserialize, Serialize};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

/// Clip limit of the contrast-limited equalisation, in multiples of the
/// uniform bin height.
const CLAHE_CLIP_LIMIT: f32 = 2.0;
/// Tiles per axis used for local equalisation.
const CLAHE_GRID: u32 = 8;

/// Margins in pixels removed from each edge. Negative values count as zero.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(default)]
pub struct TrimMargins {
    pub top: i64,
    pub bottom: i64,
    pub left: i64,
    pub right: i64,
}

impl TrimMargins {
    pub fn is_zero(&self) -> bool {
        self.top <= 0 && self.bottom <= 0 && self.left <= 0 && self.right <= 0
    }

    /// Crop rectangle `(x, y, width, height)` inside a `width`×`height` image,
    /// or `None` when the margins leave nothing.
    pub fn crop_rect(&self, width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
        let (w, h) = (i64::from(width), i64::from(height));
        let x1 = self.left.max(0);
        let y1 = self.top.max(0);
        let x2 = w - self.right.max(0);
        let y2 = h - self.bottom.max(0);
        if x2 <= x1 || y2 <= y1 {
            return None;
        }
        Some((x1 as u32, y1 as u32, (x2 - x1) as u32, (y2 - y1) as u32))
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StageOutcome {
    Applied { path: PathBuf },
    Skipped { path: PathBuf, reason: String },
}

impl StageOutcome {
    pub fn path(&self) -> &Path {
        match self {
            StageOutcome::Applied { path } | StageOutcome::Skipped { path, .. } => path,
        }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, StageOutcome::Applied { .. })
    }

    fn from_result(stage: &str, input: &Path, res: Result<PathBuf, ProcessingError>) -> Self {
        match res {
            Ok(path) => StageOutcome::Applied { path },
            Err(e) => {
                log::warn!("{stage} skipped for {}: {e}", input.display());
                StageOutcome::Skipped { path: input.to_path_buf(), reason: e.to_string() }
            }
        }
    }
}

pub fn trim(path: &Path, margins: &TrimMargins) -> StageOutcome {
    StageOutcome::from_result("trim", path, try_trim(path, margins))
}

pub fn enhance(path: &Path) -> StageOutcome {
    StageOutcome::from_result("enhance", path, try_enhance(path))
}

pub fn thumbnail(path: &Path, max_w: u32, max_h: u32, quality: u8) -> StageOutcome {
    StageOutcome::from_result("thumbnail", path, try_thumbnail(path, max_w, max_h, quality))
}

#[derive(Debug, Clone, Copy)]
pub struct ThumbnailSpec {
    pub max_width: u32,
    pub max_height: u32,
    pub quality: u8,
}

#[derive(Serialize, Debug, Clone)]
pub struct PipelineResult {
    pub trim: Option<StageOutcome>,
    pub enhance: Option<StageOutcome>,
    pub thumbnail: StageOutcome,
}

impl PipelineResult {
    /// Output of the last trim/enhance stage, or the source when neither ran.
    pub fn processed_path<'a>(&'a self, source: &'a Path) -> &'a Path {
        self.enhance
            .as_ref()
            .or(self.trim.as_ref())
            .map(StageOutcome::path)
            .unwrap_or(source)
    }
}

/// Optional trim, optional enhancement, then a thumbnail of whatever came out.
pub fn process(
    source: &Path,
    margins: Option<&TrimMargins>,
    enhance_image: bool,
    thumb: ThumbnailSpec,
) -> PipelineResult {
    let mut current = source.to_path_buf();

    let trim_outcome = margins.map(|m| trim(&current, m));
    if let Some(outcome) = &trim_outcome {
        current = outcome.path().to_path_buf();
    }

    let enhance_outcome = enhance_image.then(|| enhance(&current));
    if let Some(outcome) = &enhance_outcome {
        current = outcome.path().to_path_buf();
    }

    let thumbnail = thumbnail(&current, thumb.max_width, thumb.max_height, thumb.quality);
    PipelineResult { trim: trim_outcome, enhance: enhance_outcome, thumbnail }
}

fn try_trim(path: &Path, margins: &TrimMargins) -> Result<PathBuf, ProcessingError> {
    let img = load(path)?;
    let (width, height) = (img.width(), img.height());
    let (x, y, w, h) = margins
        .crop_rect(width, height)
        .ok_or(ProcessingError::EmptyCrop { width, height, margins: *margins })?;
    let cropped = img.crop_imm(x, y, w, h);
    let out = sibling_path(path, "trimmed", None);
    save_like_source(&cropped, &out)?;
    log::debug!("trimmed {} to {w}x{h}", path.display());
    Ok(out)
}

fn try_enhance(path: &Path) -> Result<PathBuf, ProcessingError> {
    let img = load(path)?;
    let enhanced = match img {
        DynamicImage::ImageLuma8(gray) => {
            DynamicImage::ImageLuma8(clahe(&gray, CLAHE_CLIP_LIMIT, CLAHE_GRID))
        }
        other => DynamicImage::ImageRgb8(equalize_luma(&other.to_rgb8())),
    };
    let out = sibling_path(path, "enhanced", None);
    save_like_source(&enhanced, &out)?;
    Ok(out)
}

fn try_thumbnail(path: &Path, max_w: u32, max_h: u32, quality: u8) -> Result<PathBuf, ProcessingError> {
    if max_w == 0 || max_h == 0 {
        return Err(ProcessingError::InvalidBounds { max_w, max_h });
    }
    let img = load(path)?;
    let thumb = if img.width() <= max_w && img.height() <= max_h {
        img
    } else {
        img.resize(max_w, max_h, FilterType::Lanczos3)
    };
    let out = sibling_path(path, "thumb", Some("jpg"));
    let file = std::fs::File::create(&out).map_err(|e| ProcessingError::Io { path: out.clone(), source: e })?;
    let encoder = JpegEncoder::new_with_quality(BufWriter::new(file), quality.clamp(1, 100));
    thumb
        .to_rgb8()
        .write_with_encoder(encoder)
        .map_err(|e| ProcessingError::Encode { path: out.clone(), source: e })?;
    Ok(out)
}

fn load(path: &Path) -> Result<DynamicImage, ProcessingError> {
    let reader = ImageReader::open(path)
        .map_err(|e| ProcessingError::Io { path: path.to_path_buf(), source: e })?
        .with_guessed_format()
        .map_err(|e| ProcessingError::Io { path: path.to_path_buf(), source: e })?;
    reader
        .decode()
        .map_err(|e| ProcessingError::Decode { path: path.to_path_buf(), source: e })
}

/// JPEG cannot carry alpha, so anything headed for a .jpg is flattened to RGB.
fn save_like_source(img: &DynamicImage, out: &Path) -> Result<(), ProcessingError> {
    let res = match ImageFormat::from_path(out) {
        Ok(ImageFormat::Jpeg) => img.to_rgb8().save(out),
        _ => img.save(out),
    };
    res.map_err(|e| ProcessingError::Encode { path: out.to_path_buf(), source: e })
}

/// `dir/page.jpg` + "trimmed" -> `dir/page_trimmed.jpg`.
pub fn sibling_path(path: &Path, suffix: &str, ext: Option<&str>) -> PathBuf {
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("image");
    let ext = ext
        .map(str::to_string)
        .or_else(|| path.extension().and_then(|e| e.to_str()).map(str::to_string))
        .unwrap_or_else(|| "jpg".to_string());
    path.with_file_name(format!("{stem}_{suffix}.{ext}"))
}

/// Equalises the luma channel of an RGB image, leaving chroma as it was.
fn equalize_luma(rgb: &RgbImage) -> RgbImage {
    let (w, h) = rgb.dimensions();
    let luma = GrayImage::from_fn(w, h, |x, y| {
        let [r, g, b] = rgb.get_pixel(x, y).0;
        image::Luma([to_u8(0.299 * f32::from(r) + 0.587 * f32::from(g) + 0.114 * f32::from(b))])
    });
    let equalized = clahe(&luma, CLAHE_CLIP_LIMIT, CLAHE_GRID);

    RgbImage::from_fn(w, h, |x, y| {
        let [r, g, b] = rgb.get_pixel(x, y).0;
        let (r, g, b) = (f32::from(r), f32::from(g), f32::from(b));
        let cb = -0.168_736 * r - 0.331_264 * g + 0.5 * b;
        let cr = 0.5 * r - 0.418_688 * g - 0.081_312 * b;
        let y = f32::from(equalized.get_pixel(x, y).0[0]);
        image::Rgb([
            to_u8(y + 1.402 * cr),
            to_u8(y - 0.344_136 * cb - 0.714_136 * cr),
            to_u8(y + 1.772 * cb),
        ])
    })
}

fn to_u8(v: f32) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

/// Contrast-limited adaptive histogram equalisation.
///
/// The image is split into at most `grid`×`grid` tiles. Each tile gets its own
/// clipped histogram mapping; pixels blend the mappings of the four nearest
/// tile centres bilinearly so tile seams do not show.
fn clahe(src: &GrayImage, clip_limit: f32, grid: u32) -> GrayImage {
    let (w, h) = src.dimensions();
    if w == 0 || h == 0 {
        return src.clone();
    }
    let tile_w = w.div_ceil(grid.clamp(1, w));
    let tile_h = h.div_ceil(grid.clamp(1, h));
    let tiles_x = w.div_ceil(tile_w);
    let tiles_y = h.div_ceil(tile_h);

    let mut luts = Vec::with_capacity((tiles_x * tiles_y) as usize);
    for ty in 0..tiles_y {
        for tx in 0..tiles_x {
            let x0 = tx * tile_w;
            let y0 = ty * tile_h;
            let x1 = (x0 + tile_w).min(w);
            let y1 = (y0 + tile_h).min(h);
            let mut hist = [0u32; 256];
            for y in y0..y1 {
                for x in x0..x1 {
                    hist[src.get_pixel(x, y).0[0] as usize] += 1;
                }
            }
            luts.push(tile_lut(hist, (x1 - x0) * (y1 - y0), clip_limit));
        }
    }

    let axis = |pos: u32, size: u32, count: u32| -> (u32, u32, f32) {
        let f = (pos as f32 + 0.5) / size as f32 - 0.5;
        if f <= 0.0 {
            return (0, 0, 0.0);
        }
        let i0 = f.floor() as u32;
        if i0 + 1 >= count {
            return (count - 1, count - 1, 0.0);
        }
        (i0, i0 + 1, f - i0 as f32)
    };

    GrayImage::from_fn(w, h, |x, y| {
        let v = src.get_pixel(x, y).0[0] as usize;
        let (tx0, tx1, ax) = axis(x, tile_w, tiles_x);
        let (ty0, ty1, ay) = axis(y, tile_h, tiles_y);
        let at = |tx: u32, ty: u32| f32::from(luts[(ty * tiles_x + tx) as usize][v]);
        let top = at(tx0, ty0) * (1.0 - ax) + at(tx1, ty0) * ax;
        let bottom = at(tx0, ty1) * (1.0 - ax) + at(tx1, ty1) * ax;
        image::Luma([to_u8(top * (1.0 - ay) + bottom * ay)])
    })
}

fn tile_lut(mut hist: [u32; 256], area: u32, clip_limit: f32) -> [u8; 256] {
    let limit = ((clip_limit * area as f32 / 256.0) as u32).max(1);
    let mut excess = 0u32;
    for bin in hist.iter_mut() {
        if *bin > limit {
            excess += *bin - limit;
            *bin = limit;
        }
    }
    let share = excess / 256;
    let mut residual = (excess % 256) as usize;
    for bin in hist.iter_mut() {
        *bin += share;
    }
    if residual > 0 {
        let step = (256 / residual).max(1);
        let mut i = 0;
        while i < 256 && residual > 0 {
            hist[i] += 1;
            residual -= 1;
            i += step;
        }
    }

    let mut lut = [0u8; 256];
    let mut cdf = 0u32;
    let scale = 255.0 / area as f32;
    for (i, count) in hist.iter().enumerate() {
        cdf += count;
        lut[i] = to_u8(cdf as f32 * scale);
    }
    lut
}
