//! AVIF input via `avif-parse` (container) + `rav1d` (AV1 decode).
//!
//! The `image` crate's `"avif"` feature only ships the rav1e encoder; its
//! decoder needs the C `dav1d` library. `rav1d` is the pure-Rust port, used
//! here through its C-compatible API. Only the primary item's colour planes
//! are decoded: an AVIF alpha item is ignored, so AVIF input always gets the
//! placeholder mask.

use image::RgbImage;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AvifError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("AVIF container error: {0}")]
    Container(String),
    #[error("AV1 decode error: {0}")]
    Decoder(String),
}

impl From<AvifError> for image::ImageError {
    fn from(err: AvifError) -> Self {
        match err {
            AvifError::Io(e) => image::ImageError::IoError(e),
            other => image::ImageError::Decoding(image::error::DecodingError::new(
                image::error::ImageFormatHint::Exact(image::ImageFormat::Avif),
                other,
            )),
        }
    }
}

/// Primary image size from the container, without decoding.
pub fn avif_dimensions(path: &Path) -> Result<(u32, u32), AvifError> {
    let file_data = std::fs::read(path)?;
    let avif = avif_parse::read_avif(&mut std::io::Cursor::new(&file_data))
        .map_err(|e| AvifError::Container(format!("{e:?}")))?;
    let meta = avif
        .primary_item_metadata()
        .map_err(|e| AvifError::Container(format!("{e:?}")))?;
    Ok((meta.max_frame_width.get(), meta.max_frame_height.get()))
}

/// Decode the primary item of an AVIF file to 8-bit RGB.
pub fn decode_avif(path: &Path) -> Result<RgbImage, AvifError> {
    use rav1d::include::dav1d::data::Dav1dData;
    use rav1d::include::dav1d::dav1d::Dav1dSettings;
    use rav1d::include::dav1d::picture::Dav1dPicture;
    use rav1d::src::lib as dav1d;
    use std::ptr::NonNull;

    let file_data = std::fs::read(path)?;
    let avif = avif_parse::read_avif(&mut std::io::Cursor::new(&file_data))
        .map_err(|e| AvifError::Container(format!("{e:?}")))?;
    let av1_bytes: &[u8] = &avif.primary_item;

    let mut settings = std::mem::MaybeUninit::<Dav1dSettings>::uninit();
    let settings_ptr = NonNull::new(settings.as_mut_ptr())
        .ok_or_else(|| AvifError::Decoder("settings allocation failed".into()))?;
    unsafe { dav1d::dav1d_default_settings(settings_ptr) };
    let mut settings = unsafe { settings.assume_init() };
    settings.n_threads = 1;
    settings.max_frame_delay = 1;

    let mut ctx = None;
    let rc = unsafe { dav1d::dav1d_open(NonNull::new(&mut ctx), NonNull::new(&mut settings)) };
    if rc.0 != 0 {
        return Err(AvifError::Decoder(format!("open failed ({})", rc.0)));
    }

    // Everything between open and close; the context is closed on every path.
    let decoded = (|| -> Result<RgbImage, AvifError> {
        let mut data = Dav1dData::default();
        let buf_ptr = unsafe { dav1d::dav1d_data_create(NonNull::new(&mut data), av1_bytes.len()) };
        if buf_ptr.is_null() {
            return Err(AvifError::Decoder("data_create failed".into()));
        }
        unsafe { std::ptr::copy_nonoverlapping(av1_bytes.as_ptr(), buf_ptr, av1_bytes.len()) };

        let rc = unsafe { dav1d::dav1d_send_data(ctx, NonNull::new(&mut data)) };
        if rc.0 != 0 {
            unsafe { dav1d::dav1d_data_unref(NonNull::new(&mut data)) };
            return Err(AvifError::Decoder(format!("send_data failed ({})", rc.0)));
        }

        let mut pic: Dav1dPicture = unsafe { std::mem::zeroed() };
        let rc = unsafe { dav1d::dav1d_get_picture(ctx, NonNull::new(&mut pic)) };
        if rc.0 != 0 {
            return Err(AvifError::Decoder(format!("get_picture failed ({})", rc.0)));
        }
        let rgb = picture_to_rgb(&pic);
        unsafe { dav1d::dav1d_picture_unref(NonNull::new(&mut pic)) };
        rgb
    })();

    unsafe { dav1d::dav1d_close(NonNull::new(&mut ctx)) };
    decoded
}

fn picture_to_rgb(
    pic: &rav1d::include::dav1d::picture::Dav1dPicture,
) -> Result<RgbImage, AvifError> {
    use rav1d::include::dav1d::headers::{
        DAV1D_PIXEL_LAYOUT_I400, DAV1D_PIXEL_LAYOUT_I420, DAV1D_PIXEL_LAYOUT_I422,
        DAV1D_PIXEL_LAYOUT_I444,
    };

    let width = pic.p.w as u32;
    let height = pic.p.h as u32;
    let bpc = pic.p.bpc as u32;
    let layout = pic.p.layout;
    let plane = |i: usize| {
        pic.data[i]
            .map(|p| p.as_ptr() as *const u8)
            .ok_or_else(|| AvifError::Decoder(format!("missing plane {i}")))
    };
    let y_ptr = plane(0)?;

    let planes = if layout == DAV1D_PIXEL_LAYOUT_I400 {
        YuvPlanes {
            y_ptr,
            u_ptr: y_ptr,
            v_ptr: y_ptr,
            y_stride: pic.stride[0],
            uv_stride: 0,
            width,
            height,
            bpc,
            subsampling: (false, false),
            monochrome: true,
        }
    } else {
        let subsampling = match layout {
            DAV1D_PIXEL_LAYOUT_I420 => (true, true),
            DAV1D_PIXEL_LAYOUT_I422 => (true, false),
            DAV1D_PIXEL_LAYOUT_I444 => (false, false),
            _ => {
                return Err(AvifError::Decoder(format!(
                    "unsupported pixel layout: {layout}"
                )));
            }
        };
        YuvPlanes {
            y_ptr,
            u_ptr: plane(1)?,
            v_ptr: plane(2)?,
            y_stride: pic.stride[0],
            uv_stride: pic.stride[1],
            width,
            height,
            bpc,
            subsampling,
            monochrome: false,
        }
    };

    RgbImage::from_raw(width, height, planes.to_rgb())
        .ok_or_else(|| AvifError::Decoder("decoded buffer size mismatch".into()))
}

/// Borrowed YUV planes of a decoded picture.
struct YuvPlanes {
    y_ptr: *const u8,
    u_ptr: *const u8,
    v_ptr: *const u8,
    y_stride: isize,
    uv_stride: isize,
    width: u32,
    height: u32,
    bpc: u32,
    /// Chroma subsampling (horizontal, vertical); I420 = (true, true).
    subsampling: (bool, bool),
    monochrome: bool,
}

impl YuvPlanes {
    /// Interleaved RGB8 using BT.601 coefficients.
    fn to_rgb(&self) -> Vec<u8> {
        let max_val = ((1u32 << self.bpc) - 1) as f32;
        let center = (1u32 << (self.bpc - 1)) as f32;
        let scale = 255.0 / max_val;
        let (ss_x, ss_y) = self.subsampling;

        let mut rgb = Vec::with_capacity((self.width * self.height * 3) as usize);
        for row in 0..self.height {
            for col in 0..self.width {
                let y = read_sample(self.y_ptr, self.y_stride, col, row, self.bpc);
                if self.monochrome {
                    let v = (y * scale).clamp(0.0, 255.0) as u8;
                    rgb.extend_from_slice(&[v, v, v]);
                    continue;
                }
                let cx = if ss_x { col / 2 } else { col };
                let cy = if ss_y { row / 2 } else { row };
                let cb = read_sample(self.u_ptr, self.uv_stride, cx, cy, self.bpc) - center;
                let cr = read_sample(self.v_ptr, self.uv_stride, cx, cy, self.bpc) - center;
                rgb.extend_from_slice(&[
                    ((y + 1.402 * cr) * scale).clamp(0.0, 255.0) as u8,
                    ((y - 0.344136 * cb - 0.714136 * cr) * scale).clamp(0.0, 255.0) as u8,
                    ((y + 1.772 * cb) * scale).clamp(0.0, 255.0) as u8,
                ]);
            }
        }
        rgb
    }
}

/// One sample from a plane; 10/12-bit planes store `u16`.
#[inline]
fn read_sample(ptr: *const u8, stride: isize, x: u32, y: u32, bpc: u32) -> f32 {
    if bpc <= 8 {
        (unsafe { *ptr.offset(y as isize * stride + x as isize) }) as f32
    } else {
        let byte_offset = y as isize * stride + x as isize * 2;
        (unsafe { (ptr.offset(byte_offset) as *const u16).read_unaligned() }) as f32
    }
}
