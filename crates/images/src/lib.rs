//! Frame files on disk.
//!
//! A [`PixelBuffer`] stores rows bottom-up in blue, green, red order; the
//! encoder turns it into a top-down RGB image before writing a 24-bit BMP.

use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use image::{ImageFormat, Rgb, RgbImage};
use log::debug;
use protocol::PixelBuffer;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ImageWriteError {
    #[error("cannot create output directory {path}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot encode {path}")]
    Encode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

/// `<dir>/frame_<n>.bmp`, with `n` counted from 1.
pub fn frame_path(dir: &Path, frame_index: usize) -> PathBuf {
    dir.join(format!("frame_{}.bmp", frame_index + 1))
}

pub fn to_rgb_image(buffer: &PixelBuffer) -> RgbImage {
    let height = buffer.height();
    RgbImage::from_fn(buffer.width(), height, |x, y| {
        let [blue, green, red] = buffer.pixel(x, height - 1 - y).unwrap_or_default();
        Rgb([red, green, blue])
    })
}

pub fn encode_bmp(buffer: &PixelBuffer) -> Result<Vec<u8>, image::ImageError> {
    let mut bytes = Cursor::new(Vec::new());
    to_rgb_image(buffer).write_to(&mut bytes, ImageFormat::Bmp)?;
    Ok(bytes.into_inner())
}

/// Writes frame `frame_index` into `dir`, creating it if needed, and
/// returns the file path.
pub fn write_frame(
    dir: &Path,
    frame_index: usize,
    buffer: &PixelBuffer,
) -> Result<PathBuf, ImageWriteError> {
    fs::create_dir_all(dir).map_err(|source| ImageWriteError::CreateDir {
        path: dir.to_path_buf(),
        source,
    })?;
    let path = frame_path(dir, frame_index);
    to_rgb_image(buffer)
        .save_with_format(&path, ImageFormat::Bmp)
        .map_err(|source| ImageWriteError::Encode {
            path: path.clone(),
            source,
        })?;
    debug!("wrote {}", path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use patches::Patch;
    use protocol::PatchPixels;

    use super::*;

    fn bottom_left_red() -> PixelBuffer {
        let mut buffer = PixelBuffer::new(3, 2);
        let patch = Patch::new(0, 0, 1, 1);
        let mut tile = PatchPixels::new(patch);
        tile.set(0, 0, [0, 0, 255]).unwrap();
        buffer.blit(&tile).unwrap();
        buffer
    }

    #[test]
    fn frame_paths_count_from_one() {
        let dir = Path::new("renders");
        assert_eq!(frame_path(dir, 0), dir.join("frame_1.bmp"));
        assert_eq!(frame_path(dir, 9), dir.join("frame_10.bmp"));
    }

    #[test]
    fn buffer_row_zero_is_the_bottom_of_the_image() {
        let image = to_rgb_image(&bottom_left_red());
        assert_eq!(image.get_pixel(0, 1), &Rgb([255, 0, 0]));
        assert_eq!(image.get_pixel(0, 0), &Rgb([0, 0, 0]));
    }

    #[test]
    fn encoded_bmp_decodes_to_the_same_pixels() {
        let bytes = encode_bmp(&bottom_left_red()).unwrap();
        assert_eq!(&bytes[..2], b"BM");

        let decoded = image::load_from_memory_with_format(&bytes, ImageFormat::Bmp)
            .unwrap()
            .to_rgb8();
        assert_eq!((decoded.width(), decoded.height()), (3, 2));
        assert_eq!(decoded.get_pixel(0, 1), &Rgb([255, 0, 0]));
    }

    #[test]
    fn write_frame_creates_the_directory() {
        let dir = std::env::temp_dir()
            .join(format!("images-write-{}", std::process::id()))
            .join("nested");
        let path = write_frame(&dir, 2, &bottom_left_red()).unwrap();
        assert_eq!(path, dir.join("frame_3.bmp"));
        assert!(path.is_file());
        fs::remove_dir_all(dir.parent().unwrap()).unwrap();
    }
}
