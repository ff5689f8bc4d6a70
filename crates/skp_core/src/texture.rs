//! Texture image probing.
//!
//! The kernel records a texture's pixel size and average color when it is
//! created from a file. This module reads those from disk with the `image`
//! crate and resolves texture names against a search directory.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::material::Color;

/// Errors that can occur while reading a texture image.
#[derive(Error, Debug)]
pub enum TextureError {
    #[error("Texture file not found: {0}")]
    NotFound(PathBuf),

    #[error("Image decoding error: {0}")]
    ImageError(#[from] image::ImageError),
}

pub type TextureResult<T> = Result<T, TextureError>;

/// What the kernel keeps about a texture image.
#[derive(Clone, Debug, PartialEq)]
pub struct ImageInfo {
    pub width: u32,
    pub height: u32,
    pub average_color: Color,
    pub has_alpha: bool,
}

/// Decode `path` and summarize it.
pub fn probe_image(path: &Path) -> TextureResult<ImageInfo> {
    if !path.is_file() {
        return Err(TextureError::NotFound(path.to_path_buf()));
    }

    let img = image::open(path)?;
    let has_alpha = img.color().has_alpha();
    let rgba = img.to_rgba8();
    let (width, height) = rgba.dimensions();

    let mut sum = [0u64; 4];
    for pixel in rgba.pixels() {
        for (acc, channel) in sum.iter_mut().zip(pixel.0) {
            *acc += channel as u64;
        }
    }
    let count = (width as u64 * height as u64).max(1);
    let average = sum.map(|s| (s / count) as u8);

    log::debug!(
        "Probed texture: {} ({}x{}, alpha: {})",
        path.display(),
        width,
        height,
        has_alpha
    );

    Ok(ImageInfo {
        width,
        height,
        average_color: Color::new(average[0], average[1], average[2], average[3]),
        has_alpha,
    })
}

/// Resolve a texture name relative to `base_dir`.
pub fn resolve_texture_path(name: &str, base_dir: Option<&Path>) -> PathBuf {
    let path = Path::new(name);

    if path.is_absolute() {
        path.to_path_buf()
    } else if let Some(base) = base_dir {
        base.join(path)
    } else {
        path.to_path_buf()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_png(name: &str, pixels: &[[u8; 4]], width: u32) -> PathBuf {
        let height = pixels.len() as u32 / width;
        let mut img = image::RgbaImage::new(width, height);
        for (i, p) in pixels.iter().enumerate() {
            img.put_pixel(i as u32 % width, i as u32 / width, image::Rgba(*p));
        }
        let path = std::env::temp_dir().join(format!("skp_core_{}_{}.png", name, std::process::id()));
        img.save(&path).unwrap();
        path
    }

    #[test]
    fn test_probe_average_color() {
        let path = temp_png(
            "probe",
            &[[255, 0, 0, 255], [0, 0, 255, 255]],
            2,
        );
        let info = probe_image(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(info.width, 2);
        assert_eq!(info.height, 1);
        assert_eq!(info.average_color, Color::new(127, 0, 127, 255));
        assert!(info.has_alpha);
    }

    #[test]
    fn test_missing_file() {
        let err = probe_image(Path::new("/definitely/not/here.png")).unwrap_err();
        assert!(matches!(err, TextureError::NotFound(_)));
    }

    #[test]
    fn test_resolve_texture_path() {
        let base = Path::new("/textures");
        assert_eq!(
            resolve_texture_path("wood.jpg", Some(base)),
            PathBuf::from("/textures/wood.jpg")
        );
        assert_eq!(
            resolve_texture_path("/abs/wood.jpg", Some(base)),
            PathBuf::from("/abs/wood.jpg")
        );
        assert_eq!(resolve_texture_path("wood.jpg", None), PathBuf::from("wood.jpg"));
    }
}
