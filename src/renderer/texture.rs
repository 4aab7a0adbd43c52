//! Sampled textures loaded from images or generated in code

use std::path::Path;

use image::GenericImageView;

use super::backend::{RenderBackend, TextureDesc, TextureFormat, TextureHandle, TextureKind};
use super::units::BoundTexture;
use crate::error::{RenderError, RenderResult};

/// A texture living on the backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Texture {
    pub handle: TextureHandle,
    pub kind: TextureKind,
    pub width: u32,
    pub height: u32,
    pub label: String,
}

impl Texture {
    /// Load an image file as sRGB color
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or decoded
    pub fn from_path<B: RenderBackend + ?Sized>(
        backend: &mut B,
        path: impl AsRef<Path>,
        format: TextureFormat,
    ) -> RenderResult<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)
            .map_err(|e| RenderError::TextureLoad(format!("{}: {e}", path.display())))?;
        let label = path
            .file_name()
            .map_or_else(|| "texture".to_string(), |n| n.to_string_lossy().into_owned());
        Self::from_bytes(backend, &bytes, &label, format)
    }

    /// Decode PNG/JPEG bytes
    pub fn from_bytes<B: RenderBackend + ?Sized>(
        backend: &mut B,
        bytes: &[u8],
        label: &str,
        format: TextureFormat,
    ) -> RenderResult<Self> {
        let img = image::load_from_memory(bytes)?;
        Self::from_image(backend, &img, label, format)
    }

    /// Upload a decoded image
    pub fn from_image<B: RenderBackend + ?Sized>(
        backend: &mut B,
        img: &image::DynamicImage,
        label: &str,
        format: TextureFormat,
    ) -> RenderResult<Self> {
        let (width, height) = img.dimensions();
        Self::from_rgba(backend, &img.to_rgba8(), width, height, label, format)
    }

    /// Upload raw RGBA8 texels
    pub fn from_rgba<B: RenderBackend + ?Sized>(
        backend: &mut B,
        rgba: &[u8],
        width: u32,
        height: u32,
        label: &str,
        format: TextureFormat,
    ) -> RenderResult<Self> {
        let desc = TextureDesc::sampled_2d(label, width, height, format);
        let handle = backend.create_texture(&desc, Some(rgba))?;
        log::debug!("Loaded texture `{}` ({}x{})", label, width, height);
        Ok(Self {
            handle,
            kind: desc.kind(),
            width,
            height,
            label: label.to_string(),
        })
    }

    /// 1x1 texture of one color
    pub fn solid<B: RenderBackend + ?Sized>(backend: &mut B, color: [u8; 4], label: &str) -> RenderResult<Self> {
        Self::from_rgba(backend, &color, 1, 1, label, TextureFormat::Rgba8UnormSrgb)
    }

    /// Flat tangent-space normal map
    pub fn flat_normal<B: RenderBackend + ?Sized>(backend: &mut B) -> RenderResult<Self> {
        Self::from_rgba(backend, &[128, 128, 255, 255], 1, 1, "flat_normal", TextureFormat::Rgba8Unorm)
    }

    /// Color cube map from six square faces in +X, -X, +Y, -Y, +Z, -Z order
    pub fn cube_from_faces<B: RenderBackend + ?Sized>(
        backend: &mut B,
        faces: &[Vec<u8>; 6],
        size: u32,
        label: &str,
    ) -> RenderResult<Self> {
        let desc = TextureDesc::cube(label, size, TextureFormat::Rgba8UnormSrgb, false);
        let data = faces.concat();
        let handle = backend.create_texture(&desc, Some(&data))?;
        Ok(Self {
            handle,
            kind: desc.kind(),
            width: size,
            height: size,
            label: label.to_string(),
        })
    }

    /// 1x1 depth cube used to fill omni shadow units no light occupies
    pub fn placeholder_depth_cube<B: RenderBackend + ?Sized>(backend: &mut B) -> RenderResult<Self> {
        let desc = TextureDesc::cube("placeholder_depth_cube", 1, TextureFormat::Depth32Float, true);
        let handle = backend.create_texture(&desc, None)?;
        Ok(Self {
            handle,
            kind: desc.kind(),
            width: 1,
            height: 1,
            label: desc.label,
        })
    }

    /// View for the texture unit table
    #[must_use]
    pub fn bound(&self) -> BoundTexture {
        BoundTexture {
            handle: self.handle,
            kind: self.kind,
        }
    }

    pub fn destroy<B: RenderBackend + ?Sized>(self, backend: &mut B) -> RenderResult<()> {
        backend.destroy_texture(self.handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::backend::RecordingBackend;

    #[test]
    fn test_rgba_length_is_checked() {
        let mut backend = RecordingBackend::new(8, 8);
        let err = Texture::from_rgba(&mut backend, &[0; 12], 2, 2, "short", TextureFormat::Rgba8UnormSrgb)
            .unwrap_err();
        assert!(matches!(err, RenderError::TextureLoad(_)));

        let ok = Texture::from_rgba(&mut backend, &[0; 16], 2, 2, "exact", TextureFormat::Rgba8UnormSrgb).unwrap();
        assert_eq!(ok.kind, TextureKind::Color2d);
    }

    #[test]
    fn test_load_png_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logo.png");
        image::RgbaImage::from_pixel(3, 2, image::Rgba([10, 20, 30, 255]))
            .save(&path)
            .unwrap();

        let mut backend = RecordingBackend::new(8, 8);
        let tex = Texture::from_path(&mut backend, &path, TextureFormat::Rgba8UnormSrgb).unwrap();
        assert_eq!((tex.width, tex.height), (3, 2));
        assert_eq!(tex.label, "logo.png");

        let missing = Texture::from_path(&mut backend, dir.path().join("nope.png"), TextureFormat::Rgba8UnormSrgb);
        assert!(missing.is_err());
    }

    #[test]
    fn test_cube_kinds() {
        let mut backend = RecordingBackend::new(8, 8);
        let faces: [Vec<u8>; 6] = std::array::from_fn(|_| vec![255; 4 * 4 * 4]);
        let sky = Texture::cube_from_faces(&mut backend, &faces, 4, "sky").unwrap();
        assert_eq!(sky.kind, TextureKind::ColorCube);

        let placeholder = Texture::placeholder_depth_cube(&mut backend).unwrap();
        assert_eq!(placeholder.bound().kind, TextureKind::DepthCube);
    }
}
