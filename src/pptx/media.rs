//! Image part insertion.
//!
//! Binary media lands under `ppt/media/` with per-extension sequential
//! numbering, and the extension's Default content type is registered so
//! the part resolves without an Override.

use std::path::Path;

use crate::error::{Error, Result};
use crate::opc::constants::content_type;
use crate::opc::content_types::ensure_default;
use crate::opc::package::OpcPackage;
use crate::opc::partname;

const MEDIA_DIR: &str = "ppt/media/";

/// The MIME type for a supported image extension, `None` otherwise.
pub fn image_content_type(extension: &str) -> Option<&'static str> {
    match extension {
        "png" => Some(content_type::PNG),
        "jpg" | "jpeg" => Some(content_type::JPEG),
        "gif" => Some(content_type::GIF),
        "bmp" => Some(content_type::BMP),
        _ => None,
    }
}

/// Write an image into the media directory.
///
/// The part is named `ppt/media/image<N>.<ext>` with N one past the highest
/// number already used for that extension, and the extension's Default
/// content type is ensured.
///
/// # Returns
/// The new part name.
pub fn add_image_part(pkg: &mut OpcPackage, extension: &str, data: Vec<u8>) -> Result<String> {
    let ext = extension.trim_start_matches('.').to_lowercase();
    let mime = image_content_type(&ext)
        .ok_or_else(|| Error::Unsupported(format!("image type {}", extension)))?;

    let part = next_media_part(pkg, &ext);
    pkg.write(&part, data);
    ensure_default(pkg, &ext, mime)?;
    Ok(part)
}

/// Read an image from disk and add it with [`add_image_part`].
pub fn add_image_file<P: AsRef<Path>>(pkg: &mut OpcPackage, path: P) -> Result<String> {
    let path = path.as_ref();
    let ext = path
        .extension()
        .and_then(|ext| ext.to_str())
        .ok_or_else(|| Error::Unsupported(format!("image path {}", path.display())))?
        .to_lowercase();
    let data = std::fs::read(path).map_err(crate::opc::error::OpcError::from)?;
    add_image_part(pkg, &ext, data)
}

fn next_media_part(pkg: &OpcPackage, ext: &str) -> String {
    let suffix = format!(".{}", ext);
    let mut max = 0u32;
    for part in pkg.list() {
        if !part.starts_with(MEDIA_DIR) {
            continue;
        }
        let name = partname::basename(part);
        if name.starts_with("image") && name.ends_with(&suffix) {
            if let Some(number) = partname::numeric_suffix(part) {
                max = max.max(number);
            }
        }
    }
    format!("{}image{}.{}", MEDIA_DIR, max + 1, ext)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opc::constants::CONTENT_TYPES_PART;
    use crate::opc::content_types::ContentTypes;

    fn package_with_registry() -> OpcPackage {
        let mut pkg = OpcPackage::new();
        pkg.write(
            CONTENT_TYPES_PART,
            br#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">
  <Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>
  <Default Extension="xml" ContentType="application/xml"/>
</Types>"#
                .to_vec(),
        );
        pkg
    }

    #[test]
    fn test_add_image_registers_default() {
        let mut pkg = package_with_registry();
        let part = add_image_part(&mut pkg, "png", vec![0x89, 0x50]).unwrap();
        assert_eq!(part, "ppt/media/image1.png");
        assert_eq!(pkg.read(&part).unwrap(), [0x89, 0x50]);

        let ct = ContentTypes::from_xml(pkg.read(CONTENT_TYPES_PART).unwrap()).unwrap();
        assert_eq!(ct.resolve(&part), Some(content_type::PNG));
    }

    #[test]
    fn test_numbering_is_per_extension() {
        let mut pkg = package_with_registry();
        assert_eq!(add_image_part(&mut pkg, "png", vec![1]).unwrap(), "ppt/media/image1.png");
        assert_eq!(add_image_part(&mut pkg, "png", vec![2]).unwrap(), "ppt/media/image2.png");
        assert_eq!(add_image_part(&mut pkg, "jpg", vec![3]).unwrap(), "ppt/media/image1.jpg");
    }

    #[test]
    fn test_unsupported_extension() {
        let mut pkg = package_with_registry();
        assert!(matches!(
            add_image_part(&mut pkg, "svg", vec![1]),
            Err(Error::Unsupported(_))
        ));
    }

    #[test]
    fn test_add_image_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logo.PNG");
        std::fs::write(&path, [0x89, 0x50, 0x4E, 0x47]).unwrap();

        let mut pkg = package_with_registry();
        let part = add_image_file(&mut pkg, &path).unwrap();
        assert_eq!(part, "ppt/media/image1.png");
    }
}
