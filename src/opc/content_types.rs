//! Content-type registry for OPC packages.
//!
//! The `[Content_Types].xml` part maps parts to MIME types through Default
//! entries (keyed by file extension) and Override entries (keyed by absolute
//! part path). Overrides shadow Defaults. Entry order is preserved across
//! rewrites and new entries append, so an unchanged registry re-serializes
//! byte-identically.

use quick_xml::Reader;
use quick_xml::events::Event;

use crate::common::xml::escape_xml;
use crate::opc::constants::{CONTENT_TYPES_PART, namespace};
use crate::opc::error::{OpcError, Result};
use crate::opc::package::OpcPackage;
use crate::opc::partname;

/// Parsed form of the `[Content_Types].xml` registry.
#[derive(Debug, Default, Clone)]
pub struct ContentTypes {
    /// Default entries as `(extension, content type)`, extensions lowercase
    defaults: Vec<(String, String)>,

    /// Override entries as `(absolute part path, content type)`
    overrides: Vec<(String, String)>,
}

impl ContentTypes {
    /// Parse the registry from `[Content_Types].xml` bytes.
    pub fn from_xml(xml: &[u8]) -> Result<Self> {
        let mut ct = Self::default();
        let mut reader = Reader::from_reader(xml);
        reader.config_mut().trim_text(true);

        let mut buf = Vec::new();
        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Empty(ref e) | Event::Start(ref e) => match e.local_name().as_ref() {
                    b"Default" => {
                        let mut extension = None;
                        let mut content_type = None;
                        for attr in e.attributes() {
                            let attr = attr?;
                            match attr.key.as_ref() {
                                b"Extension" => {
                                    extension = Some(attr.unescape_value()?.to_lowercase());
                                },
                                b"ContentType" => {
                                    content_type = Some(attr.unescape_value()?.to_string());
                                },
                                _ => {},
                            }
                        }
                        if let (Some(ext), Some(ct_value)) = (extension, content_type) {
                            ct.defaults.push((ext, ct_value));
                        }
                    },
                    b"Override" => {
                        let mut part = None;
                        let mut content_type = None;
                        for attr in e.attributes() {
                            let attr = attr?;
                            match attr.key.as_ref() {
                                b"PartName" => {
                                    part = Some(attr.unescape_value()?.to_string());
                                },
                                b"ContentType" => {
                                    content_type = Some(attr.unescape_value()?.to_string());
                                },
                                _ => {},
                            }
                        }
                        if let (Some(part), Some(ct_value)) = (part, content_type) {
                            ct.overrides.push((part, ct_value));
                        }
                    },
                    _ => {},
                },
                Event::Eof => break,
                _ => {},
            }
            buf.clear();
        }

        Ok(ct)
    }

    /// Serialize the registry, Defaults first, preserving entry order.
    pub fn to_xml(&self) -> Vec<u8> {
        let mut xml = String::with_capacity(512);

        xml.push_str(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#);
        xml.push('\n');
        xml.push_str(&format!(r#"<Types xmlns="{}">"#, namespace::OPC_CONTENT_TYPES));
        xml.push('\n');

        for (ext, ct_value) in &self.defaults {
            xml.push_str(&format!(
                r#"  <Default Extension="{}" ContentType="{}"/>"#,
                escape_xml(ext),
                escape_xml(ct_value)
            ));
            xml.push('\n');
        }
        for (part, ct_value) in &self.overrides {
            xml.push_str(&format!(
                r#"  <Override PartName="{}" ContentType="{}"/>"#,
                escape_xml(part),
                escape_xml(ct_value)
            ));
            xml.push('\n');
        }

        xml.push_str("</Types>");
        xml.into_bytes()
    }

    /// Add an Override entry unless one already exists for the path.
    ///
    /// Existing entries win regardless of their content type.
    pub fn ensure_override(&mut self, part: &str, content_type: &str) -> bool {
        let part = partname::absolute(part);
        if self.overrides.iter().any(|(existing, _)| *existing == part) {
            return false;
        }
        self.overrides.push((part, content_type.to_string()));
        true
    }

    /// Remove the Override entry for a part path.
    pub fn remove_override(&mut self, part: &str) -> bool {
        let part = partname::absolute(part);
        let before = self.overrides.len();
        self.overrides.retain(|(existing, _)| *existing != part);
        self.overrides.len() != before
    }

    /// Check whether an Override entry exists for a part path.
    pub fn has_override(&self, part: &str) -> bool {
        let part = partname::absolute(part);
        self.overrides.iter().any(|(existing, _)| *existing == part)
    }

    /// Add a Default entry unless one already exists for the extension.
    ///
    /// Extensions are matched case-insensitively and stored lowercase,
    /// without a leading dot.
    pub fn ensure_default(&mut self, extension: &str, content_type: &str) -> bool {
        let ext = extension.trim_start_matches('.').to_lowercase();
        if self.defaults.iter().any(|(existing, _)| *existing == ext) {
            return false;
        }
        self.defaults.push((ext, content_type.to_string()));
        true
    }

    /// Resolve the content type for a part name.
    ///
    /// Overrides shadow Defaults; `None` when neither matches.
    pub fn resolve(&self, part: &str) -> Option<&str> {
        let abs = partname::absolute(part);
        if let Some((_, ct_value)) = self.overrides.iter().find(|(existing, _)| *existing == abs) {
            return Some(ct_value);
        }
        let ext = partname::ext(partname::normalize(part)).to_lowercase();
        self.defaults
            .iter()
            .find(|(existing, _)| *existing == ext)
            .map(|(_, ct_value)| ct_value.as_str())
    }
}

/// Read the registry part, failing when it is absent.
fn read_registry(pkg: &OpcPackage) -> Result<ContentTypes> {
    if !pkg.has(CONTENT_TYPES_PART) {
        return Err(OpcError::PartNotFound(CONTENT_TYPES_PART.to_string()));
    }
    ContentTypes::from_xml(pkg.read(CONTENT_TYPES_PART)?)
}

/// Ensure an Override entry for a part, rewriting the registry on change.
pub fn ensure_override(pkg: &mut OpcPackage, part: &str, content_type: &str) -> Result<bool> {
    let mut ct = read_registry(pkg)?;
    let changed = ct.ensure_override(part, content_type);
    if changed {
        pkg.write(CONTENT_TYPES_PART, ct.to_xml());
    }
    Ok(changed)
}

/// Remove a part's Override entry. No-op when the registry is absent.
pub fn remove_override(pkg: &mut OpcPackage, part: &str) -> Result<bool> {
    if !pkg.has(CONTENT_TYPES_PART) {
        return Ok(false);
    }
    let mut ct = ContentTypes::from_xml(pkg.read(CONTENT_TYPES_PART)?)?;
    let changed = ct.remove_override(part);
    if changed {
        pkg.write(CONTENT_TYPES_PART, ct.to_xml());
    }
    Ok(changed)
}

/// Ensure a Default entry for an extension, rewriting the registry on change.
pub fn ensure_default(pkg: &mut OpcPackage, extension: &str, content_type: &str) -> Result<bool> {
    let mut ct = read_registry(pkg)?;
    let changed = ct.ensure_default(extension, content_type);
    if changed {
        pkg.write(CONTENT_TYPES_PART, ct.to_xml());
    }
    Ok(changed)
}

/// Check whether a part has an Override entry.
pub fn has_override(pkg: &OpcPackage, part: &str) -> Result<bool> {
    if !pkg.has(CONTENT_TYPES_PART) {
        return Ok(false);
    }
    let ct = ContentTypes::from_xml(pkg.read(CONTENT_TYPES_PART)?)?;
    Ok(ct.has_override(part))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opc::constants::content_type as ct;

    const SAMPLE: &[u8] = br#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">
  <Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>
  <Default Extension="xml" ContentType="application/xml"/>
  <Override PartName="/ppt/presentation.xml" ContentType="application/vnd.openxmlformats-officedocument.presentationml.presentation.main+xml"/>
</Types>"#;

    #[test]
    fn test_parse_and_resolve() {
        let reg = ContentTypes::from_xml(SAMPLE).unwrap();
        assert_eq!(
            reg.resolve("ppt/presentation.xml"),
            Some(ct::PML_PRESENTATION_MAIN)
        );
        assert_eq!(reg.resolve("ppt/slides/slide1.xml"), Some(ct::XML));
        assert_eq!(reg.resolve("ppt/media/image1.png"), None);
    }

    #[test]
    fn test_ensure_override_first_writer_wins() {
        let mut reg = ContentTypes::from_xml(SAMPLE).unwrap();

        assert!(reg.ensure_override("ppt/slideLayouts/slideLayout1.xml", ct::PML_SLIDE_LAYOUT));
        // Second writer does not replace the existing entry
        assert!(!reg.ensure_override("/ppt/slideLayouts/slideLayout1.xml", ct::XML));
        assert_eq!(
            reg.resolve("ppt/slideLayouts/slideLayout1.xml"),
            Some(ct::PML_SLIDE_LAYOUT)
        );
    }

    #[test]
    fn test_remove_override() {
        let mut reg = ContentTypes::from_xml(SAMPLE).unwrap();
        assert!(reg.remove_override("ppt/presentation.xml"));
        assert!(!reg.remove_override("ppt/presentation.xml"));
        assert!(!reg.has_override("/ppt/presentation.xml"));
    }

    #[test]
    fn test_ensure_default_case_insensitive() {
        let mut reg = ContentTypes::from_xml(SAMPLE).unwrap();
        assert!(reg.ensure_default("PNG", ct::PNG));
        assert!(!reg.ensure_default(".png", ct::PNG));
        assert_eq!(reg.resolve("ppt/media/image1.PNG"), Some(ct::PNG));
    }

    #[test]
    fn test_serialization_stable() {
        let reg = ContentTypes::from_xml(SAMPLE).unwrap();
        let xml = reg.to_xml();
        let reparsed = ContentTypes::from_xml(&xml).unwrap();
        assert_eq!(xml, reparsed.to_xml());
    }

    #[test]
    fn test_package_level_ops() {
        let mut pkg = OpcPackage::new();
        pkg.write(CONTENT_TYPES_PART, SAMPLE.to_vec());

        assert!(ensure_override(&mut pkg, "ppt/theme/theme1.xml", ct::OFC_THEME).unwrap());
        assert!(has_override(&pkg, "ppt/theme/theme1.xml").unwrap());
        assert!(!ensure_override(&mut pkg, "ppt/theme/theme1.xml", ct::OFC_THEME).unwrap());
        assert!(remove_override(&mut pkg, "ppt/theme/theme1.xml").unwrap());
        assert!(!has_override(&pkg, "ppt/theme/theme1.xml").unwrap());
    }

    #[test]
    fn test_missing_registry() {
        let mut pkg = OpcPackage::new();
        let err = ensure_override(&mut pkg, "ppt/theme/theme1.xml", ct::OFC_THEME).unwrap_err();
        assert!(matches!(err, OpcError::PartNotFound(_)));
        assert!(!has_override(&pkg, "ppt/theme/theme1.xml").unwrap());
        assert!(!remove_override(&mut pkg, "ppt/theme/theme1.xml").unwrap());
    }
}
