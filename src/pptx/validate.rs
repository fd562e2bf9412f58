//! Referential-integrity validation.
//!
//! Checks the structural invariants the topology operations maintain:
//! resolvable internal relationship targets, unique relationship ids per
//! sidecar, master layout-id lists consistent with their relationship
//! sets, and resolvable slide → layout → master linkage. Read-only.

use std::collections::HashSet;

use quick_xml::Reader;
use quick_xml::events::Event;
use serde::Serialize;

use crate::error::Result;
use crate::opc::constants::CONTENT_TYPES_PART;
use crate::opc::content_types::ContentTypes;
use crate::opc::package::OpcPackage;
use crate::opc::partname;
use crate::opc::rels::relationships_of;
use crate::pptx::layout::{layout_master_map, master_parts, slide_layout_part};
use crate::pptx::r_id_attr;
use crate::pptx::slides::{PRESENTATION_PART, slide_parts_in_order};

/// Findings from a validation pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    /// True when the package carries no errors (warnings allowed).
    pub fn ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Validate the package's structural invariants.
pub fn validate_package(pkg: &OpcPackage) -> Result<ValidationReport> {
    let mut report = ValidationReport::default();

    if !pkg.has(CONTENT_TYPES_PART) {
        report.errors.push(format!("Missing {}", CONTENT_TYPES_PART));
    }

    validate_relationship_targets(pkg, &mut report)?;
    validate_master_layout_lists(pkg, &mut report)?;
    validate_slide_linkage(pkg, &mut report)?;
    validate_part_typing(pkg, &mut report)?;

    Ok(report)
}

/// Every internal relationship target must resolve to an existing part,
/// and ids within one sidecar must be pairwise distinct.
fn validate_relationship_targets(pkg: &OpcPackage, report: &mut ValidationReport) -> Result<()> {
    let rels_parts: Vec<String> = pkg
        .list()
        .into_iter()
        .filter(|name| name.ends_with(".rels"))
        .map(String::from)
        .collect();

    for rels_part in rels_parts {
        let Some(source_part) = partname::source_part_for(&rels_part) else {
            report
                .warnings
                .push(format!("Sidecar outside _rels convention: {}", rels_part));
            continue;
        };

        let rels = relationships_of(pkg, &source_part)?;
        let mut seen = HashSet::new();
        for rel in rels.iter() {
            if !seen.insert(rel.id.clone()) {
                report
                    .errors
                    .push(format!("Duplicate relationship id {} in {}", rel.id, rels_part));
            }
            if rel.is_external() {
                continue;
            }
            let target = partname::resolve_target(&source_part, &rel.target);
            if !target.is_empty() && !pkg.has(&target) {
                report
                    .errors
                    .push(format!("Missing rel target: {} -> {}", rels_part, rel.target));
            }
        }
    }
    Ok(())
}

/// A master's layout-id list and its slideLayout relationship set must
/// reference the same targets, one entry per relationship.
fn validate_master_layout_lists(pkg: &OpcPackage, report: &mut ValidationReport) -> Result<()> {
    for master_part in master_parts(pkg) {
        let rels = relationships_of(pkg, &master_part)?;
        let layout_rel_ids: HashSet<String> = rels
            .iter()
            .filter(|rel| rel.rel_type.ends_with("/slideLayout"))
            .map(|rel| rel.id.clone())
            .collect();

        let mut listed_ids = HashSet::new();
        let xml = pkg.read(&master_part)?;
        let mut reader = Reader::from_reader(xml);
        reader.config_mut().trim_text(true);
        let mut buf = Vec::new();
        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Start(ref e) | Event::Empty(ref e)
                    if e.local_name().as_ref() == b"sldLayoutId" =>
                {
                    match r_id_attr(e)? {
                        Some(rid) => {
                            if !listed_ids.insert(rid.clone()) {
                                report.errors.push(format!(
                                    "Duplicate layout-id binding {} in {}",
                                    rid, master_part
                                ));
                            }
                            if !layout_rel_ids.contains(&rid) {
                                report.errors.push(format!(
                                    "Layout-id entry {} in {} has no slideLayout relationship",
                                    rid, master_part
                                ));
                            }
                        },
                        None => report.errors.push(format!(
                            "Layout-id entry without relationship id in {}",
                            master_part
                        )),
                    }
                },
                Event::Eof => break,
                _ => {},
            }
            buf.clear();
        }

        for rid in &layout_rel_ids {
            if !listed_ids.contains(rid) {
                report.warnings.push(format!(
                    "slideLayout relationship {} in {} is not in the layout-id list",
                    rid, master_part
                ));
            }
        }
    }
    Ok(())
}

/// Slide → layout → master must resolve end to end.
fn validate_slide_linkage(pkg: &OpcPackage, report: &mut ValidationReport) -> Result<()> {
    let layout_to_master = layout_master_map(pkg)?;
    for slide_part in slide_parts_in_order(pkg)? {
        match slide_layout_part(pkg, &slide_part)? {
            None => report
                .warnings
                .push(format!("Slide {} has no layout relationship", slide_part)),
            Some(layout) => {
                if !pkg.has(&layout) {
                    report
                        .errors
                        .push(format!("Slide {} references missing layout {}", slide_part, layout));
                } else if !layout_to_master.contains_key(&layout) {
                    report
                        .warnings
                        .push(format!("Layout {} has no master relationship", layout));
                }
            },
        }
    }
    Ok(())
}

/// Presentation, slide, layout, and master parts should carry an explicit
/// content-type Override.
fn validate_part_typing(pkg: &OpcPackage, report: &mut ValidationReport) -> Result<()> {
    if !pkg.has(CONTENT_TYPES_PART) {
        return Ok(());
    }
    let registry = ContentTypes::from_xml(pkg.read(CONTENT_TYPES_PART)?)?;

    let mut typed_parts: Vec<String> = Vec::new();
    if pkg.has(PRESENTATION_PART) {
        typed_parts.push(PRESENTATION_PART.to_string());
    }
    typed_parts.extend(slide_parts_in_order(pkg)?);
    typed_parts.extend(master_parts(pkg));
    typed_parts.extend(
        pkg.list()
            .into_iter()
            .filter(|p| p.starts_with("ppt/slideLayouts/") && p.ends_with(".xml"))
            .map(String::from),
    );

    for part in typed_parts {
        if !registry.has_override(&part) {
            report
                .warnings
                .push(format!("No content type override for /{}", part));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_deck() -> OpcPackage {
        let pml = "http://schemas.openxmlformats.org/presentationml/2006/main";
        let ofc = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
        let pkgr = "http://schemas.openxmlformats.org/package/2006/relationships";

        let mut pkg = OpcPackage::new();
        pkg.write(
            "[Content_Types].xml",
            br#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">
  <Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>
  <Default Extension="xml" ContentType="application/xml"/>
  <Override PartName="/ppt/presentation.xml" ContentType="application/vnd.openxmlformats-officedocument.presentationml.presentation.main+xml"/>
  <Override PartName="/ppt/slides/slide1.xml" ContentType="application/vnd.openxmlformats-officedocument.presentationml.slide+xml"/>
  <Override PartName="/ppt/slideMasters/slideMaster1.xml" ContentType="application/vnd.openxmlformats-officedocument.presentationml.slideMaster+xml"/>
  <Override PartName="/ppt/slideLayouts/slideLayout1.xml" ContentType="application/vnd.openxmlformats-officedocument.presentationml.slideLayout+xml"/>
</Types>"#
                .to_vec(),
        );
        pkg.write(
            "ppt/presentation.xml",
            format!(
                r#"<p:presentation xmlns:p="{pml}" xmlns:r="{ofc}"><p:sldIdLst><p:sldId id="256" r:id="rId1"/></p:sldIdLst></p:presentation>"#
            )
            .into_bytes(),
        );
        pkg.write(
            "ppt/_rels/presentation.xml.rels",
            format!(
                r#"<Relationships xmlns="{pkgr}"><Relationship Id="rId1" Type="{ofc}/slide" Target="slides/slide1.xml"/></Relationships>"#
            )
            .into_bytes(),
        );
        pkg.write(
            "ppt/slides/slide1.xml",
            format!(r#"<p:sld xmlns:p="{pml}"><p:cSld><p:spTree/></p:cSld></p:sld>"#).into_bytes(),
        );
        pkg.write(
            "ppt/slides/_rels/slide1.xml.rels",
            format!(
                r#"<Relationships xmlns="{pkgr}"><Relationship Id="rId1" Type="{ofc}/slideLayout" Target="../slideLayouts/slideLayout1.xml"/></Relationships>"#
            )
            .into_bytes(),
        );
        pkg.write(
            "ppt/slideLayouts/slideLayout1.xml",
            format!(r#"<p:sldLayout xmlns:p="{pml}"><p:cSld><p:spTree/></p:cSld></p:sldLayout>"#)
                .into_bytes(),
        );
        pkg.write(
            "ppt/slideLayouts/_rels/slideLayout1.xml.rels",
            format!(
                r#"<Relationships xmlns="{pkgr}"><Relationship Id="rId1" Type="{ofc}/slideMaster" Target="../slideMasters/slideMaster1.xml"/></Relationships>"#
            )
            .into_bytes(),
        );
        pkg.write(
            "ppt/slideMasters/slideMaster1.xml",
            format!(
                r#"<p:sldMaster xmlns:p="{pml}" xmlns:r="{ofc}"><p:sldLayoutIdLst><p:sldLayoutId id="2147483649" r:id="rId1"/></p:sldLayoutIdLst></p:sldMaster>"#
            )
            .into_bytes(),
        );
        pkg.write(
            "ppt/slideMasters/_rels/slideMaster1.xml.rels",
            format!(
                r#"<Relationships xmlns="{pkgr}"><Relationship Id="rId1" Type="{ofc}/slideLayout" Target="../slideLayouts/slideLayout1.xml"/></Relationships>"#
            )
            .into_bytes(),
        );
        pkg
    }

    #[test]
    fn test_valid_deck_passes() {
        let report = validate_package(&valid_deck()).unwrap();
        assert!(report.ok(), "unexpected errors: {:?}", report.errors);
        assert!(report.warnings.is_empty(), "unexpected warnings: {:?}", report.warnings);
    }

    #[test]
    fn test_missing_target_is_an_error() {
        let mut pkg = valid_deck();
        pkg.delete("ppt/slideLayouts/slideLayout1.xml");

        let report = validate_package(&pkg).unwrap();
        assert!(!report.ok());
        assert!(report.errors.iter().any(|e| e.contains("Missing rel target")));
        assert!(
            report
                .errors
                .iter()
                .any(|e| e.contains("references missing layout"))
        );
    }

    #[test]
    fn test_duplicate_rel_id_is_an_error() {
        let mut pkg = valid_deck();
        let pkgr = "http://schemas.openxmlformats.org/package/2006/relationships";
        let ofc = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
        pkg.write(
            "ppt/slides/_rels/slide1.xml.rels",
            format!(
                r#"<Relationships xmlns="{pkgr}"><Relationship Id="rId1" Type="{ofc}/slideLayout" Target="../slideLayouts/slideLayout1.xml"/><Relationship Id="rId1" Type="{ofc}/slideLayout" Target="../slideLayouts/slideLayout1.xml"/></Relationships>"#
            )
            .into_bytes(),
        );

        let report = validate_package(&pkg).unwrap();
        assert!(report.errors.iter().any(|e| e.contains("Duplicate relationship id")));
    }

    #[test]
    fn test_unbound_layout_id_entry_is_an_error() {
        let mut pkg = valid_deck();
        let pml = "http://schemas.openxmlformats.org/presentationml/2006/main";
        let ofc = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
        pkg.write(
            "ppt/slideMasters/slideMaster1.xml",
            format!(
                r#"<p:sldMaster xmlns:p="{pml}" xmlns:r="{ofc}"><p:sldLayoutIdLst><p:sldLayoutId id="2147483649" r:id="rId1"/><p:sldLayoutId id="2147483650" r:id="rId5"/></p:sldLayoutIdLst></p:sldMaster>"#
            )
            .into_bytes(),
        );

        let report = validate_package(&pkg).unwrap();
        assert!(
            report
                .errors
                .iter()
                .any(|e| e.contains("has no slideLayout relationship"))
        );
    }

    #[test]
    fn test_missing_override_is_a_warning() {
        let mut pkg = valid_deck();
        pkg.write(
            "[Content_Types].xml",
            br#"<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/></Types>"#.to_vec(),
        );

        let report = validate_package(&pkg).unwrap();
        assert!(report.ok());
        assert!(
            report
                .warnings
                .iter()
                .any(|w| w.contains("No content type override for /ppt/presentation.xml"))
        );
    }
}
