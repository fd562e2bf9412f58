//! Canonical slide enumeration.
//!
//! Deck order comes from the presentation part's slide-id list, each entry
//! resolved through the presentation's relationship sidecar. Synthetic or
//! partially-built containers without that plumbing fall back to a
//! lexicographic scan of the slides directory.

use quick_xml::Reader;
use quick_xml::events::Event;

use crate::error::{Error, Result};
use crate::opc::package::OpcPackage;
use crate::opc::partname;
use crate::opc::rels::relationships_of;
use crate::pptx::r_id_attr;

/// The presentation part name.
pub const PRESENTATION_PART: &str = "ppt/presentation.xml";

/// List slide parts in canonical deck order.
///
/// Entries in the presentation's `sldIdLst` are resolved through its
/// sidecar and filtered to relationships of type `…/slide`. When the
/// presentation part or its sidecar is absent, or resolution yields no
/// slides, falls back to a lexicographic scan of
/// `ppt/slides/slide*.xml`.
pub fn slide_parts_in_order(pkg: &OpcPackage) -> Result<Vec<String>> {
    let rels_part = partname::rels_part_for(PRESENTATION_PART);
    if !pkg.has(PRESENTATION_PART) || !pkg.has(&rels_part) {
        return Ok(fallback_slide_parts(pkg));
    }

    let rels = relationships_of(pkg, PRESENTATION_PART)?;
    let mut slides = Vec::new();

    let xml = pkg.read(PRESENTATION_PART)?;
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(ref e) | Event::Empty(ref e)
                if e.local_name().as_ref() == b"sldId" =>
            {
                let Some(rid) = r_id_attr(e)? else { continue };
                let Some(rel) = rels.get(&rid) else { continue };
                if !rel.rel_type.ends_with("/slide") || rel.is_external() {
                    continue;
                }
                slides.push(partname::resolve_target(PRESENTATION_PART, &rel.target));
            },
            Event::Eof => break,
            _ => {},
        }
        buf.clear();
    }

    if slides.is_empty() {
        return Ok(fallback_slide_parts(pkg));
    }
    Ok(slides)
}

/// Resolve the slide part at a 1-based position in deck order.
pub fn slide_part_for_number(pkg: &OpcPackage, slide_number: usize) -> Result<String> {
    let parts = slide_parts_in_order(pkg)?;
    if slide_number < 1 || slide_number > parts.len() {
        return Err(Error::OutOfRange(format!(
            "slide number {} (deck has {} slides)",
            slide_number,
            parts.len()
        )));
    }
    Ok(parts[slide_number - 1].clone())
}

fn fallback_slide_parts(pkg: &OpcPackage) -> Vec<String> {
    let mut parts: Vec<String> = pkg
        .list()
        .into_iter()
        .filter(|p| p.starts_with("ppt/slides/slide") && p.ends_with(".xml"))
        .map(String::from)
        .collect();
    parts.sort();
    parts
}
