//! Layout topology operations.
//!
//! The structural algorithms over the part store, relationship graph, and
//! content-type registry: creating layouts from slides, reassigning slides,
//! pruning unreferenced layouts, and reindexing layout part names. Each
//! public function is one logical transaction with no rollback, so every
//! checkable precondition is validated before its first write; derived
//! counters (next rId, next layout number, next layout-list id) are always
//! recomputed from current state rather than cached.

use std::collections::{BTreeMap, HashSet};
use std::io::Cursor;

use quick_xml::events::{BytesEnd, BytesStart, Event};
use quick_xml::name::Prefix;
use quick_xml::{Reader, Writer};
use serde::Serialize;

use crate::common::xml::{
    element_span, end_tag_start, root_attr, set_root_attr, splice, start_tag_end, with_attr,
};
use crate::error::{Error, Result};
use crate::opc::constants::{CONTENT_TYPES_PART, content_type, relationship_type};
use crate::opc::content_types::{ensure_override, remove_override};
use crate::opc::error::OpcError;
use crate::opc::package::OpcPackage;
use crate::opc::partname;
use crate::opc::rels::{
    Relationship, Relationships, ensure_relationship, relationships_of, write_relationships,
};
use crate::pptx::media::add_image_part;
use crate::pptx::r_id_attr;
use crate::pptx::slides::slide_parts_in_order;

const SLIDE_LAYOUTS_DIR: &str = "ppt/slideLayouts/";
const SLIDE_MASTERS_DIR: &str = "ppt/slideMasters/";

/// Outcome of [`prune_unused_layouts`].
#[derive(Debug, Clone, Serialize)]
pub struct PruneLayoutsResult {
    /// Layout parts that were removed, in sorted order
    pub removed_layouts: Vec<String>,

    /// Number of masters whose layout list lost at least one entry
    pub masters_updated: usize,
}

/// Outcome of [`reindex_layouts`].
#[derive(Debug, Clone, Serialize)]
pub struct ReindexLayoutsResult {
    /// Old part name to new part name, identity entries included
    pub layout_mapping: BTreeMap<String, String>,

    /// Number of masters whose relationship set was rebuilt
    pub masters_updated: usize,

    /// Number of slides whose layout target changed
    pub slides_updated: usize,
}

/// List slide layout parts in sorted order.
pub fn layout_parts(pkg: &OpcPackage) -> Vec<String> {
    parts_under(pkg, SLIDE_LAYOUTS_DIR)
}

/// List slide master parts in sorted order.
pub fn master_parts(pkg: &OpcPackage) -> Vec<String> {
    parts_under(pkg, SLIDE_MASTERS_DIR)
}

fn parts_under(pkg: &OpcPackage, prefix: &str) -> Vec<String> {
    let mut parts: Vec<String> = pkg
        .list()
        .into_iter()
        .filter(|p| p.starts_with(prefix) && p.ends_with(".xml"))
        .map(String::from)
        .collect();
    parts.sort();
    parts
}

fn is_layout_rel(rel: &Relationship) -> bool {
    rel.rel_type.ends_with("/slideLayout")
}

fn is_master_rel(rel: &Relationship) -> bool {
    rel.rel_type.ends_with("/slideMaster")
}

/// The layout part a slide uses, through its slideLayout relationship.
///
/// Tolerant of missing sidecars: `None` when the slide has no sidecar or no
/// slideLayout relationship.
pub fn slide_layout_part(pkg: &OpcPackage, slide_part: &str) -> Result<Option<String>> {
    let rels = relationships_of(pkg, slide_part)?;
    Ok(rels
        .iter()
        .find(|rel| is_layout_rel(rel) && !rel.is_external())
        .map(|rel| partname::resolve_target(slide_part, &rel.target)))
}

/// Map each layout part to the master it references, where one exists.
pub fn layout_master_map(pkg: &OpcPackage) -> Result<BTreeMap<String, String>> {
    let mut map = BTreeMap::new();
    for layout in layout_parts(pkg) {
        let rels = relationships_of(pkg, &layout)?;
        if let Some(rel) = rels.iter().find(|rel| is_master_rel(rel) && !rel.is_external()) {
            let master = partname::resolve_target(&layout, &rel.target);
            map.insert(layout, master);
        }
    }
    Ok(map)
}

/// The layouts a master owns, in layout-id-list order.
///
/// The layout-id list is the authoritative UI order; each entry is resolved
/// to a part name through the master's relationship sidecar. Entries whose
/// relationship id does not resolve are skipped. Empty when the master has
/// no sidecar or no layout-id list.
pub fn master_layout_order(pkg: &OpcPackage, master_part: &str) -> Result<Vec<String>> {
    let rels = relationships_of(pkg, master_part)?;
    if rels.is_empty() {
        return Ok(Vec::new());
    }

    let xml = pkg.read(master_part)?;
    let mut order = Vec::new();
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(ref e) | Event::Empty(ref e)
                if e.local_name().as_ref() == b"sldLayoutId" =>
            {
                let Some(rid) = r_id_attr(e)? else { continue };
                let Some(rel) = rels.get(&rid) else { continue };
                order.push(partname::resolve_target(master_part, &rel.target));
            },
            Event::Eof => break,
            _ => {},
        }
        buf.clear();
    }
    Ok(order)
}

/// Create a new layout from an existing slide's body.
///
/// The layout document is a deep copy of a template layout (the chosen
/// master's first layout, or the first layout overall) with its `cSld`
/// subtree replaced by the slide's and its display name set to `name`. The
/// new layout's relationship set keeps only the slide relationships whose
/// ids the cloned body actually references, plus a fresh slideMaster
/// binding; the master gains a layout-id entry and relationship, and a
/// content-type Override is registered.
///
/// # Arguments
/// * `slide_number` - 1-based position in deck order
/// * `name` - Display name for the new layout
/// * `master_index` - 1-based index over sorted master parts
///
/// # Returns
/// The new layout's part name.
pub fn make_layout_from_slide(
    pkg: &mut OpcPackage,
    slide_number: usize,
    name: &str,
    master_index: usize,
) -> Result<String> {
    if !pkg.has(CONTENT_TYPES_PART) {
        return Err(Error::NotFound(CONTENT_TYPES_PART.to_string()));
    }

    let slide_parts = slide_parts_in_order(pkg)?;
    if slide_number < 1 || slide_number > slide_parts.len() {
        return Err(Error::OutOfRange(format!(
            "slide number {} (deck has {} slides)",
            slide_number,
            slide_parts.len()
        )));
    }
    let slide_part = slide_parts[slide_number - 1].clone();

    let master_part = master_part_by_index(pkg, master_index)?;
    let template_layout = first_layout_for_master(pkg, &master_part)?;

    let slide_xml = pkg.read(&slide_part)?.to_vec();
    let template_xml = pkg.read(&template_layout)?.to_vec();

    let slide_span = element_span(&slide_xml, b"cSld")?
        .ok_or_else(|| Error::Inconsistent(format!("{} is missing cSld", slide_part)))?;
    let template_span = element_span(&template_xml, b"cSld")?
        .ok_or_else(|| Error::Inconsistent(format!("{} is missing cSld", template_layout)))?;

    let body = slide_xml[slide_span].to_vec();
    let layout_xml = splice(&template_xml, template_span, &body);
    let layout_xml = set_root_attr(&layout_xml, "name", name)?;

    // Relationship set for the new layout: only slide relationships the
    // cloned body references survive, then a fresh slideMaster binding.
    let slide_rels = relationships_of(pkg, &slide_part)?;
    let referenced = body_rel_ids(&body)?;
    let mut layout_rels = Relationships::new();
    for rel in slide_rels.iter() {
        if referenced.contains(&rel.id) {
            layout_rels.push(rel.clone());
        }
    }
    let new_layout_part = next_layout_part(pkg);
    let master_target = partname::relative_ref(&new_layout_part, &master_part);
    let master_rel_id = layout_rels.next_rid();
    layout_rels.push(Relationship::new(
        master_rel_id,
        relationship_type::SLIDE_MASTER,
        master_target,
    ));

    // All preconditions hold; writes start here.
    pkg.write(&new_layout_part, layout_xml);
    write_relationships(pkg, &new_layout_part, &layout_rels);

    let layout_target = partname::relative_ref(&master_part, &new_layout_part);
    let master_rel =
        ensure_relationship(pkg, &master_part, relationship_type::SLIDE_LAYOUT, &layout_target)?;
    let master_xml = append_layout_id_entry(pkg.read(&master_part)?, &master_rel.id)?;
    pkg.write(&master_part, master_xml);

    ensure_override(pkg, &new_layout_part, content_type::PML_SLIDE_LAYOUT)?;

    Ok(new_layout_part)
}

/// Point the given slides at a layout part.
///
/// Every slide number is bounds-checked and every slide sidecar verified
/// present before the first write; then each slide's slideLayout
/// relationship target is rewritten, or a new relationship appended when
/// the slide has none.
pub fn assign_slides_to_layout(
    pkg: &mut OpcPackage,
    slide_numbers: &[usize],
    layout_part: &str,
) -> Result<()> {
    let slide_parts = slide_parts_in_order(pkg)?;

    let mut selected = Vec::with_capacity(slide_numbers.len());
    for &number in slide_numbers {
        if number < 1 || number > slide_parts.len() {
            return Err(Error::OutOfRange(format!(
                "slide number {} (deck has {} slides)",
                number,
                slide_parts.len()
            )));
        }
        selected.push(slide_parts[number - 1].clone());
    }
    for slide_part in &selected {
        if !pkg.has(&partname::rels_part_for(slide_part)) {
            return Err(Error::NotFound(format!(
                "relationship sidecar for slide {}",
                slide_part
            )));
        }
    }

    for slide_part in &selected {
        let mut rels = relationships_of(pkg, slide_part)?;
        let target = partname::relative_ref(slide_part, layout_part);
        let mut rewritten = false;
        for rel in rels.iter_mut() {
            if rel.rel_type.ends_with("/slideLayout") {
                rel.target = target.clone();
                rewritten = true;
                break;
            }
        }
        if !rewritten {
            let id = rels.next_rid();
            rels.push(Relationship::new(id, relationship_type::SLIDE_LAYOUT, target));
        }
        write_relationships(pkg, slide_part, &rels);
    }
    Ok(())
}

/// Delete layouts no slide references.
///
/// A layout is kept when any slide's slideLayout relationship reaches it or
/// when it is named in `keep`. Every unused layout loses its part, its
/// sidecar, its content-type Override, and its entry in every master that
/// references it.
pub fn prune_unused_layouts(pkg: &mut OpcPackage, keep: &[&str]) -> Result<PruneLayoutsResult> {
    let keep: HashSet<String> = keep
        .iter()
        .map(|name| partname::normalize(name).to_string())
        .collect();

    let mut used = HashSet::new();
    for slide_part in slide_parts_in_order(pkg)? {
        if let Some(layout) = slide_layout_part(pkg, &slide_part)? {
            used.insert(layout);
        }
    }

    let unused: Vec<String> = layout_parts(pkg)
        .into_iter()
        .filter(|layout| !used.contains(layout) && !keep.contains(layout))
        .collect();

    let mut masters_updated = 0;
    for layout in &unused {
        masters_updated += remove_layout_from_masters(pkg, layout)?;
        pkg.delete(layout);
        pkg.delete(&partname::rels_part_for(layout));
        remove_override(pkg, layout)?;
    }

    Ok(PruneLayoutsResult {
        removed_layouts: unused,
        masters_updated,
    })
}

/// Rename layout parts to canonical sequential names.
///
/// Canonical order comes from each master's layout-id list, traversed over
/// sorted masters with numbering continuing across masters. Layouts no
/// master references are left alone. Renames run as a two-phase batch
/// through guaranteed-unique temporary names, so a destination that is
/// itself a rename source never collides. Afterwards slide targets are
/// updated, each master's slideLayout relationships are rebuilt with a
/// contiguous rId sequence that skips ids held by its other relationships,
/// and content-type Overrides follow the renames.
///
/// Running it a second time immediately after is a no-op.
pub fn reindex_layouts(pkg: &mut OpcPackage) -> Result<ReindexLayoutsResult> {
    let mapping = build_layout_reindex_map(pkg)?;
    if mapping.is_empty() {
        return Ok(ReindexLayoutsResult {
            layout_mapping: mapping,
            masters_updated: 0,
            slides_updated: 0,
        });
    }
    if !pkg.has(CONTENT_TYPES_PART) {
        return Err(Error::NotFound(CONTENT_TYPES_PART.to_string()));
    }

    rename_layout_parts(pkg, &mapping)?;
    let slides_updated = update_slide_layout_targets(pkg, &mapping)?;
    let masters_updated = rebuild_master_layout_rels(pkg, &mapping)?;

    Ok(ReindexLayoutsResult {
        layout_mapping: mapping,
        masters_updated,
        slides_updated,
    })
}

/// Resolve a layout selector: a part path, a 1-based index over sorted
/// layouts, or a layout display name.
pub fn resolve_layout_part(pkg: &OpcPackage, selector: &str) -> Result<String> {
    if selector.starts_with(SLIDE_LAYOUTS_DIR) {
        if !pkg.has(selector) {
            return Err(Error::NotFound(format!("layout {}", selector)));
        }
        return Ok(partname::normalize(selector).to_string());
    }

    if !selector.is_empty() && selector.bytes().all(|b| b.is_ascii_digit()) {
        let index: usize = selector
            .parse()
            .map_err(|_| Error::Unsupported(format!("layout selector {}", selector)))?;
        let layouts = layout_parts(pkg);
        if index < 1 || index > layouts.len() {
            return Err(Error::OutOfRange(format!(
                "layout index {} (package has {} layouts)",
                index,
                layouts.len()
            )));
        }
        return Ok(layouts[index - 1].clone());
    }

    for part in layout_parts(pkg) {
        if root_attr(pkg.read(&part)?, "name")?.as_deref() == Some(selector) {
            return Ok(part);
        }
    }
    Err(Error::NotFound(format!("layout {}", selector)))
}

/// Resolve a master selector: a part path or a 1-based index over sorted
/// masters.
pub fn resolve_master_part(pkg: &OpcPackage, selector: &str) -> Result<String> {
    if selector.starts_with(SLIDE_MASTERS_DIR) {
        if !pkg.has(selector) {
            return Err(Error::NotFound(format!("master {}", selector)));
        }
        return Ok(partname::normalize(selector).to_string());
    }
    if !selector.is_empty() && selector.bytes().all(|b| b.is_ascii_digit()) {
        let index: usize = selector
            .parse()
            .map_err(|_| Error::Unsupported(format!("master selector {}", selector)))?;
        return master_part_by_index(pkg, index);
    }
    Err(Error::Unsupported(format!("master selector {}", selector)))
}

/// Set a layout's background to a stretched image.
///
/// Writes the image into the media directory, binds it to the layout with
/// an image relationship, and replaces the layout's `bg` element (or
/// inserts one at the head of `cSld`).
///
/// # Returns
/// The new image part name.
pub fn set_layout_background_image(
    pkg: &mut OpcPackage,
    layout_part: &str,
    extension: &str,
    image: Vec<u8>,
) -> Result<String> {
    if !pkg.has(layout_part) {
        return Err(Error::NotFound(format!("layout {}", layout_part)));
    }
    let layout_xml = pkg.read(layout_part)?.to_vec();
    let c_sld = element_span(&layout_xml, b"cSld")?
        .ok_or_else(|| Error::Inconsistent(format!("{} is missing cSld", layout_part)))?;

    let image_part = add_image_part(pkg, extension, image)?;
    let target = partname::relative_ref(layout_part, &image_part);
    let rel = ensure_relationship(pkg, layout_part, relationship_type::IMAGE, &target)?;

    let bg = format!(
        r#"<p:bg><p:bgPr><a:blipFill><a:blip r:embed="{}"/><a:stretch><a:fillRect/></a:stretch></a:blipFill></p:bgPr></p:bg>"#,
        rel.id
    );
    let updated = match element_span(&layout_xml, b"bg")? {
        Some(span) => splice(&layout_xml, span, bg.as_bytes()),
        None => {
            let at = start_tag_end(&layout_xml, c_sld.start).ok_or_else(|| {
                OpcError::XmlError(format!("Malformed cSld start tag in {}", layout_part))
            })?;
            splice(&layout_xml, at..at, bg.as_bytes())
        },
    };
    pkg.write(layout_part, updated);
    Ok(image_part)
}

/// Add a picture shape to a layout's shape tree.
///
/// Coordinates and extents are in EMUs. The shape id is one past the
/// highest id currently in the document.
///
/// # Returns
/// The new image part name.
pub fn add_layout_image_shape(
    pkg: &mut OpcPackage,
    layout_part: &str,
    extension: &str,
    image: Vec<u8>,
    x: i64,
    y: i64,
    cx: i64,
    cy: i64,
    name: Option<&str>,
) -> Result<String> {
    if !pkg.has(layout_part) {
        return Err(Error::NotFound(format!("layout {}", layout_part)));
    }
    let layout_xml = pkg.read(layout_part)?.to_vec();
    let sp_tree = element_span(&layout_xml, b"spTree")?
        .ok_or_else(|| Error::Inconsistent(format!("{} is missing spTree", layout_part)))?;

    let image_part = add_image_part(pkg, extension, image)?;
    let target = partname::relative_ref(layout_part, &image_part);
    let rel = ensure_relationship(pkg, layout_part, relationship_type::IMAGE, &target)?;

    let shape_id = next_shape_id(&layout_xml)?;
    let shape_name = match name {
        Some(given) => given.to_string(),
        None => format!("Picture {}", shape_id),
    };
    let pic = format!(
        concat!(
            r#"<p:pic><p:nvPicPr><p:cNvPr id="{id}" name="{name}"/><p:cNvPicPr/><p:nvPr/></p:nvPicPr>"#,
            r#"<p:blipFill><a:blip r:embed="{rid}"/><a:stretch><a:fillRect/></a:stretch></p:blipFill>"#,
            r#"<p:spPr><a:xfrm><a:off x="{x}" y="{y}"/><a:ext cx="{cx}" cy="{cy}"/></a:xfrm>"#,
            r#"<a:prstGeom prst="rect"><a:avLst/></a:prstGeom></p:spPr></p:pic>"#
        ),
        id = shape_id,
        name = crate::common::xml::escape_xml(&shape_name),
        rid = rel.id,
        x = x,
        y = y,
        cx = cx,
        cy = cy,
    );

    let at = end_tag_start(&layout_xml, &sp_tree).ok_or_else(|| {
        OpcError::XmlError(format!("Malformed spTree element in {}", layout_part))
    })?;
    let updated = splice(&layout_xml, at..at, pic.as_bytes());
    pkg.write(layout_part, updated);
    Ok(image_part)
}

/// The deck's slide size in EMUs, `(0, 0)` when undeclared.
pub fn slide_size(pkg: &OpcPackage) -> Result<(i64, i64)> {
    if !pkg.has(crate::pptx::slides::PRESENTATION_PART) {
        return Ok((0, 0));
    }
    let xml = pkg.read(crate::pptx::slides::PRESENTATION_PART)?;
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(ref e) | Event::Empty(ref e) if e.local_name().as_ref() == b"sldSz" => {
                let mut cx = 0i64;
                let mut cy = 0i64;
                for attr in e.attributes() {
                    let attr = attr?;
                    match attr.key.as_ref() {
                        b"cx" => cx = atoi_simd::parse::<_, false, false>(&attr.value).unwrap_or(0),
                        b"cy" => cy = atoi_simd::parse::<_, false, false>(&attr.value).unwrap_or(0),
                        _ => {},
                    }
                }
                return Ok((cx, cy));
            },
            Event::Eof => break,
            _ => {},
        }
        buf.clear();
    }
    Ok((0, 0))
}

// ---------------------------------------------------------------------------
// internals

fn master_part_by_index(pkg: &OpcPackage, index: usize) -> Result<String> {
    let masters = master_parts(pkg);
    if masters.is_empty() {
        return Err(Error::NotFound("no slide master parts".to_string()));
    }
    if index < 1 || index > masters.len() {
        return Err(Error::OutOfRange(format!(
            "master index {} (package has {} masters)",
            index,
            masters.len()
        )));
    }
    Ok(masters[index - 1].clone())
}

fn first_layout_for_master(pkg: &OpcPackage, master_part: &str) -> Result<String> {
    let rels = relationships_of(pkg, master_part)?;
    if let Some(rel) = rels.iter().find(|rel| is_layout_rel(rel) && !rel.is_external()) {
        return Ok(partname::resolve_target(master_part, &rel.target));
    }
    layout_parts(pkg)
        .into_iter()
        .next()
        .ok_or_else(|| Error::NotFound("no slide layout parts".to_string()))
}

/// Next free layout part name: one past the highest numeric suffix among
/// existing layouts. Gap-tolerant; numbers freed by deletion are not reused.
fn next_layout_part(pkg: &OpcPackage) -> String {
    let mut max = 0u32;
    for part in layout_parts(pkg) {
        if partname::basename(&part).starts_with("slideLayout") {
            if let Some(number) = partname::numeric_suffix(&part) {
                max = max.max(number);
            }
        }
    }
    format!("{}slideLayout{}.xml", SLIDE_LAYOUTS_DIR, max + 1)
}

/// Collect the relationship ids a document body references through
/// `r:embed`, `r:link`, or `r:id` attributes.
fn body_rel_ids(body: &[u8]) -> Result<HashSet<String>> {
    let mut ids = HashSet::new();
    let mut reader = Reader::from_reader(body);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(ref e) | Event::Empty(ref e) => {
                for attr in e.attributes() {
                    let attr = attr?;
                    if attr.key.prefix().is_some()
                        && matches!(attr.key.local_name().as_ref(), b"embed" | b"link" | b"id")
                    {
                        let value = attr.unescape_value()?;
                        if !value.is_empty() {
                            ids.insert(value.to_string());
                        }
                    }
                }
            },
            Event::Eof => break,
            _ => {},
        }
        buf.clear();
    }
    Ok(ids)
}

fn remove_layout_from_masters(pkg: &mut OpcPackage, layout_part: &str) -> Result<usize> {
    let mut updated = 0;
    for master_part in master_parts(pkg) {
        let rels = relationships_of(pkg, &master_part)?;
        if rels.is_empty() {
            continue;
        }

        let mut removed_ids = HashSet::new();
        let mut kept = Relationships::new();
        for rel in rels.iter() {
            if is_layout_rel(rel)
                && !rel.is_external()
                && partname::resolve_target(&master_part, &rel.target) == layout_part
            {
                removed_ids.insert(rel.id.clone());
            } else {
                kept.push(rel.clone());
            }
        }
        if removed_ids.is_empty() {
            continue;
        }

        write_relationships(pkg, &master_part, &kept);
        let master_xml = remove_layout_id_entries(pkg.read(&master_part)?, &removed_ids)?;
        pkg.write(&master_part, master_xml);
        updated += 1;
    }
    Ok(updated)
}

/// Compute the canonical rename map, masters in sorted order, numbering
/// continuing across masters. A layout claimed twice necessarily lands on
/// two different names, which is an inconsistency.
fn build_layout_reindex_map(pkg: &OpcPackage) -> Result<BTreeMap<String, String>> {
    if layout_parts(pkg).is_empty() {
        return Ok(BTreeMap::new());
    }

    let mut mapping = BTreeMap::new();
    let mut next = 1usize;
    for master_part in master_parts(pkg) {
        for layout in master_layout_order(pkg, &master_part)? {
            let new_name = format!("{}slideLayout{}.xml", SLIDE_LAYOUTS_DIR, next);
            if let Some(existing) = mapping.get(&layout) {
                return Err(Error::Inconsistent(format!(
                    "layout {} already mapped to {}",
                    layout, existing
                )));
            }
            mapping.insert(layout, new_name);
            next += 1;
        }
    }
    Ok(mapping)
}

/// Two-phase rename: every changing part (and sidecar) moves to a unique
/// temporary name first, so a destination that is another rename's source
/// never collides; the second pass lands the final names and moves the
/// content-type Overrides.
fn rename_layout_parts(pkg: &mut OpcPackage, mapping: &BTreeMap<String, String>) -> Result<()> {
    let mut temp_names: BTreeMap<String, String> = BTreeMap::new();
    let mut counter = 1usize;
    for (old, new) in mapping {
        if old == new {
            continue;
        }
        let mut temp = format!("{}_tmpLayout{}.xml", SLIDE_LAYOUTS_DIR, counter);
        while pkg.has(&temp) || temp_names.values().any(|existing| existing == &temp) {
            counter += 1;
            temp = format!("{}_tmpLayout{}.xml", SLIDE_LAYOUTS_DIR, counter);
        }
        temp_names.insert(old.clone(), temp);
        counter += 1;
    }

    for (old, temp) in &temp_names {
        let data = pkg.read(old)?.to_vec();
        pkg.write(temp, data);
        pkg.delete(old);

        let old_rels = partname::rels_part_for(old);
        if pkg.has(&old_rels) {
            let data = pkg.read(&old_rels)?.to_vec();
            pkg.write(&partname::rels_part_for(temp), data);
            pkg.delete(&old_rels);
        }
        remove_override(pkg, old)?;
    }

    for (old, new) in mapping {
        if old == new {
            ensure_override(pkg, new, content_type::PML_SLIDE_LAYOUT)?;
            continue;
        }
        let temp = &temp_names[old];
        let data = pkg.read(temp)?.to_vec();
        pkg.write(new, data);
        pkg.delete(temp);

        let temp_rels = partname::rels_part_for(temp);
        if pkg.has(&temp_rels) {
            let data = pkg.read(&temp_rels)?.to_vec();
            pkg.write(&partname::rels_part_for(new), data);
            pkg.delete(&temp_rels);
        }
        ensure_override(pkg, new, content_type::PML_SLIDE_LAYOUT)?;
    }
    Ok(())
}

fn update_slide_layout_targets(
    pkg: &mut OpcPackage,
    mapping: &BTreeMap<String, String>,
) -> Result<usize> {
    let mut updated = 0;
    for slide_part in slide_parts_in_order(pkg)? {
        let mut rels = relationships_of(pkg, &slide_part)?;
        if rels.is_empty() {
            continue;
        }
        let mut changed = false;
        for rel in rels.iter_mut() {
            if !rel.rel_type.ends_with("/slideLayout") || rel.is_external() {
                continue;
            }
            let resolved = partname::resolve_target(&slide_part, &rel.target);
            if let Some(new_part) = mapping.get(&resolved) {
                let new_target = partname::relative_ref(&slide_part, new_part);
                if rel.target != new_target {
                    rel.target = new_target;
                    changed = true;
                }
            }
        }
        if changed {
            write_relationships(pkg, &slide_part, &rels);
            updated += 1;
        }
    }
    Ok(updated)
}

/// Rebuild each master's slideLayout relationships in layout-id-list order
/// with a fresh contiguous rId sequence, skipping ids its non-layout
/// relationships already hold, and rebind the list entries to match.
fn rebuild_master_layout_rels(
    pkg: &mut OpcPackage,
    mapping: &BTreeMap<String, String>,
) -> Result<usize> {
    let mut updated = 0;
    for master_part in master_parts(pkg) {
        let order = master_layout_order(pkg, &master_part)?;
        if order.is_empty() {
            continue;
        }

        let rels = relationships_of(pkg, &master_part)?;
        let mut rebuilt = Relationships::new();
        let mut used: HashSet<String> = HashSet::new();
        for rel in rels.iter() {
            if !is_layout_rel(rel) {
                used.insert(rel.id.clone());
                rebuilt.push(rel.clone());
            }
        }

        let mut new_ids = Vec::with_capacity(order.len());
        let mut next_index = 1usize;
        for layout in &order {
            let new_part = mapping.get(layout).unwrap_or(layout);
            while used.contains(&format!("rId{}", next_index)) {
                next_index += 1;
            }
            let id = format!("rId{}", next_index);
            used.insert(id.clone());
            next_index += 1;

            let target = partname::relative_ref(&master_part, new_part);
            rebuilt.push(Relationship::new(
                id.clone(),
                relationship_type::SLIDE_LAYOUT,
                target,
            ));
            new_ids.push(id);
        }

        write_relationships(pkg, &master_part, &rebuilt);
        let master_xml = rebind_layout_id_entries(pkg.read(&master_part)?, &new_ids)?;
        pkg.write(&master_part, master_xml);
        updated += 1;
    }
    Ok(updated)
}

fn qualified(prefix: Option<Prefix<'_>>, local: &str) -> String {
    match prefix {
        Some(p) => format!("{}:{}", String::from_utf8_lossy(p.as_ref()), local),
        None => local.to_string(),
    }
}

fn layout_id_entry(prefix: Option<Prefix<'_>>, id: u64, rel_id: &str) -> BytesStart<'static> {
    let mut entry = BytesStart::new(qualified(prefix, "sldLayoutId"));
    entry.push_attribute(("id", id.to_string().as_str()));
    entry.push_attribute(("r:id", rel_id));
    entry
}

/// Append a layout-id entry to a master document.
///
/// The numeric id is one past the current maximum, 256 when the list was
/// empty; a missing `sldLayoutIdLst` is created at the end of the root.
fn append_layout_id_entry(master_xml: &[u8], rel_id: &str) -> Result<Vec<u8>> {
    let mut max_id = 0u64;
    let mut has_list = false;
    {
        let mut reader = Reader::from_reader(master_xml);
        let mut buf = Vec::new();
        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Start(ref e) | Event::Empty(ref e) => match e.local_name().as_ref() {
                    b"sldLayoutIdLst" => has_list = true,
                    b"sldLayoutId" => {
                        for attr in e.attributes() {
                            let attr = attr?;
                            if attr.key.as_ref() == b"id" {
                                if let Ok(value) = atoi_simd::parse::<u64, false, false>(&attr.value) {
                                    max_id = max_id.max(value);
                                }
                            }
                        }
                    },
                    _ => {},
                },
                Event::Eof => break,
                _ => {},
            }
            buf.clear();
        }
    }
    let new_id = if max_id > 0 { max_id + 1 } else { 256 };

    let mut reader = Reader::from_reader(master_xml);
    let mut writer = Writer::new(Cursor::new(Vec::new()));
    let mut buf = Vec::new();
    let mut depth = 0usize;
    let mut inserted = false;
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(ref e) => {
                depth += 1;
                writer.write_event(Event::Start(e.to_owned()))?;
            },
            Event::Empty(ref e) if !inserted && e.local_name().as_ref() == b"sldLayoutIdLst" => {
                // Expand the self-closing list around the new entry
                let tag = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                let prefix = e.name().prefix();
                let entry = layout_id_entry(prefix, new_id, rel_id);
                writer.write_event(Event::Start(e.to_owned()))?;
                writer.write_event(Event::Empty(entry))?;
                writer.write_event(Event::End(BytesEnd::new(tag)))?;
                inserted = true;
            },
            Event::Empty(ref e) if !inserted && depth == 0 && !has_list => {
                // Childless root; expand it around a fresh list
                let tag = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                let prefix = e.name().prefix();
                let list = qualified(prefix, "sldLayoutIdLst");
                let entry = layout_id_entry(prefix, new_id, rel_id);
                writer.write_event(Event::Start(e.to_owned()))?;
                writer.write_event(Event::Start(BytesStart::new(list.clone())))?;
                writer.write_event(Event::Empty(entry))?;
                writer.write_event(Event::End(BytesEnd::new(list)))?;
                writer.write_event(Event::End(BytesEnd::new(tag)))?;
                inserted = true;
            },
            Event::End(ref e) => {
                depth -= 1;
                if !inserted && e.local_name().as_ref() == b"sldLayoutIdLst" {
                    let entry = layout_id_entry(e.name().prefix(), new_id, rel_id);
                    writer.write_event(Event::Empty(entry))?;
                    inserted = true;
                } else if !inserted && depth == 0 && !has_list {
                    let prefix = e.name().prefix();
                    let list = qualified(prefix, "sldLayoutIdLst");
                    let entry = layout_id_entry(prefix, new_id, rel_id);
                    writer.write_event(Event::Start(BytesStart::new(list.clone())))?;
                    writer.write_event(Event::Empty(entry))?;
                    writer.write_event(Event::End(BytesEnd::new(list)))?;
                    inserted = true;
                }
                writer.write_event(Event::End(e.to_owned()))?;
            },
            Event::Eof => break,
            event => writer.write_event(event)?,
        }
        buf.clear();
    }
    Ok(writer.into_inner().into_inner())
}

/// Drop layout-id entries bound to any of the given relationship ids.
fn remove_layout_id_entries(master_xml: &[u8], removed: &HashSet<String>) -> Result<Vec<u8>> {
    let mut reader = Reader::from_reader(master_xml);
    let mut writer = Writer::new(Cursor::new(Vec::new()));
    let mut buf = Vec::new();
    loop {
        let event = reader.read_event_into(&mut buf)?;
        match event {
            Event::Empty(ref e) if e.local_name().as_ref() == b"sldLayoutId" => {
                let dropped = r_id_attr(e)?.is_some_and(|id| removed.contains(&id));
                if !dropped {
                    writer.write_event(event)?;
                }
            },
            Event::Start(ref e) if e.local_name().as_ref() == b"sldLayoutId" => {
                let dropped = r_id_attr(e)?.is_some_and(|id| removed.contains(&id));
                if !dropped {
                    writer.write_event(event)?;
                } else {
                    // skip everything up to the matching end tag
                    let mut depth = 1usize;
                    loop {
                        buf.clear();
                        match reader.read_event_into(&mut buf)? {
                            Event::Start(ref inner)
                                if inner.local_name().as_ref() == b"sldLayoutId" =>
                            {
                                depth += 1;
                            },
                            Event::End(ref inner)
                                if inner.local_name().as_ref() == b"sldLayoutId" =>
                            {
                                depth -= 1;
                                if depth == 0 {
                                    break;
                                }
                            },
                            Event::Eof => {
                                return Err(
                                    OpcError::XmlError("Unclosed sldLayoutId".to_string()).into()
                                );
                            },
                            _ => {},
                        }
                    }
                }
            },
            Event::Eof => break,
            event => writer.write_event(event)?,
        }
        buf.clear();
    }
    Ok(writer.into_inner().into_inner())
}

/// Rebind layout-id entries to the given relationship ids, in list order.
fn rebind_layout_id_entries(master_xml: &[u8], ids: &[String]) -> Result<Vec<u8>> {
    let mut reader = Reader::from_reader(master_xml);
    let mut writer = Writer::new(Cursor::new(Vec::new()));
    let mut buf = Vec::new();
    let mut index = 0usize;
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Empty(ref e)
                if e.local_name().as_ref() == b"sldLayoutId" && index < ids.len() =>
            {
                writer.write_event(Event::Empty(with_attr(e, "r:id", &ids[index])?))?;
                index += 1;
            },
            Event::Start(ref e)
                if e.local_name().as_ref() == b"sldLayoutId" && index < ids.len() =>
            {
                writer.write_event(Event::Start(with_attr(e, "r:id", &ids[index])?))?;
                index += 1;
            },
            Event::Eof => break,
            event => writer.write_event(event)?,
        }
        buf.clear();
    }
    Ok(writer.into_inner().into_inner())
}

/// Highest shape id in the document plus one.
fn next_shape_id(xml: &[u8]) -> Result<u64> {
    let mut max = 0u64;
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(ref e) | Event::Empty(ref e) if e.local_name().as_ref() == b"cNvPr" => {
                for attr in e.attributes() {
                    let attr = attr?;
                    if attr.key.as_ref() == b"id" {
                        if let Ok(value) = atoi_simd::parse::<u64, false, false>(&attr.value) {
                            max = max.max(value);
                        }
                    }
                }
            },
            Event::Eof => break,
            _ => {},
        }
        buf.clear();
    }
    Ok(max + 1)
}
