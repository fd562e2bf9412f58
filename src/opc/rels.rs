//! Relationship-related objects for OPC packages.
//!
//! Each part's relationships live in a sidecar part (`_rels/<name>.rels`)
//! next to the source part; the sidecars are the authoritative store, and
//! every operation here reads and rewrites them in place. Relationship
//! order within a sidecar is preserved, so rewriting without a change is
//! byte-stable.

use quick_xml::Reader;
use quick_xml::events::Event;
use smallvec::SmallVec;

use crate::common::xml::escape_xml;
use crate::opc::constants::{namespace, target_mode};
use crate::opc::error::Result;
use crate::opc::package::OpcPackage;
use crate::opc::partname;

/// A single relationship from a source part to a target.
///
/// Identified by an rId unique within the source part's relationship set.
/// Internal relationships target another part, by a reference relative to
/// the source part's directory or absolute with a leading slash; External
/// relationships target an outside resource and are never resolved against
/// the package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relationship {
    /// Relationship ID (e.g., "rId1", "rId2")
    pub id: String,

    /// Relationship type URI
    pub rel_type: String,

    /// Target reference - a part reference or external URL
    pub target: String,

    /// Target mode; `None` means Internal
    pub target_mode: Option<String>,
}

impl Relationship {
    /// Create a new internal relationship.
    pub fn new(id: impl Into<String>, rel_type: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            rel_type: rel_type.into(),
            target: target.into(),
            target_mode: None,
        }
    }

    /// Check if this is an external relationship.
    #[inline]
    pub fn is_external(&self) -> bool {
        self.target_mode.as_deref() == Some(target_mode::EXTERNAL)
    }
}

/// Ordered collection of relationships from a single source part.
#[derive(Debug, Default, Clone)]
pub struct Relationships {
    /// Relationships in sidecar document order
    rels: SmallVec<[Relationship; 8]>,
}

impl Relationships {
    /// Create a new empty relationships collection.
    pub fn new() -> Self {
        Self { rels: SmallVec::new() }
    }

    /// Parse a relationships sidecar document.
    pub fn from_xml(xml: &[u8]) -> Result<Self> {
        let mut rels = SmallVec::new();
        let mut reader = Reader::from_reader(xml);
        reader.config_mut().trim_text(true);

        let mut buf = Vec::new();
        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Empty(ref e) | Event::Start(ref e)
                    if e.local_name().as_ref() == b"Relationship" =>
                {
                    let mut id = None;
                    let mut rel_type = None;
                    let mut target = None;
                    let mut mode = None;

                    for attr in e.attributes() {
                        let attr = attr?;
                        match attr.key.as_ref() {
                            b"Id" => id = Some(attr.unescape_value()?.to_string()),
                            b"Type" => rel_type = Some(attr.unescape_value()?.to_string()),
                            b"Target" => target = Some(attr.unescape_value()?.to_string()),
                            b"TargetMode" => mode = Some(attr.unescape_value()?.to_string()),
                            _ => {},
                        }
                    }

                    if let (Some(id), Some(rel_type), Some(target)) = (id, rel_type, target) {
                        rels.push(Relationship {
                            id,
                            rel_type,
                            target,
                            target_mode: mode,
                        });
                    }
                },
                Event::Eof => break,
                _ => {},
            }
            buf.clear();
        }

        Ok(Self { rels })
    }

    /// Serialize to sidecar XML, preserving relationship order.
    pub fn to_xml(&self) -> Vec<u8> {
        let mut xml = String::with_capacity(256 + self.rels.len() * 128);

        xml.push_str(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#);
        xml.push('\n');
        xml.push_str(&format!(
            r#"<Relationships xmlns="{}">"#,
            namespace::OPC_RELATIONSHIPS
        ));
        xml.push('\n');

        for rel in &self.rels {
            let mode = match &rel.target_mode {
                Some(mode) => format!(r#" TargetMode="{}""#, escape_xml(mode)),
                None => String::new(),
            };
            xml.push_str(&format!(
                r#"  <Relationship Id="{}" Type="{}" Target="{}"{}/>"#,
                escape_xml(&rel.id),
                escape_xml(&rel.rel_type),
                escape_xml(&rel.target),
                mode
            ));
            xml.push('\n');
        }

        xml.push_str("</Relationships>");
        xml.into_bytes()
    }

    /// Get a relationship by its ID.
    #[inline]
    pub fn get(&self, id: &str) -> Option<&Relationship> {
        self.rels.iter().find(|rel| rel.id == id)
    }

    /// Get the first relationship of a given type.
    #[inline]
    pub fn first_of_type(&self, rel_type: &str) -> Option<&Relationship> {
        self.rels.iter().find(|rel| rel.rel_type == rel_type)
    }

    /// Get an iterator over all relationships, in sidecar order.
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &Relationship> {
        self.rels.iter()
    }

    /// Get a mutable iterator over all relationships.
    #[inline]
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Relationship> {
        self.rels.iter_mut()
    }

    /// Get the number of relationships in the collection.
    #[inline]
    pub fn len(&self) -> usize {
        self.rels.len()
    }

    /// Check if the collection is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rels.is_empty()
    }

    /// Append a relationship.
    pub fn push(&mut self, rel: Relationship) {
        self.rels.push(rel);
    }

    /// Keep only the relationships matching the predicate.
    pub fn retain<F: FnMut(&Relationship) -> bool>(&mut self, mut f: F) {
        self.rels.retain(|rel| f(rel));
    }

    /// Get or add an internal relationship for `(rel_type, target)`.
    ///
    /// Idempotent: when a relationship with the same type and target already
    /// exists it is returned unchanged. Otherwise a new relationship is
    /// appended under the next free rId.
    ///
    /// # Returns
    /// The relationship and whether it was newly created.
    pub fn get_or_add(&mut self, rel_type: &str, target: &str) -> (&Relationship, bool) {
        if let Some(pos) = self
            .rels
            .iter()
            .position(|rel| rel.rel_type == rel_type && rel.target == target && !rel.is_external())
        {
            return (&self.rels[pos], false);
        }

        let id = self.next_rid();
        self.rels.push(Relationship::new(id, rel_type, target));
        (self.rels.last().expect("just pushed"), true)
    }

    /// Get the smallest unused relationship ID of the form `rId<N>`, N >= 1.
    ///
    /// Recomputed from the current set on every call, so ids freed by
    /// removals become available again.
    pub fn next_rid(&self) -> String {
        let mut used: Vec<u32> = self
            .rels
            .iter()
            .filter_map(|rel| rid_number(&rel.id))
            .collect();
        used.sort_unstable();

        let mut next = 1u32;
        for num in used {
            match num.cmp(&next) {
                std::cmp::Ordering::Equal => next += 1,
                std::cmp::Ordering::Greater => break,
                std::cmp::Ordering::Less => {},
            }
        }
        format!("rId{}", next)
    }
}

/// Extract the numeric suffix of an `rId<N>` identifier.
pub(crate) fn rid_number(id: &str) -> Option<u32> {
    let digits = id.strip_prefix("rId")?;
    atoi_simd::parse::<u32, false, false>(digits.as_bytes()).ok()
}

/// Load a part's relationships from its sidecar.
///
/// Empty when no sidecar part exists.
pub fn relationships_of(pkg: &OpcPackage, source_part: &str) -> Result<Relationships> {
    let rels_part = partname::rels_part_for(source_part);
    if !pkg.has(&rels_part) {
        return Ok(Relationships::new());
    }
    Relationships::from_xml(pkg.read(&rels_part)?)
}

/// Replace a part's sidecar contents wholesale.
pub fn write_relationships(pkg: &mut OpcPackage, source_part: &str, rels: &Relationships) {
    let rels_part = partname::rels_part_for(source_part);
    pkg.write(&rels_part, rels.to_xml());
}

/// Ensure an internal relationship exists from `source_part` to `target`.
///
/// Returns the existing relationship when one with the same `(type, target)`
/// is already present; otherwise appends one under the smallest free rId and
/// persists the sidecar immediately.
pub fn ensure_relationship(
    pkg: &mut OpcPackage,
    source_part: &str,
    rel_type: &str,
    target: &str,
) -> Result<Relationship> {
    let mut rels = relationships_of(pkg, source_part)?;
    let (rel, created) = rels.get_or_add(rel_type, target);
    let rel = rel.clone();
    if created {
        write_relationships(pkg, source_part, &rels);
    }
    Ok(rel)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opc::constants::relationship_type;

    const SAMPLE: &[u8] = br#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
  <Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/slideLayout" Target="../slideLayouts/slideLayout1.xml"/>
  <Relationship Id="rId3" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/hyperlink" Target="https://example.com/" TargetMode="External"/>
</Relationships>"#;

    #[test]
    fn test_parse_relationships() {
        let rels = Relationships::from_xml(SAMPLE).unwrap();
        assert_eq!(rels.len(), 2);

        let layout = rels.get("rId1").unwrap();
        assert_eq!(layout.rel_type, relationship_type::SLIDE_LAYOUT);
        assert_eq!(layout.target, "../slideLayouts/slideLayout1.xml");
        assert!(!layout.is_external());

        let link = rels.get("rId3").unwrap();
        assert!(link.is_external());
    }

    #[test]
    fn test_serialize_round_trip() {
        let rels = Relationships::from_xml(SAMPLE).unwrap();
        let xml = rels.to_xml();
        let reparsed = Relationships::from_xml(&xml).unwrap();
        assert_eq!(
            rels.iter().collect::<Vec<_>>(),
            reparsed.iter().collect::<Vec<_>>()
        );
        // Serialization is deterministic
        assert_eq!(xml, reparsed.to_xml());
    }

    #[test]
    fn test_next_rid_fills_gaps() {
        let rels = Relationships::from_xml(SAMPLE).unwrap();
        // rId1 and rId3 are taken; rId2 is the smallest free id
        assert_eq!(rels.next_rid(), "rId2");

        let empty = Relationships::new();
        assert_eq!(empty.next_rid(), "rId1");
    }

    #[test]
    fn test_get_or_add_idempotent() {
        let mut rels = Relationships::new();

        let (first, created) = rels.get_or_add("type1", "target1");
        assert!(created);
        let first_id = first.id.clone();
        assert_eq!(first_id, "rId1");

        let (again, created) = rels.get_or_add("type1", "target1");
        assert!(!created);
        assert_eq!(again.id, first_id);
        assert_eq!(rels.len(), 1);

        let (other, created) = rels.get_or_add("type1", "target2");
        assert!(created);
        assert_eq!(other.id, "rId2");
    }

    #[test]
    fn test_ids_stay_distinct() {
        let mut rels = Relationships::from_xml(SAMPLE).unwrap();
        for i in 0..10 {
            rels.get_or_add("type", &format!("target{}", i));
        }
        let mut ids: Vec<&str> = rels.iter().map(|rel| rel.id.as_str()).collect();
        let total = ids.len();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), total);
    }

    #[test]
    fn test_ensure_relationship_persists_sidecar() {
        let mut pkg = OpcPackage::new();
        pkg.write("ppt/slides/slide1.xml", b"<p:sld/>".to_vec());

        let rel = ensure_relationship(
            &mut pkg,
            "ppt/slides/slide1.xml",
            relationship_type::SLIDE_LAYOUT,
            "../slideLayouts/slideLayout1.xml",
        )
        .unwrap();
        assert_eq!(rel.id, "rId1");
        assert!(pkg.has("ppt/slides/_rels/slide1.xml.rels"));

        // A second call returns the same relationship without growing the set
        let again = ensure_relationship(
            &mut pkg,
            "ppt/slides/slide1.xml",
            relationship_type::SLIDE_LAYOUT,
            "../slideLayouts/slideLayout1.xml",
        )
        .unwrap();
        assert_eq!(again, rel);
        let rels = relationships_of(&pkg, "ppt/slides/slide1.xml").unwrap();
        assert_eq!(rels.len(), 1);
    }

    #[test]
    fn test_missing_sidecar_is_empty() {
        let pkg = OpcPackage::new();
        let rels = relationships_of(&pkg, "ppt/slides/slide1.xml").unwrap();
        assert!(rels.is_empty());
    }
}
