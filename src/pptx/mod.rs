//! PresentationML layer.
//!
//! Presentation topology built on the OPC components: slide enumeration,
//! layout creation and reassignment, pruning, reindexing, plus the
//! boundary collaborators (theme access, media insertion, auditing,
//! validation).

pub mod audit;
pub mod auto;
pub mod layout;
pub mod media;
pub mod slides;
pub mod theme;
pub mod validate;

use quick_xml::events::BytesStart;

use crate::opc::error::Result as OpcResult;

/// Read the relationship-id attribute (`r:id`) from an element.
///
/// Matched by local name with a required namespace prefix, so the plain
/// `id` attribute that commonly sits next to it is never confused with it.
pub(crate) fn r_id_attr(e: &BytesStart) -> OpcResult<Option<String>> {
    for attr in e.attributes() {
        let attr = attr?;
        if attr.key.prefix().is_some() && attr.key.local_name().as_ref() == b"id" {
            return Ok(Some(attr.unescape_value()?.to_string()));
        }
    }
    Ok(None)
}
