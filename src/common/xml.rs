//! Streaming XML helpers.
//!
//! Document rewrites in this crate never build a DOM: edits are expressed
//! either as byte-range splices (locate an element's span, replace the
//! bytes) or as event pipelines (read events, transform, write through).
//! Both keep untouched regions of the document byte-identical, which the
//! topology operations rely on for idempotence.

use std::io::Cursor;
use std::ops::Range;

use quick_xml::events::attributes::Attribute;
use quick_xml::events::{BytesStart, Event};
use quick_xml::{Reader, Writer};

use crate::opc::error::{OpcError, Result};

/// Escape XML special characters.
pub(crate) fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

/// Find the byte span of the first element with the given local name.
///
/// The span covers the whole element, from the opening `<` through the
/// closing `>` (or the end of a self-closing tag). `None` when the document
/// has no such element.
pub(crate) fn element_span(xml: &[u8], local: &[u8]) -> Result<Option<Range<usize>>> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();

    loop {
        let pos = reader.buffer_position() as usize;
        match reader.read_event_into(&mut buf)? {
            Event::Empty(ref e) if e.local_name().as_ref() == local => {
                return Ok(Some(pos..reader.buffer_position() as usize));
            },
            Event::Start(ref e) if e.local_name().as_ref() == local => {
                let mut depth = 1usize;
                loop {
                    buf.clear();
                    match reader.read_event_into(&mut buf)? {
                        Event::Start(ref inner) if inner.local_name().as_ref() == local => {
                            depth += 1;
                        },
                        Event::End(ref inner) if inner.local_name().as_ref() == local => {
                            depth -= 1;
                            if depth == 0 {
                                return Ok(Some(pos..reader.buffer_position() as usize));
                            }
                        },
                        Event::Eof => {
                            return Err(OpcError::XmlError(format!(
                                "Unclosed element: {}",
                                String::from_utf8_lossy(local)
                            )));
                        },
                        _ => {},
                    }
                }
            },
            Event::Eof => return Ok(None),
            _ => {},
        }
        buf.clear();
    }
}

/// Replace the bytes of `span` with `replacement`.
pub(crate) fn splice(xml: &[u8], span: Range<usize>, replacement: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(xml.len() - span.len() + replacement.len());
    out.extend_from_slice(&xml[..span.start]);
    out.extend_from_slice(replacement);
    out.extend_from_slice(&xml[span.end..]);
    out
}

/// Set an attribute on the document's root element, replacing any existing
/// value. Everything else in the document passes through unchanged.
pub(crate) fn set_root_attr(xml: &[u8], name: &str, value: &str) -> Result<Vec<u8>> {
    let mut reader = Reader::from_reader(xml);
    let mut writer = Writer::new(Cursor::new(Vec::new()));
    let mut buf = Vec::new();
    let mut seen_root = false;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(ref e) if !seen_root => {
                seen_root = true;
                writer.write_event(Event::Start(with_attr(e, name, value)?))?;
            },
            Event::Empty(ref e) if !seen_root => {
                seen_root = true;
                writer.write_event(Event::Empty(with_attr(e, name, value)?))?;
            },
            Event::Eof => break,
            event => writer.write_event(event)?,
        }
        buf.clear();
    }

    Ok(writer.into_inner().into_inner())
}

/// Byte offset just past the `>` that closes the start tag beginning at
/// `from`. Quote-aware, so `>` inside attribute values is skipped.
pub(crate) fn start_tag_end(xml: &[u8], from: usize) -> Option<usize> {
    let mut quote: Option<u8> = None;
    for (offset, &byte) in xml[from..].iter().enumerate() {
        match quote {
            Some(q) if byte == q => quote = None,
            Some(_) => {},
            None => match byte {
                b'"' | b'\'' => quote = Some(byte),
                b'>' => return Some(from + offset + 1),
                _ => {},
            },
        }
    }
    None
}

/// Byte offset of the closing tag (`</…>`) of the element covering `span`.
/// `None` when the element is self-closing.
pub(crate) fn end_tag_start(xml: &[u8], span: &Range<usize>) -> Option<usize> {
    let slice = &xml[span.clone()];
    let pos = slice.windows(2).rposition(|pair| pair == b"</")?;
    Some(span.start + pos)
}

/// The qualified tag name of the element starting at the head of `element`.
pub(crate) fn element_qname(element: &[u8]) -> Option<String> {
    if element.first() != Some(&b'<') {
        return None;
    }
    let rest = &element[1..];
    let end = rest
        .iter()
        .position(|&b| b == b'>' || b == b'/' || b.is_ascii_whitespace())?;
    if end == 0 {
        return None;
    }
    Some(String::from_utf8_lossy(&rest[..end]).into_owned())
}

/// Read an attribute from the first element with the given local name.
pub(crate) fn element_attr(xml: &[u8], local: &[u8], name: &[u8]) -> Result<Option<String>> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(ref e) | Event::Empty(ref e) if e.local_name().as_ref() == local => {
                for attr in e.attributes() {
                    let attr = attr?;
                    if attr.key.as_ref() == name {
                        return Ok(Some(attr.unescape_value()?.to_string()));
                    }
                }
                return Ok(None);
            },
            Event::Eof => return Ok(None),
            _ => {},
        }
        buf.clear();
    }
}

/// Read an attribute from the document's root element.
pub(crate) fn root_attr(xml: &[u8], name: &str) -> Result<Option<String>> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(ref e) | Event::Empty(ref e) => {
                for attr in e.attributes() {
                    let attr = attr?;
                    if attr.key.as_ref() == name.as_bytes() {
                        return Ok(Some(attr.unescape_value()?.to_string()));
                    }
                }
                return Ok(None);
            },
            Event::Eof => return Ok(None),
            _ => {},
        }
        buf.clear();
    }
}

/// Rebuild a start tag with one attribute replaced or appended.
pub(crate) fn with_attr(e: &BytesStart, name: &str, value: &str) -> Result<BytesStart<'static>> {
    let tag = String::from_utf8_lossy(e.name().as_ref()).into_owned();
    let mut out = BytesStart::new(tag);
    for attr in e.attributes() {
        let attr = attr?;
        if attr.key.as_ref() != name.as_bytes() {
            out.push_attribute(Attribute {
                key: attr.key,
                value: attr.value.clone(),
            });
        }
    }
    out.push_attribute((name, value));
    Ok(out)
}
