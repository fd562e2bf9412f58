//! Theme part access.
//!
//! Read and write the color-scheme slots, font-scheme slots, and names of
//! a theme document. Edits rewrite only the elements they touch; the rest
//! of the document passes through byte-identical.

use std::collections::BTreeMap;
use std::io::Cursor;

use quick_xml::events::{BytesStart, Event};
use quick_xml::{Reader, Writer};
use serde::Serialize;

use crate::common::xml::{
    element_qname, element_span, end_tag_start, set_root_attr, splice, with_attr,
};
use crate::error::{Error, Result};
use crate::opc::package::OpcPackage;

/// The twelve color-scheme slots, in scheme order.
pub const COLOR_SLOTS: [&str; 12] = [
    "dk1", "lt1", "dk2", "lt2", "accent1", "accent2", "accent3", "accent4", "accent5", "accent6",
    "hlink", "folHlink",
];

/// Typefaces of one font-scheme slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ThemeFontSpec {
    pub latin: String,
    pub east_asian: Option<String>,
    pub complex_script: Option<String>,
}

/// A theme document held as bytes, edited in place.
pub struct Theme {
    xml: Vec<u8>,
}

impl Theme {
    /// Wrap theme bytes, verifying the color and font schemes are present.
    pub fn from_bytes(xml: Vec<u8>) -> Result<Self> {
        if element_span(&xml, b"clrScheme")?.is_none() {
            return Err(Error::Inconsistent("theme is missing clrScheme".to_string()));
        }
        if element_span(&xml, b"fontScheme")?.is_none() {
            return Err(Error::Inconsistent("theme is missing fontScheme".to_string()));
        }
        Ok(Self { xml })
    }

    /// Load the theme from a package part.
    pub fn from_part(pkg: &OpcPackage, part: &str) -> Result<Self> {
        Self::from_bytes(pkg.read(part)?.to_vec())
    }

    /// The current document bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.xml
    }

    /// Consume the theme and return the document bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.xml
    }

    /// The theme's display name.
    pub fn name(&self) -> Result<Option<String>> {
        Ok(crate::common::xml::root_attr(&self.xml, "name")?)
    }

    /// Set the theme's display name.
    pub fn set_name(&mut self, value: &str) -> Result<()> {
        self.xml = set_root_attr(&self.xml, "name", value)?;
        Ok(())
    }

    /// The color scheme's name.
    pub fn color_scheme_name(&self) -> Result<Option<String>> {
        self.element_attr(b"clrScheme", b"name")
    }

    /// Set the color scheme's name.
    pub fn set_color_scheme_name(&mut self, value: &str) -> Result<()> {
        self.xml = set_element_attr(&self.xml, b"clrScheme", "name", value)?;
        Ok(())
    }

    /// The font scheme's name.
    pub fn font_scheme_name(&self) -> Result<Option<String>> {
        self.element_attr(b"fontScheme", b"name")
    }

    /// Set the font scheme's name.
    pub fn set_font_scheme_name(&mut self, value: &str) -> Result<()> {
        self.xml = set_element_attr(&self.xml, b"fontScheme", "name", value)?;
        Ok(())
    }

    /// Read a color slot as `#RRGGBB`.
    ///
    /// Reads `srgbClr@val`, falling back to `sysClr@lastClr`. `None` when
    /// the slot is absent or carries neither.
    pub fn color(&self, slot: &str) -> Result<Option<String>> {
        let Some(span) = element_span(&self.xml, slot.as_bytes())? else {
            return Ok(None);
        };
        let fragment = &self.xml[span];

        let mut reader = Reader::from_reader(fragment);
        let mut buf = Vec::new();
        let mut sys_fallback = None;
        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Start(ref e) | Event::Empty(ref e) => match e.local_name().as_ref() {
                    b"srgbClr" => {
                        for attr in e.attributes() {
                            let attr = attr?;
                            if attr.key.as_ref() == b"val" {
                                let value = attr.unescape_value()?;
                                if !value.is_empty() {
                                    return Ok(Some(format!("#{}", value.to_uppercase())));
                                }
                            }
                        }
                    },
                    b"sysClr" if sys_fallback.is_none() => {
                        for attr in e.attributes() {
                            let attr = attr?;
                            if attr.key.as_ref() == b"lastClr" {
                                let value = attr.unescape_value()?;
                                if !value.is_empty() {
                                    sys_fallback = Some(format!("#{}", value.to_uppercase()));
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
        Ok(sys_fallback)
    }

    /// All twelve color slots, in scheme order.
    pub fn colors(&self) -> Result<BTreeMap<String, Option<String>>> {
        let mut map = BTreeMap::new();
        for slot in COLOR_SLOTS {
            map.insert(slot.to_string(), self.color(slot)?);
        }
        Ok(map)
    }

    /// Set a color slot to an sRGB value.
    ///
    /// Accepts `RRGGBB` with an optional leading `#`; stored uppercase.
    /// The slot's children are replaced; an absent slot is created at the
    /// end of the color scheme.
    pub fn set_color(&mut self, slot: &str, value: &str) -> Result<()> {
        let hex = normalize_hex(value)?;

        if let Some(span) = element_span(&self.xml, slot.as_bytes())? {
            let qname = element_qname(&self.xml[span.clone()])
                .ok_or_else(|| Error::Inconsistent(format!("malformed {} slot", slot)))?;
            let srgb_tag = sibling_qname(&qname, "srgbClr");
            let replacement =
                format!(r#"<{qname}><{srgb_tag} val="{hex}"/></{qname}>"#);
            self.xml = splice(&self.xml, span, replacement.as_bytes());
            return Ok(());
        }

        // Slot absent; append it inside the color scheme
        let scheme_span = element_span(&self.xml, b"clrScheme")?
            .ok_or_else(|| Error::Inconsistent("theme is missing clrScheme".to_string()))?;
        let scheme_qname = element_qname(&self.xml[scheme_span.clone()])
            .ok_or_else(|| Error::Inconsistent("malformed clrScheme".to_string()))?;
        let slot_tag = sibling_qname(&scheme_qname, slot);
        let srgb_tag = sibling_qname(&scheme_qname, "srgbClr");
        let entry = format!(r#"<{slot_tag}><{srgb_tag} val="{hex}"/></{slot_tag}>"#);
        let at = end_tag_start(&self.xml, &scheme_span).ok_or_else(|| {
            Error::Inconsistent("clrScheme has no closing tag".to_string())
        })?;
        self.xml = splice(&self.xml, at..at, entry.as_bytes());
        Ok(())
    }

    /// The major (heading) font slot.
    pub fn major_fonts(&self) -> Result<Option<ThemeFontSpec>> {
        self.font_spec(b"majorFont")
    }

    /// The minor (body) font slot.
    pub fn minor_fonts(&self) -> Result<Option<ThemeFontSpec>> {
        self.font_spec(b"minorFont")
    }

    /// Set the major font typefaces. `east_asian`/`complex_script` are left
    /// untouched when `None`.
    pub fn set_major_fonts(
        &mut self,
        latin: &str,
        east_asian: Option<&str>,
        complex_script: Option<&str>,
    ) -> Result<()> {
        self.set_font_spec(b"majorFont", latin, east_asian, complex_script)
    }

    /// Set the minor font typefaces. `east_asian`/`complex_script` are left
    /// untouched when `None`.
    pub fn set_minor_fonts(
        &mut self,
        latin: &str,
        east_asian: Option<&str>,
        complex_script: Option<&str>,
    ) -> Result<()> {
        self.set_font_spec(b"minorFont", latin, east_asian, complex_script)
    }

    fn element_attr(&self, local: &[u8], attr_name: &[u8]) -> Result<Option<String>> {
        Ok(crate::common::xml::element_attr(&self.xml, local, attr_name)?)
    }

    fn font_spec(&self, local: &[u8]) -> Result<Option<ThemeFontSpec>> {
        let Some(span) = element_span(&self.xml, local)? else {
            return Ok(None);
        };
        let fragment = &self.xml[span];

        let mut latin = None;
        let mut east_asian = None;
        let mut complex_script = None;
        let mut reader = Reader::from_reader(fragment);
        let mut buf = Vec::new();
        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Start(ref e) | Event::Empty(ref e) => {
                    let target = match e.local_name().as_ref() {
                        b"latin" => &mut latin,
                        b"ea" => &mut east_asian,
                        b"cs" => &mut complex_script,
                        _ => continue,
                    };
                    for attr in e.attributes() {
                        let attr = attr?;
                        if attr.key.as_ref() == b"typeface" {
                            *target = Some(attr.unescape_value()?.to_string());
                        }
                    }
                },
                Event::Eof => break,
                _ => {},
            }
            buf.clear();
        }

        Ok(latin.map(|latin| ThemeFontSpec {
            latin,
            east_asian: east_asian.filter(|s| !s.is_empty()),
            complex_script: complex_script.filter(|s| !s.is_empty()),
        }))
    }

    /// Rewrite `latin`/`ea`/`cs` typefaces inside one font slot, creating
    /// children that are requested but absent.
    fn set_font_spec(
        &mut self,
        slot: &[u8],
        latin: &str,
        east_asian: Option<&str>,
        complex_script: Option<&str>,
    ) -> Result<()> {
        if element_span(&self.xml, slot)?.is_none() {
            return Err(Error::Inconsistent(format!(
                "theme is missing {}",
                String::from_utf8_lossy(slot)
            )));
        }

        let mut reader = Reader::from_reader(self.xml.as_slice());
        let mut writer = Writer::new(Cursor::new(Vec::new()));
        let mut buf = Vec::new();
        let mut inside = false;
        let mut prefix = String::new();
        let mut seen_latin = false;
        let mut seen_ea = false;
        let mut seen_cs = false;

        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Start(ref e) if e.local_name().as_ref() == slot => {
                    inside = true;
                    prefix = match e.name().prefix() {
                        Some(p) => format!("{}:", String::from_utf8_lossy(p.as_ref())),
                        None => String::new(),
                    };
                    writer.write_event(Event::Start(e.to_owned()))?;
                },
                Event::End(ref e) if inside && e.local_name().as_ref() == slot => {
                    if !seen_latin {
                        writer.write_event(Event::Empty(typeface_entry(&prefix, "latin", latin)))?;
                    }
                    if let Some(value) = east_asian {
                        if !seen_ea {
                            writer.write_event(Event::Empty(typeface_entry(&prefix, "ea", value)))?;
                        }
                    }
                    if let Some(value) = complex_script {
                        if !seen_cs {
                            writer.write_event(Event::Empty(typeface_entry(&prefix, "cs", value)))?;
                        }
                    }
                    inside = false;
                    writer.write_event(Event::End(e.to_owned()))?;
                },
                Event::Empty(ref e) if inside && e.local_name().as_ref() == b"latin" => {
                    seen_latin = true;
                    writer.write_event(Event::Empty(with_attr(e, "typeface", latin)?))?;
                },
                Event::Empty(ref e) if inside && e.local_name().as_ref() == b"ea" => {
                    seen_ea = true;
                    match east_asian {
                        Some(value) => {
                            writer.write_event(Event::Empty(with_attr(e, "typeface", value)?))?;
                        },
                        None => writer.write_event(Event::Empty(e.to_owned()))?,
                    }
                },
                Event::Empty(ref e) if inside && e.local_name().as_ref() == b"cs" => {
                    seen_cs = true;
                    match complex_script {
                        Some(value) => {
                            writer.write_event(Event::Empty(with_attr(e, "typeface", value)?))?;
                        },
                        None => writer.write_event(Event::Empty(e.to_owned()))?,
                    }
                },
                Event::Eof => break,
                event => writer.write_event(event)?,
            }
            buf.clear();
        }

        self.xml = writer.into_inner().into_inner();
        Ok(())
    }
}

/// The primary theme part of a package: the first sorted theme part that is
/// not a theme override. `None` when the package has no theme parts.
pub fn theme_part(pkg: &OpcPackage) -> Option<String> {
    let mut parts: Vec<String> = pkg
        .list()
        .into_iter()
        .filter(|p| p.starts_with("ppt/theme/") && p.ends_with(".xml"))
        .map(String::from)
        .collect();
    parts.sort();
    parts
        .iter()
        .find(|p| !p.contains("themeOverride"))
        .or_else(|| parts.first())
        .cloned()
}

fn normalize_hex(value: &str) -> Result<String> {
    let trimmed = value.trim().trim_start_matches('#');
    if trimmed.len() != 6 || !trimmed.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(Error::Unsupported(format!("hex color {}", value)));
    }
    Ok(trimmed.to_uppercase())
}

/// Build a sibling tag name sharing `qname`'s prefix.
fn sibling_qname(qname: &str, local: &str) -> String {
    match qname.split_once(':') {
        Some((prefix, _)) => format!("{}:{}", prefix, local),
        None => local.to_string(),
    }
}

fn typeface_entry(prefix: &str, local: &str, typeface: &str) -> BytesStart<'static> {
    let mut entry = BytesStart::new(format!("{}{}", prefix, local));
    entry.push_attribute(("typeface", typeface));
    entry
}

/// Set an attribute on the first element with the given local name.
fn set_element_attr(xml: &[u8], local: &[u8], name: &str, value: &str) -> Result<Vec<u8>> {
    let mut reader = Reader::from_reader(xml);
    let mut writer = Writer::new(Cursor::new(Vec::new()));
    let mut buf = Vec::new();
    let mut done = false;
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(ref e) if !done && e.local_name().as_ref() == local => {
                done = true;
                writer.write_event(Event::Start(with_attr(e, name, value)?))?;
            },
            Event::Empty(ref e) if !done && e.local_name().as_ref() == local => {
                done = true;
                writer.write_event(Event::Empty(with_attr(e, name, value)?))?;
            },
            Event::Eof => break,
            event => writer.write_event(event)?,
        }
        buf.clear();
    }
    Ok(writer.into_inner().into_inner())
}
