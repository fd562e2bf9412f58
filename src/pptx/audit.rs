//! Read-only structural and color audit over the package graph.
//!
//! Profiles each slide, layout, and master (color usage, fills, pictures,
//! background shape), resolves slide → layout → master linkage, and groups
//! slides by palette, layout, and background signature so callers can spot
//! candidate layouts. Never writes.

use std::collections::{BTreeMap, HashMap};

use quick_xml::Reader;
use quick_xml::events::Event;
use serde::Serialize;

use crate::common::xml::{element_attr, root_attr};
use crate::error::{Error, Result};
use crate::opc::package::OpcPackage;
use crate::pptx::layout::{layout_master_map, slide_layout_part};
use crate::pptx::slides::slide_parts_in_order;
use crate::pptx::theme::theme_part;

/// Counts of the three color element kinds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ColorCounts {
    pub srgb: usize,
    pub scheme: usize,
    pub sysclr: usize,
}

/// Counts of fill kinds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FillCounts {
    pub solid: usize,
    pub grad: usize,
    pub blip: usize,
}

/// What the part declares for its background.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BackgroundFlags {
    pub bg_ref: bool,
    pub bg_blip: bool,
    pub bg_grad: bool,
    pub bg_solid: bool,
}

impl BackgroundFlags {
    /// Compressed form used as a grouping key, e.g. `blip+solid` or `none`.
    pub fn signature(&self) -> String {
        let mut flags = Vec::new();
        if self.bg_blip {
            flags.push("blip");
        }
        if self.bg_grad {
            flags.push("grad");
        }
        if self.bg_solid {
            flags.push("solid");
        }
        if self.bg_ref {
            flags.push("ref");
        }
        if flags.is_empty() {
            "none".to_string()
        } else {
            flags.join("+")
        }
    }
}

/// One srgb value and how often it appears.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SrgbCount {
    pub value: String,
    pub count: usize,
}

/// Color/fill/picture profile of a single XML part.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PartProfile {
    pub colors: ColorCounts,
    pub shape_colors: ColorCounts,
    pub text_colors: ColorCounts,
    pub fills: FillCounts,
    pub pictures: usize,
    pub top_srgb: Vec<SrgbCount>,
    pub has_clr_map: bool,
    pub has_clr_map_ovr: bool,
    pub background: BackgroundFlags,
}

/// Audit entry for one slide.
#[derive(Debug, Clone, Serialize)]
pub struct SlideAudit {
    pub slide_part: String,
    pub layout_part: Option<String>,
    pub master_part: Option<String>,
    #[serde(flatten)]
    pub profile: PartProfile,
}

/// Slides that share a grouping key.
#[derive(Debug, Clone, Serialize)]
pub struct SlideGroup {
    pub layout_part: Option<String>,
    pub master_part: Option<String>,
    pub background: String,
    pub palette: Vec<String>,
    pub slides: Vec<usize>,
    pub hardcoded_total: usize,
    pub text_srgb_total: usize,
    pub shape_srgb_total: usize,
    pub clr_map_ovr_slides: usize,
    pub image_slides: usize,
    pub custom_bg_slides: usize,
}

/// Names of the primary theme.
#[derive(Debug, Clone, Serialize)]
pub struct ThemeSummary {
    pub part: String,
    pub theme_name: String,
    pub color_scheme_name: String,
    pub font_scheme_name: String,
}

/// Complete audit report.
#[derive(Debug, Clone, Serialize)]
pub struct AuditReport {
    pub slides_total: usize,
    pub slides_audited: usize,
    pub per_slide: BTreeMap<usize, SlideAudit>,
    pub masters: BTreeMap<String, PartProfile>,
    pub layouts: BTreeMap<String, PartProfile>,
    pub groups: Vec<SlideGroup>,
    pub theme: Option<ThemeSummary>,
    pub group_by: Vec<String>,
}

/// Audit the package.
///
/// # Arguments
/// * `slide_numbers` - restrict per-slide auditing to these 1-based
///   numbers; `None` audits every slide
/// * `group_by` - grouping key tokens, any of `p` (palette), `l` (layout
///   and master), `b` (background signature); `None` means `p` + `l`
pub fn audit_package(
    pkg: &OpcPackage,
    slide_numbers: Option<&[usize]>,
    group_by: Option<&[&str]>,
) -> Result<AuditReport> {
    let group_by = normalize_group_by(group_by)?;
    let slide_parts = slide_parts_in_order(pkg)?;
    let layout_to_master = layout_master_map(pkg)?;

    let mut per_slide = BTreeMap::new();
    for (index, slide_part) in slide_parts.iter().enumerate() {
        let number = index + 1;
        if let Some(filter) = slide_numbers {
            if !filter.contains(&number) {
                continue;
            }
        }
        let profile = profile_part(pkg.read(slide_part)?)?;
        let layout_part = slide_layout_part(pkg, slide_part)?;
        let master_part = layout_part
            .as_ref()
            .and_then(|layout| layout_to_master.get(layout).cloned());
        per_slide.insert(
            number,
            SlideAudit {
                slide_part: slide_part.clone(),
                layout_part,
                master_part,
                profile,
            },
        );
    }

    let groups = group_slides(&per_slide, &group_by);

    Ok(AuditReport {
        slides_total: slide_parts.len(),
        slides_audited: per_slide.len(),
        per_slide,
        masters: summarize_parts(pkg, "ppt/slideMasters/")?,
        layouts: summarize_parts(pkg, "ppt/slideLayouts/")?,
        groups,
        theme: theme_summary(pkg)?,
        group_by,
    })
}

/// Profile a single part's XML.
pub fn profile_part(xml: &[u8]) -> Result<PartProfile> {
    let mut profile = PartProfile::default();
    let mut srgb_values: HashMap<String, usize> = HashMap::new();

    let mut reader = Reader::from_reader(xml);
    let mut stack: Vec<Vec<u8>> = Vec::new();
    let mut buf = Vec::new();
    loop {
        let event = reader.read_event_into(&mut buf)?;
        match event {
            Event::Start(ref e) | Event::Empty(ref e) => {
                let local = e.local_name().as_ref().to_vec();
                let in_shape_props = stack.iter().any(|a| a == b"spPr");
                let in_text_props = stack
                    .iter()
                    .any(|a| a == b"rPr" || a == b"defRPr" || a == b"lstStyle" || a == b"buClr");
                let in_bg = stack.iter().any(|a| a == b"bg");
                let in_bg_props = stack.iter().any(|a| a == b"bgPr");

                match local.as_slice() {
                    b"srgbClr" => {
                        profile.colors.srgb += 1;
                        if in_shape_props {
                            profile.shape_colors.srgb += 1;
                        }
                        if in_text_props {
                            profile.text_colors.srgb += 1;
                        }
                        for attr in e.attributes() {
                            let attr = attr?;
                            if attr.key.as_ref() == b"val" {
                                let value = attr.unescape_value()?.to_uppercase();
                                if !value.is_empty() {
                                    *srgb_values.entry(value).or_insert(0) += 1;
                                }
                            }
                        }
                    },
                    b"schemeClr" => {
                        profile.colors.scheme += 1;
                        if in_shape_props {
                            profile.shape_colors.scheme += 1;
                        }
                        if in_text_props {
                            profile.text_colors.scheme += 1;
                        }
                    },
                    b"sysClr" => {
                        profile.colors.sysclr += 1;
                        if in_shape_props {
                            profile.shape_colors.sysclr += 1;
                        }
                        if in_text_props {
                            profile.text_colors.sysclr += 1;
                        }
                    },
                    b"solidFill" => {
                        profile.fills.solid += 1;
                        if in_bg_props {
                            profile.background.bg_solid = true;
                        }
                    },
                    b"gradFill" => {
                        profile.fills.grad += 1;
                        if in_bg_props {
                            profile.background.bg_grad = true;
                        }
                    },
                    b"blipFill" => {
                        profile.fills.blip += 1;
                        if in_bg_props {
                            profile.background.bg_blip = true;
                        }
                    },
                    b"bgRef" => {
                        if in_bg {
                            profile.background.bg_ref = true;
                        }
                    },
                    b"pic" => profile.pictures += 1,
                    b"clrMap" => profile.has_clr_map = true,
                    b"clrMapOvr" => profile.has_clr_map_ovr = true,
                    _ => {},
                }

                if matches!(event, Event::Start(_)) {
                    stack.push(local);
                }
            },
            Event::End(_) => {
                stack.pop();
            },
            Event::Eof => break,
            _ => {},
        }
        buf.clear();
    }

    let mut ranked: Vec<SrgbCount> = srgb_values
        .into_iter()
        .map(|(value, count)| SrgbCount { value, count })
        .collect();
    ranked.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.value.cmp(&b.value)));
    ranked.truncate(5);
    profile.top_srgb = ranked;

    Ok(profile)
}

fn summarize_parts(pkg: &OpcPackage, prefix: &str) -> Result<BTreeMap<String, PartProfile>> {
    let mut summary = BTreeMap::new();
    for part in pkg.list() {
        if !part.starts_with(prefix) || !part.ends_with(".xml") {
            continue;
        }
        summary.insert(part.to_string(), profile_part(pkg.read(part)?)?);
    }
    Ok(summary)
}

fn normalize_group_by(value: Option<&[&str]>) -> Result<Vec<String>> {
    let Some(tokens) = value else {
        return Ok(vec!["p".to_string(), "l".to_string()]);
    };
    let mut selected = Vec::new();
    for token in tokens {
        if !matches!(*token, "p" | "b" | "l") {
            return Err(Error::Unsupported(format!("group-by option {}", token)));
        }
        if !selected.iter().any(|existing| existing == token) {
            selected.push(token.to_string());
        }
    }
    Ok(selected)
}

fn group_slides(per_slide: &BTreeMap<usize, SlideAudit>, group_by: &[String]) -> Vec<SlideGroup> {
    let mut keys: Vec<Vec<String>> = Vec::new();
    let mut groups: Vec<SlideGroup> = Vec::new();

    for (&number, audit) in per_slide {
        let palette: Vec<String> = audit
            .profile
            .top_srgb
            .iter()
            .map(|entry| entry.value.clone())
            .collect();
        let background = audit.profile.background.signature();

        let mut key: Vec<String> = Vec::new();
        for token in group_by {
            match token.as_str() {
                "l" => {
                    key.push(audit.layout_part.clone().unwrap_or_default());
                    key.push(audit.master_part.clone().unwrap_or_default());
                },
                "b" => key.push(background.clone()),
                "p" => key.push(palette.join("+")),
                _ => {},
            }
        }

        let index = match keys.iter().position(|existing| existing == &key) {
            Some(index) => index,
            None => {
                keys.push(key);
                groups.push(SlideGroup {
                    layout_part: audit.layout_part.clone(),
                    master_part: audit.master_part.clone(),
                    background: background.clone(),
                    palette: palette.clone(),
                    slides: Vec::new(),
                    hardcoded_total: 0,
                    text_srgb_total: 0,
                    shape_srgb_total: 0,
                    clr_map_ovr_slides: 0,
                    image_slides: 0,
                    custom_bg_slides: 0,
                });
                groups.len() - 1
            },
        };

        let group = &mut groups[index];
        let profile = &audit.profile;
        group.slides.push(number);
        group.hardcoded_total += profile.colors.srgb + profile.colors.sysclr;
        group.text_srgb_total += profile.text_colors.srgb;
        group.shape_srgb_total += profile.shape_colors.srgb;
        if profile.has_clr_map_ovr {
            group.clr_map_ovr_slides += 1;
        }
        if profile.pictures > 0 || profile.fills.blip > 0 {
            group.image_slides += 1;
        }
        if profile.background.bg_blip
            || profile.background.bg_grad
            || profile.background.bg_solid
            || profile.background.bg_ref
        {
            group.custom_bg_slides += 1;
        }
    }

    groups
}

fn theme_summary(pkg: &OpcPackage) -> Result<Option<ThemeSummary>> {
    let Some(part) = theme_part(pkg) else {
        return Ok(None);
    };
    let xml = pkg.read(&part)?;
    Ok(Some(ThemeSummary {
        theme_name: root_attr(xml, "name")?.unwrap_or_default(),
        color_scheme_name: element_attr(xml, b"clrScheme", b"name")?.unwrap_or_default(),
        font_scheme_name: element_attr(xml, b"fontScheme", b"name")?.unwrap_or_default(),
        part,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SLIDE_WITH_COLORS: &[u8] = br#"<?xml version="1.0"?>
<p:sld xmlns:p="http://schemas.openxmlformats.org/presentationml/2006/main" xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main">
<p:cSld>
<p:bg><p:bgPr><a:solidFill><a:srgbClr val="112233"/></a:solidFill></p:bgPr></p:bg>
<p:spTree>
<p:sp><p:spPr><a:solidFill><a:srgbClr val="FF0000"/></a:solidFill></p:spPr>
<p:txBody><a:p><a:r><a:rPr><a:solidFill><a:srgbClr val="FF0000"/></a:solidFill></a:rPr></a:r></a:p></p:txBody></p:sp>
<p:pic><p:blipFill><a:blip/></p:blipFill></p:pic>
</p:spTree>
</p:cSld>
<p:clrMapOvr><a:masterClrMapping/></p:clrMapOvr>
</p:sld>"#;

    #[test]
    fn test_profile_part_counts() {
        let profile = profile_part(SLIDE_WITH_COLORS).unwrap();
        assert_eq!(profile.colors.srgb, 3);
        assert_eq!(profile.shape_colors.srgb, 1);
        assert_eq!(profile.text_colors.srgb, 1);
        assert_eq!(profile.fills.solid, 3);
        assert_eq!(profile.fills.blip, 1);
        assert_eq!(profile.pictures, 1);
        assert!(profile.has_clr_map_ovr);
        assert!(!profile.has_clr_map);
        assert!(profile.background.bg_solid);
        assert!(!profile.background.bg_blip);
        assert_eq!(profile.background.signature(), "solid");

        assert_eq!(profile.top_srgb[0].value, "FF0000");
        assert_eq!(profile.top_srgb[0].count, 2);
    }

    fn audit_deck() -> OpcPackage {
        let mut pkg = OpcPackage::new();
        pkg.write("ppt/slides/slide1.xml", SLIDE_WITH_COLORS.to_vec());
        pkg.write("ppt/slides/slide2.xml", SLIDE_WITH_COLORS.to_vec());
        pkg.write(
            "ppt/slides/slide3.xml",
            br#"<p:sld xmlns:p="http://schemas.openxmlformats.org/presentationml/2006/main"><p:cSld><p:spTree/></p:cSld></p:sld>"#.to_vec(),
        );
        for number in 1..=3 {
            pkg.write(
                &format!("ppt/slides/_rels/slide{}.xml.rels", number),
                br#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
  <Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/slideLayout" Target="../slideLayouts/slideLayout1.xml"/>
</Relationships>"#.to_vec(),
            );
        }
        pkg.write(
            "ppt/slideLayouts/slideLayout1.xml",
            br#"<p:sldLayout xmlns:p="http://schemas.openxmlformats.org/presentationml/2006/main"><p:cSld><p:spTree/></p:cSld></p:sldLayout>"#.to_vec(),
        );
        pkg.write(
            "ppt/slideLayouts/_rels/slideLayout1.xml.rels",
            br#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
  <Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/slideMaster" Target="../slideMasters/slideMaster1.xml"/>
</Relationships>"#.to_vec(),
        );
        pkg.write(
            "ppt/slideMasters/slideMaster1.xml",
            br#"<p:sldMaster xmlns:p="http://schemas.openxmlformats.org/presentationml/2006/main"><p:clrMap/></p:sldMaster>"#.to_vec(),
        );
        pkg.write(
            "ppt/theme/theme1.xml",
            br#"<a:theme xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" name="Office"><a:themeElements><a:clrScheme name="Colors"/><a:fontScheme name="Fonts"/></a:themeElements></a:theme>"#.to_vec(),
        );
        pkg
    }

    #[test]
    fn test_audit_resolves_linkage_and_groups() {
        let pkg = audit_deck();
        let report = audit_package(&pkg, None, None).unwrap();

        assert_eq!(report.slides_total, 3);
        assert_eq!(report.slides_audited, 3);
        assert_eq!(
            report.per_slide[&1].layout_part.as_deref(),
            Some("ppt/slideLayouts/slideLayout1.xml")
        );
        assert_eq!(
            report.per_slide[&1].master_part.as_deref(),
            Some("ppt/slideMasters/slideMaster1.xml")
        );

        // Slides 1 and 2 share a palette; slide 3 is plain
        assert_eq!(report.groups.len(), 2);
        assert_eq!(report.groups[0].slides, vec![1, 2]);
        assert_eq!(report.groups[1].slides, vec![3]);
        assert_eq!(report.groups[0].custom_bg_slides, 2);
        assert_eq!(report.groups[0].image_slides, 2);

        assert!(report.masters.contains_key("ppt/slideMasters/slideMaster1.xml"));
        assert!(report.masters["ppt/slideMasters/slideMaster1.xml"].has_clr_map);

        let theme = report.theme.unwrap();
        assert_eq!(theme.theme_name, "Office");
        assert_eq!(theme.color_scheme_name, "Colors");
    }

    #[test]
    fn test_audit_slide_filter_and_bad_group_by() {
        let pkg = audit_deck();
        let report = audit_package(&pkg, Some(&[2]), Some(&["l", "b"])).unwrap();
        assert_eq!(report.slides_audited, 1);
        assert!(report.per_slide.contains_key(&2));
        assert_eq!(report.group_by, vec!["l", "b"]);

        assert!(matches!(
            audit_package(&pkg, None, Some(&["x"])),
            Err(Error::Unsupported(_))
        ));
    }

    #[test]
    fn test_report_serializes() {
        let pkg = audit_deck();
        let report = audit_package(&pkg, None, None).unwrap();
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["slides_total"], 3);
        assert!(json["per_slide"]["1"]["colors"]["srgb"].as_u64().unwrap() > 0);
    }
}
