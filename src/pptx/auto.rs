//! Grouped auto-layout.
//!
//! Audits the deck, groups slides that look alike, and materializes one
//! layout per group from the group's first slide, optionally pointing the
//! group's slides at it.

use serde::Serialize;

use crate::error::Result;
use crate::opc::package::OpcPackage;
use crate::pptx::audit::audit_package;
use crate::pptx::layout::{assign_slides_to_layout, make_layout_from_slide};

/// Options for [`auto_layout`].
#[derive(Debug, Clone)]
pub struct AutoLayoutOptions<'a> {
    /// Grouping key tokens, as for [`audit_package`]
    pub group_by: Option<&'a [&'a str]>,

    /// Display-name prefix for created layouts
    pub prefix: &'a str,

    /// 1-based master index the new layouts bind to
    pub master_index: usize,

    /// Point each group's slides at its new layout
    pub assign: bool,
}

impl Default for AutoLayoutOptions<'_> {
    fn default() -> Self {
        Self {
            group_by: None,
            prefix: "Auto Layout",
            master_index: 1,
            assign: true,
        }
    }
}

/// Outcome of [`auto_layout`].
#[derive(Debug, Clone, Serialize)]
pub struct AutoLayoutResult {
    /// Created layout parts, in group order
    pub created_layouts: Vec<String>,

    /// Number of groups the audit produced
    pub group_count: usize,
}

/// Create one layout per slide group.
///
/// Each non-empty group contributes a layout built from its first slide,
/// named `"<prefix> <n>"` with n counting groups from 1.
pub fn auto_layout(pkg: &mut OpcPackage, options: &AutoLayoutOptions<'_>) -> Result<AutoLayoutResult> {
    let report = audit_package(pkg, None, options.group_by)?;
    let mut created = Vec::new();

    for (index, group) in report.groups.iter().enumerate() {
        if group.slides.is_empty() {
            continue;
        }
        let layout_name = format!("{} {}", options.prefix, index + 1);
        let layout_part = make_layout_from_slide(
            pkg,
            group.slides[0],
            &layout_name,
            options.master_index,
        )?;

        if options.assign {
            assign_slides_to_layout(pkg, &group.slides, &layout_part)?;
        }
        created.push(layout_part);
    }

    Ok(AutoLayoutResult {
        created_layouts: created,
        group_count: report.groups.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pptx::layout::slide_layout_part;

    // Reuses the layout fixture shape: two slides over one master/layout,
    // differing enough to land in separate groups.
    fn deck() -> OpcPackage {
        let pml = "http://schemas.openxmlformats.org/presentationml/2006/main";
        let dml = "http://schemas.openxmlformats.org/drawingml/2006/main";
        let ofc = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
        let pkgr = "http://schemas.openxmlformats.org/package/2006/relationships";

        let mut pkg = OpcPackage::new();
        pkg.write(
            "[Content_Types].xml",
            br#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">
  <Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>
  <Default Extension="xml" ContentType="application/xml"/>
  <Override PartName="/ppt/slideLayouts/slideLayout1.xml" ContentType="application/vnd.openxmlformats-officedocument.presentationml.slideLayout+xml"/>
</Types>"#
                .to_vec(),
        );
        pkg.write(
            "ppt/slides/slide1.xml",
            format!(
                r#"<p:sld xmlns:p="{pml}" xmlns:a="{dml}"><p:cSld><p:spTree><p:sp><p:spPr><a:solidFill><a:srgbClr val="FF0000"/></a:solidFill></p:spPr></p:sp></p:spTree></p:cSld></p:sld>"#
            )
            .into_bytes(),
        );
        pkg.write(
            "ppt/slides/slide2.xml",
            format!(r#"<p:sld xmlns:p="{pml}"><p:cSld><p:spTree/></p:cSld></p:sld>"#).into_bytes(),
        );
        for number in 1..=2 {
            pkg.write(
                &format!("ppt/slides/_rels/slide{number}.xml.rels"),
                format!(
                    r#"<Relationships xmlns="{pkgr}"><Relationship Id="rId1" Type="{ofc}/slideLayout" Target="../slideLayouts/slideLayout1.xml"/></Relationships>"#
                )
                .into_bytes(),
            );
        }
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
        pkg.write(
            "ppt/slideLayouts/slideLayout1.xml",
            format!(
                r#"<p:sldLayout xmlns:p="{pml}" name="Base"><p:cSld><p:spTree/></p:cSld></p:sldLayout>"#
            )
            .into_bytes(),
        );
        pkg
    }

    #[test]
    fn test_auto_layout_creates_and_assigns() {
        let mut pkg = deck();
        let result = auto_layout(&mut pkg, &AutoLayoutOptions::default()).unwrap();

        // Two distinct groups, one new layout each
        assert_eq!(result.group_count, 2);
        assert_eq!(
            result.created_layouts,
            vec![
                "ppt/slideLayouts/slideLayout2.xml",
                "ppt/slideLayouts/slideLayout3.xml"
            ]
        );

        assert_eq!(
            slide_layout_part(&pkg, "ppt/slides/slide1.xml").unwrap().as_deref(),
            Some("ppt/slideLayouts/slideLayout2.xml")
        );
        assert_eq!(
            slide_layout_part(&pkg, "ppt/slides/slide2.xml").unwrap().as_deref(),
            Some("ppt/slideLayouts/slideLayout3.xml")
        );

        let created = String::from_utf8(
            pkg.read("ppt/slideLayouts/slideLayout2.xml").unwrap().to_vec(),
        )
        .unwrap();
        assert!(created.contains(r#"name="Auto Layout 1""#));
    }

    #[test]
    fn test_auto_layout_without_assignment() {
        let mut pkg = deck();
        let options = AutoLayoutOptions {
            assign: false,
            prefix: "Group",
            ..AutoLayoutOptions::default()
        };
        auto_layout(&mut pkg, &options).unwrap();

        // Slides keep their original layout
        assert_eq!(
            slide_layout_part(&pkg, "ppt/slides/slide1.xml").unwrap().as_deref(),
            Some("ppt/slideLayouts/slideLayout1.xml")
        );
    }
}
