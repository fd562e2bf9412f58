//! Slidekit - structural editing of PowerPoint template packages
//!
//! This library edits PresentationML containers (.pptx/.potx): zip archives
//! of interrelated XML parts. It models the container as three components -
//! an order-preserving part store, per-part relationship sidecars, and the
//! content-type registry - and builds the presentation topology operations
//! on top: creating layouts from slides, reassigning slides, pruning
//! unreferenced layouts, and reindexing layout names, all while keeping
//! relationship ids unique, targets resolvable, and master↔layout↔slide
//! linkage consistent.
//!
//! # Example - Promoting a slide to a layout
//!
//! ```no_run
//! use slidekit::OpcPackage;
//! use slidekit::pptx::layout::{make_layout_from_slide, assign_slides_to_layout};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut pkg = OpcPackage::open("template.potx")?;
//!
//! // Turn slide 3 into a reusable layout on the first master
//! let layout = make_layout_from_slide(&mut pkg, 3, "Section Divider", 1)?;
//! assign_slides_to_layout(&mut pkg, &[3, 4, 5], &layout)?;
//!
//! pkg.save("template.potx")?;
//! # Ok(())
//! # }
//! ```
//!
//! # Example - Cleaning up a template
//!
//! ```no_run
//! use slidekit::OpcPackage;
//! use slidekit::pptx::layout::{prune_unused_layouts, reindex_layouts};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut pkg = OpcPackage::open("template.potx")?;
//!
//! // Drop layouts no slide uses, then renumber the survivors
//! let pruned = prune_unused_layouts(&mut pkg, &[])?;
//! println!("removed {} layouts", pruned.removed_layouts.len());
//! reindex_layouts(&mut pkg)?;
//!
//! pkg.save("template.potx")?;
//! # Ok(())
//! # }
//! ```
//!
//! The whole container is materialized in memory; operations are
//! synchronous and single-owner, and a failed operation is not rolled
//! back - callers needing atomicity should work on a clone of the loaded
//! package and swap it in on success.

mod common;

pub mod error;

/// Open Packaging Conventions layer: part store, relationships, content
/// types.
pub mod opc;

/// PresentationML layer: slide enumeration and layout topology operations.
pub mod pptx;

// Re-export commonly used types from the OPC layer
pub use opc::{OpcError, OpcPackage, Relationship, Relationships};

// Re-export error types
pub use error::{Error, Result};
