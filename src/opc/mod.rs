//! Open Packaging Conventions (OPC) layer.
//!
//! Container-generic package handling: the order-preserving part store,
//! relationship sidecars, and the content-type registry. Nothing in this
//! layer knows about slides or layouts; the `pptx` module builds the
//! presentation topology on top of these three components.

pub mod constants;
pub mod content_types;
pub mod error;
pub mod package;
pub mod partname;
pub mod rels;

pub use content_types::ContentTypes;
pub use error::{OpcError, Result};
pub use package::OpcPackage;
pub use rels::{Relationship, Relationships};
