//! Local filesystem side of the mirror: names, timestamps and references.

pub mod links;
pub mod metadata;
pub mod naming;
