//! Provide the canonical vocabulary shared by the worker bootstrap and anything that inspects a realm.
//!
//! This crate is intentionally small and dependency-free. It holds the spellings that several layers
//! need to agree on:
//! - which import extensions are stubbed instead of executed, and how,
//! - the names of well-known realm globals and environment variables,
//! - the transform-mode tags environments declare.
//!
//! ## Notes
//!
//! - This is a "vocabulary" crate: **no IO**, no global state, no runtime types.
//! - Callers should go through these registries instead of matching on string literals.

pub mod extensions;
pub mod globals;
pub mod transform;

pub use extensions::StubKind;
pub use transform::TransformMode;
