//! Variables module
//!
//! Token resolution for request templates. See [`TemplateResolver`].

pub mod substitution;

pub use substitution::{substitute_tokens, TemplateResolver, Validation};
