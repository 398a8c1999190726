//! Data models for requests and responses.
//!
//! This module contains the structures exchanged between callers and the
//! dispatch pipeline: the user-composed [`RequestSpec`] and the
//! [`NormalizedResponse`] handed back.

pub mod request;
pub mod response;

pub use request::{
    AuthSpec, BodySpec, FileAttachment, FormDataEntry, FormFieldKind, HttpMethod, KeyValueEntry,
    RequestSpec,
};
pub use response::NormalizedResponse;
