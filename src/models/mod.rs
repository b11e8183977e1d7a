//! Core data models for the media relay.
//!
//! Objects are addressed by an opaque [`object::ObjectKey`]; retrieval works
//! on inclusive byte windows described by [`range::ByteRange`].

pub mod object;
pub mod range;
