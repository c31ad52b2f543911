//! Speaker attribution: name-candidate registry and audio-activity
//! identification.

pub mod identifier;
pub mod registry;
