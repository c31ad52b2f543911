//! Continuous speech recognition: engine/session traits and the
//! self-healing orchestrator that binds them to audio and speakers.

pub mod orchestrator;
pub mod session;
