#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
//! meetme is a multi-party audio conference bridge core built over a
//! kernel-style conference mixer device. The library offers:
//!  * A registry of named conferences, created on demand and reaped when the
//!    last participant leaves.
//!  * Thread-per-participant sessions driving each call's bidirectional
//!    audio path against the mixer at frame pacing, with per-participant
//!    mute/marked/hold state, DTMF menus, and volume control.
//!  * An administrative plane (programmatic and CLI) for lock, mute, kick,
//!    and roster listing, addressable per conference and per participant.
//!  * Join/leave/talker events published to a management bus.
//!  * Optional per-conference recording on a dedicated writer thread.
//!
//! ## Collaborators
//!
//! The audio device, the telephony channel, and the prompt/file layer stay
//! outside the crate, behind the [`MixerDevice`]/[`MixerPort`],
//! [`Call`], and [`PromptPlayer`] traits. Deployments wire their real
//! implementations into a [`Registry`]; tests substitute scripted ones.
//!
//! [`MixerDevice`]: mixer::MixerDevice
//! [`MixerPort`]: mixer::MixerPort
//! [`Call`]: channel::Call
//! [`PromptPlayer`]: channel::PromptPlayer

#![warn(clippy::pedantic, rust_2018_idioms)]
#![allow(
    // Allowed as they are too pedantic
    clippy::module_name_repetitions,
    clippy::wildcard_imports,
    clippy::too_many_lines,
    clippy::cast_lossless,
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap,
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
)]

pub mod admin;
pub mod app;
pub mod channel;
pub mod cli;
mod config;
pub mod conference;
pub mod constants;
pub mod error;
pub mod events;
pub mod mixer;
pub mod participant;
pub mod rooms;
pub mod session;
pub mod tones;

pub use crate::{
    conference::{registry::Registry, Conference},
    config::Config,
    error::{Error, Result},
    events::{EventBus, EventKind, ManagerEvent},
};
