// SPDX-FileCopyrightText: 2026 Banana Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Presets, flag parsing, and parameter resolution.
//!
//! A preset maps a trigger word to a prompt template and default parameters.
//! [`ParameterResolver`] combines a preset with the flags and free text of a
//! trigger message into an immutable [`banana_core::GenerationRequest`].

pub mod params;
pub mod preset;
pub mod resolver;
pub mod store;

pub use params::{FlagParser, Param, ParamValues};
pub use preset::{Preset, USER_TEXT};
pub use resolver::{GlobalDefaults, ParameterResolver, resolve};
pub use store::{DeleteScope, PresetStore, Removal, UpsertOutcome};
