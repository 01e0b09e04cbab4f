// SPDX-FileCopyrightText: 2026 Banana Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Gather mode for the Banana image generation engine.
//!
//! A gather-enabled preset opens a session that collects text and images over
//! several messages until the sender says a start word, a cancel word, or goes
//! quiet for longer than the configured timeout.

pub mod session;
pub mod table;

pub use session::{CollectedRequest, GatherProgress, GatherSession, GatherState, Step, Terminators};
pub use table::{BeginOutcome, ExpiryEvent, GatherOutcome, GatherSettings, GatherTable};
