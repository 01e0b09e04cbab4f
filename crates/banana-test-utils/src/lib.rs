// SPDX-FileCopyrightText: 2026 Banana Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Banana integration tests.
//!
//! - [`MockChannel`]: a `ChannelAdapter` with injectable inbound messages and
//!   in-memory avatar and image tables.
//! - [`MockBackend`]: an `ImageBackend` replaying scripted results per provider.
//! - [`fixtures`]: builders for requests, provider specs, and images.

pub mod fixtures;
pub mod mock_backend;
pub mod mock_channel;

pub use fixtures::{mock_dispatcher, png, provider_spec, request, tagged_png};
pub use mock_backend::{MockBackend, RecordedCall, output_of};
pub use mock_channel::MockChannel;
