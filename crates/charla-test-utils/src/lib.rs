// SPDX-FileCopyrightText: 2026 Charla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shared test utilities: mock adapters and a temp-database harness.
//!
//! Everything here is deterministic and CI-runnable without network access.

pub mod harness;
pub mod mock_adapters;
pub mod mock_provider;

pub use harness::{contact_fixture, session_fixture, TestDb};
pub use mock_adapters::{MockEmbedder, MockMedia, MockNotifier};
pub use mock_provider::{MockProvider, MockReply};
