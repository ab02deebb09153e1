// SPDX-FileCopyrightText: 2026 Charla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Query modules, one per table family.

pub mod buffer;
pub mod contacts;
pub mod examples;
pub mod flows;
pub mod followups;
pub mod knowledge;
pub mod messages;
pub mod sessions;
