// SPDX-FileCopyrightText: 2026 Charla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Notifier adapter trait for human-handoff alerts.

use async_trait::async_trait;

use crate::error::CharlaError;
use crate::types::EscalationAlert;

/// Adapter for delivering escalation alerts to a human-agent channel.
///
/// Delivery is best-effort: failures are logged by the caller and never
/// block the user-visible response.
#[async_trait]
pub trait NotifierAdapter: Send + Sync + 'static {
    /// Sends an escalation alert to the given destination (e.g. a group id).
    async fn send_escalation_alert(
        &self,
        destination: &str,
        alert: &EscalationAlert,
    ) -> Result<(), CharlaError>;
}
