//! Shared UI icons.
//!
//! Each icon carries a plain-text fallback for terminals without emoji.

use conductor_common::WorkflowStatus;
use console::Emoji;

// Status indicators
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "[OK]");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "[ERR]");
pub static SPARKLE: Emoji<'_, '_> = Emoji("✨ ", "*");
pub static PENDING: Emoji<'_, '_> = Emoji("⏳ ", "[..]");
pub static RUNNING: Emoji<'_, '_> = Emoji("▶️  ", "[>]");

// Transport indicators
pub static WARNING: Emoji<'_, '_> = Emoji("⚠️  ", "[!]");
pub static LINK: Emoji<'_, '_> = Emoji("🔗 ", "[~]");

// Context preview
pub static SEARCH: Emoji<'_, '_> = Emoji("🔍 ", "[?]");
pub static FILE: Emoji<'_, '_> = Emoji("📄 ", "-");

/// Icon for a workflow status.
pub fn status_icon(status: WorkflowStatus) -> Emoji<'static, 'static> {
    match status {
        WorkflowStatus::Pending => PENDING,
        WorkflowStatus::Running => RUNNING,
        WorkflowStatus::Completed => CHECK,
        WorkflowStatus::Failed => CROSS,
    }
}
