//! Host lifecycle events that make a cached snapshot stale.

use std::fmt;

/// Something changed in the observed application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateChange {
    ExtensionActivated(String),
    ExtensionDeactivated(String),
    ExtensionDeleted(String),
    ThemeSwitched(String),
    UpgradeCompleted,
    /// Access policy or other settings were reloaded.
    SettingsUpdated,
    /// The site manifest backing the snapshot changed on disk.
    ManifestReloaded,
}

impl StateChange {
    /// Stable label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            StateChange::ExtensionActivated(_) => "extension_activated",
            StateChange::ExtensionDeactivated(_) => "extension_deactivated",
            StateChange::ExtensionDeleted(_) => "extension_deleted",
            StateChange::ThemeSwitched(_) => "theme_switched",
            StateChange::UpgradeCompleted => "upgrade_completed",
            StateChange::SettingsUpdated => "settings_updated",
            StateChange::ManifestReloaded => "manifest_reloaded",
        }
    }
}

impl fmt::Display for StateChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateChange::ExtensionActivated(name)
            | StateChange::ExtensionDeactivated(name)
            | StateChange::ExtensionDeleted(name)
            | StateChange::ThemeSwitched(name) => write!(f, "{}({})", self.kind(), name),
            _ => f.write_str(self.kind()),
        }
    }
}
