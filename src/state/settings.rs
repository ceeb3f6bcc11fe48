use serde::{Deserialize, Serialize};

/// How a newly drawn label attaches to subplots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelMode {
    /// One shared entry drawn identically in every subplot.
    Synchronized,
    /// The label attaches only to the subplot where the interaction
    /// happened, with a channel tag suffixed to its name.
    Independent,
}

impl ChannelMode {
    pub fn label(&self) -> &'static str {
        match self {
            ChannelMode::Synchronized => "Synchronized",
            ChannelMode::Independent => "Independent",
        }
    }
}

impl Default for ChannelMode {
    fn default() -> Self {
        ChannelMode::Synchronized
    }
}

/// Session-wide options carried as an optional `"options"` block in the
/// sidecar / project manifest. Absent block means all defaults, so config
/// files written by older versions stay readable.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionOptions {
    /// Save instead of prompting when navigating away with unsaved changes.
    pub autosave: bool,
    pub channel_mode: ChannelMode,
    /// Height of each subplot panel in points.
    pub plot_height: f32,
}

impl SessionOptions {
    pub fn is_default(&self) -> bool {
        *self == Self::default()
    }
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            autosave: false,
            channel_mode: ChannelMode::default(),
            plot_height: 180.0,
        }
    }
}
