use std::collections::BTreeMap;

use tokio::sync::oneshot;

use crate::stage::LayerId;

/// Attributes a panel observes; changing `data` reloads the manifest.
pub const OBSERVED_ATTRIBUTES: &[&str] = &["data", "width", "height", "interval", "fade-duration"];

/// Requests a host can make of a running panel.
#[derive(Debug)]
pub enum PanelCommand {
    SetAttribute {
        name: String,
        value: Option<String>,
    },
    Start(i64),
    Stop,
    Next,
    Previous,
    Pause,
    Resume,
    Snapshot(oneshot::Sender<PanelSnapshot>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanelState {
    /// No slides to show yet.
    Idle,
    /// Manifest fetch in flight.
    Loading,
    /// Image preload or fade-in for the current index in flight.
    Advancing,
    /// Current slide mounted and opaque; the advance timer is armed.
    Displayed,
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanelSnapshot {
    pub state: PanelState,
    pub current_index: usize,
    pub slide_count: usize,
    pub current_layer: Option<LayerId>,
    pub timer_running: bool,
    pub attributes: BTreeMap<String, String>,
}

/// Emitted by the panel once a slide's fade-in has completed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Displayed {
    pub index: usize,
    pub image_url: String,
}

impl PanelSnapshot {
    /// Current string value of an observed attribute.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }
}
