//! The mounted layer tree of a panel.
//!
//! Layers are kept in document order: a layer inserted "before" another one
//! sits earlier in the list and therefore paints underneath it unless its
//! z-index says otherwise.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tracing::debug;

pub type LayerId = u64;

/// Styling every slide layer receives after its custom style.
pub const LAYER_BASE_STYLE: &str = "background-size: cover; \
background-position: center center; \
background-repeat: no-repeat; \
position: absolute; top: 0; right: 0; bottom: 0; left: 0;";

/// Builds the style attribute of a slide layer: the slide's own style first,
/// then the background image and the full-bleed rules.
pub fn layer_style(custom: Option<&str>, image_url: &str) -> String {
    let mut style = String::new();
    if let Some(custom) = custom.map(str::trim).filter(|s| !s.is_empty()) {
        style.push_str(custom);
        if !custom.ends_with(';') {
            style.push(';');
        }
        style.push(' ');
    }
    style.push_str(&format!("background-image: url({image_url}); "));
    style.push_str(LAYER_BASE_STYLE);
    style
}

/// Host surface the panel renders into.
pub trait Stage: Send + 'static {
    /// Mounts a new layer directly before `before` (or at the end when
    /// `None` or unknown) and returns its id.
    fn mount(&mut self, image_url: &str, style: &str, before: Option<LayerId>) -> LayerId;

    fn set_z_index(&mut self, layer: LayerId, z_index: i32);

    /// Animates the layer's opacity from 0 to 1 over `duration`.
    fn fade_in(&mut self, layer: LayerId, duration: Duration);

    fn remove(&mut self, layer: LayerId);
}

#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    pub id: LayerId,
    pub image_url: String,
    pub style: String,
    pub z_index: Option<i32>,
    pub fade: Option<Duration>,
}

#[derive(Debug, Default)]
struct SceneState {
    layers: Vec<Layer>,
    next_id: LayerId,
}

/// In-memory [`Stage`]. Clones share the same tree, so a host can keep a
/// handle for inspection while the panel task owns another.
#[derive(Debug, Clone, Default)]
pub struct SceneGraph {
    inner: Arc<Mutex<SceneState>>,
}

impl SceneGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the mounted layers in document order.
    pub fn layers(&self) -> Vec<Layer> {
        self.state().layers.clone()
    }

    pub fn image_urls(&self) -> Vec<String> {
        self.state()
            .layers
            .iter()
            .map(|layer| layer.image_url.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.state().layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn state(&self) -> MutexGuard<'_, SceneState> {
        // A poisoned lock only means a panic elsewhere; the layer list is
        // still consistent.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Stage for SceneGraph {
    fn mount(&mut self, image_url: &str, style: &str, before: Option<LayerId>) -> LayerId {
        let mut state = self.state();
        state.next_id += 1;
        let id = state.next_id;
        let layer = Layer {
            id,
            image_url: image_url.to_owned(),
            style: style.to_owned(),
            z_index: None,
            fade: None,
        };
        let position = before
            .and_then(|target| state.layers.iter().position(|l| l.id == target))
            .unwrap_or(state.layers.len());
        state.layers.insert(position, layer);
        debug!(layer = id, url = image_url, position, "layer mounted");
        id
    }

    fn set_z_index(&mut self, layer: LayerId, z_index: i32) {
        if let Some(entry) = self.state().layers.iter_mut().find(|l| l.id == layer) {
            entry.z_index = Some(z_index);
        }
    }

    fn fade_in(&mut self, layer: LayerId, duration: Duration) {
        if let Some(entry) = self.state().layers.iter_mut().find(|l| l.id == layer) {
            entry.fade = Some(duration);
            debug!(layer, ?duration, "fade-in started");
        }
    }

    fn remove(&mut self, layer: LayerId) {
        let mut state = self.state();
        let before = state.layers.len();
        state.layers.retain(|l| l.id != layer);
        if state.layers.len() != before {
            debug!(layer, "layer removed");
        }
    }
}
