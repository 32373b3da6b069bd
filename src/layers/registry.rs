use super::mutable::{MutableTileLayer, TileEvent};
use crate::catalog::MapDescriptor;
use crate::core::{render::RenderParameters, viewport::Viewport};
use crate::MapError;
use fxhash::FxHashMap;
use std::time::Instant;

/// Hooks for widgets that depend on the active layer (histograms, sliders).
pub trait SwapObserver: Send {
    fn before_swap(&mut self, _from: Option<&str>, _to: &str) {}

    fn after_swap(&mut self, _name: &str, _parameters: &RenderParameters) {}
}

/// Application-owned set of named layers, at most one of them on the map.
#[derive(Default)]
pub struct LayerRegistry {
    layers: FxHashMap<String, MutableTileLayer>,
    /// Layer names in insertion order.
    order: Vec<String>,
    /// Last parameters applied to each layer.
    render_parameters: FxHashMap<String, RenderParameters>,
    current: Option<String>,
    viewport: Option<Viewport>,
    observers: Vec<Box<dyn SwapObserver>>,
}

impl LayerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds one layer per descriptor through `factory`.
    pub fn from_descriptors<F>(descriptors: Vec<MapDescriptor>, mut factory: F) -> crate::Result<Self>
    where
        F: FnMut(MapDescriptor) -> crate::Result<MutableTileLayer>,
    {
        let mut registry = Self::new();
        for descriptor in descriptors {
            registry.insert(factory(descriptor)?);
        }
        Ok(registry)
    }

    /// Adds `layer`, replacing a detached layer of the same name.
    pub fn insert(&mut self, layer: MutableTileLayer) {
        let name = layer.name().to_string();
        if !self.layers.contains_key(&name) {
            self.order.push(name.clone());
        } else if self.current.as_deref() == Some(name.as_str()) {
            log::warn!("replacing the active layer {}; it will need to be added again", name);
            self.current = None;
        }
        self.render_parameters
            .insert(name.clone(), layer.render_parameters().clone());
        self.layers.insert(name, layer);
    }

    pub fn add_observer(&mut self, observer: Box<dyn SwapObserver>) {
        self.observers.push(observer);
    }

    pub fn names(&self) -> &[String] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn layer(&self, name: &str) -> Option<&MutableTileLayer> {
        self.layers.get(name)
    }

    pub fn layer_mut(&mut self, name: &str) -> Option<&mut MutableTileLayer> {
        self.layers.get_mut(name)
    }

    pub fn current_name(&self) -> Option<&str> {
        self.current.as_deref()
    }

    pub fn current(&self) -> Option<&MutableTileLayer> {
        self.current.as_ref().and_then(|name| self.layers.get(name))
    }

    /// Parameters last recorded for `name`.
    pub fn render_parameters_of(&self, name: &str) -> Option<&RenderParameters> {
        self.render_parameters.get(name)
    }

    /// Attaches `name`, or the first layer when `None`.
    pub fn add_to_map(&mut self, name: Option<&str>) -> crate::Result<()> {
        let name = match name {
            Some(name) => name.to_string(),
            None => self
                .order
                .first()
                .cloned()
                .ok_or_else(|| MapError::Layer("no layers to add to map".into()))?,
        };
        let viewport = self.viewport.clone();
        let layer = self
            .layers
            .get_mut(&name)
            .ok_or_else(|| MapError::Layer(format!("layer {} does not exist", name)))?;

        layer.attach()?;
        if let Some(viewport) = viewport {
            layer.update_viewport(&viewport);
        }
        self.current = Some(name);
        Ok(())
    }

    /// Makes `name` the visible layer, carrying over the current render parameters.
    pub fn swap_to(&mut self, name: &str) -> crate::Result<()> {
        if self.current.as_deref() == Some(name) {
            return Ok(());
        }
        if !self.layers.contains_key(name) {
            return Err(MapError::Layer(format!("layer {} does not exist", name)).into());
        }

        let outgoing = self.current.clone();
        let carried = self.current_render_parameters();
        let viewport = self.viewport.clone();
        if let Some(incoming) = self.layers.get_mut(name) {
            let previous = incoming.render_parameters().clone();
            // Applied before attach so the first requests already use them.
            if let Some(parameters) = carried.clone() {
                incoming.set_render_parameters(parameters);
            }
            if let Err(e) = incoming.attach() {
                if carried.is_some() {
                    incoming.set_render_parameters(previous);
                }
                log::warn!("swap to layer {} failed; keeping the current layer", name);
                return Err(e);
            }
            if let Some(viewport) = viewport {
                incoming.update_viewport(&viewport);
            }
        }
        if let Some(parameters) = carried {
            self.render_parameters.insert(name.to_string(), parameters);
        }

        for observer in &mut self.observers {
            observer.before_swap(outgoing.as_deref(), name);
        }
        if let Some(layer) = outgoing.as_ref().and_then(|old| self.layers.get_mut(old)) {
            layer.detach();
        }
        self.current = Some(name.to_string());
        log::info!(
            "swapped layer {} -> {}",
            outgoing.as_deref().unwrap_or("<none>"),
            name
        );

        if let Some(parameters) = self.current_render_parameters() {
            for observer in &mut self.observers {
                observer.after_swap(name, &parameters);
            }
        }
        Ok(())
    }

    pub fn current_render_parameters(&self) -> Option<RenderParameters> {
        self.current().map(|layer| layer.render_parameters().clone())
    }

    /// Updates the current layer and its recorded parameters.
    pub fn set_render_parameters(&mut self, parameters: RenderParameters) -> crate::Result<()> {
        let name = self
            .current
            .clone()
            .ok_or_else(|| MapError::Layer("no layer on the map".into()))?;
        if let Some(layer) = self.layers.get_mut(&name) {
            layer.set_render_parameters(parameters.clone());
        }
        self.render_parameters.insert(name, parameters);
        Ok(())
    }

    /// Remembers `viewport` and forwards it to the current layer.
    pub fn update_viewport(&mut self, viewport: Viewport) {
        if let Some(layer) = self.current.as_ref().and_then(|name| self.layers.get_mut(name)) {
            layer.update_viewport(&viewport);
        }
        self.viewport = Some(viewport);
    }

    /// Polls the current layer.
    pub fn poll(&mut self, now: Instant) -> Vec<TileEvent> {
        match self.current.as_ref().and_then(|name| self.layers.get_mut(name)) {
            Some(layer) => layer.poll(now),
            None => Vec::new(),
        }
    }
}
