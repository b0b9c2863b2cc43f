//! Map view: resolves the active locality to coordinates and renders one pin with a halo.
//!
//! Every target change tears the rendered surface down and builds a new one.
//! Resolution and render happen as one refresh guarded by a generation counter
//! and a cancellation token, so a geocode that completes after the target moved
//! on (or after teardown) never touches state.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::config::MapConfig;
use crate::geocoder::Geocoder;
use crate::models::Coordinates;

/// Styling shared by every render. Declared once, never injected per activation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MapStyle {
    pub tile_url: &'static str,
    pub max_zoom: u8,
    pub halo_stroke: &'static str,
    pub halo_fill: &'static str,
    pub halo_fill_opacity: f64,
    pub halo_weight: u8,
    pub marker_size: (u16, u16),
    pub marker_anchor: (u16, u16),
    pub popup_anchor: (i16, i16),
}

pub static MAP_STYLE: MapStyle = MapStyle {
    tile_url: "https://tiles.stadiamaps.com/tiles/stamen_toner_lite/{z}/{x}/{y}{r}.png",
    max_zoom: 20,
    halo_stroke: "rgba(255, 59, 48, 0.3)",
    halo_fill: "rgba(255, 59, 48, 0.2)",
    halo_fill_opacity: 0.8,
    halo_weight: 1,
    marker_size: (30, 30),
    marker_anchor: (15, 30),
    popup_anchor: (0, -30),
};

/// The map is a fixed snapshot: every interaction is off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Interactions {
    pub zoom_control: bool,
    pub scroll_wheel_zoom: bool,
    pub dragging: bool,
    pub touch_zoom: bool,
    pub double_click_zoom: bool,
    pub box_zoom: bool,
    pub keyboard: bool,
    pub attribution: bool,
}

impl Interactions {
    pub const DISABLED: Interactions = Interactions {
        zoom_control: false,
        scroll_wheel_zoom: false,
        dragging: false,
        touch_zoom: false,
        double_click_zoom: false,
        box_zoom: false,
        keyboard: false,
        attribution: false,
    };

    pub fn any_enabled(&self) -> bool {
        self.zoom_control
            || self.scroll_wheel_zoom
            || self.dragging
            || self.touch_zoom
            || self.double_click_zoom
            || self.box_zoom
            || self.keyboard
            || self.attribution
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Highlight {
    pub center: Coordinates,
    pub radius_m: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Marker {
    pub position: Coordinates,
    pub popup: String,
    pub popup_open: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum CameraTransition {
    FlyTo {
        target: Coordinates,
        zoom: u8,
        duration: Duration,
        ease_linearity: f64,
    },
}

/// Where the pinned coordinates came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ResolutionSource {
    Supplied,
    Geocoded,
    /// Geocoding failed; pinned at the sentinel
    Fallback,
}

/// One complete render of the map surface.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapScene {
    pub name: String,
    pub center: Coordinates,
    pub zoom: u8,
    pub interactions: Interactions,
    pub highlight: Highlight,
    pub markers: Vec<Marker>,
    pub camera: CameraTransition,
    pub source: ResolutionSource,
    #[serde(skip)]
    pub style: &'static MapStyle,
}

impl MapScene {
    fn build(name: &str, center: Coordinates, source: ResolutionSource, cfg: &MapConfig) -> Self {
        Self {
            name: name.to_string(),
            center,
            zoom: cfg.zoom,
            interactions: Interactions::DISABLED,
            highlight: Highlight {
                center,
                radius_m: cfg.highlight_radius_m,
            },
            markers: vec![Marker {
                position: center,
                popup: name.to_string(),
                popup_open: true,
            }],
            camera: CameraTransition::FlyTo {
                target: center,
                zoom: cfg.zoom,
                duration: Duration::from_millis(cfg.fly_duration_ms),
                ease_linearity: cfg.ease_linearity,
            },
            source,
            style: &MAP_STYLE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct SurfaceId(pub u64);

/// The tile/render library. Best-effort: rendering cannot fail from the core's point of view.
pub trait MapSurface: Send + Sync {
    fn render(&self, scene: &MapScene) -> SurfaceId;
    fn teardown(&self, id: SurfaceId);
}

/// In-memory surface that keeps every live scene. Backs the console driver and tests.
#[derive(Default)]
pub struct HeadlessSurface {
    next_id: AtomicU64,
    live: Mutex<HashMap<SurfaceId, MapScene>>,
    destroyed: AtomicU64,
}

impl HeadlessSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn live_count(&self) -> usize {
        self.live.lock().map(|live| live.len()).unwrap_or(0)
    }

    pub fn created_count(&self) -> u64 {
        self.next_id.load(Ordering::SeqCst)
    }

    pub fn destroyed_count(&self) -> u64 {
        self.destroyed.load(Ordering::SeqCst)
    }

    pub fn live_scenes(&self) -> Vec<MapScene> {
        self.live
            .lock()
            .map(|live| live.values().cloned().collect())
            .unwrap_or_default()
    }
}

impl MapSurface for HeadlessSurface {
    fn render(&self, scene: &MapScene) -> SurfaceId {
        let id = SurfaceId(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        if let Ok(mut live) = self.live.lock() {
            live.insert(id, scene.clone());
        }
        id
    }

    fn teardown(&self, id: SurfaceId) {
        if let Ok(mut live) = self.live.lock() {
            if live.remove(&id).is_some() {
                self.destroyed.fetch_add(1, Ordering::SeqCst);
            }
        }
    }
}

/// What the map should show: a name, and coordinates when already known.
#[derive(Debug, Clone, PartialEq)]
pub struct MapTarget {
    pub name: String,
    pub coordinates: Option<Coordinates>,
}

impl MapTarget {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            coordinates: None,
        }
    }

    pub fn at(name: impl Into<String>, coordinates: Coordinates) -> Self {
        Self {
            name: name.into(),
            coordinates: Some(coordinates),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapSnapshot {
    /// Bumped on every retarget and teardown
    pub generation: u64,
    pub target: Option<String>,
    pub coordinates: Coordinates,
    pub resolving: bool,
    pub scene: Option<MapScene>,
}

struct MapState {
    generation: u64,
    target: Option<MapTarget>,
    coordinates: Coordinates,
    resolving: bool,
    rendered: Option<(SurfaceId, MapScene)>,
    cancel: CancellationToken,
}

impl MapState {
    fn drop_surface(&mut self, surface: &dyn MapSurface) {
        if let Some((id, _)) = self.rendered.take() {
            surface.teardown(id);
        }
    }
}

struct Inner {
    geocoder: Arc<dyn Geocoder>,
    surface: Arc<dyn MapSurface>,
    config: MapConfig,
    state: Mutex<MapState>,
}

#[derive(Clone)]
pub struct MapView {
    inner: Arc<Inner>,
}

impl MapView {
    pub fn new(geocoder: Arc<dyn Geocoder>, surface: Arc<dyn MapSurface>, config: MapConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                geocoder,
                surface,
                config,
                state: Mutex::new(MapState {
                    generation: 0,
                    target: None,
                    coordinates: Coordinates::UNRESOLVED,
                    resolving: false,
                    rendered: None,
                    cancel: CancellationToken::new(),
                }),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, MapState> {
        // State is plain data; a panic elsewhere leaves it usable
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Switches to a new target: cancels any in-flight resolution and tears the
    /// current surface down. Run the returned activation to resolve and render.
    pub fn retarget(&self, target: MapTarget) -> Activation {
        let mut state = self.state();
        state.cancel.cancel();
        state.cancel = CancellationToken::new();
        state.generation += 1;
        state.drop_surface(self.inner.surface.as_ref());
        state.target = Some(target.clone());
        state.resolving = true;

        tracing::debug!(
            "Map retargeted to '{}' (generation {})",
            target.name,
            state.generation
        );

        Activation {
            view: self.clone(),
            generation: state.generation,
            cancel: state.cancel.clone(),
            target,
        }
    }

    /// Retarget and resolve in one step.
    pub async fn activate(&self, target: MapTarget) -> Option<MapScene> {
        self.retarget(target).run().await
    }

    /// Unmount: invalidates in-flight work and removes the surface.
    pub fn teardown(&self) {
        let mut state = self.state();
        state.cancel.cancel();
        state.generation += 1;
        state.drop_surface(self.inner.surface.as_ref());
        state.target = None;
        state.resolving = false;
        tracing::debug!("Map view torn down");
    }

    pub fn coordinates(&self) -> Coordinates {
        self.state().coordinates
    }

    pub fn snapshot(&self) -> MapSnapshot {
        let state = self.state();
        MapSnapshot {
            generation: state.generation,
            target: state.target.as_ref().map(|t| t.name.clone()),
            coordinates: state.coordinates,
            resolving: state.resolving,
            scene: state.rendered.as_ref().map(|(_, scene)| scene.clone()),
        }
    }
}

/// A pending resolve-and-render for one map generation.
#[must_use = "an activation does nothing until it is run"]
pub struct Activation {
    view: MapView,
    generation: u64,
    cancel: CancellationToken,
    target: MapTarget,
}

impl Activation {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Resolves coordinates (unless supplied) and renders. Returns `None` when
    /// the activation was superseded or torn down before it finished.
    pub async fn run(self) -> Option<MapScene> {
        let Activation {
            view,
            generation,
            cancel,
            target,
        } = self;

        let (center, source) = match target.coordinates {
            Some(coords) => (coords, ResolutionSource::Supplied),
            None => {
                let geocoder = Arc::clone(&view.inner.geocoder);
                let resolved = tokio::select! {
                    _ = cancel.cancelled() => {
                        tracing::debug!("Geocoding for '{}' cancelled", target.name);
                        return None;
                    }
                    resolved = geocoder.geocode(&target.name) => resolved,
                };
                match resolved {
                    Ok(coords) => (coords, ResolutionSource::Geocoded),
                    Err(e) => {
                        tracing::warn!(
                            "Geocoding '{}' failed: {} - pinning at sentinel",
                            target.name,
                            e
                        );
                        (Coordinates::UNRESOLVED, ResolutionSource::Fallback)
                    }
                }
            }
        };

        let mut state = view.state();
        if cancel.is_cancelled() || state.generation != generation {
            tracing::debug!(
                "Discarding map resolution for '{}' (generation {} superseded)",
                target.name,
                generation
            );
            return None;
        }

        let scene = MapScene::build(&target.name, center, source, &view.inner.config);
        state.drop_surface(view.inner.surface.as_ref());
        let id = view.inner.surface.render(&scene);
        state.coordinates = center;
        state.resolving = false;
        state.rendered = Some((id, scene.clone()));

        tracing::info!(
            "Map rendered for '{}' at ({}, {}) [{:?}]",
            target.name,
            center.lat,
            center.lng,
            source
        );
        Some(scene)
    }
}
