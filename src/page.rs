//! The locality page: search, detail, map and chat wired together.

use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::assistant::{Assistant, HttpAssistant};
use crate::chat::{ChatSession, ChatSnapshot, SubmitOutcome};
use crate::config::Config;
use crate::detail::{DetailPanel, DetailView};
use crate::error::Result;
use crate::geocoder::{Geocoder, NominatimGeocoder};
use crate::locality::{HttpLocalityLookup, LocalityLookup};
use crate::map_view::{MapScene, MapSurface, MapTarget, MapView};
use crate::models::{Coordinates, LocalityRecord};
use crate::search::{SearchController, SearchSnapshot, SelectOutcome};
use crate::transport::{HttpTransport, Transport};

/// A consistent read of the whole page.
///
/// The map scene is only reported when it comes from the map generation the
/// selected record committed, so a rating is never paired with another pin.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageSnapshot {
    pub search: SearchSnapshot,
    pub detail: Option<DetailView>,
    pub map: Option<MapScene>,
    pub map_resolving: bool,
    pub coordinates: Coordinates,
    pub chat: ChatSnapshot,
}

#[derive(Clone)]
pub struct LocalityPage {
    search: SearchController,
    map: MapView,
    detail: Arc<Mutex<DetailPanel>>,
    /// Map generation started by the selection that installed the current record
    committed_map: Arc<Mutex<Option<u64>>>,
    chat: ChatSession,
    reset_chat_on_selection: bool,
}

impl LocalityPage {
    pub fn new(
        config: &Config,
        lookup: Arc<dyn LocalityLookup>,
        geocoder: Arc<dyn Geocoder>,
        assistant: Arc<dyn Assistant>,
        surface: Arc<dyn MapSurface>,
    ) -> Self {
        Self {
            search: SearchController::new(lookup, &config.search),
            map: MapView::new(geocoder, surface, config.map.clone()),
            detail: Arc::new(Mutex::new(DetailPanel::new(
                config.detail.default_time_range_years,
            ))),
            committed_map: Arc::new(Mutex::new(None)),
            chat: ChatSession::new(assistant, &config.chat),
            reset_chat_on_selection: config.chat.reset_on_selection,
        }
    }

    /// Builds the page against the HTTP services named in `config`.
    pub fn from_config(config: &Config, surface: Arc<dyn MapSurface>) -> Result<Self> {
        let transport: Arc<dyn Transport> = Arc::new(HttpTransport::from_config(config)?);
        tracing::info!(
            "Services: locality={} assistant={} geocoder={}",
            config.services.locality_url,
            config.services.assistant_url,
            config.services.geocoder_url
        );

        let lookup = Arc::new(HttpLocalityLookup::new(
            Arc::clone(&transport),
            config.services.locality_url.clone(),
        ));
        let geocoder = Arc::new(NominatimGeocoder::new(
            Arc::clone(&transport),
            config.services.geocoder_url.clone(),
        ));
        let assistant = Arc::new(HttpAssistant::new(
            Arc::clone(&transport),
            config.services.assistant_url.clone(),
        ));

        Ok(Self::new(config, lookup, geocoder, assistant, surface))
    }

    pub fn search(&self) -> &SearchController {
        &self.search
    }

    pub fn map(&self) -> &MapView {
        &self.map
    }

    pub fn chat(&self) -> &ChatSession {
        &self.chat
    }

    /// Selects a locality; on success the map is retargeted in the same
    /// transition that installs the record, then resolved and rendered.
    pub async fn select(&self, name: &str) -> SelectOutcome {
        let (outcome, activation) = self
            .search
            .select_with(name, |record| {
                if self.reset_chat_on_selection {
                    self.chat.reset();
                }
                let activation = self.map.retarget(self.map_target(record));
                *self.committed_map() = Some(activation.generation());
                activation
            })
            .await;

        if let Some(activation) = activation {
            activation.run().await;
        }
        outcome
    }

    /// Submits the search box contents.
    pub async fn submit_search(&self) -> SelectOutcome {
        let query = self.search.snapshot().query;
        self.select(&query).await
    }

    pub async fn ask(&self, question: &str) -> SubmitOutcome {
        self.chat.send(question).await
    }

    pub fn set_time_range(&self, years: u32) {
        self.detail
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .set_time_range(years);
    }

    /// Tears everything down; in-flight work finishes without touching state.
    pub fn unmount(&self) {
        self.search.shutdown();
        self.map.teardown();
        self.chat.reset();
        tracing::info!("Locality page unmounted");
    }

    fn committed_map(&self) -> MutexGuard<'_, Option<u64>> {
        self.committed_map
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Lookup coordinates first, then seed coordinates, else geocode by name.
    fn map_target(&self, record: &LocalityRecord) -> MapTarget {
        let coordinates = record
            .coordinates
            .or_else(|| self.search.seed_coordinates(&record.name));
        MapTarget {
            name: record.name.clone(),
            coordinates,
        }
    }

    pub fn snapshot(&self) -> PageSnapshot {
        let (search, (map, committed)) = self
            .search
            .snapshot_with(|_| (self.map.snapshot(), *self.committed_map()));
        let detail = search.selected.as_ref().map(|record| {
            self.detail
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .view(record)
        });

        let scene = map.scene.filter(|_| Some(map.generation) == committed);
        let map_resolving = search.selected.is_some() && scene.is_none();

        PageSnapshot {
            detail,
            map: scene,
            map_resolving,
            coordinates: map.coordinates,
            chat: self.chat.snapshot(),
            search,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assistant::MockAssistant;
    use crate::error::SpotOnError;
    use crate::geocoder::MockGeocoder;
    use crate::locality::MockLocalityLookup;
    use crate::map_view::{HeadlessSurface, ResolutionSource};
    use crate::models::{Description, SuggestionSeed};
    use async_trait::async_trait;
    use tokio::sync::oneshot;

    fn geocoding_to(coords: Coordinates) -> MockGeocoder {
        let mut geocoder = MockGeocoder::new();
        geocoder.expect_geocode().returning(move |_| Ok(coords));
        geocoder
    }

    fn record(rating: f64, coordinates: Option<Coordinates>) -> LocalityRecord {
        LocalityRecord {
            name: "alias".to_string(),
            rating,
            description: Description::Structured(vec!["Good schools".into()]),
            coordinates,
        }
    }

    #[tokio::test]
    async fn test_lookup_coordinates_win_over_seed() {
        let mut lookup = MockLocalityLookup::new();
        lookup
            .expect_lookup()
            .returning(|_| Ok(record(55.0, Some(Coordinates::new(12.0, 77.0)))));
        let mut geocoder = MockGeocoder::new();
        geocoder.expect_geocode().times(0);
        let mut config = Config::default();
        config.search.suggestions = vec![SuggestionSeed::new(
            "Sarjapur",
            Some(Coordinates::new(12.8583, 77.7843)),
        )];
        let page = LocalityPage::new(
            &config,
            Arc::new(lookup),
            Arc::new(geocoder),
            Arc::new(MockAssistant::new()),
            Arc::new(HeadlessSurface::new()),
        );

        page.select("Sarjapur").await;

        let snap = page.snapshot();
        let scene = snap.map.expect("map should be rendered");
        assert_eq!(scene.center, Coordinates::new(12.0, 77.0));
        assert_eq!(scene.source, ResolutionSource::Supplied);
    }

    #[tokio::test]
    async fn test_seed_coordinates_skip_geocoding() {
        let mut lookup = MockLocalityLookup::new();
        lookup.expect_lookup().returning(|_| Ok(record(55.0, None)));
        let mut geocoder = MockGeocoder::new();
        geocoder.expect_geocode().times(0);
        let mut config = Config::default();
        config.search.suggestions = vec![SuggestionSeed::new(
            "Varthur",
            Some(Coordinates::new(12.9374, 77.7446)),
        )];
        let page = LocalityPage::new(
            &config,
            Arc::new(lookup),
            Arc::new(geocoder),
            Arc::new(MockAssistant::new()),
            Arc::new(HeadlessSurface::new()),
        );

        page.select("Varthur").await;

        let scene = page.snapshot().map.unwrap();
        assert_eq!(scene.center, Coordinates::new(12.9374, 77.7446));
        assert_eq!(scene.markers[0].popup, "Varthur");
    }

    #[tokio::test]
    async fn test_failed_selection_keeps_map_and_detail() {
        let mut lookup = MockLocalityLookup::new();
        let mut calls = 0;
        lookup.expect_lookup().times(2).returning(move |_| {
            calls += 1;
            if calls == 1 {
                Ok(record(40.0, None))
            } else {
                Err(SpotOnError::network("http://svc", Some(500), "down"))
            }
        });
        let mut geocoder = MockGeocoder::new();
        geocoder
            .expect_geocode()
            .times(1)
            .returning(|_| Ok(Coordinates::new(13.0, 77.6)));
        let page = LocalityPage::new(
            &Config::default(),
            Arc::new(lookup),
            Arc::new(geocoder),
            Arc::new(MockAssistant::new()),
            Arc::new(HeadlessSurface::new()),
        );

        page.select("Hebbal").await;
        let outcome = page.select("Yelahanka").await;

        assert!(matches!(outcome, SelectOutcome::Failed(_)));
        let snap = page.snapshot();
        assert_eq!(snap.detail.unwrap().name, "Hebbal");
        assert_eq!(snap.map.unwrap().name, "Hebbal");
        assert!(snap.search.error.is_some());
    }

    #[tokio::test]
    async fn test_snapshot_hides_scene_of_other_locality() {
        let mut lookup = MockLocalityLookup::new();
        lookup.expect_lookup().returning(|_| Ok(record(40.0, None)));
        let mut geocoder = MockGeocoder::new();
        geocoder
            .expect_geocode()
            .returning(|_| Ok(Coordinates::new(13.0, 77.6)));
        let page = LocalityPage::new(
            &Config::default(),
            Arc::new(lookup),
            Arc::new(geocoder),
            Arc::new(MockAssistant::new()),
            Arc::new(HeadlessSurface::new()),
        );
        page.select("Hebbal").await;

        // Map moves on by itself; the page must not pair Hebbal's rating with it
        page.map()
            .activate(MapTarget::at("Elsewhere", Coordinates::new(1.0, 1.0)))
            .await;

        let snap = page.snapshot();
        assert_eq!(snap.detail.unwrap().name, "Hebbal");
        assert!(snap.map.is_none());
        assert!(snap.map_resolving);
    }

    #[tokio::test]
    async fn test_reset_on_selection() {
        let mut config = Config::default();
        config.chat.reset_on_selection = true;
        let mut lookup = MockLocalityLookup::new();
        lookup.expect_lookup().returning(|_| Ok(record(40.0, None)));
        let mut assistant = MockAssistant::new();
        assistant.expect_ask().returning(|_| Ok("Sure.".to_string()));
        let page = LocalityPage::new(
            &config,
            Arc::new(lookup),
            Arc::new(geocoding_to(Coordinates::new(12.86, 77.78))),
            Arc::new(assistant),
            Arc::new(HeadlessSurface::new()),
        );

        page.ask("Hi?").await;
        assert_eq!(page.chat().transcript().len(), 3);
        page.select("Sarjapur").await;
        assert_eq!(page.chat().transcript().len(), 1);
    }

    #[tokio::test]
    async fn test_time_range_is_display_only() {
        let mut lookup = MockLocalityLookup::new();
        lookup.expect_lookup().returning(|_| Ok(record(72.0, None)));
        let page = LocalityPage::new(
            &Config::default(),
            Arc::new(lookup),
            Arc::new(geocoding_to(Coordinates::new(12.97, 77.75))),
            Arc::new(MockAssistant::new()),
            Arc::new(HeadlessSurface::new()),
        );
        page.select("Whitefield").await;
        let before = page.snapshot().detail.unwrap();

        page.set_time_range(10);
        let after = page.snapshot().detail.unwrap();

        assert_eq!(after.time_range.label(), "in next 10 years");
        assert_eq!(after.gauge, before.gauge);
    }

    #[tokio::test]
    async fn test_unmount_clears_map() {
        let mut lookup = MockLocalityLookup::new();
        lookup.expect_lookup().returning(|_| Ok(record(72.0, None)));
        let surface = Arc::new(HeadlessSurface::new());
        let page = LocalityPage::new(
            &Config::default(),
            Arc::new(lookup),
            Arc::new(geocoding_to(Coordinates::new(12.97, 77.75))),
            Arc::new(MockAssistant::new()),
            surface.clone(),
        );
        page.select("Whitefield").await;
        assert_eq!(surface.live_count(), 1);

        page.unmount();

        assert_eq!(surface.live_count(), 0);
        assert!(page.snapshot().map.is_none());
    }

    #[tokio::test]
    async fn test_default_seeds_geocode_by_name() {
        let mut lookup = MockLocalityLookup::new();
        lookup.expect_lookup().returning(|_| Ok(record(72.0, None)));
        let mut geocoder = MockGeocoder::new();
        geocoder
            .expect_geocode()
            .withf(|place| place == "Whitefield")
            .times(1)
            .returning(|_| Ok(Coordinates::new(12.9698, 77.75)));
        let page = LocalityPage::new(
            &Config::default(),
            Arc::new(lookup),
            Arc::new(geocoder),
            Arc::new(MockAssistant::new()),
            Arc::new(HeadlessSurface::new()),
        );

        page.select("Whitefield").await;

        let scene = page.snapshot().map.expect("map should be rendered");
        assert_eq!(scene.source, ResolutionSource::Geocoded);
        assert_eq!(scene.center, Coordinates::new(12.9698, 77.75));
        assert_eq!(scene.markers[0].popup, "Whitefield");
    }

    #[tokio::test]
    async fn test_snapshot_hides_newer_pin_for_same_name() {
        let mut lookup = MockLocalityLookup::new();
        lookup
            .expect_lookup()
            .returning(|_| Ok(record(40.0, Some(Coordinates::new(13.0, 77.6)))));
        let page = LocalityPage::new(
            &Config::default(),
            Arc::new(lookup),
            Arc::new(MockGeocoder::new()),
            Arc::new(MockAssistant::new()),
            Arc::new(HeadlessSurface::new()),
        );
        page.select("Hebbal").await;
        assert!(page.snapshot().map.is_some());

        // Same name, different pin, not committed by a selection
        page.map()
            .activate(MapTarget::at("Hebbal", Coordinates::new(1.0, 1.0)))
            .await;

        let snap = page.snapshot();
        assert_eq!(snap.detail.unwrap().name, "Hebbal");
        assert!(snap.map.is_none());
        assert!(snap.map_resolving);
    }

    /// Lookup whose answers are released by the test, one gate per call.
    struct GatedLookup {
        gates: Mutex<Vec<oneshot::Receiver<crate::error::Result<LocalityRecord>>>>,
    }

    #[async_trait]
    impl LocalityLookup for GatedLookup {
        async fn lookup(&self, _locality: &str) -> crate::error::Result<LocalityRecord> {
            let gate = self.gates.lock().unwrap().remove(0);
            gate.await
                .unwrap_or_else(|_| Err(SpotOnError::Internal("gate dropped".into())))
        }
    }

    #[tokio::test]
    async fn test_superseded_selection_leaves_map_alone() {
        let (first_tx, first_rx) = oneshot::channel();
        let (second_tx, second_rx) = oneshot::channel();
        let lookup = Arc::new(GatedLookup {
            gates: Mutex::new(vec![first_rx, second_rx]),
        });
        let mut geocoder = MockGeocoder::new();
        geocoder
            .expect_geocode()
            .withf(|place| place == "Whitefield")
            .times(1)
            .returning(|_| Ok(Coordinates::new(12.9698, 77.75)));
        let surface = Arc::new(HeadlessSurface::new());
        let page = LocalityPage::new(
            &Config::default(),
            lookup,
            Arc::new(geocoder),
            Arc::new(MockAssistant::new()),
            surface.clone(),
        );

        let p1 = page.clone();
        let first = tokio::spawn(async move { p1.select("Sarjapur").await });
        tokio::task::yield_now().await;
        let p2 = page.clone();
        let second = tokio::spawn(async move { p2.select("Whitefield").await });
        tokio::task::yield_now().await;

        second_tx.send(Ok(record(72.0, None))).unwrap();
        assert!(matches!(second.await.unwrap(), SelectOutcome::Selected(_)));
        first_tx.send(Ok(record(40.0, None))).unwrap();
        assert_eq!(first.await.unwrap(), SelectOutcome::Superseded);

        let snap = page.snapshot();
        assert_eq!(snap.detail.unwrap().name, "Whitefield");
        assert_eq!(snap.map.unwrap().name, "Whitefield");
        assert_eq!(page.map().snapshot().target.as_deref(), Some("Whitefield"));
        assert_eq!(surface.created_count(), 1);
        assert_eq!(surface.live_count(), 1);
    }
}
