//! Session orchestration: grid rebuilds, generation-tagged fetches, overlays.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use grid_processor::GridError;
use projection::{CoordinateProjector, EquirectangularViewport, WebMercatorViewport};
use renderer::SimulatorOptions;
use test_utils::{kmh_wind_sample, uniform_sample, DEMO_CENTER, DEMO_ZOOM, GALICIA, ONE_DEGREE};
use wind_common::{GeoBounds, GeoPoint, Rgb, SampleValue};
use wind_viewer::{
    DataRequest, FetchError, Overlay, RandomFetcher, SessionError, ViewerConfig, WeatherFetcher,
    WindSession,
};

/// Returns a fixed sample for every point and counts what it was asked for.
#[derive(Clone)]
struct StubFetcher(Arc<StubState>);

struct StubState {
    sample: SampleValue,
    calls: AtomicUsize,
    points: AtomicUsize,
    fail: AtomicBool,
}

impl StubFetcher {
    fn new(sample: SampleValue) -> Self {
        Self(Arc::new(StubState {
            sample,
            calls: AtomicUsize::new(0),
            points: AtomicUsize::new(0),
            fail: AtomicBool::new(false),
        }))
    }

    fn calls(&self) -> usize {
        self.0.calls.load(Ordering::SeqCst)
    }

    fn points(&self) -> usize {
        self.0.points.load(Ordering::SeqCst)
    }

    fn set_failing(&self, fail: bool) {
        self.0.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl WeatherFetcher for StubFetcher {
    async fn fetch(&self, _request: &DataRequest, points: &[GeoPoint]) -> Result<Vec<SampleValue>, FetchError> {
        self.0.calls.fetch_add(1, Ordering::SeqCst);
        if self.0.fail.load(Ordering::SeqCst) {
            return Err(FetchError::Unavailable("stub offline".into()));
        }
        self.0.points.fetch_add(points.len(), Ordering::SeqCst);
        Ok(points.iter().map(|_| self.0.sample.clone()).collect())
    }
}

/// Half-degree lattice, so the one-degree fixture yields 3x3 points.
fn test_config() -> ViewerConfig {
    let mut config = ViewerConfig::default();
    config.grid.point_distance = Some(0.5);
    config.session.fetch_batch_size = 4;
    config
}

fn session_with(sample: SampleValue) -> (WindSession<StubFetcher>, StubFetcher) {
    let fetcher = StubFetcher::new(sample);
    let session = WindSession::with_seed(test_config(), fetcher.clone(), 7).unwrap();
    (session, fetcher)
}

fn forecast() -> DataRequest {
    DataRequest::Forecast {
        start: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
        end: NaiveDate::from_ymd_opt(2024, 3, 2).unwrap(),
    }
}

#[tokio::test]
async fn test_refresh_fetches_every_new_point_in_batches() {
    let (mut session, fetcher) = session_with(uniform_sample(10.0, 5.0, 270.0));
    let t0 = Instant::now();
    session.on_viewport_change(ONE_DEGREE, 8.0, t0);
    assert!(session.needs_rebuild().unwrap());

    let grid = session.rebuild().unwrap();
    assert_eq!((grid.nx, grid.ny), (3, 3));
    assert_eq!(grid.new_points().len(), 9);

    assert_eq!(session.refresh(t0).await.unwrap(), 9);
    assert_eq!(fetcher.points(), 9);
    // 9 points in batches of 4.
    assert_eq!(fetcher.calls(), 3);
    assert!(!session.needs_rebuild().unwrap());
}

#[test]
fn test_rebuild_over_same_viewport_reuses_cache() {
    let (mut session, fetcher) = session_with(uniform_sample(10.0, 5.0, 270.0));
    let t0 = Instant::now();
    session.on_viewport_change(ONE_DEGREE, 8.0, t0);
    session.rebuild().unwrap();
    tokio_test::block_on(session.refresh(t0)).unwrap();

    let grid = session.rebuild().unwrap();
    assert!(grid.new_points().is_empty());
    assert_eq!(tokio_test::block_on(session.refresh(t0)).unwrap(), 0);
    assert_eq!(fetcher.points(), 9);
}

#[tokio::test]
async fn test_superseded_results_are_discarded() {
    let (mut session, _fetcher) = session_with(uniform_sample(10.0, 5.0, 270.0));
    let t0 = Instant::now();
    session.on_viewport_change(ONE_DEGREE, 8.0, t0);
    session.rebuild().unwrap();

    let ticket = session.begin_refresh(Utc::now()).unwrap();
    assert_eq!(ticket.points().len(), 9);
    let samples = vec![uniform_sample(10.0, 5.0, 270.0); 9];

    session.rebuild().unwrap();
    assert!(ticket.generation() < session.generation());
    assert_eq!(session.complete_refresh(ticket, Ok(samples), t0).unwrap(), 0);
    assert!(session.grid().is_none());
    assert!(session.pending_grid().is_some());
    assert!(matches!(session.sample_at(0.5, 0.5), Err(SessionError::NoGrid)));
}

#[tokio::test]
async fn test_failed_fetch_keeps_last_good_samples() {
    let (mut session, fetcher) = session_with(uniform_sample(10.0, 5.0, 270.0));
    let t0 = Instant::now();
    session.on_viewport_change(ONE_DEGREE, 8.0, t0);
    session.rebuild().unwrap();
    session.refresh(t0).await.unwrap();

    // Two hours later every sample is stale and queued again.
    let ticket = session
        .begin_refresh(Utc::now() + chrono::Duration::hours(2))
        .unwrap();
    assert_eq!(ticket.points().len(), 9);

    let err = session
        .complete_refresh(ticket, Err(FetchError::Unavailable("down".into())), t0)
        .unwrap_err();
    assert!(matches!(err, SessionError::Fetch(_)));
    let sample = session.sample_at(0.5, 0.5).unwrap();
    assert!((sample.temperature.unwrap() - 10.0).abs() < 1e-9);

    fetcher.set_failing(true);
    session.rebuild().unwrap();
    // Nothing is pending right now, so the failing source is never asked.
    assert_eq!(session.refresh(t0).await.unwrap(), 0);
    assert!(session.sample_at(0.25, 0.75).is_ok());
}

#[tokio::test]
async fn test_fetch_error_propagates_from_refresh() {
    let (mut session, fetcher) = session_with(uniform_sample(10.0, 5.0, 270.0));
    fetcher.set_failing(true);
    let t0 = Instant::now();
    session.on_viewport_change(ONE_DEGREE, 8.0, t0);
    session.rebuild().unwrap();

    let err = session.refresh(t0).await.unwrap_err();
    assert!(matches!(err, SessionError::Fetch(FetchError::Unavailable(_))));
    assert_eq!(session.begin_refresh(Utc::now()).unwrap().points().len(), 9);
}

#[tokio::test]
async fn test_sample_count_mismatch_is_rejected() {
    let (mut session, _fetcher) = session_with(uniform_sample(10.0, 5.0, 270.0));
    let t0 = Instant::now();
    session.on_viewport_change(ONE_DEGREE, 8.0, t0);
    session.rebuild().unwrap();

    let ticket = session.begin_refresh(Utc::now()).unwrap();
    let err = session
        .complete_refresh(ticket, Ok(vec![uniform_sample(1.0, 1.0, 0.0)]), t0)
        .unwrap_err();
    assert!(matches!(
        err,
        SessionError::Fetch(FetchError::CountMismatch { expected: 9, actual: 1 })
    ));
}

#[tokio::test]
async fn test_sample_at_interpolates_and_normalizes_units() {
    // 36 km/h from the south.
    let (mut session, _fetcher) = session_with(kmh_wind_sample(36.0, 180.0));
    let t0 = Instant::now();
    session.on_viewport_change(ONE_DEGREE, 8.0, t0);
    session.rebuild().unwrap();
    session.refresh(t0).await.unwrap();

    let sample = session.sample_at(0.3, 0.6).unwrap();
    assert!((sample.wind_speed.unwrap() - 10.0).abs() < 1e-3);
    assert!((sample.wind_direction.unwrap() - 180.0).abs() < 1e-6);

    assert!(matches!(
        session.sample_at(5.0, 5.0),
        Err(SessionError::Grid(GridError::OutsideGrid { .. }))
    ));
}

#[test]
fn test_sample_at_without_grid() {
    let (session, _fetcher) = session_with(uniform_sample(10.0, 5.0, 270.0));
    assert!(matches!(session.sample_at(0.5, 0.5), Err(SessionError::NoGrid)));
}

#[tokio::test]
async fn test_switching_requests_keeps_separate_caches() {
    let (mut session, fetcher) = session_with(uniform_sample(10.0, 5.0, 270.0));
    let t0 = Instant::now();
    session.on_viewport_change(ONE_DEGREE, 8.0, t0);
    session.rebuild().unwrap();
    session.refresh(t0).await.unwrap();

    assert_eq!(session.select_request(forecast(), t0).await.unwrap(), 9);
    assert_eq!(session.request(), &forecast());

    // Back to the first request: its cache is still warm.
    assert_eq!(session.select_request(DataRequest::Current, t0).await.unwrap(), 0);
    assert_eq!(fetcher.points(), 18);
    assert!(session.sample_at(0.5, 0.5).is_ok());
}

#[test]
fn test_overlays_are_exclusive_and_recolor_particles() {
    let (mut session, _fetcher) = session_with(uniform_sample(10.0, 5.0, 270.0));
    let configured = SimulatorOptions::default().color_scale;

    session.set_overlay(Overlay::Temperature).unwrap();
    assert_eq!(session.overlay(), Overlay::Temperature);
    assert_eq!(session.wind_layer().drawable().options().color_scale, vec![Rgb::WHITE]);

    session.set_overlay(Overlay::Precipitation).unwrap();
    assert_eq!(session.overlay(), Overlay::Precipitation);
    assert_eq!(session.wind_layer().drawable().options().color_scale, vec![Rgb::WHITE]);

    session.set_overlay(Overlay::None).unwrap();
    assert_eq!(session.wind_layer().drawable().options().color_scale, configured);
}

#[test]
fn test_toggle_updates_pauses_viewport_rebuilds() {
    let (mut session, _fetcher) = session_with(uniform_sample(10.0, 5.0, 270.0));
    let t0 = Instant::now();

    assert!(!session.toggle_updates(t0));
    session.on_viewport_change(ONE_DEGREE, 8.0, t0);
    assert!(!session.is_rebuild_pending());
    assert_eq!(session.next_deadline(), None);

    assert!(session.toggle_updates(t0));
    assert!(session.is_rebuild_pending());
    assert_eq!(session.next_deadline(), Some(t0 + Duration::from_millis(300)));
}

#[tokio::test]
async fn test_tick_rebuilds_after_viewport_debounce() {
    let (mut session, fetcher) = session_with(uniform_sample(10.0, 5.0, 270.0));
    let view = EquirectangularViewport::new(ONE_DEGREE, 64, 64);
    session.attach(64, 64).unwrap();

    let t0 = Instant::now();
    session.on_viewport_change(ONE_DEGREE, 8.0, t0);
    session.tick(&view, t0 + Duration::from_millis(100)).await.unwrap();
    assert!(session.grid().is_none());
    assert_eq!(fetcher.calls(), 0);

    session.tick(&view, t0 + Duration::from_millis(300)).await.unwrap();
    assert!(session.grid().is_some());
    assert_eq!(fetcher.points(), 9);
    assert!(session.wind_layer().drawable().has_data());
}

#[tokio::test]
async fn test_failed_pan_fetch_keeps_last_grid_and_retries() {
    let (mut session, fetcher) = session_with(uniform_sample(10.0, 5.0, 270.0));
    let view = EquirectangularViewport::new(ONE_DEGREE, 64, 64);
    session.attach(64, 64).unwrap();

    let t0 = Instant::now();
    session.on_viewport_change(ONE_DEGREE, 8.0, t0);
    session.tick(&view, t0 + Duration::from_millis(300)).await.unwrap();
    assert_eq!(fetcher.points(), 9);

    let east = GeoBounds::new(2.0, 0.0, 3.0, 1.0);
    fetcher.set_failing(true);
    let t1 = t0 + Duration::from_secs(1);
    session.on_viewport_change(east, 8.0, t1);
    let err = session.tick(&view, t1 + Duration::from_millis(300)).await.unwrap_err();
    assert!(matches!(err, SessionError::Fetch(FetchError::Unavailable(_))));

    // The fetched grid stays current and the rebuild is armed again.
    assert_eq!(session.grid().unwrap().bounds.west, 0.0);
    assert!(session.sample_at(0.5, 0.5).is_ok());
    assert!(session.is_rebuild_pending());

    // A small pan inside the unfetched area once the source is back.
    fetcher.set_failing(false);
    let calls = fetcher.calls();
    let t2 = t1 + Duration::from_secs(1);
    session.on_viewport_change(GeoBounds::new(2.1, 0.1, 2.9, 0.9), 8.0, t2);
    session.tick(&view, t2 + Duration::from_millis(300)).await.unwrap();
    assert!(fetcher.calls() > calls);
    assert!(session.pending_grid().is_none());
    assert_eq!(session.grid().unwrap().bounds.west, 2.0);
    assert!(session.sample_at(0.5, 2.5).is_ok());
}

#[tokio::test]
async fn test_failed_fetch_retries_without_another_pan() {
    let (mut session, fetcher) = session_with(uniform_sample(10.0, 5.0, 270.0));
    let view = EquirectangularViewport::new(ONE_DEGREE, 64, 64);
    session.attach(64, 64).unwrap();
    fetcher.set_failing(true);

    let t0 = Instant::now();
    session.on_viewport_change(ONE_DEGREE, 8.0, t0);
    assert!(session.tick(&view, t0 + Duration::from_millis(300)).await.is_err());
    assert!(session.grid().is_none());

    fetcher.set_failing(false);
    assert!(session.is_rebuild_pending());
    session.tick(&view, t0 + Duration::from_millis(600)).await.unwrap();
    assert!(session.grid().is_some());
    assert_eq!(fetcher.points(), 9);
}

#[tokio::test]
async fn test_composite_shows_visible_overlay() {
    let mut config = test_config();
    config.session.overlay = Overlay::Temperature;
    let fetcher = StubFetcher::new(uniform_sample(10.0, 5.0, 270.0));
    let mut session = WindSession::with_seed(config, fetcher, 3).unwrap();
    let view = EquirectangularViewport::new(ONE_DEGREE, 32, 32);

    assert!(matches!(session.composite(), Err(SessionError::NotAttached)));
    session.attach(32, 32).unwrap();

    let t0 = Instant::now();
    session.on_viewport_change(ONE_DEGREE, 8.0, t0);
    session.rebuild().unwrap();
    session.refresh(t0).await.unwrap();
    assert!(session.render(&view, t0 + Duration::from_millis(100)).unwrap());

    let image = session.composite().unwrap();
    assert_eq!((image.width(), image.height()), (32, 32));
    assert!(image.pixel(16, 16).unwrap().alpha() > 0);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("frame_0000.png");
    std::fs::write(&path, renderer::png::encode_pixmap(&image).unwrap()).unwrap();
    assert!(std::fs::metadata(&path).unwrap().len() > 8);
}

#[test]
fn test_detached_session_refuses_to_render() {
    let (mut session, _fetcher) = session_with(uniform_sample(10.0, 5.0, 270.0));
    let view = EquirectangularViewport::new(ONE_DEGREE, 16, 16);
    session.attach(16, 16).unwrap();
    session.detach();
    assert!(matches!(
        session.render(&view, Instant::now()),
        Err(SessionError::NotAttached)
    ));
}

#[tokio::test]
async fn test_demo_viewport_with_random_source() {
    let (lat, lon) = DEMO_CENTER;
    assert!(GALICIA.contains_point(lat, lon));

    let config = ViewerConfig::default();
    let mut session = WindSession::with_seed(config, RandomFetcher::new(42), 42).unwrap();
    let view = WebMercatorViewport::new(lat, lon, DEMO_ZOOM, 256, 256);
    session.attach(256, 256).unwrap();

    let t0 = Instant::now();
    session.on_viewport_change(view.bounds(), DEMO_ZOOM, t0);
    session.rebuild().unwrap();
    let fetched = session.refresh(t0).await.unwrap();

    let grid = session.grid().unwrap();
    assert_eq!(fetched, grid.len());
    assert!(grid.len() <= 600);
    assert!(grid.covers(&view.bounds()));

    let sample = session.sample_at(lat, lon).unwrap();
    assert!(sample.temperature.is_some());
    assert!(sample.wind_speed.unwrap() >= 0.0);
}
