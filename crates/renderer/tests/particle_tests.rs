//! Particle simulator behavior on a 40x40 canvas over a 4°x4° box.

use std::time::{Duration, Instant};

use projection::{CoordinateProjector, EquirectangularViewport, WebMercatorViewport};
use renderer::particles::{distort, FieldSample, PixelVector};
use renderer::{
    CanvasLayer, OptionsPatch, Particle, ParticleSimulator, RenderError, SimulatorOptions,
    SimulatorState, StartParams,
};
use test_utils::{create_test_field, create_uniform_wind_records, Lattice};
use tiny_skia::{Color, Pixmap};
use wind_common::{GeoBounds, Rgb, WeatherField, WindVector};

// ============================================================================
// Helpers
// ============================================================================

fn lattice() -> Lattice {
    Lattice::new(0.0, 4.0, 5, 5, 1.0)
}

fn view() -> EquirectangularViewport {
    EquirectangularViewport::new(GeoBounds::new(0.0, 0.0, 4.0, 4.0), 40, 40)
}

/// About 12 px per frame for 10 m/s on this canvas.
fn options() -> SimulatorOptions {
    SimulatorOptions {
        velocity_scale: 1.0,
        particle_multiplier: 0.05,
        ..SimulatorOptions::default()
    }
}

fn running(records: Vec<WeatherField>) -> (ParticleSimulator, Pixmap, Instant) {
    let mut sim = ParticleSimulator::with_seed(options(), 42);
    sim.set_data(records);
    let mut canvas = Pixmap::new(40, 40).unwrap();
    let now = Instant::now();
    assert!(sim.tick(&mut canvas, &view(), now).unwrap());
    assert_eq!(sim.state(), SimulatorState::Animating);
    (sim, canvas, now)
}

fn place(sim: &mut ParticleSimulator, x: f64, y: f64) {
    sim.particles_mut()[0] = Particle {
        x,
        y,
        xt: x,
        yt: y,
        age: 0,
    };
}

// ============================================================================
// Advection
// ============================================================================

#[test]
fn test_particle_count_follows_multiplier() {
    let (sim, _, _) = running(create_uniform_wind_records(lattice(), 10.0, 0.0));
    assert_eq!(sim.particles().len(), 80);
    let max_age = sim.options().particle_age;
    assert!(sim.particles().iter().all(|p| p.age <= max_age));
}

#[test]
fn test_no_data_destination_keeps_position_and_ages_out() {
    let mut records = create_uniform_wind_records(lattice(), 10.0, 0.0);
    // Node at lat 2, lon 3.
    records[0].data[2 * 5 + 3] = f64::NAN;
    let (mut sim, _, _) = running(records);
    let max_age = sim.options().particle_age;

    let field = sim.field().unwrap();
    assert!(field.sample(14.0, 20.0).vector().is_some());
    assert_eq!(field.sample(26.0, 20.0), FieldSample::NoData);

    place(&mut sim, 14.0, 20.0);
    sim.evolve();

    let p = sim.particles()[0];
    assert_eq!((p.x, p.y), (14.0, 20.0));
    assert!(p.age >= max_age);
    assert!(!sim.buckets().iter().any(|b| b.contains(&0)));
}

#[test]
fn test_leaving_canvas_moves_without_trail() {
    let (mut sim, _, _) = running(create_uniform_wind_records(lattice(), 10.0, 0.0));
    let max_age = sim.options().particle_age;

    place(&mut sim, 36.0, 4.0);
    sim.evolve();
    let p = sim.particles()[0];
    assert!(p.x > 40.0);
    assert_eq!(p.y, 4.0);
    assert_eq!(p.age, 1);
    assert!(!sim.buckets().iter().any(|b| b.contains(&0)));

    // Off-canvas particles have no wind and die on the next frame.
    sim.evolve();
    assert_eq!(sim.particles()[0].age, max_age + 1);
}

#[test]
fn test_valid_move_is_bucketed_and_committed_on_draw() {
    let (mut sim, mut canvas, _) = running(create_uniform_wind_records(lattice(), 10.0, 0.0));
    canvas.fill(Color::TRANSPARENT);

    place(&mut sim, 2.0, 36.0);
    sim.evolve();
    let p = sim.particles()[0];
    assert_eq!(p.x, 2.0);
    assert!(p.xt > 10.0 && p.xt < 16.0);
    // 10 m/s is the top of the default 0..10 range.
    assert!(sim.buckets()[9].contains(&0));

    sim.draw(&mut canvas);
    let p = sim.particles()[0];
    assert_eq!(p.x, p.xt);

    let trail = (35..=36).any(|row| canvas.pixel(8, row).map_or(false, |c| c.alpha() > 0));
    assert!(trail);
}

#[test]
fn test_fade_keeps_most_of_previous_frame() {
    let (mut sim, mut canvas, _) = running(create_uniform_wind_records(lattice(), 0.0, 0.0));
    canvas.fill(Color::WHITE);
    sim.evolve();
    sim.draw(&mut canvas);

    // Strokes only add coverage, so nothing drops below the fade level.
    assert!(canvas.pixels().iter().all(|c| c.alpha() >= 245));
    let faded = canvas
        .pixels()
        .iter()
        .filter(|c| (245..=249).contains(&c.alpha()))
        .count();
    assert!(faded > 1000, "only {} pixels faded", faded);
}

// ============================================================================
// Lifecycle
// ============================================================================

#[test]
fn test_set_data_preserves_ages() {
    let (mut sim, mut canvas, now) = running(create_uniform_wind_records(lattice(), 10.0, 0.0));
    let before: Vec<u32> = sim.particles().iter().map(|p| p.age).collect();

    sim.set_data(create_uniform_wind_records(lattice(), 5.0, 0.0));
    assert_eq!(sim.state(), SimulatorState::Stopped);
    assert!(sim.field().is_none());

    assert!(sim.tick(&mut canvas, &view(), now + Duration::from_millis(10)).unwrap());
    let after: Vec<u32> = sim.particles().iter().map(|p| p.age).collect();
    assert_eq!(after.len(), before.len());
    for (old, new) in before.iter().zip(&after) {
        assert_eq!(*new, old + 1);
    }
}

#[test]
fn test_set_options_does_not_restart() {
    let (mut sim, mut canvas, now) = running(create_uniform_wind_records(lattice(), 10.0, 0.0));
    sim.set_options(&OptionsPatch::color_scale(vec![Rgb::WHITE])).unwrap();
    assert_eq!(sim.state(), SimulatorState::Animating);
    assert!(sim.field().is_some());

    let next = sim.next_deadline().unwrap();
    assert!(sim.tick(&mut canvas, &view(), next + Duration::from_millis(1)).unwrap());
    assert_eq!(sim.buckets().len(), 1);
    assert!(next > now);
}

#[test]
fn test_frames_are_paced() {
    let (mut sim, mut canvas, now) = running(create_uniform_wind_records(lattice(), 10.0, 0.0));
    assert!(!sim.tick(&mut canvas, &view(), now + Duration::from_millis(20)).unwrap());
    // 15 fps
    assert!(sim.tick(&mut canvas, &view(), now + Duration::from_millis(70)).unwrap());
}

#[test]
fn test_stop_releases_field() {
    let (mut sim, _, _) = running(create_uniform_wind_records(lattice(), 10.0, 0.0));
    sim.stop();
    sim.stop();
    assert_eq!(sim.state(), SimulatorState::Stopped);
    assert!(sim.field().is_none());
    assert!(sim.particles().is_empty());
    assert!(sim.next_deadline().is_none());
}

#[test]
fn test_build_is_time_sliced() {
    let mut sim = ParticleSimulator::with_seed(
        SimulatorOptions {
            batch_budget_ms: 0,
            ..options()
        },
        3,
    );
    sim.set_data(create_uniform_wind_records(lattice(), 10.0, 0.0));
    let mut canvas = Pixmap::new(40, 40).unwrap();
    let mut now = Instant::now();

    assert!(!sim.tick(&mut canvas, &view(), now).unwrap());
    assert_eq!(sim.state(), SimulatorState::Building);
    assert_eq!(sim.next_deadline(), Some(now + Duration::from_millis(25)));

    // Too early: no progress.
    assert!(!sim.tick(&mut canvas, &view(), now + Duration::from_millis(5)).unwrap());

    let mut batches = 1;
    while sim.state() == SimulatorState::Building {
        now = sim.next_deadline().unwrap();
        sim.tick(&mut canvas, &view(), now).unwrap();
        batches += 1;
        assert!(batches <= 20);
    }
    assert_eq!(sim.state(), SimulatorState::Animating);
}

#[test]
fn test_missing_component_degrades_to_nothing() {
    let mut sim = ParticleSimulator::with_seed(options(), 1);
    sim.set_data(vec![create_test_field(lattice())]);
    let mut canvas = Pixmap::new(40, 40).unwrap();

    assert!(!sim.tick(&mut canvas, &view(), Instant::now()).unwrap());
    assert_eq!(sim.state(), SimulatorState::Stopped);
    assert!(matches!(
        sim.start(StartParams::for_canvas(&view()), Instant::now()),
        Err(RenderError::Field(_))
    ));
}

#[test]
fn test_viewport_change_through_layer_rebuilds() {
    let mut sim = ParticleSimulator::with_seed(options(), 9);
    sim.set_data(create_uniform_wind_records(lattice(), 10.0, 0.0));
    let mut layer = CanvasLayer::new(sim);
    layer.attach(40, 40).unwrap();

    let now = Instant::now();
    assert!(layer.render(&view(), now).unwrap());

    layer.on_viewport_change();
    assert!(layer.drawable().field().is_none());
    assert!(layer.render(&view(), now + Duration::from_millis(5)).unwrap());
    assert_eq!(layer.drawable().state(), SimulatorState::Animating);

    layer.detach();
    assert_eq!(layer.drawable().state(), SimulatorState::Stopped);
}

// ============================================================================
// Projection distortion
// ============================================================================

fn mercator_displacement(view: &WebMercatorViewport, lat: f64) -> PixelVector {
    let (x, y) = view.project(lat, 10.0).unwrap();
    distort(view, lat, 10.0, x, y, 1.0, WindVector::new(1.0, 1.0)).unwrap()
}

#[test]
fn test_mercator_displacement_grows_with_latitude() {
    let view = WebMercatorViewport::new(55.0, 10.0, 5.0, 800, 800);
    let mut last = 0.0_f32;
    for lat in [45.0, 55.0, 62.0] {
        let d = mercator_displacement(&view, lat);
        // Eastward stays right, northward stays up.
        assert!(d.u > 0.0 && d.v < 0.0, "lat {lat}: {d:?}");
        let len = d.u.hypot(d.v);
        assert!(len > last, "lat {lat}: {len} <= {last}");
        last = len;

        // Conformal: both axes stretch by nearly the same factor.
        let ratio = d.u / -d.v;
        assert!((0.9..1.15).contains(&ratio), "lat {lat}: ratio {ratio}");
    }
}

#[test]
fn test_equirectangular_displacement_is_latitude_independent() {
    let view = view();
    let at = |lat: f64| {
        let (x, y) = view.project(lat, 2.0).unwrap();
        distort(&view, lat, 2.0, x, y, 1.0, WindVector::new(0.0, 1.0)).unwrap()
    };
    let (north, south) = (at(3.0), at(1.0));
    assert!((north.v - south.v).abs() < 1e-4);
    assert!((north.v + 10.0).abs() < 1e-4);
    assert!(north.u.abs() < 1e-4);
}
