//! Particle advection over a pixel-space wind field.
//!
//! Lifecycle:
//!
//! ```text
//!   Idle --start--> Building --(field done)--> Built --(seeded)--> Animating
//!     ^                 |                                             |
//!     +---- start <--- Stopped <------------- stop ------------------+
//! ```
//!
//! `start` always releases the previous run first, so at most one field and
//! one particle set exist per simulator.

use std::time::{Duration, Instant};

use projection::CoordinateProjector;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use tiny_skia::{BlendMode, Paint, PathBuilder, Pixmap, Rect, Stroke, Transform};
use tracing::{debug, info, warn};
use wind_common::{GeoBounds, WeatherField, WindField};

use super::field::{FieldBuildTask, FieldSample, PixelBounds, VectorField};
use super::options::{OptionsPatch, SimulatorOptions};
use crate::error::{RenderError, Result};
use crate::layer::{Drawable, FrameInfo};
use crate::schedule::FramePacer;

/// Trail strokes are slightly more transparent than the fade.
const STROKE_ALPHA_FACTOR: f32 = 0.9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimulatorState {
    Idle,
    Building,
    Built,
    Animating,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Particle {
    pub x: f64,
    pub y: f64,
    /// Pending position, committed when the trail segment is drawn.
    pub xt: f64,
    pub yt: f64,
    pub age: u32,
}

/// Canvas region and geographic extent of one simulation run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StartParams {
    pub bounds: PixelBounds,
    pub extent: GeoBounds,
}

impl StartParams {
    /// The projector's whole canvas and visible extent.
    pub fn for_canvas(projector: &dyn CoordinateProjector) -> Self {
        let (width, height) = projector.size();
        Self {
            bounds: PixelBounds::canvas(width, height),
            extent: projector.bounds(),
        }
    }
}

/// Pixels per frame per m/s for a run over `extent`.
///
/// Larger visible areas get faster particles so the animation reads the same
/// at every zoom.
pub fn velocity_scale(options: &SimulatorOptions, extent: &GeoBounds) -> f64 {
    let [west, south, east, north] = extent.to_radians();
    let map_area = (south - north) * (west - east);
    options.density_scale() * map_area.abs().powf(0.4)
}

pub struct ParticleSimulator {
    options: SimulatorOptions,
    records: Vec<WeatherField>,
    state: SimulatorState,
    params: Option<StartParams>,
    task: Option<FieldBuildTask>,
    field: Option<VectorField>,
    particles: Vec<Particle>,
    carried_ages: Vec<u32>,
    buckets: Vec<Vec<usize>>,
    pacer: FramePacer,
    resume_at: Option<Instant>,
    restart_pending: bool,
    warned: bool,
    rng: SmallRng,
}

impl ParticleSimulator {
    pub fn new(options: SimulatorOptions) -> Self {
        Self::with_rng(options, SmallRng::from_entropy())
    }

    /// Deterministic seeding for tests and benchmarks.
    pub fn with_seed(options: SimulatorOptions, seed: u64) -> Self {
        Self::with_rng(options, SmallRng::seed_from_u64(seed))
    }

    fn with_rng(options: SimulatorOptions, rng: SmallRng) -> Self {
        let pacer = FramePacer::new(options.frame_rate);
        Self {
            options,
            records: Vec::new(),
            state: SimulatorState::Idle,
            params: None,
            task: None,
            field: None,
            particles: Vec::new(),
            carried_ages: Vec::new(),
            buckets: Vec::new(),
            pacer,
            resume_at: None,
            restart_pending: false,
            warned: false,
            rng,
        }
    }

    pub fn state(&self) -> SimulatorState {
        self.state
    }

    pub fn options(&self) -> &SimulatorOptions {
        &self.options
    }

    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    pub fn particles_mut(&mut self) -> &mut [Particle] {
        &mut self.particles
    }

    pub fn field(&self) -> Option<&VectorField> {
        self.field.as_ref()
    }

    pub fn params(&self) -> Option<StartParams> {
        self.params
    }

    pub fn has_data(&self) -> bool {
        !self.records.is_empty()
    }

    /// Particle indices per color bucket from the last `evolve`.
    pub fn buckets(&self) -> &[Vec<usize>] {
        &self.buckets
    }

    pub fn is_running(&self) -> bool {
        matches!(
            self.state,
            SimulatorState::Building | SimulatorState::Built | SimulatorState::Animating
        )
    }

    /// Swap the source wind records. A running simulation rebuilds on the
    /// next frame and the current particle ages carry over.
    pub fn set_data(&mut self, records: Vec<WeatherField>) {
        if self.is_running() && !self.particles.is_empty() {
            self.carried_ages = self.particles.iter().map(|p| p.age).collect();
        }
        self.records = records;
        self.warned = false;
        self.release();
        if self.state != SimulatorState::Idle {
            self.state = SimulatorState::Stopped;
        }
        self.restart_pending = true;
    }

    /// Apply a partial options update in place; the run keeps going.
    ///
    /// Velocity scale and particle density apply from the next field build.
    pub fn set_options(&mut self, patch: &OptionsPatch) -> Result<()> {
        let mut options = self.options.clone();
        patch.apply(&mut options);
        options.validate()?;
        self.pacer.set_frame_rate(options.frame_rate);
        self.options = options;
        debug!(
            max_velocity = self.options.max_velocity,
            buckets = self.options.color_scale.len(),
            "simulator options updated"
        );
        Ok(())
    }

    /// Stop any previous run and begin building the field for `params`.
    pub fn start(&mut self, params: StartParams, now: Instant) -> Result<()> {
        self.release();
        self.restart_pending = false;
        self.options.validate()?;

        let wind = match WindField::from_records(&self.records) {
            Ok(wind) => wind,
            Err(err) => {
                if !self.warned {
                    warn!(error = %err, "wind records unusable, particles disabled");
                    self.warned = true;
                }
                self.state = SimulatorState::Stopped;
                return Err(err.into());
            }
        };

        let scale = velocity_scale(&self.options, &params.extent);
        info!(
            width = params.bounds.width,
            height = params.bounds.height,
            velocity_scale = scale,
            "building particle field"
        );
        self.task = Some(FieldBuildTask::new(wind, params.bounds, scale));
        self.params = Some(params);
        self.state = SimulatorState::Building;
        self.resume_at = Some(now);
        Ok(())
    }

    /// Run one field-build batch if one is due. Returns true when the field
    /// finished in this call.
    pub fn step_build(&mut self, projector: &dyn CoordinateProjector, now: Instant) -> bool {
        if self.state != SimulatorState::Building {
            return false;
        }
        if self.resume_at.is_some_and(|at| now < at) {
            return false;
        }
        let Some(task) = self.task.as_mut() else {
            return false;
        };

        let budget = Duration::from_millis(self.options.batch_budget_ms);
        if !task.step(projector, budget) {
            self.resume_at = Some(now + Duration::from_millis(self.options.batch_pause_ms));
            return false;
        }

        if let Some(task) = self.task.take() {
            let field = task.finish();
            debug!(coverage = field.coverage(), "particle field ready");
            self.field = Some(field);
        }
        self.resume_at = None;
        self.state = SimulatorState::Built;
        true
    }

    /// Advance every particle by one frame and bucket the movers by speed.
    pub fn evolve(&mut self) {
        let Some(field) = self.field.as_ref() else {
            return;
        };
        let max_age = self.options.particle_age;
        let bucket_count = self.options.color_scale.len();
        self.buckets.resize_with(bucket_count, Vec::new);
        self.buckets.truncate(bucket_count);
        self.buckets.iter_mut().for_each(Vec::clear);

        for (index, particle) in self.particles.iter_mut().enumerate() {
            if particle.age > max_age {
                let (x, y) = field.random_position(&mut self.rng);
                particle.x = x;
                particle.y = y;
                particle.age = 0;
            }

            match field.sample(particle.x, particle.y) {
                FieldSample::Vector(v) => {
                    let xt = particle.x + v.u as f64;
                    let yt = particle.y + v.v as f64;
                    match field.sample(xt, yt) {
                        FieldSample::Vector(_) => {
                            particle.xt = xt;
                            particle.yt = yt;
                            let bucket = self.options.bucket_index(v.magnitude as f64);
                            self.buckets[bucket].push(index);
                        }
                        // Off the canvas: keep moving without a trail.
                        FieldSample::Outside => {
                            particle.x = xt;
                            particle.y = yt;
                        }
                        FieldSample::NoData => particle.age = max_age,
                    }
                }
                FieldSample::NoData | FieldSample::Outside => particle.age = max_age,
            }
            particle.age += 1;
        }
    }

    /// Fade the previous trails and stroke this frame's segments.
    pub fn draw(&mut self, canvas: &mut Pixmap) {
        let Some(field) = self.field.as_ref() else {
            return;
        };
        let b = field.bounds();

        if let Some(rect) = Rect::from_xywh(b.x as f32, b.y as f32, b.width as f32, b.height as f32) {
            let mut fade = Paint::default();
            fade.set_color_rgba8(0, 0, 0, unit_to_u8(self.options.opacity));
            fade.blend_mode = BlendMode::DestinationIn;
            canvas.fill_rect(rect, &fade, Transform::identity(), None);
        }

        let stroke = Stroke {
            width: self.options.line_width,
            ..Stroke::default()
        };
        let alpha = unit_to_u8(self.options.opacity * STROKE_ALPHA_FACTOR);

        for (bucket, color) in self.buckets.iter().zip(self.options.color_scale.iter()) {
            if bucket.is_empty() {
                continue;
            }
            let mut pb = PathBuilder::new();
            for &index in bucket {
                let p = &mut self.particles[index];
                pb.move_to(p.x as f32, p.y as f32);
                pb.line_to(p.xt as f32, p.yt as f32);
                p.x = p.xt;
                p.y = p.yt;
            }
            if let Some(path) = pb.finish() {
                let mut paint = Paint::default();
                paint.set_color_rgba8(color.r, color.g, color.b, alpha);
                paint.anti_alias = true;
                canvas.stroke_path(&path, &paint, &stroke, Transform::identity(), None);
            }
        }
    }

    /// Drive the simulator from the host loop. Returns true when a frame was
    /// drawn.
    pub fn tick(
        &mut self,
        canvas: &mut Pixmap,
        projector: &dyn CoordinateProjector,
        now: Instant,
    ) -> Result<bool> {
        if self.restart_pending {
            self.restart_pending = false;
            if !self.has_data() {
                return Ok(false);
            }
            match self.start(StartParams::for_canvas(projector), now) {
                Ok(()) => {}
                // Already logged; draw nothing until new data arrives.
                Err(RenderError::Field(_)) => return Ok(false),
                Err(err) => return Err(err),
            }
        }

        if self.state == SimulatorState::Building && !self.step_build(projector, now) {
            return Ok(false);
        }
        if self.state == SimulatorState::Built {
            self.seed();
            self.pacer.reset();
            self.state = SimulatorState::Animating;
        }
        if self.state != SimulatorState::Animating || !self.pacer.due(now) {
            return Ok(false);
        }
        self.evolve();
        self.draw(canvas);
        Ok(true)
    }

    /// Release the field and particles. Safe to call repeatedly.
    pub fn stop(&mut self) {
        self.release();
        self.restart_pending = false;
        if self.state != SimulatorState::Idle {
            self.state = SimulatorState::Stopped;
        }
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        match self.state {
            SimulatorState::Building => self.resume_at,
            SimulatorState::Animating => self.pacer.next_due(),
            _ => None,
        }
    }

    fn seed(&mut self) {
        let Some(field) = self.field.as_ref() else {
            return;
        };
        let b = field.bounds();
        let count = (b.width as f64 * b.height as f64 * self.options.particle_multiplier).round() as usize;
        let max_age = self.options.particle_age.max(1);

        let mut particles = Vec::with_capacity(count);
        for i in 0..count {
            let (x, y) = field.random_position(&mut self.rng);
            let age = match self.carried_ages.get(i) {
                Some(&age) => age,
                None => self.rng.gen_range(0..max_age),
            };
            particles.push(Particle {
                x,
                y,
                xt: x,
                yt: y,
                age,
            });
        }
        self.carried_ages.clear();
        self.particles = particles;
        debug!(count, "particles seeded");
    }

    fn release(&mut self) {
        self.task = None;
        self.field = None;
        self.particles.clear();
        self.buckets.iter_mut().for_each(Vec::clear);
        self.resume_at = None;
        self.pacer.reset();
    }
}

impl Drawable for ParticleSimulator {
    fn draw(&mut self, frame: &mut FrameInfo<'_>) -> Result<bool> {
        self.tick(frame.canvas, frame.projector, frame.now)
    }

    fn on_viewport_change(&mut self) {
        self.stop();
        self.restart_pending = true;
    }

    fn on_detach(&mut self) {
        self.stop();
    }

    fn next_deadline(&self) -> Option<Instant> {
        ParticleSimulator::next_deadline(self)
    }
}

fn unit_to_u8(value: f32) -> u8 {
    (value.clamp(0.0, 1.0) * 255.0).round() as u8
}
