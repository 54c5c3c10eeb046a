#![allow(dead_code)]

use async_trait::async_trait;
use image::{Rgb, RgbImage};
use interfaces::defs::{
    BoundingBox, DetectError, Detector, Frame, FrameSource, Observation, SourceAddress,
    SourceError, SourceOpener, SourceSpec,
};
use scene_switcher::SwitcherConfig;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

/// What a scripted source does on one read.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Step {
    /// A frame in which the detector will see this many cats.
    Cats(u8),
    Fail,
    /// Never returns.
    Hang,
    /// A zero-sized frame.
    Empty,
}

/// Frame whose top-left red channel carries the cat count for [`PixelCountDetector`].
pub fn frame_with_cats(cats: u8) -> Frame {
    let mut image = RgbImage::new(2, 2);
    image.put_pixel(0, 0, Rgb([cats, 0, 0]));
    Frame::new(image)
}

#[derive(Debug, Clone)]
pub struct SourcePlan {
    pub fails_to_open: bool,
    pub steps: Vec<Step>,
    /// Used once `steps` is exhausted.
    pub then: Step,
    pub release_fails: bool,
}

impl SourcePlan {
    pub fn constant(step: Step) -> Self {
        Self {
            fails_to_open: false,
            steps: Vec::new(),
            then: step,
            release_fails: false,
        }
    }

    pub fn unopenable() -> Self {
        Self {
            fails_to_open: true,
            ..Self::constant(Step::Fail)
        }
    }

    pub fn scripted(steps: &[Step], then: Step) -> Self {
        Self {
            steps: steps.to_vec(),
            ..Self::constant(then)
        }
    }

    pub fn with_failing_release(mut self) -> Self {
        self.release_fails = true;
        self
    }
}

/// Activity shared between an opener, its sources and the test body.
#[derive(Debug, Default)]
pub struct SourceLog {
    pub opened: Vec<String>,
    pub reads: HashMap<String, usize>,
    pub skipped: HashMap<String, u32>,
    pub released: Vec<String>,
}

pub struct ScriptedSource {
    label: String,
    steps: VecDeque<Step>,
    then: Step,
    release_fails: bool,
    log: Arc<Mutex<SourceLog>>,
}

#[async_trait]
impl FrameSource for ScriptedSource {
    async fn read(&mut self) -> Result<Frame, SourceError> {
        *self.log.lock().unwrap().reads.entry(self.label.clone()).or_default() += 1;
        match self.steps.pop_front().unwrap_or(self.then) {
            Step::Cats(cats) => Ok(frame_with_cats(cats)),
            Step::Fail => Err(SourceError::Read(format!("{} returned no frame", self.label))),
            Step::Hang => std::future::pending().await,
            Step::Empty => Ok(Frame::new(RgbImage::new(0, 0))),
        }
    }

    async fn skip(&mut self, frames: u32) -> Result<(), SourceError> {
        *self.log.lock().unwrap().skipped.entry(self.label.clone()).or_default() += frames;
        Ok(())
    }

    async fn release(&mut self) -> Result<(), SourceError> {
        self.log.lock().unwrap().released.push(self.label.clone());
        if self.release_fails {
            return Err(SourceError::Release(format!("{} is stuck", self.label)));
        }
        Ok(())
    }
}

/// Opens [`ScriptedSource`]s by label.
#[derive(Clone, Default)]
pub struct ScriptedOpener {
    plans: HashMap<String, SourcePlan>,
    pub log: Arc<Mutex<SourceLog>>,
}

impl ScriptedOpener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, label: &str, plan: SourcePlan) -> Self {
        self.plans.insert(label.to_string(), plan);
        self
    }

    pub fn released(&self) -> Vec<String> {
        let mut released = self.log.lock().unwrap().released.clone();
        released.sort();
        released
    }

    pub fn reads(&self, label: &str) -> usize {
        self.log.lock().unwrap().reads.get(label).copied().unwrap_or(0)
    }

    pub fn skipped(&self, label: &str) -> u32 {
        self.log.lock().unwrap().skipped.get(label).copied().unwrap_or(0)
    }
}

#[async_trait]
impl SourceOpener for ScriptedOpener {
    async fn open(&self, spec: &SourceSpec) -> Result<Box<dyn FrameSource>, SourceError> {
        let plan = self
            .plans
            .get(&spec.label)
            .cloned()
            .unwrap_or_else(|| SourcePlan::constant(Step::Cats(0)));

        if plan.fails_to_open {
            return Err(SourceError::Open {
                address: spec.address.to_string(),
                reason: "device busy".to_string(),
            });
        }

        self.log.lock().unwrap().opened.push(spec.label.clone());
        Ok(Box::new(ScriptedSource {
            label: spec.label.clone(),
            steps: plan.steps.into(),
            then: plan.then,
            release_fails: plan.release_fails,
            log: self.log.clone(),
        }))
    }
}

/// Reports as many confident cats as the frame's top-left red value, plus
/// one low-confidence cat and one dog that must never count.
pub struct PixelCountDetector;

#[async_trait]
impl Detector for PixelCountDetector {
    fn detector_name(&self) -> String {
        "pixel-count".to_string()
    }

    async fn detect(&self, frame: &Frame) -> Result<Vec<Observation>, DetectError> {
        let cats = frame.image().get_pixel(0, 0)[0] as usize;
        let mut observations = vec![Observation::new("cat", 0.9, BoundingBox::default()); cats];
        observations.push(Observation::new("cat", 0.2, BoundingBox::default()));
        observations.push(Observation::new("dog", 0.95, BoundingBox::default()));
        Ok(observations)
    }
}

pub fn detector() -> Arc<dyn Detector> {
    Arc::new(PixelCountDetector)
}

/// Device-addressed specs in the given order.
pub fn specs(labels: &[&str]) -> Vec<SourceSpec> {
    labels
        .iter()
        .enumerate()
        .map(|(i, label)| SourceSpec::new(*label, SourceAddress::Device(i as u32)))
        .collect()
}

pub fn config(cadence: u32) -> SwitcherConfig {
    SwitcherConfig {
        cadence,
        cooldown_ms: 0,
        read_timeout_ms: 1_000,
        open_timeout_ms: 1_000,
        ..Default::default()
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}
