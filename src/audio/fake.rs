//! Scriptable audio host for tests.

use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use super::analyzer::{AnalyzerTap, SpectralAnalyzer};
use super::backend::{AudioBackend, EventEmitter, HostError};
use super::types::{PlayRequest, ResourceEvent};
use crate::config::AnalyzerSettings;

pub(crate) type HostHandle = Rc<RefCell<FakeHost>>;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum StartMode {
    /// Resolve successfully right away.
    Immediate,
    /// Leave the request pending; tests resolve it through the emitter.
    Deferred,
    /// Reject, as a host refusing to start output would.
    Reject,
}

/// Scriptable host shared between the backend and the test body.
pub(crate) struct FakeHost {
    pub(crate) start_mode: StartMode,
    pub(crate) deny_resume: bool,
    pub(crate) unsupported_analyzer: bool,
    pub(crate) duration: Option<f64>,
    pub(crate) fail_open: Vec<PathBuf>,

    pub(crate) live: usize,
    pub(crate) opened: Vec<PathBuf>,
    pub(crate) released: Vec<PathBuf>,
    pub(crate) resumes: usize,
    pub(crate) closed: bool,
    pub(crate) starts: Vec<PlayRequest>,
    pub(crate) pauses: usize,
    pub(crate) seeks: Vec<f64>,
    pub(crate) volumes: Vec<f32>,
    pub(crate) emitters: Vec<EventEmitter>,
    pub(crate) analyzers: Vec<SpectralAnalyzer>,
    pub(crate) taps: Vec<AnalyzerTap>,
}

impl Default for FakeHost {
    fn default() -> Self {
        Self {
            start_mode: StartMode::Immediate,
            deny_resume: false,
            unsupported_analyzer: false,
            duration: Some(180.0),
            fail_open: Vec::new(),
            live: 0,
            opened: Vec::new(),
            released: Vec::new(),
            resumes: 0,
            closed: false,
            starts: Vec::new(),
            pauses: 0,
            seeks: Vec::new(),
            volumes: Vec::new(),
            emitters: Vec::new(),
            analyzers: Vec::new(),
            taps: Vec::new(),
        }
    }
}

impl FakeHost {
    pub(crate) fn emit_latest(&self, event: ResourceEvent) {
        self.emitters
            .last()
            .expect("a resource was opened")
            .emit(event);
    }

    pub(crate) fn emit_latest_ok(&self, event: ResourceEvent) -> bool {
        self.emitters.last().is_some_and(|e| e.emit(event))
    }
}

pub(crate) struct FakeMedia {
    locator: PathBuf,
    events: EventEmitter,
}

pub(crate) struct FakeBackend {
    host: HostHandle,
}

impl FakeBackend {
    /// A backend plus the handle tests use to script and inspect it.
    pub(crate) fn new(host: FakeHost) -> (Self, HostHandle) {
        let host = Rc::new(RefCell::new(host));
        (Self { host: host.clone() }, host)
    }
}

impl AudioBackend for FakeBackend {
    type Media = FakeMedia;

    fn resume(&mut self) -> Result<(), HostError> {
        let mut host = self.host.borrow_mut();
        host.resumes += 1;
        if host.deny_resume {
            Err(HostError::new("no output device"))
        } else {
            Ok(())
        }
    }

    fn open(&mut self, locator: &Path, events: EventEmitter) -> Result<FakeMedia, HostError> {
        let mut host = self.host.borrow_mut();
        if host.fail_open.iter().any(|p| p == locator) {
            return Err(HostError::new("cannot decode"));
        }
        host.live += 1;
        host.opened.push(locator.to_path_buf());
        if let Some(duration) = host.duration {
            events.emit(ResourceEvent::MetadataLoaded { duration });
        }
        host.emitters.push(events.clone());
        Ok(FakeMedia {
            locator: locator.to_path_buf(),
            events,
        })
    }

    fn attach_analyzer(
        &mut self,
        _media: &mut FakeMedia,
        settings: &AnalyzerSettings,
        generation: u64,
    ) -> Result<SpectralAnalyzer, HostError> {
        let mut host = self.host.borrow_mut();
        if host.unsupported_analyzer {
            return Err(HostError::new("analysis refused"));
        }
        let (analyzer, tap) = SpectralAnalyzer::new(settings, generation)?;
        host.analyzers.push(analyzer.clone());
        host.taps.push(tap);
        Ok(analyzer)
    }

    fn start(&mut self, media: &mut FakeMedia, request: PlayRequest) {
        let mut host = self.host.borrow_mut();
        host.starts.push(request);
        match host.start_mode {
            StartMode::Immediate => {
                media.events.emit(ResourceEvent::PlayResolved {
                    request,
                    outcome: Ok(()),
                });
            }
            StartMode::Deferred => {}
            StartMode::Reject => {
                media.events.emit(ResourceEvent::PlayResolved {
                    request,
                    outcome: Err("autoplay policy".to_string()),
                });
            }
        }
    }

    fn pause(&mut self, _media: &mut FakeMedia) {
        self.host.borrow_mut().pauses += 1;
    }

    fn seek(&mut self, _media: &mut FakeMedia, position: f64) {
        self.host.borrow_mut().seeks.push(position);
    }

    fn set_volume(&mut self, _media: &mut FakeMedia, volume: f32) {
        self.host.borrow_mut().volumes.push(volume);
    }

    fn release(&mut self, media: FakeMedia) {
        let mut host = self.host.borrow_mut();
        host.live -= 1;
        host.released.push(media.locator);
    }

    fn close(&mut self) {
        self.host.borrow_mut().closed = true;
    }
}
