//! The seam between a playback session and the audio host.
//!
//! A backend opens media resources, builds analyzers for them and drives
//! their transport. Anything asynchronous (metadata, position reports, the
//! outcome of a start request, end of stream) comes back through the
//! `EventEmitter` handed over at `open` time.

use std::path::Path;
use std::sync::mpsc::Sender;

use thiserror::Error;

use crate::config::AnalyzerSettings;

use super::analyzer::SpectralAnalyzer;
use super::types::{BindingEvent, PlayRequest, ResourceEvent};

#[derive(Debug, Error)]
#[error("{0}")]
pub struct HostError(pub String);

impl HostError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

/// Sends resource events to the owning session, tagged with the binding generation.
#[derive(Debug, Clone)]
pub struct EventEmitter {
    generation: u64,
    tx: Sender<BindingEvent>,
}

impl EventEmitter {
    pub fn new(generation: u64, tx: Sender<BindingEvent>) -> Self {
        Self { generation, tx }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Returns false once the receiving session is gone.
    pub fn emit(&self, event: ResourceEvent) -> bool {
        self.tx
            .send(BindingEvent {
                generation: self.generation,
                event,
            })
            .is_ok()
    }
}

pub trait AudioBackend {
    type Media;

    /// Make sure the audio output context is running. Created lazily on the
    /// first call, which is always a user-initiated `play()`.
    fn resume(&mut self) -> Result<(), HostError>;

    /// Open the resource at `locator`. Errors mean the file cannot be played.
    fn open(&mut self, locator: &Path, events: EventEmitter) -> Result<Self::Media, HostError>;

    /// Build a real-time analyzer tapping `media`.
    fn attach_analyzer(
        &mut self,
        media: &mut Self::Media,
        settings: &AnalyzerSettings,
        generation: u64,
    ) -> Result<SpectralAnalyzer, HostError>;

    /// Request playback; the outcome arrives later as `ResourceEvent::PlayResolved`.
    fn start(&mut self, media: &mut Self::Media, request: PlayRequest);

    fn pause(&mut self, media: &mut Self::Media);

    fn seek(&mut self, media: &mut Self::Media, position: f64);

    fn set_volume(&mut self, media: &mut Self::Media, volume: f32);

    /// Release every native handle held by `media`. No events fire afterwards.
    fn release(&mut self, media: Self::Media);

    /// Shut the output context down.
    fn close(&mut self);
}
