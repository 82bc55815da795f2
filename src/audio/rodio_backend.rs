//! Native audio host built on `rodio`.
//!
//! The output stream is the audio context: it is opened lazily by the first
//! `resume()` (which only a user-initiated play reaches) and closed with the
//! session. Each media resource owns a `Sink` built from the decoded file,
//! with the analyzer tap spliced into the sample stream, plus a watcher
//! thread reporting position and end of stream.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use rodio::mixer::Mixer;
use rodio::{Decoder, OutputStream, OutputStreamBuilder, Sink, Source};

use crate::config::AnalyzerSettings;
use crate::library::probe::probe_duration;

use super::analyzer::{AnalyzerTap, SpectralAnalyzer};
use super::backend::{AudioBackend, EventEmitter, HostError};
use super::tap::AnalyzingSource;
use super::types::{PlayRequest, ResourceEvent};

/// Elapsed-time bookkeeping: a start instant plus time accumulated before the last pause.
#[derive(Debug, Default)]
struct PlaybackClock {
    started_at: Option<Instant>,
    accumulated: Duration,
}

impl PlaybackClock {
    fn position(&self) -> Duration {
        self.accumulated + self.started_at.map_or(Duration::ZERO, |st| st.elapsed())
    }

    fn is_running(&self) -> bool {
        self.started_at.is_some()
    }

    fn resume(&mut self) {
        if self.started_at.is_none() {
            self.started_at = Some(Instant::now());
        }
    }

    fn pause(&mut self) {
        self.accumulated = self.position();
        self.started_at = None;
    }

    fn set(&mut self, position: Duration) {
        self.accumulated = position;
        if self.started_at.is_some() {
            self.started_at = Some(Instant::now());
        }
    }

    fn reset(&mut self) {
        self.started_at = None;
        self.accumulated = Duration::ZERO;
    }
}

#[derive(Default)]
struct Transport {
    sink: Option<Sink>,
    clock: PlaybackClock,
}

type SharedTransport = Arc<Mutex<Transport>>;

fn lock(transport: &SharedTransport) -> MutexGuard<'_, Transport> {
    transport
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// One opened file and everything playing it.
pub struct RodioMedia {
    path: PathBuf,
    duration: Option<Duration>,
    events: EventEmitter,
    tap: Option<AnalyzerTap>,
    volume: f32,
    transport: SharedTransport,
    watcher_stop: Option<Sender<()>>,
    watcher: Option<JoinHandle<()>>,
}

pub struct RodioBackend {
    stream: Option<OutputStream>,
    time_update: Duration,
}

impl RodioBackend {
    pub fn new(time_update: Duration) -> Self {
        Self {
            stream: None,
            time_update,
        }
    }

    fn mixer(&self) -> Option<&Mixer> {
        self.stream.as_ref().map(|s| s.mixer())
    }
}

/// Create a paused `Sink` for `path` that starts playback at `start_at`.
fn create_sink_at(
    mixer: &Mixer,
    path: &Path,
    start_at: Duration,
    tap: Option<AnalyzerTap>,
) -> Result<Sink, HostError> {
    let file = File::open(path).map_err(|e| HostError::new(format!("{}: {e}", path.display())))?;

    let source = Decoder::new(BufReader::new(file))
        .map_err(|e| HostError::new(format!("{}: {e}", path.display())))?
        // `skip_duration` is our seeking primitive; even Duration::ZERO is fine.
        .skip_duration(start_at);

    let sink = Sink::connect_new(mixer);
    match tap {
        Some(tap) => sink.append(AnalyzingSource::new(source, tap)),
        None => sink.append(source),
    }
    sink.pause();
    Ok(sink)
}

/// Start the transport, building a sink at the clock position when there is
/// none or the current one ran dry.
fn start_transport(
    mixer: &Mixer,
    t: &mut Transport,
    path: &Path,
    tap: Option<&AnalyzerTap>,
    volume: f32,
) -> Result<(), HostError> {
    if t.sink.as_ref().is_none_or(|s| s.empty()) {
        if let Some(old) = t.sink.take() {
            old.stop();
        }
        t.sink = Some(create_sink_at(mixer, path, t.clock.position(), tap.cloned())?);
    }
    if let Some(sink) = t.sink.as_ref() {
        sink.set_volume(volume);
        sink.play();
    }
    t.clock.resume();
    Ok(())
}

/// One watcher tick. Nothing is reported while the clock is stopped.
fn poll_transport(t: &mut Transport, duration: Option<Duration>) -> Option<ResourceEvent> {
    if !t.clock.is_running() {
        return None;
    }
    if t.sink.as_ref().is_none_or(|s| s.empty()) {
        // A drained sink never plays again; the next start builds a fresh one.
        t.sink = None;
        t.clock.reset();
        return Some(ResourceEvent::Ended);
    }
    let mut position = t.clock.position();
    if let Some(d) = duration {
        position = position.min(d);
    }
    Some(ResourceEvent::TimeUpdate(position.as_secs_f64()))
}

fn spawn_watcher(
    transport: SharedTransport,
    events: EventEmitter,
    duration: Option<Duration>,
    interval: Duration,
) -> std::io::Result<(Sender<()>, JoinHandle<()>)> {
    let (stop_tx, stop_rx) = mpsc::channel::<()>();
    let join = thread::Builder::new()
        .name(format!("media-watcher-{}", events.generation()))
        .spawn(move || {
            loop {
                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {}
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }

                let Some(event) = poll_transport(&mut lock(&transport), duration) else {
                    continue;
                };

                if !events.emit(event) {
                    break;
                }
            }
        })?;
    Ok((stop_tx, join))
}

impl AudioBackend for RodioBackend {
    type Media = RodioMedia;

    fn resume(&mut self) -> Result<(), HostError> {
        if self.stream.is_some() {
            return Ok(());
        }
        let mut stream = OutputStreamBuilder::open_default_stream()
            .map_err(|e| HostError::new(format!("no audio output device: {e}")))?;
        // rodio logs to stderr when OutputStream is dropped. That's useful in debugging,
        // but noisy for a TUI app.
        stream.log_on_drop(false);
        info!("audio output opened");
        self.stream = Some(stream);
        Ok(())
    }

    fn open(&mut self, locator: &Path, events: EventEmitter) -> Result<RodioMedia, HostError> {
        let file =
            File::open(locator).map_err(|e| HostError::new(format!("{}: {e}", locator.display())))?;
        let decoder = Decoder::new(BufReader::new(file))
            .map_err(|e| HostError::new(format!("{}: {e}", locator.display())))?;
        let duration = decoder
            .total_duration()
            .or_else(|| probe_duration(locator));
        drop(decoder);

        let transport = SharedTransport::default();
        let (watcher_stop, watcher) =
            spawn_watcher(transport.clone(), events.clone(), duration, self.time_update)
                .map_err(|e| HostError::new(format!("cannot spawn media watcher: {e}")))?;

        events.emit(ResourceEvent::MetadataLoaded {
            duration: duration.map_or(0.0, |d| d.as_secs_f64()),
        });
        debug!("opened {} ({duration:?})", locator.display());

        Ok(RodioMedia {
            path: locator.to_path_buf(),
            duration,
            events,
            tap: None,
            volume: 1.0,
            transport,
            watcher_stop: Some(watcher_stop),
            watcher: Some(watcher),
        })
    }

    fn attach_analyzer(
        &mut self,
        media: &mut RodioMedia,
        settings: &AnalyzerSettings,
        generation: u64,
    ) -> Result<SpectralAnalyzer, HostError> {
        let (analyzer, tap) = SpectralAnalyzer::new(settings, generation)?;
        media.tap = Some(tap);
        Ok(analyzer)
    }

    fn start(&mut self, media: &mut RodioMedia, request: PlayRequest) {
        let Some(mixer) = self.mixer() else {
            media.events.emit(ResourceEvent::PlayResolved {
                request,
                outcome: Err("audio output is not running".to_string()),
            });
            return;
        };

        let started = start_transport(
            mixer,
            &mut lock(&media.transport),
            &media.path,
            media.tap.as_ref(),
            media.volume,
        );
        let outcome = started.map_err(|e| {
            warn!("cannot start {}: {e}", media.path.display());
            e.0
        });

        media
            .events
            .emit(ResourceEvent::PlayResolved { request, outcome });
    }

    fn pause(&mut self, media: &mut RodioMedia) {
        let mut t = lock(&media.transport);
        if let Some(sink) = t.sink.as_ref() {
            sink.pause();
        }
        t.clock.pause();
    }

    fn seek(&mut self, media: &mut RodioMedia, position: f64) {
        let mut target = Duration::from_secs_f64(position.max(0.0));
        if let Some(d) = media.duration {
            target = target.min(d);
        }

        let mut t = lock(&media.transport);
        t.clock.set(target);
        if t.sink.is_none() {
            // Not started yet; the sink will be built at `target`.
            return;
        }
        let Some(mixer) = self.mixer() else {
            return;
        };

        // Scrubbing: rebuild the current sink and skip into the file.
        if let Some(old) = t.sink.take() {
            old.stop();
        }
        match create_sink_at(mixer, &media.path, target, media.tap.clone()) {
            Ok(sink) => {
                sink.set_volume(media.volume);
                if t.clock.is_running() {
                    sink.play();
                }
                t.sink = Some(sink);
            }
            Err(e) => {
                warn!("seek failed: {e}");
                t.clock.pause();
                drop(t);
                media.events.emit(ResourceEvent::Error(e.0));
            }
        }
    }

    fn set_volume(&mut self, media: &mut RodioMedia, volume: f32) {
        media.volume = volume;
        if let Some(sink) = lock(&media.transport).sink.as_ref() {
            sink.set_volume(volume);
        }
    }

    fn release(&mut self, mut media: RodioMedia) {
        if let Some(tx) = media.watcher_stop.take() {
            let _ = tx.send(());
        }
        if let Some(join) = media.watcher.take() {
            let _ = join.join();
        }
        let mut t = lock(&media.transport);
        if let Some(sink) = t.sink.take() {
            sink.stop();
        }
        t.clock.reset();
        media.tap = None;
        debug!("released {}", media.path.display());
    }

    fn close(&mut self) {
        if self.stream.take().is_some() {
            info!("audio output closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_accumulates_across_pauses() {
        let mut clock = PlaybackClock::default();
        assert_eq!(clock.position(), Duration::ZERO);
        assert!(!clock.is_running());

        clock.set(Duration::from_secs(5));
        assert_eq!(clock.position(), Duration::from_secs(5));

        clock.resume();
        thread::sleep(Duration::from_millis(10));
        clock.pause();
        let paused_at = clock.position();
        assert!(paused_at >= Duration::from_millis(5010));

        thread::sleep(Duration::from_millis(10));
        assert_eq!(clock.position(), paused_at);

        clock.reset();
        assert_eq!(clock.position(), Duration::ZERO);
    }

    /// A short mono 16-bit PCM WAV file.
    fn write_wav(path: &Path, samples: u32) {
        const RATE: u32 = 8_000;
        let data_len = samples * 2;
        let mut bytes = Vec::with_capacity(44 + data_len as usize);
        bytes.extend_from_slice(b"RIFF");
        bytes.extend_from_slice(&(36 + data_len).to_le_bytes());
        bytes.extend_from_slice(b"WAVEfmt ");
        bytes.extend_from_slice(&16u32.to_le_bytes());
        bytes.extend_from_slice(&1u16.to_le_bytes());
        bytes.extend_from_slice(&1u16.to_le_bytes());
        bytes.extend_from_slice(&RATE.to_le_bytes());
        bytes.extend_from_slice(&(RATE * 2).to_le_bytes());
        bytes.extend_from_slice(&2u16.to_le_bytes());
        bytes.extend_from_slice(&16u16.to_le_bytes());
        bytes.extend_from_slice(b"data");
        bytes.extend_from_slice(&data_len.to_le_bytes());
        for i in 0..samples {
            let v: i16 = if i % 2 == 0 { 4_000 } else { -4_000 };
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        std::fs::write(path, bytes).unwrap();
    }

    #[test]
    fn idle_transport_reports_nothing() {
        let mut t = Transport::default();
        assert_eq!(poll_transport(&mut t, None), None);
    }

    #[test]
    fn replay_after_end_builds_a_fresh_sink() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blip.wav");
        write_wav(&path, 800);

        let (mixer, mut output) = rodio::mixer::mixer(1, 8_000);
        let mut t = Transport::default();
        start_transport(&mixer, &mut t, &path, None, 0.5).unwrap();
        assert!(t.clock.is_running());
        assert!(!t.sink.as_ref().unwrap().empty());

        // Pull the mixer output until the sink has played everything.
        let mut pulled = 0;
        while !t.sink.as_ref().unwrap().empty() {
            assert!(output.next().is_some());
            pulled += 1;
            assert!(pulled < 100_000, "sink never drained");
        }

        assert_eq!(
            poll_transport(&mut t, Some(Duration::from_millis(100))),
            Some(ResourceEvent::Ended)
        );
        assert!(t.sink.is_none());
        assert!(!t.clock.is_running());
        assert_eq!(t.clock.position(), Duration::ZERO);

        start_transport(&mixer, &mut t, &path, None, 0.5).unwrap();
        let sink = t.sink.as_ref().unwrap();
        assert!(!sink.empty());
        assert!(!sink.is_paused());
        assert!((sink.volume() - 0.5).abs() < f32::EPSILON);
        assert!(t.clock.is_running());
        assert!(matches!(
            poll_transport(&mut t, None),
            Some(ResourceEvent::TimeUpdate(_))
        ));
    }

    #[test]
    fn start_replaces_an_empty_sink() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blip.wav");
        write_wav(&path, 400);

        let (mixer, _output) = rodio::mixer::mixer(1, 8_000);
        let mut t = Transport {
            sink: Some(Sink::connect_new(&mixer)),
            ..Transport::default()
        };
        start_transport(&mixer, &mut t, &path, None, 1.0).unwrap();
        assert_eq!(t.sink.as_ref().unwrap().len(), 1);
        assert!(!t.sink.as_ref().unwrap().is_paused());
    }

    #[test]
    fn start_keeps_a_paused_sink_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blip.wav");
        write_wav(&path, 400);

        let (mixer, _output) = rodio::mixer::mixer(1, 8_000);
        let mut t = Transport::default();
        start_transport(&mixer, &mut t, &path, None, 1.0).unwrap();
        t.sink.as_ref().unwrap().pause();
        t.clock.pause();

        start_transport(&mixer, &mut t, &path, None, 1.0).unwrap();
        assert_eq!(t.sink.as_ref().unwrap().len(), 1);
        assert!(!t.sink.as_ref().unwrap().is_paused());
    }

    #[test]
    fn open_rejects_undecodable_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.mp3");
        std::fs::write(&path, b"definitely not audio").unwrap();

        let (tx, rx) = mpsc::channel();
        let mut backend = RodioBackend::new(Duration::from_millis(250));
        assert!(backend.open(&path, EventEmitter::new(1, tx)).is_err());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn open_rejects_missing_files() {
        let (tx, _rx) = mpsc::channel();
        let mut backend = RodioBackend::new(Duration::from_millis(250));
        let missing = Path::new("/nonexistent/allegro/track.ogg");
        assert!(backend.open(missing, EventEmitter::new(1, tx)).is_err());
    }
}
