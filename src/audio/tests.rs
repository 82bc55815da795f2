use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use super::fake::{FakeBackend, FakeHost, HostHandle, StartMode};
use super::session::{PlaybackSession, SessionOptions, clamp_position};
use super::types::{ErrorKind, Phase, ResourceEvent, Visualization};

fn options() -> SessionOptions {
    SessionOptions {
        frame_interval: Duration::from_millis(1),
        ..SessionOptions::default()
    }
}

fn session_with(host: FakeHost) -> (PlaybackSession<FakeBackend>, HostHandle) {
    let (backend, host) = FakeBackend::new(host);
    (PlaybackSession::new(backend, options()), host)
}

fn session() -> (PlaybackSession<FakeBackend>, HostHandle) {
    session_with(FakeHost::default())
}

fn playing_session() -> (PlaybackSession<FakeBackend>, HostHandle) {
    let (mut s, host) = session();
    s.load("/music/a.mp3").unwrap();
    s.pump();
    s.play().unwrap();
    s.pump();
    assert_eq!(s.phase(), Phase::Playing);
    (s, host)
}

#[test]
fn clamp_position_bounds_to_duration() {
    assert_eq!(clamp_position(-3.0, 10.0), 0.0);
    assert_eq!(clamp_position(4.5, 10.0), 4.5);
    assert_eq!(clamp_position(12.0, 10.0), 10.0);
    assert_eq!(clamp_position(12.0, 0.0), 12.0);
    assert_eq!(clamp_position(f64::NAN, 10.0), 0.0);
}

#[test]
fn new_session_is_idle_with_nothing_bound() {
    let (s, _host) = session();
    assert_eq!(s.phase(), Phase::Idle);
    assert_eq!(s.generation(), 0);
    assert!(!s.has_binding());
    assert!(s.visualization().is_none());
    assert_eq!(s.state().volume, 1.0);
}

#[test]
fn load_binds_resource_and_reads_metadata() {
    let (mut s, host) = session();
    s.load("/music/a.mp3").unwrap();

    assert_eq!(s.phase(), Phase::Loading);
    assert_eq!(s.generation(), 1);
    assert_eq!(s.locator(), Some(Path::new("/music/a.mp3")));
    assert_eq!(s.visualization(), Some(Visualization::Active));
    assert_eq!(host.borrow().live, 1);

    assert_eq!(s.pump(), 1);
    assert_eq!(s.state().duration, 180.0);
    // Loading waits for play() unless autoplay is on.
    assert_eq!(s.phase(), Phase::Loading);
    assert!(host.borrow().starts.is_empty());
}

#[test]
fn load_failure_errors_without_a_binding() {
    let mut host = FakeHost::default();
    host.fail_open.push(PathBuf::from("/music/broken.mp3"));
    let (mut s, host) = session_with(host);

    assert!(s.load("/music/broken.mp3").is_err());
    assert_eq!(s.phase(), Phase::Errored);
    assert_eq!(s.state().last_error, Some(ErrorKind::LoadFailed));
    assert!(!s.has_binding());
    assert_eq!(host.borrow().live, 0);

    // Retrying with another track clears the error.
    s.load("/music/ok.mp3").unwrap();
    assert_eq!(s.phase(), Phase::Loading);
    assert_eq!(s.state().last_error, None);
}

#[test]
fn play_without_track_is_rejected() {
    let (mut s, _host) = session();
    assert!(s.play().is_err());
    assert_eq!(s.phase(), Phase::Idle);
}

#[test]
fn play_resumes_context_then_plays_and_starts_feed() {
    let (mut s, host) = playing_session();
    assert_eq!(host.borrow().resumes, 1);
    assert!(s.is_feed_running());
    assert_eq!(s.state().last_error, None);

    let rx = s.subscribe();
    let snap = rx.recv_timeout(Duration::from_secs(2)).unwrap();
    assert_eq!(snap.generation, s.generation());
    assert_eq!(snap.bins.len(), 64);
    assert!(s.latest_snapshot().is_some());
}

#[test]
fn play_while_playing_is_a_noop() {
    let (mut s, host) = playing_session();
    s.play().unwrap();
    s.pump();
    assert_eq!(s.phase(), Phase::Playing);
    assert_eq!(host.borrow().starts.len(), 1);
}

#[test]
fn play_is_valid_from_paused_and_ended() {
    let (mut s, host) = playing_session();
    s.pause();
    s.play().unwrap();
    s.pump();
    assert_eq!(s.phase(), Phase::Playing);

    host.borrow().emit_latest(ResourceEvent::Ended);
    s.pump();
    assert_eq!(s.phase(), Phase::Ended);
    s.play().unwrap();
    s.pump();
    assert_eq!(s.phase(), Phase::Playing);
    assert_eq!(host.borrow().starts.len(), 3);
}

#[test]
fn pause_when_not_playing_is_a_noop() {
    let (mut s, host) = session();
    s.load("/music/a.mp3").unwrap();
    s.pause();
    assert_eq!(s.phase(), Phase::Loading);
    assert_eq!(host.borrow().pauses, 0);
}

#[test]
fn play_then_pause_stops_publication() {
    let (mut s, host) = playing_session();
    let rx = s.subscribe();
    assert!(rx.recv_timeout(Duration::from_secs(2)).is_ok());

    s.pause();
    assert_eq!(s.phase(), Phase::Paused);
    assert!(!s.is_feed_running());
    assert_eq!(host.borrow().pauses, 1);

    while rx.try_recv().is_ok() {}
    let published = s.snapshot_hub().published();
    thread::sleep(Duration::from_millis(20));
    assert!(rx.try_recv().is_err());
    assert_eq!(s.snapshot_hub().published(), published);

    s.play().unwrap();
    s.pump();
    assert!(rx.recv_timeout(Duration::from_secs(2)).is_ok());
}

#[test]
fn pause_cancels_a_pending_play() {
    let host = FakeHost {
        start_mode: StartMode::Deferred,
        ..FakeHost::default()
    };
    let (mut s, host) = session_with(host);
    s.load("/music/a.mp3").unwrap();
    s.play().unwrap();
    assert!(s.is_play_pending());

    s.pause();
    assert_eq!(s.phase(), Phase::Paused);
    assert!(!s.is_play_pending());

    // The host finishes starting after the pause; the session ignores it.
    let request = host.borrow().starts[0];
    host.borrow().emit_latest(ResourceEvent::PlayResolved {
        request,
        outcome: Ok(()),
    });
    s.pump();
    assert_eq!(s.phase(), Phase::Paused);
    assert!(!s.is_feed_running());
}

#[test]
fn rejected_play_errors_but_keeps_binding_for_retry() {
    let host = FakeHost {
        start_mode: StartMode::Reject,
        ..FakeHost::default()
    };
    let (mut s, host) = session_with(host);
    s.load("/music/a.mp3").unwrap();
    s.pump();

    s.play().unwrap();
    s.pump();
    assert_eq!(s.phase(), Phase::Errored);
    assert_eq!(s.state().last_error, Some(ErrorKind::PlaybackDenied));
    assert!(s.has_binding());
    assert_eq!(host.borrow().live, 1);
    assert!(!s.is_feed_running());

    host.borrow_mut().start_mode = StartMode::Immediate;
    s.play().unwrap();
    s.pump();
    assert_eq!(s.phase(), Phase::Playing);
    assert_eq!(s.state().last_error, None);
    assert_eq!(host.borrow().opened.len(), 1);
}

#[test]
fn denied_output_context_is_playback_denied() {
    let host = FakeHost {
        deny_resume: true,
        ..FakeHost::default()
    };
    let (mut s, host) = session_with(host);
    s.load("/music/a.mp3").unwrap();
    assert!(s.play().is_err());
    assert_eq!(s.phase(), Phase::Errored);
    assert_eq!(s.state().last_error, Some(ErrorKind::PlaybackDenied));
    assert!(s.has_binding());
    assert!(host.borrow().starts.is_empty());
}

#[test]
fn seek_clamps_to_duration() {
    let (mut s, host) = session();
    s.load("/music/a.mp3").unwrap();
    s.pump();

    s.seek(200.0);
    assert_eq!(s.state().current_time, 180.0);
    s.seek(-5.0);
    assert_eq!(s.state().current_time, 0.0);
    s.seek(42.5);
    assert_eq!(s.state().current_time, 42.5);
    assert_eq!(s.phase(), Phase::Loading);
    assert_eq!(host.borrow().seeks, vec![180.0, 0.0, 42.5]);
}

#[test]
fn seek_property_holds_across_inputs() {
    let (mut s, _host) = session();
    s.load("/music/a.mp3").unwrap();
    s.pump();
    for t in [-100.0, -0.1, 0.0, 0.5, 90.0, 179.99, 180.0, 180.01, 1e9] {
        s.seek(t);
        assert_eq!(s.state().current_time, t.clamp(0.0, 180.0));
    }
}

#[test]
fn seek_is_ignored_when_idle_or_errored() {
    let (mut s, host) = session();
    s.seek(10.0);
    assert_eq!(s.state().current_time, 0.0);

    host.borrow_mut().fail_open.push(PathBuf::from("/music/x.mp3"));
    let _ = s.load("/music/x.mp3");
    s.seek(10.0);
    assert_eq!(s.state().current_time, 0.0);
    assert!(host.borrow().seeks.is_empty());
}

#[test]
fn skip_moves_relative_to_current_position() {
    let (mut s, _host) = playing_session();
    s.seek(100.0);
    s.skip(10.0);
    assert_eq!(s.state().current_time, 110.0);
    s.skip(-200.0);
    assert_eq!(s.state().current_time, 0.0);
    s.skip(500.0);
    assert_eq!(s.state().current_time, 180.0);
}

#[test]
fn volume_is_stored_exactly_or_clamped() {
    let (mut s, host) = session();
    for v in [0.0, 0.25, 0.5, 1.0] {
        s.set_volume(v);
        assert_eq!(s.state().volume, v);
    }
    s.set_volume(1.7);
    assert_eq!(s.state().volume, 1.0);
    s.set_volume(-0.3);
    assert_eq!(s.state().volume, 0.0);
    s.set_volume(f32::NAN);
    assert_eq!(s.state().volume, 0.0);

    // Applies to the resource immediately, whatever the phase.
    s.load("/music/a.mp3").unwrap();
    s.set_volume(0.6);
    assert_eq!(host.borrow().volumes.last().copied(), Some(0.6));
}

#[test]
fn mute_silences_without_losing_volume() {
    let (mut s, host) = playing_session();
    s.set_volume(0.4);
    s.toggle_mute();
    assert!(s.state().muted);
    assert_eq!(s.state().volume, 0.4);
    assert_eq!(host.borrow().volumes.last().copied(), Some(0.0));
    s.toggle_mute();
    assert_eq!(host.borrow().volumes.last().copied(), Some(0.4));
}

#[test]
fn time_updates_advance_position() {
    let (mut s, host) = playing_session();
    host.borrow().emit_latest(ResourceEvent::TimeUpdate(1.0));
    host.borrow().emit_latest(ResourceEvent::TimeUpdate(2.5));
    s.pump();
    assert_eq!(s.state().current_time, 2.5);
}

#[test]
fn ended_resets_position_and_stops_feed() {
    let (mut s, host) = playing_session();
    host.borrow().emit_latest(ResourceEvent::TimeUpdate(179.0));
    host.borrow().emit_latest(ResourceEvent::Ended);
    s.pump();

    assert_eq!(s.phase(), Phase::Ended);
    assert_eq!(s.state().current_time, 0.0);
    assert!(!s.is_feed_running());
}

#[test]
fn ended_applies_even_when_not_playing() {
    let (mut s, host) = session();
    s.load("/music/a.mp3").unwrap();
    s.pump();
    s.seek(50.0);
    host.borrow().emit_latest(ResourceEvent::Ended);
    s.pump();
    assert_eq!(s.phase(), Phase::Ended);
    assert_eq!(s.state().current_time, 0.0);
}

#[test]
fn resource_error_releases_binding() {
    let (mut s, host) = playing_session();
    host.borrow()
        .emit_latest(ResourceEvent::Error("decode error".to_string()));
    s.pump();

    assert_eq!(s.phase(), Phase::Errored);
    assert_eq!(s.state().last_error, Some(ErrorKind::LoadFailed));
    assert!(!s.has_binding());
    assert!(!s.is_feed_running());
    let host = host.borrow();
    assert_eq!(host.live, 0);
    assert!(host.analyzers[0].is_released());
}

#[test]
fn loading_while_playing_releases_old_binding_first() {
    let (mut s, host) = playing_session();
    let rx = s.subscribe();
    assert!(rx.recv_timeout(Duration::from_secs(2)).is_ok());

    s.load("/music/b.mp3").unwrap();
    assert_eq!(s.phase(), Phase::Loading);
    assert_eq!(s.generation(), 2);
    assert!(!s.is_feed_running());
    assert!(s.latest_snapshot().is_none());
    {
        let host = host.borrow();
        assert_eq!(host.live, 1);
        assert_eq!(host.released, vec![PathBuf::from("/music/a.mp3")]);
        assert!(host.analyzers[0].is_released());
        assert!(!host.analyzers[1].is_released());
    }

    while rx.try_recv().is_ok() {}
    thread::sleep(Duration::from_millis(20));
    assert!(rx.try_recv().is_err());
}

#[test]
fn rapid_double_load_discards_stale_play_completion() {
    let host = FakeHost {
        start_mode: StartMode::Deferred,
        ..FakeHost::default()
    };
    let (mut s, host) = session_with(host);
    let rx = s.subscribe();

    s.load("/music/a.mp3").unwrap();
    s.play().unwrap();
    let stale_request = host.borrow().starts[0];
    let stale_emitter = host.borrow().emitters[0].clone();

    s.load("/music/b.mp3").unwrap();

    // The first track's play() completes after the switch.
    stale_emitter.emit(ResourceEvent::PlayResolved {
        request: stale_request,
        outcome: Ok(()),
    });
    stale_emitter.emit(ResourceEvent::TimeUpdate(99.0));
    s.pump();

    assert_eq!(s.phase(), Phase::Loading);
    assert_eq!(s.state().current_time, 0.0);
    assert!(!s.is_feed_running());
    assert_eq!(host.borrow().live, 1);
    thread::sleep(Duration::from_millis(10));
    assert!(rx.try_recv().is_err());

    // The new binding plays normally; every snapshot belongs to it.
    s.play().unwrap();
    let request = host.borrow().starts[1];
    host.borrow().emit_latest(ResourceEvent::PlayResolved {
        request,
        outcome: Ok(()),
    });
    s.pump();
    assert_eq!(s.phase(), Phase::Playing);
    let snap = rx.recv_timeout(Duration::from_secs(2)).unwrap();
    assert_eq!(snap.generation, 2);
}

#[test]
fn unsupported_analyzer_still_plays_without_snapshots() {
    let host = FakeHost {
        unsupported_analyzer: true,
        duration: None,
        ..FakeHost::default()
    };
    let (mut s, host) = session_with(host);
    let rx = s.subscribe();

    s.load("/music/unknown-length.ogg").unwrap();
    s.pump();
    assert_eq!(s.state().duration, 0.0);
    assert_eq!(s.visualization(), Some(Visualization::Unsupported));

    s.play().unwrap();
    s.pump();
    assert_eq!(s.phase(), Phase::Playing);
    assert!(!s.is_feed_running());

    host.borrow().emit_latest(ResourceEvent::TimeUpdate(3.0));
    host.borrow().emit_latest(ResourceEvent::TimeUpdate(4.0));
    s.pump();
    assert_eq!(s.state().current_time, 4.0);

    thread::sleep(Duration::from_millis(10));
    assert!(rx.try_recv().is_err());
    assert_eq!(s.snapshot_hub().published(), 0);
}

#[test]
fn disabled_visualizer_keeps_feed_off_until_enabled() {
    let (mut s, host) = session();
    s.set_visualizer_enabled(false);
    s.load("/music/a.mp3").unwrap();
    s.play().unwrap();
    s.pump();
    assert_eq!(s.visualization(), Some(Visualization::Disabled));
    assert!(!s.is_feed_running());

    s.set_visualizer_enabled(true);
    assert!(s.is_feed_running());
    s.set_visualizer_enabled(false);
    assert!(!s.is_feed_running());
    assert_eq!(host.borrow().analyzers.len(), 1);
}

#[test]
fn autoplay_starts_when_metadata_arrives() {
    let (mut s, host) = session();
    s.set_autoplay(true);
    s.load("/music/a.mp3").unwrap();
    s.pump();
    s.pump();
    assert_eq!(s.phase(), Phase::Playing);
    assert_eq!(host.borrow().starts.len(), 1);
}

#[test]
fn feed_snapshots_carry_tap_output() {
    let (mut s, host) = playing_session();
    let rx = s.subscribe();
    {
        let mut host = host.borrow_mut();
        let tap = &mut host.taps[0];
        let block: Vec<f32> = (0..tap.block_len())
            .map(|i| (2.0 * std::f32::consts::PI * 8.0 * i as f32 / 128.0).sin())
            .collect();
        for _ in 0..10 {
            tap.process_block(&block);
        }
    }
    let lit = (0..200)
        .filter_map(|_| rx.recv_timeout(Duration::from_secs(2)).ok())
        .any(|snap| snap.bins[8] > 0);
    assert!(lit);
    s.pause();
}

#[test]
fn unload_returns_to_idle_and_keeps_volume() {
    let (mut s, host) = playing_session();
    s.set_volume(0.3);
    s.unload();

    assert_eq!(s.phase(), Phase::Idle);
    assert!(!s.has_binding());
    assert!(!s.is_feed_running());
    assert_eq!(s.state().volume, 0.3);
    assert_eq!(s.state().current_time, 0.0);
    assert_eq!(host.borrow().live, 0);

    // Events from the unloaded binding are ignored.
    host.borrow().emit_latest(ResourceEvent::Ended);
    assert_eq!(s.pump(), 0);
    assert_eq!(s.phase(), Phase::Idle);
}

#[test]
fn dispose_while_playing_releases_everything() {
    let (s, host) = playing_session();
    let rx = s.subscribe();
    assert!(rx.recv_timeout(Duration::from_secs(2)).is_ok());

    s.dispose();

    {
        let host = host.borrow();
        assert_eq!(host.live, 0);
        assert!(host.closed);
        assert!(host.analyzers[0].is_released());
        assert!(host.taps[0].is_released());
    }
    // Drain what was published before disposal; then the channel is closed.
    while rx.try_recv().is_ok() {}
    assert!(matches!(
        rx.try_recv(),
        Err(std::sync::mpsc::TryRecvError::Disconnected)
    ));
    // The emitter's session is gone.
    assert!(!host.borrow().emit_latest_ok(ResourceEvent::TimeUpdate(1.0)));
}
