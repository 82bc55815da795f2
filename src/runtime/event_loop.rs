use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind};
use ratatui::{Terminal, backend::CrosstermBackend};

use crate::app::{App, InputMode};
use crate::audio::AudioBackend;
use crate::config;
use crate::runtime::player::Player;
use crate::storage::KeyValueStore;
use crate::ui;

/// State tracked by the runtime event loop across iterations.
#[derive(Debug, Default)]
pub struct EventLoopState {
    /// Internal two-key prefix state used for `gg` handling.
    pub pending_gg: bool,
    pending_zz: bool,
}

/// Main terminal event loop: handles input, UI drawing and session upkeep.
/// Returns `Ok(())` when shutdown is requested.
pub fn run<B, S>(
    terminal: &mut Terminal<CrosstermBackend<std::io::Stdout>>,
    settings: &config::Settings,
    app: &mut App,
    player: &mut Player<B, S>,
    state: &mut EventLoopState,
) -> Result<(), Box<dyn std::error::Error>>
where
    B: AudioBackend,
    S: KeyValueStore,
{
    loop {
        player.tick(app);

        let playback = player.state().clone();
        let visualization = player.session().visualization();
        terminal.draw(|f| {
            ui::draw(
                f,
                app,
                &playback,
                visualization,
                &settings.ui,
                &settings.controls,
            )
        })?;

        if event::poll(Duration::from_millis(50))? {
            if let Event::Key(key) = event::read()? {
                if key.kind != KeyEventKind::Press {
                    continue;
                }
                if handle_key_event(key, app, player, state) {
                    break;
                }
            }
        }
    }

    Ok(())
}

/// Expand a leading `~/` against `$HOME`.
fn expand_home(input: &str) -> PathBuf {
    expand_home_with(input, std::env::var_os("HOME"))
}

fn expand_home_with(input: &str, home: Option<OsString>) -> PathBuf {
    match (input.strip_prefix("~/"), home) {
        (Some(rest), Some(home)) => PathBuf::from(home).join(rest),
        _ => PathBuf::from(input),
    }
}

fn handle_import_key<B: AudioBackend, S: KeyValueStore>(
    key: KeyEvent,
    app: &mut App,
    player: &mut Player<B, S>,
) {
    match key.code {
        KeyCode::Esc => app.cancel_input(),
        KeyCode::Backspace => app.pop_input_char(),
        KeyCode::Enter => {
            if let Some(path) = app.take_input() {
                player.import(app, &[expand_home(&path)]);
            }
        }
        KeyCode::Char(c) if !c.is_control() => app.push_input_char(c),
        _ => {}
    }
}

/// Handle one key press. Returns `true` when the user asked to quit.
fn handle_key_event<B: AudioBackend, S: KeyValueStore>(
    key: KeyEvent,
    app: &mut App,
    player: &mut Player<B, S>,
    state: &mut EventLoopState,
) -> bool {
    if matches!(app.input, InputMode::Import(_)) {
        state.pending_gg = false;
        handle_import_key(key, app, player);
        return false;
    }

    // Any key press dismisses the last message.
    app.clear_message();

    if key.code != KeyCode::Char('g') {
        state.pending_gg = false;
    }
    if key.code != KeyCode::Char('z') {
        state.pending_zz = false;
    }

    match key.code {
        KeyCode::Char('q') => return true,
        KeyCode::Char('g') => {
            if state.pending_gg {
                state.pending_gg = false;
                app.select_first();
            } else {
                state.pending_gg = true;
            }
        }
        KeyCode::Char('G') => app.select_last(),
        KeyCode::Char('z') => {
            if state.pending_zz {
                state.pending_zz = false;
                app.follow_current();
            } else {
                state.pending_zz = true;
            }
        }
        KeyCode::Char('j') | KeyCode::Down => app.next(),
        KeyCode::Char('k') | KeyCode::Up => app.prev(),
        KeyCode::Enter => player.play_selected(app),
        KeyCode::Char('p') | KeyCode::Char(' ') => player.toggle_play_pause(app),
        KeyCode::Char('l') | KeyCode::Char('n') => player.next_track(app),
        KeyCode::Char('h') | KeyCode::Char('N') => player.previous_track(app),
        KeyCode::Char('L') | KeyCode::Right => player.skip(true),
        KeyCode::Char('H') | KeyCode::Left => player.skip(false),
        KeyCode::Char('+') | KeyCode::Char('=') => player.change_volume(true),
        KeyCode::Char('-') => player.change_volume(false),
        KeyCode::Char('m') => player.toggle_mute(),
        KeyCode::Char('d') | KeyCode::Delete => player.delete_selected(app),
        KeyCode::Char('X') => player.clear_library(app),
        KeyCode::Char('a') => app.begin_import(),
        KeyCode::Char('s') => player.toggle_shuffle(app),
        KeyCode::Char('r') => {
            player.cycle_repeat(app);
        }
        KeyCode::Char('v') => player.toggle_visualizer(app),
        KeyCode::Char('A') => player.toggle_autoplay(app),
        _ => {}
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::fake::{FakeBackend, FakeHost};
    use crate::audio::{PlaybackSession, SessionOptions};
    use crate::config::{ControlsSettings, LibrarySettings};
    use crate::library::Playlist;
    use crate::storage::{MemoryStore, PlayerStore};
    use crossterm::event::KeyModifiers;

    #[test]
    fn home_prefix_is_expanded() {
        let home = || Some(OsString::from("/home/me"));
        assert_eq!(
            expand_home_with("~/Music", home()),
            PathBuf::from("/home/me/Music")
        );
        assert_eq!(
            expand_home_with("/tmp/x.mp3", home()),
            PathBuf::from("/tmp/x.mp3")
        );
        assert_eq!(expand_home_with("~user/x", home()), PathBuf::from("~user/x"));
        assert_eq!(expand_home_with("~/Music", None), PathBuf::from("~/Music"));
    }

    fn press(player: &mut Player<FakeBackend, MemoryStore>, app: &mut App, code: KeyCode) -> bool {
        let mut state = EventLoopState::default();
        handle_key_event(
            KeyEvent::new(code, KeyModifiers::NONE),
            app,
            player,
            &mut state,
        )
    }

    fn player() -> Player<FakeBackend, MemoryStore> {
        let (backend, _host) = FakeBackend::new(FakeHost::default());
        Player::new(
            PlaybackSession::new(backend, SessionOptions::default()),
            PlayerStore::new(MemoryStore::default()),
            LibrarySettings::default(),
            ControlsSettings::default(),
        )
    }

    #[test]
    fn q_quits_only_outside_import_mode() {
        let mut player = player();
        let mut app = App::new(Playlist::default());
        assert!(press(&mut player, &mut app, KeyCode::Char('q')));

        assert!(!press(&mut player, &mut app, KeyCode::Char('a')));
        assert!(!press(&mut player, &mut app, KeyCode::Char('q')));
        assert_eq!(app.input, InputMode::Import("q".to_string()));

        press(&mut player, &mut app, KeyCode::Esc);
        assert_eq!(app.input, InputMode::Normal);
    }

    #[test]
    fn gg_needs_two_presses() {
        let mut player = player();
        let mut app = App::new(Playlist::default());
        let mut state = EventLoopState::default();
        let g = KeyEvent::new(KeyCode::Char('g'), KeyModifiers::NONE);

        handle_key_event(g, &mut app, &mut player, &mut state);
        assert!(state.pending_gg);
        handle_key_event(g, &mut app, &mut player, &mut state);
        assert!(!state.pending_gg);

        handle_key_event(g, &mut app, &mut player, &mut state);
        let j = KeyEvent::new(KeyCode::Char('j'), KeyModifiers::NONE);
        handle_key_event(j, &mut app, &mut player, &mut state);
        assert!(!state.pending_gg);
    }

    #[test]
    fn shift_x_clears_the_library() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.mp3"), b"x").unwrap();
        let mut player = player();
        let mut app = App::new(Playlist::default());
        player.import(&mut app, &[dir.path().to_path_buf()]);
        assert_eq!(app.playlist.len(), 1);

        press(&mut player, &mut app, KeyCode::Char('x'));
        assert_eq!(app.playlist.len(), 1);
        press(&mut player, &mut app, KeyCode::Char('X'));
        assert!(app.playlist.is_empty());
        assert!(player.store().tracks().is_empty());
    }

    #[test]
    fn volume_keys_adjust_session() {
        let mut player = player();
        let mut app = App::new(Playlist::default());
        press(&mut player, &mut app, KeyCode::Char('-'));
        assert!((player.state().volume - 0.95).abs() < 1e-6);
        press(&mut player, &mut app, KeyCode::Char('m'));
        assert!(player.state().muted);
    }
}
