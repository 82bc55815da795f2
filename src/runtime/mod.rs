use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use log::{info, warn};
use ratatui::{Terminal, backend::CrosstermBackend};

use crate::app::App;
use crate::audio::{PlaybackSession, RodioBackend, SessionOptions};
use crate::storage::{JsonDirStore, KeyValueStore, MemoryStore, PlayerStore};

mod cli;
mod event_loop;
mod logging;
mod player;
mod settings;
mod startup;

use player::Player;

/// Open the on-disk store, or keep everything in memory when that is impossible.
fn open_store(data_dir: Option<PathBuf>) -> Box<dyn KeyValueStore> {
    match data_dir.map(JsonDirStore::open) {
        Some(Ok(store)) => {
            info!("storing library in {}", store.dir().display());
            Box::new(store)
        }
        Some(Err(e)) => {
            warn!("cannot open data directory, nothing will be saved: {e}");
            Box::new(MemoryStore::default())
        }
        None => {
            warn!("no data directory, nothing will be saved");
            Box::new(MemoryStore::default())
        }
    }
}

/// One-line summary of what is stored, shown when the player starts.
fn storage_summary(tracks: usize, bytes: u64) -> String {
    let size = if bytes < 1024 {
        format!("{bytes} B")
    } else {
        format!("{:.1} KiB", bytes as f64 / 1024.0)
    };
    format!("{tracks} track(s) in library, {size} stored")
}

pub fn run() -> Result<(), Box<dyn std::error::Error>> {
    let command = cli::parse(env::args_os().skip(1)).inspect_err(|e| {
        eprintln!("allegro: {e}\n{}", cli::USAGE);
    })?;

    let (settings, config_warning) = settings::load_settings();
    let data_dir = settings.data_dir();
    // Raw mode is still off, so stderr is visible.
    let logging_error = match logging::init(data_dir.as_deref()) {
        Ok(path) => {
            info!("logging to {}", path.display());
            None
        }
        Err(e) => {
            eprintln!("allegro: logging disabled: {e}");
            Some(e)
        }
    };
    if let Some(msg) = config_warning {
        warn!("{msg}");
    }

    let mut store = PlayerStore::new(open_store(data_dir));
    let paths = match command {
        cli::Command::Maintain(task) => {
            println!("{}", cli::execute(task, &mut store)?);
            return Ok(());
        }
        cli::Command::Play(paths) => paths,
        cli::Command::Help => {
            println!("{}", cli::USAGE);
            return Ok(());
        }
    };

    if !store.initialize() {
        warn!("could not seed default documents");
    }
    let preferences = store.preferences();

    let mut app = App::new(startup::restore_playlist(&store));
    app.show_visualizer = preferences.show_visualizer;
    app.set_message(storage_summary(app.playlist.len(), store.usage()));

    let options = SessionOptions {
        analyzer: settings.analyzer.clone(),
        frame_interval: Duration::from_millis(settings.audio.frame_interval_ms),
        visualizer_enabled: preferences.show_visualizer,
        autoplay: preferences.auto_play,
        initial_volume: store.volume(),
    };
    let backend = RodioBackend::new(Duration::from_millis(settings.audio.time_update_ms));
    let session = PlaybackSession::new(backend, options);
    let mut player = Player::new(
        session,
        store,
        settings.library.clone(),
        settings.controls.clone(),
    );

    startup::resume_session(&mut app, &mut player);

    if !paths.is_empty() {
        player.import(&mut app, &paths);
    }
    if let Some(e) = logging_error {
        app.set_message(format!("logging disabled: {e}"));
    }

    enable_raw_mode()?;
    let mut stdout = std::io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let run_result: Result<(), Box<dyn std::error::Error>> = (|| {
        let mut state = event_loop::EventLoopState::default();
        event_loop::run(&mut terminal, &settings, &mut app, &mut player, &mut state)
    })();

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    player.shutdown();
    info!("bye");
    run_result
}
