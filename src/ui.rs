//! UI rendering helpers for the terminal user interface.
//!
//! This module contains functions to render the TUI using `ratatui`.

use ratatui::{
    Frame,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Modifier, Style, Stylize},
    widgets::{Block, Borders, List, ListItem, Padding, Paragraph, Sparkline, Wrap},
};
use std::{collections::BTreeMap, sync::LazyLock};

use crate::app::{App, InputMode};
use crate::audio::{Phase, PlaybackState, Visualization};
use crate::config::{ControlsSettings, UiSettings};
use crate::library::RepeatMode;

static CONTROLS_MAP: LazyLock<BTreeMap<String, String>> = LazyLock::new(|| {
    let mut map: BTreeMap<String, String> = BTreeMap::new();
    map.insert("j/k".to_string(), "up/down".to_string());
    map.insert("gg/G".to_string(), "top/bottom".to_string());
    map.insert("enter".to_string(), "play selected".to_string());
    map.insert("space/p".to_string(), "play/pause".to_string());
    map.insert("h/l".to_string(), "prev/next track".to_string());
    // H/L is filled dynamically from config.
    map.insert("+/-".to_string(), "volume".to_string());
    map.insert("m".to_string(), "mute".to_string());
    map.insert("a".to_string(), "import".to_string());
    map.insert("d".to_string(), "delete".to_string());
    map.insert("X".to_string(), "clear library".to_string());
    map.insert("s".to_string(), "shuffle".to_string());
    map.insert("r".to_string(), "repeat".to_string());
    map.insert("v".to_string(), "visualizer".to_string());
    map.insert("A".to_string(), "autoplay".to_string());
    map.insert("q".to_string(), "quit".to_string());
    map
});

/// Render the controls help text, incorporating skip seconds.
fn controls_text(skip_seconds: f64) -> String {
    let order = [
        "j/k", "h/l", "H/L", "enter", "space/p", "gg/G", "+/-", "m", "a", "d", "X", "s", "r",
        "v", "A", "q",
    ];
    order
        .iter()
        .filter_map(|k| {
            if *k == "H/L" {
                Some(format!("[H/L] seek -/+{skip_seconds}s"))
            } else {
                CONTROLS_MAP.get(*k).map(|v| format!("[{k}] {v}"))
            }
        })
        .collect::<Vec<String>>()
        .join(" | ")
}

/// Format seconds as `MM:SS`. Negative and non-finite values render as `00:00`.
fn format_mmss(seconds: f64) -> String {
    let secs = if seconds.is_finite() && seconds > 0.0 {
        seconds as u64
    } else {
        0
    };
    format!("{:02}:{:02}", secs / 60, secs % 60)
}

fn track_duration_text(seconds: f64) -> String {
    if seconds > 0.0 {
        format_mmss(seconds)
    } else {
        "--:--".to_string()
    }
}

fn repeat_text(mode: RepeatMode) -> &'static str {
    match mode {
        RepeatMode::None => "REPEAT: Off",
        RepeatMode::One => "REPEAT: One",
        RepeatMode::All => "REPEAT: All",
    }
}

fn status_text(app: &App, state: &PlaybackState) -> String {
    let mut parts: Vec<String> = Vec::new();

    let song = app
        .playlist
        .current()
        .map(|t| t.name.as_str())
        .unwrap_or("-");
    if state.phase == Phase::Idle {
        parts.push(" Stopped".to_string());
    } else {
        parts.push(format!(
            " {}: {} [{}/{}]",
            state.phase.label(),
            song,
            format_mmss(state.current_time),
            track_duration_text(state.duration)
        ));
    }

    let volume = (state.volume * 100.0).round() as u32;
    if state.muted {
        parts.push(format!("VOL: {volume}% (muted)"));
    } else {
        parts.push(format!("VOL: {volume}%"));
    }

    parts.push(repeat_text(app.playlist.repeat()).to_string());
    if app.playlist.shuffle() {
        parts.push("Shuffle: ON".to_string());
    } else {
        parts.push("Shuffle: OFF".to_string());
    }

    if let Some(err) = state.last_error {
        parts.push(err.message().to_string());
    }
    if let Some(msg) = &app.message {
        parts.push(msg.clone());
    }

    parts.join(" • ")
}

/// Squeeze or stretch `bins` to `width` columns, averaging where bins are merged.
fn fit_bins(bins: &[u8], width: usize) -> Vec<u64> {
    if bins.is_empty() || width == 0 {
        return Vec::new();
    }
    (0..width)
        .map(|col| {
            let start = col * bins.len() / width;
            let end = ((col + 1) * bins.len() / width).max(start + 1);
            let slice = &bins[start..end.min(bins.len())];
            slice.iter().map(|&b| u64::from(b)).sum::<u64>() / slice.len() as u64
        })
        .collect()
}

fn draw_visualizer(frame: &mut Frame, app: &App, visualization: Option<Visualization>, area: Rect) {
    let block = Block::default().borders(Borders::ALL).title(" spectrum ");
    let note = match visualization {
        Some(Visualization::Unsupported) => Some("visualization unavailable for this track"),
        Some(Visualization::Disabled) => Some("visualizer off"),
        _ => None,
    };

    if let Some(note) = note {
        let p = Paragraph::new(note)
            .alignment(Alignment::Center)
            .italic()
            .block(block);
        frame.render_widget(p, area);
        return;
    }

    let inner_width = area.width.saturating_sub(2) as usize;
    let sparkline = Sparkline::default()
        .block(block)
        .data(fit_bins(app.spectrum(), inner_width))
        .max(255);
    frame.render_widget(sparkline, area);
}

/// Render the entire UI into the provided `frame`.
pub fn draw(
    frame: &mut Frame,
    app: &App,
    state: &PlaybackState,
    visualization: Option<Visualization>,
    ui_settings: &UiSettings,
    controls_settings: &ControlsSettings,
) {
    let importing = matches!(app.input, InputMode::Import(_));
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(4),
            Constraint::Min(1),
            Constraint::Length(if app.show_visualizer { 8 } else { 0 }),
            Constraint::Length(if importing { 3 } else { 0 }),
            Constraint::Length(4),
        ])
        .split(frame.area());

    // Header
    let header = Paragraph::new(ui_settings.header_text.as_str())
        .alignment(Alignment::Center)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(" allegro ")
                .title_alignment(Alignment::Center),
        );
    frame.render_widget(header, chunks[0]);

    // Status box
    let status_par = Paragraph::new(status_text(app, state))
        .block(
            Block::bordered()
                .padding(Padding {
                    left: 1,
                    right: 0,
                    top: 0,
                    bottom: 0,
                })
                .title(" status "),
        )
        .wrap(Wrap { trim: true });
    frame.render_widget(status_par, chunks[1]);

    // Main list
    {
        let tracks = app.playlist.tracks();
        let current = app.playlist.current_index();

        // Center the selected item when possible by creating a visible window.
        let total = tracks.len();
        let list_height = chunks[2].height.saturating_sub(2) as usize;
        let sel_pos = app.selected.min(total.saturating_sub(1));
        let (start, end, selected_pos_in_visible) = if total <= list_height || list_height == 0 {
            (0, total, sel_pos)
        } else {
            let half = list_height / 2;
            let mut start = sel_pos.saturating_sub(half);
            if start + list_height > total {
                start = total - list_height;
            }
            (start, start + list_height, sel_pos - start)
        };

        let visible_items: Vec<ListItem> = tracks[start..end]
            .iter()
            .enumerate()
            .map(|(offset, track)| {
                let marker = if current == Some(start + offset) {
                    "♪ "
                } else {
                    "  "
                };
                ListItem::new(format!(
                    "{marker}{} [{}]",
                    track.name,
                    track_duration_text(track.duration_seconds)
                ))
            })
            .collect();

        let title = if !app.has_tracks() {
            " tracks (press a to import) ".to_string()
        } else {
            format!(" tracks ({total}) ")
        };
        let list = List::new(visible_items)
            .block(Block::default().borders(Borders::ALL).title(title))
            .highlight_style(Style::default().add_modifier(Modifier::REVERSED))
            .highlight_symbol("> ");
        let mut list_state = ratatui::widgets::ListState::default();
        if total > 0 {
            list_state.select(Some(selected_pos_in_visible));
        }
        frame.render_stateful_widget(list, chunks[2], &mut list_state);
    }

    if app.show_visualizer {
        draw_visualizer(frame, app, visualization, chunks[3]);
    }

    if let InputMode::Import(buf) = &app.input {
        let input = Paragraph::new(buf.as_str()).block(
            Block::default()
                .borders(Borders::ALL)
                .title(" import path (enter to add, esc to cancel) "),
        );
        frame.render_widget(input, chunks[4]);
    }

    let footer = Paragraph::new(controls_text(controls_settings.skip_seconds))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(" controls ")
                .padding(Padding {
                    left: 1,
                    right: 0,
                    top: 0,
                    bottom: 0,
                }),
        )
        .wrap(Wrap { trim: true });

    frame.render_widget(footer, chunks[5]);
}
