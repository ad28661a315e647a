use ratatui::crossterm::event::{self, KeyCode, KeyModifiers};

use crate::app::{App, AppMode};
use crate::constants::constants;
use crate::render::Action;

// --- Helpers ---

/// Convert a char index to a byte offset within the string.
pub fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
  s.char_indices().nth(char_idx).map_or(s.len(), |(i, _)| i)
}

fn select_next(app: &mut App) {
  let count = app.entries.len();
  if count > 0 {
    let i = app.list_state.selected().map_or(0, |i| (i + 1) % count);
    app.list_state.select(Some(i));
  }
}

fn select_prev(app: &mut App) {
  let count = app.entries.len();
  if count > 0 {
    let i = app.list_state.selected().map_or(0, |i| if i == 0 { count.saturating_sub(1) } else { i - 1 });
    app.list_state.select(Some(i));
  }
}

// --- Event Handling ---

pub fn handle_key_event(app: &mut App, key: event::KeyEvent) {
  if key.modifiers.contains(KeyModifiers::CONTROL) {
    match key.code {
      KeyCode::Char('c') => {
        app.should_quit = true;
        return;
      }
      KeyCode::Char('r') => {
        app.trigger_refresh_instances();
        return;
      }
      KeyCode::Char('l') => {
        app.clear_thumbnails();
        return;
      }
      _ => {}
    }
  }

  match app.mode {
    AppMode::Input => handle_input_key(app, key),
    AppMode::Results => handle_results_key(app, key),
    AppMode::Details => handle_details_key(app, key),
  }
}

fn handle_input_key(app: &mut App, key: event::KeyEvent) {
  app.clear_error();
  match key.code {
    KeyCode::Enter => {
      app.trigger_search();
    }
    KeyCode::Char(c) => {
      let byte_idx = char_to_byte_index(&app.input, app.cursor_position);
      app.input.insert(byte_idx, c);
      app.cursor_position += 1;
    }
    KeyCode::Backspace => {
      if app.cursor_position > 0 {
        app.cursor_position -= 1;
        let byte_idx = char_to_byte_index(&app.input, app.cursor_position);
        app.input.remove(byte_idx);
      }
    }
    KeyCode::Delete => {
      if app.cursor_position < app.input.chars().count() {
        let byte_idx = char_to_byte_index(&app.input, app.cursor_position);
        app.input.remove(byte_idx);
      }
    }
    KeyCode::Left => {
      app.cursor_position = app.cursor_position.saturating_sub(1);
    }
    KeyCode::Right => {
      if app.cursor_position < app.input.chars().count() {
        app.cursor_position += 1;
      }
    }
    KeyCode::Home => {
      app.cursor_position = 0;
    }
    KeyCode::End => {
      app.cursor_position = app.input.chars().count();
    }
    KeyCode::Esc => {
      if !app.input.is_empty() {
        app.input.clear();
        app.cursor_position = 0;
        app.input_scroll = 0;
      } else if !app.entries.is_empty() {
        app.mode = AppMode::Results;
      } else {
        app.should_quit = true;
      }
    }
    KeyCode::Down => {
      if !app.entries.is_empty() {
        app.mode = AppMode::Results;
      }
    }
    _ => {}
  }
}

fn handle_results_key(app: &mut App, key: event::KeyEvent) {
  match key.code {
    KeyCode::Enter => app.trigger_primary(),
    KeyCode::Char('c') => app.trigger_author_channel(),
    KeyCode::Char('y') => app.trigger_copy_url(),
    KeyCode::Char('d') => app.trigger_describe(),
    KeyCode::Down | KeyCode::Char('j') => select_next(app),
    KeyCode::Up | KeyCode::Char('k') => select_prev(app),
    KeyCode::Home | KeyCode::Char('g') => {
      if !app.entries.is_empty() {
        app.list_state.select(Some(0));
      }
    }
    KeyCode::End | KeyCode::Char('G') => {
      if !app.entries.is_empty() {
        app.list_state.select(Some(app.entries.len() - 1));
      }
    }
    KeyCode::Esc | KeyCode::Char('/') => {
      app.mode = AppMode::Input;
    }
    _ => {}
  }
}

fn handle_details_key(app: &mut App, key: event::KeyEvent) {
  match key.code {
    KeyCode::Down | KeyCode::Char('j') => {
      app.details_scroll = app.details_scroll.saturating_add(1);
    }
    KeyCode::Up | KeyCode::Char('k') => {
      app.details_scroll = app.details_scroll.saturating_sub(1);
    }
    KeyCode::PageDown => {
      app.details_scroll = app.details_scroll.saturating_add(10);
    }
    KeyCode::PageUp => {
      app.details_scroll = app.details_scroll.saturating_sub(10);
    }
    KeyCode::Enter => {
      if let Some(details) = &app.details {
        let url = constants().watch_url(&details.video_id);
        app.run_action(Action::Watch { url });
      }
    }
    KeyCode::Esc | KeyCode::Char('q') => {
      app.mode = if app.entries.is_empty() { AppMode::Input } else { AppMode::Results };
    }
    _ => {}
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::Config;
  use crate::display::DisplayMode;
  use crate::mirror::testing::ScriptedTransport;
  use crate::render::{ChannelEntry, Entry};
  use crate::session::{Session, Thumbnails};
  use ratatui::crossterm::event::KeyEvent;
  use tokio::sync::mpsc;

  // --- char_to_byte_index ---

  #[test]
  fn char_to_byte_ascii() {
    assert_eq!(char_to_byte_index("hello", 0), 0);
    assert_eq!(char_to_byte_index("hello", 3), 3);
    assert_eq!(char_to_byte_index("hello", 5), 5); // past end
  }

  #[test]
  fn char_to_byte_multibyte() {
    let s = "aé日"; // a=1 byte, é=2 bytes, 日=3 bytes
    assert_eq!(char_to_byte_index(s, 0), 0);
    assert_eq!(char_to_byte_index(s, 1), 1);
    assert_eq!(char_to_byte_index(s, 2), 3);
    assert_eq!(char_to_byte_index(s, 3), 6); // past end
  }

  #[test]
  fn char_to_byte_empty() {
    assert_eq!(char_to_byte_index("", 0), 0);
    assert_eq!(char_to_byte_index("", 5), 0);
  }

  // --- Key dispatch ---

  fn test_app() -> App {
    let config = Config { instances: Some(vec!["m".into()]), ..Config::default() };
    let session = Session::with_transport(config, ScriptedTransport::new(), Thumbnails::Skip);
    let (_tx, rx) = mpsc::unbounded_channel();
    App::new(session, rx, DisplayMode::Ascii)
  }

  fn press(app: &mut App, code: KeyCode) {
    handle_key_event(app, KeyEvent::new(code, KeyModifiers::NONE));
  }

  fn with_channels(app: &mut App, n: usize) {
    app.entries = (0..n)
      .map(|i| {
        let url = format!("https://www.youtube.com/channel/UC{}", i);
        Entry::Channel(ChannelEntry {
          author_id: format!("UC{}", i),
          author: format!("ch{}", i),
          subscribers: None,
          actions: vec![Action::OpenChannel { author_id: format!("UC{}", i) }, Action::CopyUrl { url }],
        })
      })
      .collect();
    app.list_state.select(Some(0));
    app.mode = AppMode::Results;
  }

  #[test]
  fn typing_edits_at_cursor() {
    let mut app = test_app();
    for c in "cts".chars() {
      press(&mut app, KeyCode::Char(c));
    }
    press(&mut app, KeyCode::Left);
    press(&mut app, KeyCode::Left);
    press(&mut app, KeyCode::Char('a'));
    assert_eq!(app.input, "cats");
    press(&mut app, KeyCode::Backspace);
    assert_eq!(app.input, "cts");
  }

  #[test]
  fn results_navigation_wraps() {
    let mut app = test_app();
    with_channels(&mut app, 3);
    press(&mut app, KeyCode::Up);
    assert_eq!(app.list_state.selected(), Some(2));
    press(&mut app, KeyCode::Char('j'));
    assert_eq!(app.list_state.selected(), Some(0));
    press(&mut app, KeyCode::Char('G'));
    assert_eq!(app.list_state.selected(), Some(2));
  }

  #[test]
  fn copy_key_shows_url() {
    let mut app = test_app();
    with_channels(&mut app, 2);
    press(&mut app, KeyCode::Down);
    press(&mut app, KeyCode::Char('y'));
    assert_eq!(app.info_message.as_deref(), Some("https://www.youtube.com/channel/UC1"));
  }

  #[test]
  fn escape_walks_back_to_input() {
    let mut app = test_app();
    with_channels(&mut app, 1);
    app.mode = AppMode::Details;
    press(&mut app, KeyCode::Esc);
    assert_eq!(app.mode, AppMode::Results);
    press(&mut app, KeyCode::Esc);
    assert_eq!(app.mode, AppMode::Input);
    press(&mut app, KeyCode::Esc);
    assert_eq!(app.mode, AppMode::Results);
  }

  #[test]
  fn ctrl_c_quits_from_any_mode() {
    let mut app = test_app();
    with_channels(&mut app, 1);
    handle_key_event(&mut app, KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL));
    assert!(app.should_quit);
  }
}
