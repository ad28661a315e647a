use ratatui::{
  Frame,
  layout::{Alignment, Constraint, Layout, Rect},
  style::{Color, Modifier, Style, Stylize},
  text::{Line, Span, Text},
  widgets::{Block, BorderType, List, ListItem, Padding, Paragraph, Wrap},
};

use crate::app::{App, AppMode};
use crate::cache::ImageState;
use crate::graphics::{ThumbnailWidget, fit_to_area};
use crate::render::{Action, Entry};

// --- Theme ---

struct Theme {
  bg: Color,
  fg: Color,
  muted: Color,
  accent: Color,
  border: Color,
  highlight_fg: Color,
  highlight_bg: Color,
  stripe_bg: Color,
  status: Color,
  info: Color,
  error: Color,
  key_fg: Color,
  key_bg: Color,
}

const THEME: Theme = Theme {
  bg: Color::Rgb(24, 24, 32),
  fg: Color::Rgb(220, 220, 230),
  muted: Color::Rgb(130, 130, 150),
  accent: Color::Rgb(255, 110, 110),
  border: Color::Rgb(70, 70, 90),
  highlight_fg: Color::Rgb(255, 255, 255),
  highlight_bg: Color::Rgb(90, 50, 60),
  stripe_bg: Color::Rgb(30, 30, 40),
  status: Color::Rgb(240, 200, 100),
  info: Color::Rgb(130, 200, 240),
  error: Color::Rgb(255, 90, 90),
  key_fg: Color::Rgb(24, 24, 32),
  key_bg: Color::Rgb(160, 160, 180),
};

// --- Helpers ---

/// Compute the display width of the first `n` chars (accounting for double-width CJK).
pub fn display_width(s: &str, n: usize) -> usize {
  use unicode_width::UnicodeWidthChar;
  s.chars().take(n).map(|c| c.width().unwrap_or(0)).sum()
}

/// Truncate a string to `max_width` characters, appending "…" if truncated.
fn truncate_str(s: &str, max_width: usize) -> String {
  if s.chars().count() <= max_width {
    s.to_string()
  } else {
    let truncated: String = s.chars().take(max_width.saturating_sub(1)).collect();
    format!("{}…", truncated)
  }
}

fn rounded_block<'a>(title: impl Into<Line<'a>>) -> Block<'a> {
  Block::bordered()
    .title(title)
    .title_style(Style::default().fg(THEME.accent).add_modifier(Modifier::BOLD))
    .border_type(BorderType::Rounded)
    .border_style(Style::default().fg(THEME.border))
}

// --- UI Rendering ---

pub fn ui(frame: &mut Frame, app: &mut App) {
  frame.render_widget(Block::default().style(Style::default().bg(THEME.bg)), frame.area());

  let [header_area, main_area, status_area, input_area, footer_area] = Layout::vertical([
    Constraint::Length(1),
    Constraint::Min(3),
    Constraint::Length(1),
    Constraint::Length(3),
    Constraint::Length(1),
  ])
  .areas(frame.area());

  render_header(frame, app, header_area);
  render_main(frame, app, main_area);
  render_status(frame, app, status_area);
  render_input(frame, app, input_area);
  render_footer(frame, app, footer_area);
}

fn render_header(frame: &mut Frame, app: &App, area: Rect) {
  let left = Line::from(vec![
    Span::styled(" ▶ invid ", Style::default().fg(THEME.accent).add_modifier(Modifier::BOLD)),
    Span::styled(format!("{} mirrors", app.session.hosts().len()), Style::default().fg(THEME.muted)),
  ]);
  frame.render_widget(left, area);

  let version = format!("v{} ", env!("CARGO_PKG_VERSION"));
  let right = Line::from(Span::styled(&version, Style::default().fg(THEME.muted)));
  let right_area =
    Rect { x: area.x + area.width.saturating_sub(version.len() as u16), width: version.len() as u16, ..area };
  frame.render_widget(right, right_area);
}

fn render_main(frame: &mut Frame, app: &mut App, area: Rect) {
  if app.mode == AppMode::Details && app.details.is_some() {
    render_details(frame, app, area);
  } else if !app.entries.is_empty() {
    let [list_area, preview_area] =
      Layout::horizontal([Constraint::Percentage(60), Constraint::Percentage(40)]).areas(area);
    render_results(frame, app, list_area);
    render_preview(frame, app, preview_area);
  } else {
    render_welcome(frame, area);
  }
}

fn render_welcome(frame: &mut Frame, area: Rect) {
  let text = vec![
    Line::from(""),
    Line::from(Span::styled("▶  Welcome to invid", Style::default().fg(THEME.accent).add_modifier(Modifier::BOLD))),
    Line::from(""),
    Line::from(Span::styled("Browse YouTube through Invidious mirrors.", Style::default().fg(THEME.fg))),
    Line::from(""),
    Line::from(Span::styled("Type a query below and press Enter.", Style::default().fg(THEME.muted))),
    Line::from(Span::styled("/channel <name> searches channels", Style::default().fg(THEME.muted))),
    Line::from(Span::styled("/videos <channel id> lists uploads", Style::default().fg(THEME.muted))),
  ];
  let paragraph = Paragraph::new(text)
    .alignment(Alignment::Center)
    .block(Block::bordered().border_type(BorderType::Rounded).border_style(Style::default().fg(THEME.border)));
  frame.render_widget(paragraph, area);
}

fn render_results(frame: &mut Frame, app: &mut App, area: Rect) {
  // Inner width: area minus 2 borders minus 2 chars for highlight symbol ("▶ ")
  let inner_w = area.width.saturating_sub(4) as usize;
  let selected = app.list_state.selected();

  let items: Vec<ListItem> = app
    .entries
    .iter()
    .enumerate()
    .map(|(i, entry)| {
      let bg = if i % 2 == 1 { THEME.stripe_bg } else { THEME.bg };
      let fg = if Some(i) == selected { THEME.highlight_fg } else { THEME.fg };
      let marker = match entry {
        Entry::Video(_) => "",
        Entry::Channel(_) => "◉ ",
      };
      let title = truncate_str(&format!("{}{}", marker, entry.title()), inner_w);
      let subtitle = truncate_str(&entry.subtitle(), inner_w);
      let text = Text::from(vec![
        Line::from(Span::styled(title, Style::default().fg(fg))),
        Line::from(Span::styled(subtitle, Style::default().fg(THEME.muted))),
      ]);
      ListItem::new(text).bg(bg)
    })
    .collect();

  let suffix = if app.listing_done { String::new() } else { " (loading…)".to_string() };
  let title = format!(" {} · {}{} ", app.surface_title, app.entries.len(), suffix);

  let list = List::new(items)
    .block(rounded_block(title))
    .highlight_symbol("▶ ")
    .highlight_style(Style::default().fg(THEME.highlight_fg).bg(THEME.highlight_bg).add_modifier(Modifier::BOLD));

  frame.render_stateful_widget(list, area, &mut app.list_state);
}

fn render_preview(frame: &mut Frame, app: &mut App, area: Rect) {
  let title = Line::from(vec![
    Span::styled(" Preview ", Style::default().fg(THEME.accent).add_modifier(Modifier::BOLD)),
    Span::styled(format!("[{}] ", app.display_mode.label().to_lowercase()), Style::default().fg(THEME.muted)),
  ]);
  let block = rounded_block(title).padding(Padding::horizontal(1));
  let inner = block.inner(area);
  frame.render_widget(block, area);

  let Some(entry) = app.selected_entry().cloned() else { return };
  let actions_h = entry.actions().len() as u16 + 3;
  let [thumb_area, info_area] =
    Layout::vertical([Constraint::Min(0), Constraint::Length(actions_h.min(inner.height))]).areas(inner);

  if let Entry::Video(video) = &entry {
    match video.image.state() {
      ImageState::Ready(image) => {
        let key = video.image.key().to_string();
        let stale = match &app.gfx.resized_thumb {
          Some((k, rect, _)) => *k != key || *rect != thumb_area,
          None => true,
        };
        if stale && !thumb_area.is_empty() {
          let resized = fit_to_area(&image, thumb_area, app.display_mode);
          app.gfx.resized_thumb = Some((key.clone(), thumb_area, resized));
        }
        if let Some((k, _, resized)) = &app.gfx.resized_thumb
          && *k == key
        {
          frame.render_widget(ThumbnailWidget { image: resized, display_mode: app.display_mode }, thumb_area);
        }
      }
      ImageState::Pending => render_placeholder(frame, "loading thumbnail…", thumb_area),
      ImageState::Missing => render_placeholder(frame, "no thumbnail", thumb_area),
    }
  }

  let inner_w = info_area.width as usize;
  let mut lines = vec![Line::from(Span::styled(
    truncate_str(entry.title(), inner_w),
    Style::default().fg(THEME.fg).add_modifier(Modifier::BOLD),
  ))];
  lines.push(Line::from(Span::styled(truncate_str(&entry.subtitle(), inner_w), Style::default().fg(THEME.muted))));
  lines.push(Line::from(""));
  for (i, action) in entry.actions().iter().enumerate() {
    let key = match action {
      _ if i == 0 => "Enter",
      Action::Watch { .. } => "Enter",
      Action::OpenChannel { .. } => "c",
      Action::CopyUrl { .. } => "y",
      Action::Describe { .. } => "d",
    };
    lines.push(Line::from(vec![
      Span::styled(format!(" {} ", key), Style::default().fg(THEME.key_fg).bg(THEME.key_bg)),
      Span::styled(format!(" {}", action.label()), Style::default().fg(THEME.fg)),
    ]));
  }
  frame.render_widget(Paragraph::new(lines), info_area);
}

fn render_placeholder(frame: &mut Frame, text: &str, area: Rect) {
  if area.height == 0 {
    return;
  }
  let middle = Rect { y: area.y + area.height / 2, height: 1, ..area };
  let paragraph = Paragraph::new(text).alignment(Alignment::Center).style(Style::default().fg(THEME.muted));
  frame.render_widget(paragraph, middle);
}

fn render_details(frame: &mut Frame, app: &App, area: Rect) {
  let Some(details) = &app.details else { return };
  let title = format!(" {} ", app.session.config.surfaces.details);
  let mut lines = vec![
    Line::from(Span::styled(details.title.clone(), Style::default().fg(THEME.fg).add_modifier(Modifier::BOLD))),
    Line::from(Span::styled(details.author.clone(), Style::default().fg(THEME.accent))),
    Line::from(Span::styled(details.stats_line(), Style::default().fg(THEME.muted))),
    Line::from(""),
  ];
  let body = Style::default().fg(THEME.fg);
  lines.extend(details.description.lines().map(|l| Line::from(Span::styled(l.to_string(), body))));

  let paragraph = Paragraph::new(lines)
    .wrap(Wrap { trim: false })
    .scroll((app.details_scroll, 0))
    .block(rounded_block(title).padding(Padding::horizontal(1)));
  frame.render_widget(paragraph, area);
}

fn render_status(frame: &mut Frame, app: &App, area: Rect) {
  let (text, style) = if let Some(msg) = &app.status_message {
    (format!(" ⏳ {}", msg), Style::default().fg(THEME.status))
  } else if let Some(err) = &app.last_error {
    (format!(" ⚠  {}", err), Style::default().fg(THEME.error))
  } else if let Some(info) = &app.info_message {
    (format!(" ℹ  {}", info), Style::default().fg(THEME.info))
  } else {
    (" Ready".to_string(), Style::default().fg(THEME.muted))
  };
  frame.render_widget(Paragraph::new(text).style(style), area);
}

fn render_input(frame: &mut Frame, app: &mut App, area: Rect) {
  let border_color = if app.mode == AppMode::Input { THEME.accent } else { THEME.border };
  let input_block = Block::bordered()
    .title(" Search ")
    .title_style(Style::default().fg(border_color))
    .border_type(BorderType::Rounded)
    .border_style(Style::default().fg(border_color))
    .padding(Padding::horizontal(1));

  let inner_w = area.width.saturating_sub(4) as usize;
  let cursor_col = display_width(&app.input, app.cursor_position);

  if cursor_col < app.input_scroll {
    app.input_scroll = cursor_col;
  } else if cursor_col >= app.input_scroll + inner_w {
    app.input_scroll = cursor_col.saturating_sub(inner_w) + 1;
  }

  let visible: String = app
    .input
    .chars()
    .scan(0usize, |col, c| {
      let w = unicode_width::UnicodeWidthChar::width(c).unwrap_or(0);
      let start = *col;
      *col += w;
      Some((start, *col, c))
    })
    .skip_while(|(_, end, _)| *end <= app.input_scroll)
    .take_while(|(start, _, _)| *start < app.input_scroll + inner_w)
    .map(|(_, _, c)| c)
    .collect();

  let paragraph = Paragraph::new(visible).style(Style::default().fg(THEME.fg)).block(input_block);
  frame.render_widget(paragraph, area);

  if app.mode == AppMode::Input {
    let cursor_x = area.x + 2 + (cursor_col - app.input_scroll) as u16;
    frame.set_cursor_position((cursor_x, area.y + 1));
  }
}

fn footer_keys(app: &App) -> Vec<(&'static str, &'static str)> {
  let has_results = !app.entries.is_empty();
  match app.mode {
    AppMode::Input => {
      let mut k = vec![("Enter", "Search"), ("^r", "Refresh mirrors")];
      if has_results {
        k.push(("↓", "Results"));
      } else {
        k.push(("Esc", "Quit"));
      }
      k
    }
    AppMode::Results => {
      let mut k = vec![("Enter", "Open"), ("j/k", "Navigate")];
      if matches!(app.selected_entry(), Some(Entry::Video(_))) {
        k.push(("c", "Channel"));
        k.push(("d", "Description"));
      }
      k.push(("y", "URL"));
      k.push(("^l", "Clear thumbnails"));
      k.push(("Esc", "Back"));
      k
    }
    AppMode::Details => vec![("Enter", "Watch"), ("j/k", "Scroll"), ("Esc", "Back")],
  }
}

fn render_footer(frame: &mut Frame, app: &App, area: Rect) {
  let keys = footer_keys(app);
  let spans: Vec<Span> = keys
    .iter()
    .enumerate()
    .flat_map(|(i, (key, action))| {
      let mut s = vec![
        Span::styled(format!(" {} ", key), Style::default().fg(THEME.key_fg).bg(THEME.key_bg)),
        Span::styled(format!(" {} ", action), Style::default().fg(THEME.muted)),
      ];
      if i < keys.len() - 1 {
        s.push(Span::raw("  "));
      }
      s
    })
    .collect();

  frame.render_widget(Line::from(spans), area);
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::Config;
  use crate::display::DisplayMode;
  use crate::mirror::testing::ScriptedTransport;
  use crate::render::ChannelEntry;
  use crate::session::{Session, Thumbnails};
  use ratatui::{Terminal, backend::TestBackend};
  use tokio::sync::mpsc;

  #[test]
  fn truncate_short_and_long() {
    assert_eq!(truncate_str("abc", 5), "abc");
    assert_eq!(truncate_str("abcdef", 4), "abc…");
    assert_eq!(truncate_str("", 0), "");
  }

  #[test]
  fn display_width_counts_wide_chars() {
    assert_eq!(display_width("ab", 2), 2);
    assert_eq!(display_width("日本", 2), 4);
    assert_eq!(display_width("日本", 1), 2);
  }

  #[test]
  fn draws_results_with_surface_title() {
    let config = Config { instances: Some(vec!["m".into()]), ..Config::default() };
    let session = Session::with_transport(config, ScriptedTransport::new(), Thumbnails::Skip);
    let (_tx, rx) = mpsc::unbounded_channel();
    let mut app = App::new(session, rx, DisplayMode::Ascii);
    app.entries.push(Entry::Channel(ChannelEntry {
      author_id: "UCx".into(),
      author: "Xylophones".into(),
      subscribers: Some(12),
      actions: vec![Action::OpenChannel { author_id: "UCx".into() }],
    }));
    app.list_state.select(Some(0));
    app.listing_done = true;
    app.mode = AppMode::Results;

    let mut terminal = Terminal::new(TestBackend::new(80, 20)).unwrap();
    terminal.draw(|frame| ui(frame, &mut app)).unwrap();
    let screen: String = terminal.backend().buffer().content().iter().map(|c| c.symbol()).collect();
    assert!(screen.contains("Videos · 1"));
    assert!(screen.contains("Xylophones"));
    assert!(screen.contains("open channel"));
  }
}
