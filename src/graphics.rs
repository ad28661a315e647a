use image::{DynamicImage, imageops::FilterType};
use ratatui::{
  buffer::Buffer,
  layout::Rect,
  style::{Color, Style},
  widgets::Widget,
};

use crate::display::DisplayMode;

// --- Thumbnail Widget ---

/// Draws an already-resized image into a terminal area.
pub struct ThumbnailWidget<'a> {
  pub image: &'a DynamicImage,
  pub display_mode: DisplayMode,
}

const ASCII_CHARS: [&str; 10] = [" ", ".", ":", "-", "=", "+", "*", "#", "%", "@"];

impl Widget for ThumbnailWidget<'_> {
  fn render(self, area: Rect, buf: &mut Buffer) {
    if area.is_empty() {
      return;
    }
    match self.display_mode {
      DisplayMode::Direct => render_direct(self.image, area, buf),
      DisplayMode::Ascii => render_ascii(self.image, area, buf),
    }
  }
}

/// Resize `image` to fit `area` for `mode`, keeping its aspect ratio.
pub fn fit_to_area(image: &DynamicImage, area: Rect, mode: DisplayMode) -> DynamicImage {
  let max_w = (area.width as u32).max(1);
  // Terminal cells are roughly twice as tall as wide.
  let max_h = (area.height as u32 * mode.pixel_rows_per_cell()).max(1);
  let (w, h) = (image.width().max(1), image.height().max(1));
  let aspect_h = match mode {
    DisplayMode::Direct => h,
    DisplayMode::Ascii => h.div_ceil(2),
  };
  let scale = f64::min(max_w as f64 / w as f64, max_h as f64 / aspect_h as f64);
  let target_w = ((w as f64 * scale).floor() as u32).clamp(1, max_w);
  let target_h = ((aspect_h as f64 * scale).floor() as u32).clamp(1, max_h);
  image.resize_exact(target_w, target_h, FilterType::Triangle)
}

fn cell(area: Rect, offset_x: u32, offset_y: u32, x: u32, y: u32) -> (u16, u16) {
  let clamp = |v: u32| v.min(u16::MAX as u32) as u16;
  (
    area.x.saturating_add(clamp(offset_x)).saturating_add(clamp(x)),
    area.y.saturating_add(clamp(offset_y)).saturating_add(clamp(y)),
  )
}

fn render_direct(image: &DynamicImage, area: Rect, buf: &mut Buffer) {
  let rgb = image.to_rgb8();
  let img_w = rgb.width().min(area.width as u32);
  let img_h = rgb.height();
  let cell_h = img_h.div_ceil(2);
  let offset_x = (area.width as u32).saturating_sub(img_w) / 2;
  let offset_y = (area.height as u32).saturating_sub(cell_h) / 2;

  for y in 0..cell_h.min(area.height as u32) {
    for x in 0..img_w {
      let upper = rgb.get_pixel(x, y * 2);
      let lower_y = y * 2 + 1;
      let fg = Color::Rgb(upper[0], upper[1], upper[2]);
      let bg = if lower_y < img_h {
        let lower = rgb.get_pixel(x, lower_y);
        Color::Rgb(lower[0], lower[1], lower[2])
      } else {
        Color::Reset
      };
      let (cx, cy) = cell(area, offset_x, offset_y, x, y);
      buf.set_string(cx, cy, "▀", Style::default().fg(fg).bg(bg));
    }
  }
}

fn render_ascii(image: &DynamicImage, area: Rect, buf: &mut Buffer) {
  let luma = image.to_luma8();
  let img_w = luma.width().min(area.width as u32);
  let img_h = luma.height().min(area.height as u32);
  let offset_x = (area.width as u32).saturating_sub(img_w) / 2;
  let offset_y = (area.height as u32).saturating_sub(img_h) / 2;

  for y in 0..img_h {
    for x in 0..img_w {
      let (cx, cy) = cell(area, offset_x, offset_y, x, y);
      buf.set_string(cx, cy, ascii_for(luma.get_pixel(x, y)[0]), Style::default());
    }
  }
}

fn ascii_for(level: u8) -> &'static str {
  let idx = ((level as f32 / 255.0) * (ASCII_CHARS.len() - 1) as f32).round() as usize;
  ASCII_CHARS[idx.min(ASCII_CHARS.len() - 1)]
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn ascii_ramp_ends() {
    assert_eq!(ascii_for(0), " ");
    assert_eq!(ascii_for(255), "@");
  }

  #[test]
  fn fit_keeps_within_area() {
    let image = DynamicImage::new_rgb8(480, 360);
    let area = Rect::new(0, 0, 40, 10);

    let direct = fit_to_area(&image, area, DisplayMode::Direct);
    assert!(direct.width() <= 40 && direct.height() <= 20);
    let ascii = fit_to_area(&image, area, DisplayMode::Ascii);
    assert!(ascii.width() <= 40 && ascii.height() <= 10);
  }

  #[test]
  fn direct_render_fills_cells() {
    let image = DynamicImage::new_rgb8(4, 4);
    let area = Rect::new(0, 0, 4, 2);
    let mut buf = Buffer::empty(area);
    ThumbnailWidget { image: &image, display_mode: DisplayMode::Direct }.render(area, &mut buf);
    assert_eq!(buf[(0, 0)].symbol(), "▀");
    assert_eq!(buf[(3, 1)].symbol(), "▀");
  }
}
