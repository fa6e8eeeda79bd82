//! Bar-grid widgets and dithered overlays.
//!
//! Disabled bars and hover states are drawn as checkerboard dither
//! patterns instead of grays, so the content underneath stays visible.

use basscore::Segment;
use egui::{Color32, Painter, Pos2, Rect, Response, Sense, Stroke, Ui, Widget};

use crate::theme::Ink;

/// Draw a checkerboard dither pattern over a rectangle. `density` controls
/// spacing: 1 = tight (selection), 2 = sparse (hover). Bounds are clamped
/// up front so the inner loop needs no per-pixel check.
pub fn draw_dither_rect(painter: &Painter, rect: Rect, color: Color32, density: u32) {
    let density = density.max(1) as i32;

    let x0 = rect.min.x.ceil() as i32;
    let y0 = rect.min.y.ceil() as i32;
    let x1 = rect.max.x.floor() as i32;
    let y1 = rect.max.y.floor() as i32;
    if x0 >= x1 || y0 >= y1 {
        return;
    }

    let y_step = density;
    let x_step = density * 2;
    let pixel = egui::Vec2::splat(1.0);

    let mut y = y0;
    while y < y1 {
        let row_offset = if ((y - y0) / density) % 2 == 0 { 0 } else { density };
        let mut x = x0 + row_offset;
        while x < x1 {
            painter.rect_filled(Rect::from_min_size(Pos2::new(x as f32, y as f32), pixel), 0.0, color);
            x += x_step;
        }
        y += y_step;
    }
}

pub fn draw_dither_selection(painter: &Painter, rect: Rect) {
    draw_dither_rect(painter, rect, Ink::BLACK, 1);
}

pub fn draw_dither_hover(painter: &Painter, rect: Rect) {
    draw_dither_rect(painter, rect, Ink::BLACK, 2);
}

/// One bar of the grid: index, chord label, and root frequency in a boxed
/// cell. The active bar is drawn inverted; disabled bars get a dither
/// overlay. Clicking the cell is how the user toggles a bar on or off.
pub struct BarCell<'a> {
    segment: &'a Segment,
    active: bool,
}

impl<'a> BarCell<'a> {
    pub const SIZE: egui::Vec2 = egui::Vec2::new(64.0, 56.0);

    pub fn new(segment: &'a Segment) -> Self {
        Self { segment, active: false }
    }

    pub fn active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }
}

impl<'a> Widget for BarCell<'a> {
    fn ui(self, ui: &mut Ui) -> Response {
        let (rect, response) = ui.allocate_exact_size(Self::SIZE, Sense::click());

        if ui.is_rect_visible(rect) {
            let painter = ui.painter();

            let fill = if self.active { Ink::BLACK } else { Ink::WHITE };
            let text = if self.active { Ink::WHITE } else { Ink::BLACK };
            painter.rect_filled(rect, 0.0, fill);
            painter.rect_stroke(rect, 0.0, Stroke::new(1.0, Ink::BLACK));

            // bar number, top-left
            painter.text(
                rect.min + egui::vec2(4.0, 3.0),
                egui::Align2::LEFT_TOP,
                format!("{}", self.segment.index + 1),
                egui::FontId::proportional(10.0),
                text,
            );

            painter.text(
                rect.center() + egui::vec2(0.0, -2.0),
                egui::Align2::CENTER_CENTER,
                &self.segment.chord,
                egui::FontId::proportional(16.0),
                text,
            );

            painter.text(
                egui::pos2(rect.center().x, rect.max.y - 4.0),
                egui::Align2::CENTER_BOTTOM,
                format!("{:.1} Hz", self.segment.frequency),
                egui::FontId::proportional(9.0),
                text,
            );

            if !self.segment.enabled && !self.active {
                draw_dither_hover(painter, rect.shrink(1.0));
            }
            if !self.active {
                if response.is_pointer_button_down_on() {
                    draw_dither_selection(painter, rect.shrink(1.0));
                } else if response.hovered() {
                    draw_dither_hover(painter, rect.shrink(1.0));
                }
            }
        }

        response
            .on_hover_text(if self.segment.enabled { "click to disable" } else { "click to enable" })
    }
}

/// Status bar: white bg, 1px black border.
pub fn status_bar(ui: &mut Ui, text: &str) {
    egui::Frame::none()
        .fill(Ink::WHITE)
        .stroke(Stroke::new(1.0, Ink::BLACK))
        .inner_margin(egui::Margin::symmetric(8.0, 2.0))
        .show(ui, |ui| {
            ui.label(text);
        });
}

/// `m:ss` display for positions and durations.
pub fn format_time(seconds: f64) -> String {
    let whole = seconds.max(0.0) as u64;
    format!("{}:{:02}", whole / 60, whole % 60)
}
