//! Black-and-white theme. Pure white fills, 1px black outlines, no
//! rounding — selection and hover feedback comes from dithering, not gray.

use egui::{Color32, FontId, FontFamily, Rounding, Stroke, Style, TextStyle, Visuals};

/// The only two colors the app paints with.
pub struct Ink;

impl Ink {
    pub const WHITE: Color32 = Color32::from_rgb(255, 255, 255);
    pub const BLACK: Color32 = Color32::from_rgb(0, 0, 0);
}

/// Apply the theme to an egui context.
pub fn apply(ctx: &egui::Context) {
    let mut style = Style::default();

    style.text_styles = [
        (TextStyle::Small, FontId::new(11.0, FontFamily::Proportional)),
        (TextStyle::Body, FontId::new(14.0, FontFamily::Proportional)),
        (TextStyle::Button, FontId::new(14.0, FontFamily::Proportional)),
        (TextStyle::Heading, FontId::new(22.0, FontFamily::Proportional)),
        (TextStyle::Monospace, FontId::new(14.0, FontFamily::Monospace)),
    ]
    .into();

    let mut visuals = Visuals::light();
    visuals.window_fill = Ink::WHITE;
    visuals.panel_fill = Ink::WHITE;
    visuals.faint_bg_color = Ink::WHITE;
    visuals.extreme_bg_color = Ink::WHITE;
    visuals.window_rounding = Rounding::ZERO;
    visuals.menu_rounding = Rounding::ZERO;
    visuals.window_stroke = Stroke::new(1.0, Ink::BLACK);

    let bw = |ws: &mut egui::style::WidgetVisuals| {
        ws.bg_fill = Ink::WHITE;
        ws.bg_stroke = Stroke::new(1.0, Ink::BLACK);
        ws.fg_stroke = Stroke::new(1.0, Ink::BLACK);
        ws.rounding = Rounding::ZERO;
    };
    bw(&mut visuals.widgets.noninteractive);
    bw(&mut visuals.widgets.inactive);
    bw(&mut visuals.widgets.hovered);
    bw(&mut visuals.widgets.active);
    bw(&mut visuals.widgets.open);

    visuals.window_shadow = egui::epaint::Shadow::NONE;
    visuals.popup_shadow = egui::epaint::Shadow::NONE;

    // selection: grey so highlighted text stays legible
    visuals.selection.bg_fill = Color32::from_rgb(160, 160, 160);
    visuals.selection.stroke = Stroke::new(1.0, Ink::BLACK);

    style.visuals = visuals;
    style.spacing.window_margin = egui::Margin::same(8.0);
    style.spacing.item_spacing = egui::vec2(4.0, 4.0);
    style.spacing.button_padding = egui::vec2(8.0, 4.0);

    ctx.set_style(style);
}

/// Menu bar styling helper.
pub fn menu_bar<R>(ui: &mut egui::Ui, add_contents: impl FnOnce(&mut egui::Ui) -> R) -> egui::InnerResponse<R> {
    let frame_resp = egui::Frame::none()
        .fill(Ink::WHITE)
        .stroke(Stroke::new(1.0, Ink::BLACK))
        .inner_margin(egui::Margin::symmetric(4.0, 2.0))
        .show(ui, |ui| ui.horizontal(add_contents).inner);
    egui::InnerResponse {
        inner: frame_resp.inner,
        response: frame_resp.response,
    }
}

/// Strip key events egui would otherwise act on itself: Tab focus cycling
/// and Cmd+/- zoom scaling.
pub fn consume_special_keys(ctx: &egui::Context) {
    ctx.input_mut(|i| {
        let mut kept = Vec::new();
        for event in i.events.iter() {
            match event {
                egui::Event::Key { key: egui::Key::Tab, .. } => {}
                egui::Event::Key { key, modifiers, .. }
                    if modifiers.command
                        && matches!(key, egui::Key::Plus | egui::Key::Minus | egui::Key::Equals) => {}
                _ => kept.push(event.clone()),
            }
        }
        i.events = kept;
    });
}
