//! bassline — bar-grid chord annotation and sub-bass player.

use std::path::PathBuf;
use std::sync::mpsc::{channel, Receiver, Sender};

use basscore::{zoom, ApplyOutcome, Session, TransportState};
use egui::{Context, Key};

use crate::analyzer::{spawn_analysis, AnalysisResult};
use crate::audio::RodioEngine;
use crate::repaint::RepaintGovernor;
use crate::storage::{is_audio_file, music_dir, FileBrowser, Prefs};
use crate::theme::{consume_special_keys, menu_bar, Ink};
use crate::widgets::{format_time, status_bar, BarCell};

pub struct BasslineApp {
    session: Session,
    engine: RodioEngine,

    // Chord analysis runs on a background thread; results come back here.
    analysis_tx: Sender<AnalysisResult>,
    analysis_rx: Receiver<AnalysisResult>,
    analysis_pending: bool,

    /// Bar the sub-bass voice was last triggered for.
    last_active: Option<usize>,

    show_browser: bool,
    browser: FileBrowser,
    show_about: bool,
    error_msg: Option<String>,
    repaint: RepaintGovernor,
}

impl BasslineApp {
    pub fn new(_cc: &eframe::CreationContext<'_>) -> Self {
        let prefs = Prefs::load();
        let mut engine = RodioEngine::new();
        engine.set_volume(prefs.volume);
        let mut session = Session::new();
        session.set_zoom_level(prefs.zoom_level);
        *session.dsp_mut() = prefs.dsp;
        let browser_dir = prefs.last_dir.clone().unwrap_or_else(music_dir);
        let (analysis_tx, analysis_rx) = channel();

        Self {
            session,
            engine,
            analysis_tx,
            analysis_rx,
            analysis_pending: false,
            last_active: None,
            show_browser: false,
            browser: FileBrowser::new(browser_dir),
            show_about: false,
            error_msg: None,
            repaint: RepaintGovernor::new(),
        }
    }

    pub fn load_path(&mut self, path: PathBuf) {
        if !is_audio_file(&path) {
            self.error_msg = Some(format!("not an audio file: {}", path.display()));
            return;
        }
        let info = self.session.load_track(&mut self.engine, &path);
        self.error_msg = if info.decode_fallback {
            Some(format!("could not read {}; assuming 3:00", info.display_name))
        } else {
            None
        };
        self.analysis_pending = false;
        self.last_active = None;
        self.repaint.poke();
    }

    fn persist_prefs(&self) {
        Prefs {
            volume: self.engine.volume(),
            zoom_level: self.session.zoom_level(),
            dsp: self.session.dsp(),
            last_dir: Some(self.browser.current_dir.clone()),
        }
        .save();
    }

    fn toggle_play(&mut self) {
        match self.session.playback_state() {
            TransportState::Playing => self.session.pause(&mut self.engine),
            _ => {
                if self.session.start(&mut self.engine).is_err() {
                    self.error_msg = Some("load a track first".into());
                } else {
                    self.error_msg = None;
                }
            }
        }
    }

    fn stop_playback(&mut self) {
        self.session.stop(&mut self.engine);
        self.last_active = None;
    }

    fn run_analysis(&mut self) {
        if self.session.segments().is_empty() {
            self.error_msg = Some("load a track first".into());
            return;
        }
        spawn_analysis(
            self.session.snapshot(),
            self.session.generation(),
            self.analysis_tx.clone(),
        );
        self.analysis_pending = true;
    }

    fn poll_analysis(&mut self) {
        while let Ok(result) = self.analysis_rx.try_recv() {
            self.analysis_pending = false;
            match self.session.apply_analysis(result.generation, &result.estimates) {
                ApplyOutcome::Applied(counts) => {
                    log::info!("analysis merged: {} bars updated", counts.applied);
                    self.repaint.poke();
                }
                ApplyOutcome::Stale => {}
            }
        }
    }

    /// Advance the clock and retrigger the sub-bass voice on bar changes.
    fn update_playback(&mut self) {
        let state = self.session.tick(&mut self.engine);
        if state != TransportState::Playing {
            return;
        }
        let active = self.session.active_segment_index();
        if active == self.last_active {
            return;
        }
        self.last_active = active;

        let Some(index) = active else { return };
        let segments = self.session.snapshot();
        let bar = &segments[index];
        if !bar.enabled {
            self.engine.silence_sub();
            return;
        }
        let dsp = self.session.dsp();
        let shifted = bar.frequency * 2.0f64.powi(dsp.octave_shift as i32);
        let remaining = (bar.end_time - self.session.position()).max(0.0);
        self.engine.trigger_sub(shifted, remaining, dsp.sub_volume);
    }

    fn handle_keys(&mut self, ctx: &Context) {
        consume_special_keys(ctx);

        // Dropped audio files load like opened ones.
        let dropped: Vec<PathBuf> = ctx.input(|i| {
            i.raw
                .dropped_files
                .iter()
                .filter_map(|f| f.path.clone())
                .filter(|p| is_audio_file(p))
                .collect()
        });
        if let Some(path) = dropped.into_iter().next() {
            self.load_path(path);
        }

        let (space, open, zoom_delta) = ctx.input(|i| {
            let mut delta = 0;
            if i.key_pressed(Key::Plus) || i.key_pressed(Key::Equals) {
                delta += 4;
            }
            if i.key_pressed(Key::Minus) {
                delta -= 4;
            }
            (
                i.key_pressed(Key::Space),
                i.modifiers.command && i.key_pressed(Key::O),
                delta,
            )
        });
        if space {
            self.toggle_play();
        }
        if open {
            self.show_browser = true;
        }
        if zoom_delta != 0 {
            self.session.set_zoom_level(self.session.zoom_level() + zoom_delta);
            self.persist_prefs();
        }
    }

    fn render_controls(&mut self, ui: &mut egui::Ui) {
        let info = self.session.track();
        let name = info.display_name.clone();
        let duration = info.duration;
        let loaded = info.is_loaded();

        ui.vertical_centered(|ui| {
            ui.label(egui::RichText::new(&name).strong().size(16.0));
            let time = if loaded {
                format!("{} / {}", format_time(self.session.position()), format_time(duration))
            } else {
                "-:-- / -:--".to_string()
            };
            ui.label(time);
        });
        ui.add_space(4.0);

        ui.horizontal(|ui| {
            ui.add_space(ui.available_width() / 2.0 - 90.0);
            let play_label = match self.session.playback_state() {
                TransportState::Playing => "pause",
                TransportState::Paused => "resume",
                TransportState::Stopped => "play",
            };
            if ui.button(egui::RichText::new(play_label).size(16.0)).clicked() {
                self.toggle_play();
            }
            if ui.button("stop").clicked() {
                self.stop_playback();
            }
            if ui.button("analyze").clicked() {
                self.run_analysis();
            }
        });
        ui.add_space(4.0);

        ui.horizontal(|ui| {
            ui.label("bars shown:");
            if ui.button("-").clicked() {
                self.session.set_zoom_level(self.session.zoom_level() - 4);
                self.persist_prefs();
            }
            ui.label(format!("{}", self.session.zoom_level()));
            if ui.button("+").clicked() {
                self.session.set_zoom_level(self.session.zoom_level() + 4);
                self.persist_prefs();
            }

            ui.separator();
            ui.label("vol:");
            let mut volume = self.engine.volume();
            if ui
                .add(egui::Slider::new(&mut volume, 0.0..=1.0).show_value(false))
                .changed()
            {
                self.engine.set_volume(volume);
                self.persist_prefs();
            }
        });

        ui.horizontal(|ui| {
            ui.label("sub-bass octave:");
            let current = self.session.dsp().octave_shift;
            for shift in [-2i8, -1, 0] {
                if ui.selectable_label(current == shift, format!("{shift}")).clicked() {
                    self.session.dsp_mut().set_octave_shift(shift);
                    self.persist_prefs();
                }
            }

            ui.separator();
            ui.label("sub vol:");
            let mut sub = self.session.dsp().sub_volume;
            if ui.add(egui::Slider::new(&mut sub, 0.0..=1.0).show_value(false)).changed() {
                self.session.dsp_mut().set_sub_volume(sub);
                self.persist_prefs();
            }
        });

        ui.horizontal(|ui| {
            // Pass-through EQ: stored and forwarded, never applied here.
            let dsp = self.session.dsp();
            let (mut bass, mut mid, mut treble) = (dsp.eq_bass, dsp.eq_mid, dsp.eq_treble);
            let mut changed = false;
            ui.label("eq:");
            changed |= ui.add(egui::Slider::new(&mut bass, 0.0..=1.0).show_value(false)).changed();
            ui.label("bass");
            changed |= ui.add(egui::Slider::new(&mut mid, 0.0..=1.0).show_value(false)).changed();
            ui.label("mid");
            changed |= ui
                .add(egui::Slider::new(&mut treble, 0.0..=1.0).show_value(false))
                .changed();
            ui.label("treble");
            if changed {
                self.session.dsp_mut().set_eq(bass, mid, treble);
                self.persist_prefs();
            }
        });
    }

    fn render_grid(&mut self, ui: &mut egui::Ui) {
        let segments = self.session.snapshot();
        if segments.is_empty() {
            ui.add_space(40.0);
            ui.vertical_centered(|ui| {
                ui.label("no track loaded");
                ui.add_space(4.0);
                ui.label("open an audio file to see its bars (⌘o)");
            });
            return;
        }

        let active = self.session.active_segment_index();
        let visible = zoom::visible(&segments, self.session.zoom_level());
        let mut toggled = None;

        egui::ScrollArea::vertical().show(ui, |ui| {
            ui.horizontal_wrapped(|ui| {
                for bar in visible {
                    let cell = BarCell::new(bar).active(active == Some(bar.index));
                    if ui.add(cell).clicked() {
                        toggled = Some(bar.index);
                    }
                }
            });
            let hidden = segments.len().saturating_sub(visible.len());
            if hidden > 0 {
                ui.add_space(4.0);
                ui.label(format!("... {hidden} more bars past the zoom window"));
            }
        });

        if let Some(index) = toggled {
            match self.session.toggle_enabled(index) {
                Ok(_) => {
                    self.error_msg = None;
                    // Toggling the sounding bar takes effect right away:
                    // drop the voice and let the next frame retrigger.
                    if Some(index) == self.last_active {
                        self.last_active = None;
                        self.engine.silence_sub();
                    }
                }
                Err(err) => self.error_msg = Some(err.to_string()),
            }
        }
    }

    fn render_file_browser(&mut self, ctx: &Context) {
        let mut open_path = None;
        let mut close = false;
        egui::Window::new("open track")
            .collapsible(false)
            .resizable(false)
            .default_width(380.0)
            .show(ctx, |ui| {
                ui.label(self.browser.current_dir.to_string_lossy().to_string());
                ui.separator();
                egui::ScrollArea::vertical().max_height(220.0).show(ui, |ui| {
                    let entries = self.browser.entries.clone();
                    for (idx, entry) in entries.iter().enumerate() {
                        let selected = self.browser.selected == Some(idx);
                        let icon = if entry.is_directory { "📁" } else { "📄" };
                        let row = ui.selectable_label(selected, format!("{icon} {}", entry.name));
                        if row.clicked() {
                            self.browser.selected = Some(idx);
                        }
                        if row.double_clicked() {
                            if entry.is_directory {
                                self.browser.navigate_to(entry.path.clone());
                            } else {
                                open_path = Some(entry.path.clone());
                            }
                        }
                    }
                });
                ui.separator();
                ui.horizontal(|ui| {
                    if ui.button("cancel").clicked() {
                        close = true;
                    }
                    if ui.button("open").clicked() {
                        if let Some(entry) = self.browser.selected_entry() {
                            if entry.is_directory {
                                self.browser.navigate_to(entry.path.clone());
                            } else {
                                open_path = Some(entry.path.clone());
                            }
                        }
                    }
                });
            });

        if let Some(path) = open_path {
            self.load_path(path);
            self.persist_prefs();
            close = true;
        }
        if close {
            self.show_browser = false;
        }
    }

    fn render_about(&mut self, ctx: &Context) {
        egui::Window::new("about bassline")
            .collapsible(false)
            .resizable(false)
            .default_width(300.0)
            .show(ctx, |ui| {
                ui.vertical_centered(|ui| {
                    ui.heading("bassline");
                    ui.label(format!("version {}", env!("CARGO_PKG_VERSION")));
                    ui.add_space(8.0);
                    ui.label("chord bars and a sine sub-bass layer");
                });
                ui.add_space(8.0);
                ui.separator();
                ui.add_space(4.0);
                ui.label("supported formats:");
                ui.label("  MP3, WAV, FLAC, OGG, AAC");
                ui.add_space(4.0);
                ui.label("frameworks:");
                ui.label("  egui/eframe (MIT), rodio (MIT)");
                ui.label("  symphonia (MPL-2.0)");
                ui.add_space(8.0);
                ui.vertical_centered(|ui| {
                    if ui.button("ok").clicked() {
                        self.show_about = false;
                    }
                });
            });
    }

    fn status_line(&self) -> String {
        let state = match self.session.playback_state() {
            TransportState::Playing => "playing",
            TransportState::Paused => "paused",
            TransportState::Stopped => "stopped",
        };
        let analysis = if self.analysis_pending { "  |  analyzing..." } else { "" };
        let err = self
            .error_msg
            .as_deref()
            .map(|e| format!("  |  {e}"))
            .unwrap_or_default();
        format!("{} bars  |  {state}{analysis}{err}", self.session.segments().len())
    }
}

impl eframe::App for BasslineApp {
    fn update(&mut self, ctx: &Context, _frame: &mut eframe::Frame) {
        self.handle_keys(ctx);
        self.poll_analysis();
        self.update_playback();

        let rolling = self.session.playback_state() == TransportState::Playing;
        self.repaint.set_active(rolling || self.analysis_pending);

        egui::TopBottomPanel::top("menu").show(ctx, |ui| {
            menu_bar(ui, |ui| {
                ui.menu_button("file", |ui| {
                    if ui.button("open...  ⌘o").clicked() {
                        self.show_browser = true;
                        ui.close_menu();
                    }
                });
                ui.menu_button("track", |ui| {
                    if ui.button("analyze chords").clicked() {
                        self.run_analysis();
                        ui.close_menu();
                    }
                    if ui.button("stop").clicked() {
                        self.stop_playback();
                        ui.close_menu();
                    }
                });
                ui.menu_button("help", |ui| {
                    if ui.button("about").clicked() {
                        self.show_about = true;
                        ui.close_menu();
                    }
                });
            });
        });

        egui::TopBottomPanel::bottom("status").show(ctx, |ui| {
            status_bar(ui, &self.status_line());
        });

        egui::TopBottomPanel::top("controls")
            .min_height(150.0)
            .show(ctx, |ui| self.render_controls(ui));

        egui::CentralPanel::default()
            .frame(egui::Frame::none().fill(Ink::WHITE).inner_margin(egui::Margin::same(8.0)))
            .show(ctx, |ui| self.render_grid(ui));

        if self.show_browser {
            self.render_file_browser(ctx);
        }
        if self.show_about {
            self.render_about(ctx);
        }

        self.repaint.schedule(ctx);
    }
}
