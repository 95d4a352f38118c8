// GUI implementation for the Solari departure board using egui/eframe
use crate::solari_controllers::{BoardState, RefreshState, SolariControllers};
use crate::solari_models::{BoardConfig, BoardSnapshot, Result, SolariModels};
use chrono::{DateTime, Utc};
use eframe::egui;
use egui::{Color32, RichText, Ui};
use egui_extras::{Column, TableBuilder};
use poll_promise::Promise;
use std::time::Duration;

// ============================================================================
// Application State
// ============================================================================

pub struct SolariApp {
    config: BoardConfig,
    board: BoardState,

    // Background task for the in-flight refresh cycle, tagged with its
    // sequence number.
    refresh_promise: Option<(u64, Promise<Result<BoardSnapshot>>)>,
}

impl SolariApp {
    pub fn new(_cc: &eframe::CreationContext<'_>, config: BoardConfig) -> Self {
        Self {
            config,
            board: BoardState::new(),
            refresh_promise: None,
        }
    }

    fn poll_refresh(&mut self) {
        if let Some((seq, promise)) = self.refresh_promise.take() {
            match promise.try_take() {
                Ok(result) => {
                    self.board.finish_refresh(seq, result);
                }
                Err(pending) => self.refresh_promise = Some((seq, pending)),
            }
        }
    }

    fn maybe_start_refresh(&mut self, now: DateTime<Utc>) {
        if self.refresh_promise.is_some() {
            return;
        }
        if !self.board.due_for_refresh(now, self.config.refresh_secs) {
            return;
        }
        if let Some(seq) = self.board.begin_refresh(now) {
            let config = self.config.clone();
            let promise =
                Promise::spawn_thread("board-refresh", move || SolariModels::refresh_board(&config));
            self.refresh_promise = Some((seq, promise));
        }
    }
}

// ============================================================================
// GUI Implementation
// ============================================================================

impl eframe::App for SolariApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        let now = Utc::now();

        self.poll_refresh();
        self.maybe_start_refresh(now);

        // Keep the clock moving even while the worker thread is fetching.
        ctx.request_repaint_after(Duration::from_millis(self.config.tick_millis.max(1)));

        // Clone the snapshot to avoid borrowing issues inside the panels.
        let snapshot = self.board.snapshot().cloned();
        let refreshing = self.board.refresh_state() == RefreshState::Refreshing;

        egui::TopBottomPanel::top("board_header").show(ctx, |ui| {
            ui.horizontal(|ui| {
                let station_name = snapshot
                    .as_ref()
                    .map(|s| s.stop_name.as_str())
                    .unwrap_or(self.config.stop_id.as_str());
                ui.heading(format!("🚆 {}", station_name));
                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    ui.label(
                        RichText::new(SolariModels::format_clock(&now))
                            .monospace()
                            .size(18.0),
                    );
                });
            });
        });

        egui::TopBottomPanel::bottom("board_footer").show(ctx, |ui| {
            ui.horizontal(|ui| {
                match snapshot.as_ref() {
                    Some(board) => {
                        ui.label(format!(
                            "Data last updated {}",
                            SolariModels::format_clock(&board.last_update)
                        ));
                    }
                    None => {
                        ui.label("Waiting for first update...");
                    }
                }
                if refreshing {
                    ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                        ui.spinner();
                        ui.label("Refreshing...");
                    });
                }
            });
        });

        egui::CentralPanel::default().show(ctx, |ui| match snapshot.as_ref() {
            None => {
                ui.centered_and_justified(|ui| {
                    ui.vertical_centered(|ui| {
                        ui.spinner();
                        ui.label("Data loading...");
                    });
                });
            }
            Some(board) if board.rows.is_empty() => {
                ui.centered_and_justified(|ui| {
                    ui.label("No upcoming departures");
                });
            }
            Some(board) => {
                Self::show_departure_table(ui, board, now);
            }
        });
    }
}

impl SolariApp {
    fn show_departure_table(ui: &mut Ui, board: &BoardSnapshot, now: DateTime<Utc>) {
        TableBuilder::new(ui)
            .striped(true)
            .cell_layout(egui::Layout::left_to_right(egui::Align::Center))
            .column(Column::auto().at_least(90.0))
            .column(Column::remainder().at_least(160.0))
            .column(Column::auto().at_least(60.0))
            .column(Column::auto().at_least(60.0))
            .column(Column::auto().at_least(120.0))
            .header(24.0, |mut header| {
                for title in ["Time", "Destination", "Train", "Track", "Status"] {
                    header.col(|ui| {
                        ui.strong(title);
                    });
                }
            })
            .body(|mut body| {
                for row in &board.rows {
                    let minutes = SolariControllers::minutes_until_departure(&row.departure, &now);
                    body.row(22.0, |mut table_row| {
                        table_row.col(|ui| {
                            ui.colored_label(
                                departure_color(minutes),
                                RichText::new(SolariModels::format_departure(&row.departure))
                                    .monospace(),
                            );
                        });
                        table_row.col(|ui| {
                            ui.label(&row.destination);
                        });
                        table_row.col(|ui| {
                            ui.label(&row.train);
                        });
                        table_row.col(|ui| {
                            ui.label(&row.track);
                        });
                        table_row.col(|ui| {
                            ui.label(row.status.as_deref().unwrap_or(""));
                        });
                    });
                }
            });
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

fn departure_color(minutes: i64) -> Color32 {
    if minutes <= 2 {
        Color32::from_rgb(255, 0, 0) // Boarding or gone
    } else if minutes <= 10 {
        Color32::from_rgb(255, 165, 0) // Leaving soon
    } else {
        Color32::from_rgb(0, 200, 0)
    }
}

// ============================================================================
// Public entry point
// ============================================================================

pub fn run_gui(config: BoardConfig) -> std::result::Result<(), eframe::Error> {
    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([900.0, 620.0])
            .with_min_inner_size([640.0, 400.0]),
        ..Default::default()
    };

    eframe::run_native(
        "Solari Board",
        options,
        Box::new(|cc| Ok(Box::new(SolariApp::new(cc, config)))),
    )
}
