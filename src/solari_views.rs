// Terminal views for the Solari departure board.
use crate::solari_controllers::SolariControllers;
use crate::solari_models::{BoardConfig, BoardSnapshot, SolariModels};
use chrono::{DateTime, Utc};
use std::io::{self, Write};

pub struct SolariViews;

impl SolariViews {
    /// Full-screen redraw of the board: header with station name and clock,
    /// the departure table, and the last-updated footer.
    pub fn draw_board(config: &BoardConfig, snapshot: Option<&BoardSnapshot>, now: DateTime<Utc>) {
        Self::clear_screen();

        let station_name = snapshot
            .map(|s| s.stop_name.as_str())
            .unwrap_or(config.stop_id.as_str());

        println!("{}", "═".repeat(70));
        println!("  🚆 SOLARI BOARD");
        println!("  {} - {}", station_name, SolariModels::format_clock(&now));
        println!("{}", "═".repeat(70));

        println!(
            "{:<10} {:<28} {:<7} {:<7} {}",
            "TIME", "DESTINATION", "TRAIN", "TRACK", "STATUS"
        );
        println!("{}", "─".repeat(70));

        match snapshot {
            None => {
                println!("\n{:^70}", "Data loading...");
            }
            Some(board) if board.rows.is_empty() => {
                println!("\n{:^70}", "No upcoming departures");
            }
            Some(board) => {
                for row in &board.rows {
                    let time_cell = format!("{:<10}", SolariModels::format_departure(&row.departure));
                    let minutes = SolariControllers::minutes_until_departure(&row.departure, &now);
                    println!(
                        "{} {:<28} {:<7} {:<7} {}",
                        Self::colorize_departure(&time_cell, minutes),
                        row.destination,
                        row.train,
                        row.track,
                        row.status.as_deref().unwrap_or(""),
                    );
                }
            }
        }

        println!("\n{}", "─".repeat(70));
        match snapshot {
            Some(board) => println!(
                "Data last updated {}",
                SolariModels::format_clock(&board.last_update)
            ),
            None => println!("Waiting for first update..."),
        }
        println!("Press Enter to exit");

        let _ = io::stdout().flush();
    }

    pub fn goodbye() {
        println!("\n{}", "═".repeat(70));
        println!("       👋 Thanks for riding. See you on the next train!");
        println!("{}", "═".repeat(70));
        println!();
    }

    /// Imminent departures light up: red inside two minutes, yellow inside
    /// ten. The cell is padded before coloring so the escape codes do not
    /// skew the column widths.
    fn colorize_departure(padded_cell: &str, minutes: i64) -> String {
        if (0..=2).contains(&minutes) {
            format!("\x1b[31m{}\x1b[0m", padded_cell)
        } else if (3..=10).contains(&minutes) {
            format!("\x1b[33m{}\x1b[0m", padded_cell)
        } else {
            padded_cell.to_string()
        }
    }

    fn clear_screen() {
        // ANSI escape sequence to clear screen and move cursor to top-left
        print!("\x1B[2J\x1B[1;1H");
        let _ = io::stdout().flush();
    }
}
