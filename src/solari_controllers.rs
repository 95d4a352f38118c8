// Controllers for the Solari departure board: refresh orchestration and the
// terminal front-end loop.
use crate::solari_models::{BoardConfig, BoardSnapshot, Result, SolariModels};
use crate::solari_views::SolariViews;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use log::{error, warn};
use std::io;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

// ============================================================================
// Refresh State Machine
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshState {
    Idle,
    Refreshing,
}

/// Owns the published snapshot and the refresh lifecycle. A cycle must be
/// opened with `begin_refresh` (which refuses re-entry while one is in
/// flight) and closed with `finish_refresh`. Snapshots install
/// last-started-wins: a completion carrying a sequence number at or below
/// the installed one is discarded, so a slow stale cycle can never
/// overwrite a fresher board.
pub struct BoardState {
    snapshot: Option<BoardSnapshot>,
    state: RefreshState,
    last_attempt: Option<DateTime<Utc>>,
    next_seq: u64,
    installed_seq: u64,
}

impl BoardState {
    pub fn new() -> Self {
        BoardState {
            snapshot: None,
            state: RefreshState::Idle,
            last_attempt: None,
            next_seq: 0,
            installed_seq: 0,
        }
    }

    pub fn snapshot(&self) -> Option<&BoardSnapshot> {
        self.snapshot.as_ref()
    }

    pub fn refresh_state(&self) -> RefreshState {
        self.state
    }

    /// A refresh is due once the interval has elapsed since both the last
    /// attempt and the last successful install; the first cycle is due
    /// immediately. Never due while a cycle is in flight.
    pub fn due_for_refresh(&self, now: DateTime<Utc>, refresh_secs: u64) -> bool {
        if self.state == RefreshState::Refreshing {
            return false;
        }
        let interval = ChronoDuration::seconds(refresh_secs as i64);
        let attempt_elapsed = self
            .last_attempt
            .map_or(true, |t| now.signed_duration_since(t) > interval);
        let success_elapsed = self
            .snapshot
            .as_ref()
            .map_or(true, |s| now.signed_duration_since(s.last_update) > interval);
        attempt_elapsed && success_elapsed
    }

    /// Open a refresh cycle. Returns the cycle's sequence number, or `None`
    /// while another cycle is still in flight.
    pub fn begin_refresh(&mut self, now: DateTime<Utc>) -> Option<u64> {
        if self.state == RefreshState::Refreshing {
            return None;
        }
        self.state = RefreshState::Refreshing;
        self.last_attempt = Some(now);
        self.next_seq += 1;
        Some(self.next_seq)
    }

    /// Close a refresh cycle. On success the snapshot installs atomically;
    /// on failure the previous board stays up. Returns whether a new
    /// snapshot was installed.
    pub fn finish_refresh(&mut self, seq: u64, result: Result<BoardSnapshot>) -> bool {
        self.state = RefreshState::Idle;
        match result {
            Ok(snapshot) => {
                if seq <= self.installed_seq {
                    warn!("discarding refresh #{}: a newer board is already up", seq);
                    return false;
                }
                self.installed_seq = seq;
                self.snapshot = Some(snapshot);
                true
            }
            Err(e) => {
                error!("refresh failed: {}", e);
                false
            }
        }
    }
}

// ============================================================================
// Terminal Front-End
// ============================================================================

pub struct SolariControllers;

impl SolariControllers {
    /// Run the terminal board: redraw the clock every second, refresh the
    /// predictions on the configured interval, exit when Enter is pressed.
    pub fn run(config: &BoardConfig) {
        let mut board = BoardState::new();
        let exit_flag = Arc::new(Mutex::new(false));

        {
            let exit_flag = Arc::clone(&exit_flag);
            thread::spawn(move || {
                let mut input = String::new();
                if io::stdin().read_line(&mut input).is_ok() {
                    *exit_flag.lock().unwrap() = true;
                }
            });
        }

        let tick = Duration::from_millis(config.tick_millis.max(1));
        let mut last_drawn_second: Option<i64> = None;

        loop {
            if *exit_flag.lock().unwrap() {
                break;
            }

            let now = Utc::now();

            if last_drawn_second != Some(now.timestamp()) {
                SolariViews::draw_board(config, board.snapshot(), now);
                last_drawn_second = Some(now.timestamp());
            }

            if board.due_for_refresh(now, config.refresh_secs) {
                if let Some(seq) = board.begin_refresh(now) {
                    let result = SolariModels::refresh_board(config);
                    board.finish_refresh(seq, result);
                    // Redraw with whatever the cycle produced.
                    last_drawn_second = None;
                }
            }

            thread::sleep(tick);
        }

        SolariViews::goodbye();
    }

    // ========================================================================
    // Helper Functions
    // ========================================================================

    /// Whole minutes until departure; negative once it has gone.
    pub fn minutes_until_departure(departure: &DateTime<Utc>, now: &DateTime<Utc>) -> i64 {
        departure.signed_duration_since(*now).num_minutes()
    }
}

// ============================================================================
// Tests
// ============================================================================
