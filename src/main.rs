mod ui;

use clap::{error::ErrorKind, CommandFactory, Parser};
use crossterm::{
    event::{KeyCode, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    tty::IsTty,
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    Terminal,
};
use std::{
    error::Error,
    io::{self, stdin},
    path::PathBuf,
    time::Duration,
};
use typemaster::{
    controller::Controller,
    corpus::{Mode, ModeCategory},
    history::{HistoryDb, ResultSink, StoredResult},
    runtime::{AppEvent, CrosstermEventSource, FixedTicker, Runner},
    session::TestResult,
    settings::{FileSettingsStore, Settings, SettingsStore},
    supply::TextSupplier,
};

const TICK_RATE_MS: u64 = 100;
const DURATIONS: [u32; 4] = [15, 30, 60, 120];

/// terminal typing speed trainer
#[derive(Parser, Debug, Clone)]
#[clap(
    version,
    about,
    long_about = "A terminal typing speed trainer with themed practice modes (plain sentences, romantic passages, code snippets), live wpm and accuracy tracking, and a persistent result history."
)]
pub struct Cli {
    /// number of seconds to run each test
    #[clap(short = 's', long, default_value_t = 30)]
    seconds: u32,

    /// practice mode to start in
    #[clap(short = 'm', long, value_enum, default_value_t = Mode::Normal)]
    mode: Mode,

    /// print recent results and exit
    #[clap(long)]
    history: bool,

    /// export the full result history as csv to the given path and exit
    #[clap(long)]
    export: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Screen {
    Typing,
    Results,
    History,
    Preview(ModeCategory),
}

pub struct App {
    pub controller: Controller,
    pub screen: Screen,
    pub settings: Settings,
    pub last_result: Option<TestResult>,
    pub best_wpm: Option<u32>,
    pub history: Vec<StoredResult>,
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    if cli.history {
        return print_history();
    }
    if let Some(path) = &cli.export {
        let exported = HistoryDb::new()?.export_csv(path)?;
        println!("exported {} results to {}", exported, path.display());
        return Ok(());
    }

    if !stdin().is_tty() {
        let mut cmd = Cli::command();
        cmd.error(ErrorKind::Io, "stdin must be a tty").exit();
    }

    enable_raw_mode()?;

    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let events = CrosstermEventSource::new(Duration::from_millis(TICK_RATE_MS));
    let supplier = TextSupplier::with_default_provider();
    let sink: Option<Box<dyn ResultSink>> = match HistoryDb::new() {
        Ok(db) => Some(Box::new(db)),
        Err(_) => None,
    };

    let controller = Controller::new(cli.mode, cli.seconds, supplier, events.sender(), sink);
    controller.warm_cache();

    let mut app = App {
        controller,
        screen: Screen::Typing,
        settings: FileSettingsStore::new().load(),
        last_result: None,
        best_wpm: None,
        history: Vec::new(),
    };

    let result = run_app(&mut terminal, &mut app, events);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result
}

fn print_history() -> Result<(), Box<dyn Error>> {
    let db = HistoryDb::new()?;
    let results = db.recent(20)?;

    if results.is_empty() {
        println!("no results recorded yet");
        return Ok(());
    }
    for r in &results {
        println!(
            "{}  {:>3} wpm  {:>3}% acc  {:<9} {:>4}s  {:>4} chars  {:>3} errors",
            r.timestamp.format("%Y-%m-%d %H:%M"),
            r.wpm,
            r.accuracy,
            r.mode.file_name(),
            r.duration_secs,
            r.characters,
            r.errors
        );
    }

    Ok(())
}

fn run_app<B: Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
    events: CrosstermEventSource,
) -> Result<(), Box<dyn Error>> {
    let runner = Runner::new(events, FixedTicker::new(Duration::from_millis(TICK_RATE_MS)));

    loop {
        terminal.draw(|f| f.render_widget(&*app, f.area()))?;

        match runner.step() {
            AppEvent::Tick => {
                if let Some(result) = app.controller.on_tick() {
                    finish_session(app, result);
                }
            }
            AppEvent::Resize => {}
            AppEvent::TextReady(delivery) => {
                app.controller.text_arrived(delivery);
            }
            AppEvent::Key(key) => {
                if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
                    break;
                }

                match app.screen {
                    Screen::Typing => match key.code {
                        KeyCode::Esc => break,
                        KeyCode::Left if !app.controller.session().is_active() => {
                            cycle_mode(app, -1);
                        }
                        KeyCode::Right if !app.controller.session().is_active() => {
                            cycle_mode(app, 1);
                        }
                        KeyCode::Up if !app.controller.session().is_active() => {
                            cycle_duration(app, 1);
                        }
                        KeyCode::Down if !app.controller.session().is_active() => {
                            cycle_duration(app, -1);
                        }
                        _ => {
                            if let Some(result) = app.controller.on_key(key) {
                                finish_session(app, result);
                            }
                        }
                    },
                    Screen::Results => match key.code {
                        KeyCode::Esc => break,
                        KeyCode::Char('r') | KeyCode::Char('n') => {
                            app.controller.reset();
                            app.screen = Screen::Typing;
                        }
                        KeyCode::Char('h') => {
                            app.history = HistoryDb::new()
                                .and_then(|db| db.recent(15))
                                .unwrap_or_default();
                            app.screen = Screen::History;
                        }
                        _ => {}
                    },
                    Screen::History => match key.code {
                        KeyCode::Esc => break,
                        KeyCode::Char('b') | KeyCode::Backspace => {
                            app.screen = Screen::Results;
                        }
                        KeyCode::Char('e') => {
                            if let Ok(db) = HistoryDb::new() {
                                let _ = db.export_csv("typemaster_history.csv");
                            }
                        }
                        _ => {}
                    },
                    Screen::Preview(_) => {
                        // Any key dismisses the interstitial.
                        app.screen = Screen::Typing;
                    }
                }
            }
        }
    }

    Ok(())
}

fn finish_session(app: &mut App, result: TestResult) {
    if let Ok(db) = HistoryDb::new() {
        app.best_wpm = db.best_wpm(result.mode).ok().flatten();
    }
    app.last_result = Some(result);
    app.screen = Screen::Results;
}

fn cycle_mode(app: &mut App, step: isize) {
    let modes = Mode::ALL;
    let current = app.controller.session().mode;
    let idx = modes.iter().position(|m| *m == current).unwrap_or(0);
    let next = (idx as isize + step).rem_euclid(modes.len() as isize) as usize;

    if let Some(category) = app.controller.change_mode(modes[next]) {
        app.screen = Screen::Preview(category);
    }
}

fn cycle_duration(app: &mut App, step: isize) {
    let current = app.controller.duration_secs();
    let idx = DURATIONS.iter().position(|d| *d == current).unwrap_or(1);
    let next = (idx as isize + step).rem_euclid(DURATIONS.len() as isize) as usize;
    app.controller.change_duration(DURATIONS[next]);
}
