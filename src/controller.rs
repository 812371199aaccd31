use crate::corpus::{Mode, ModeCategory};
use crate::history::ResultSink;
use crate::runtime::{AppEvent, TextDelivery};
use crate::session::{Session, TestResult};
use crate::supply::{self, TextSupplier};
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use std::sync::mpsc::Sender;
use std::thread;
use std::time::SystemTime;

/// Wires user intents to the session and the text supplier. Owns the
/// active [`Session`], requests replacement text asynchronously, and
/// emits each completed session's record exactly once.
pub struct Controller {
    session: Session,
    supplier: TextSupplier,
    duration_secs: u32,
    loading: bool,
    text_seq: u64,
    ticks_applied: u32,
    events: Sender<AppEvent>,
    sink: Option<Box<dyn ResultSink>>,
}

impl Controller {
    pub fn new(
        mode: Mode,
        duration_secs: u32,
        supplier: TextSupplier,
        events: Sender<AppEvent>,
        sink: Option<Box<dyn ResultSink>>,
    ) -> Self {
        let mut controller = Self {
            session: Session::new(mode, String::new(), duration_secs),
            supplier,
            duration_secs,
            loading: false,
            text_seq: 0,
            ticks_applied: 0,
            events,
            sink,
        };
        controller.request_text();
        controller
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn loading(&self) -> bool {
        self.loading
    }

    pub fn duration_secs(&self) -> u32 {
        self.duration_secs
    }

    /// Warm the cache for every mode at the current duration so mode
    /// switches don't wait on a fetch.
    pub fn warm_cache(&self) {
        for mode in Mode::ALL {
            self.supplier.prefetch(mode, self.duration_secs);
        }
    }

    /// Keyboard intake. Only printable characters, Enter (typed as a
    /// newline), Tab, and Backspace reach the session; anything else is
    /// ignored. Returns the result record when the keystroke completed
    /// the session.
    pub fn on_key(&mut self, key: KeyEvent) -> Option<TestResult> {
        // Restart chord: ctrl+enter or alt+enter.
        if key.code == KeyCode::Enter
            && (key.modifiers.contains(KeyModifiers::CONTROL)
                || key.modifiers.contains(KeyModifiers::ALT))
        {
            self.reset();
            return None;
        }

        if self.loading {
            return None;
        }

        // Enter on the failure placeholder retries the fetch.
        if key.code == KeyCode::Enter && supply::is_placeholder(self.session.text()) {
            self.reset();
            return None;
        }

        match key.code {
            KeyCode::Char(c) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.session.type_char(c);
                self.check_completion()
            }
            KeyCode::Enter => {
                self.session.type_char('\n');
                self.check_completion()
            }
            KeyCode::Tab => {
                self.session.tab();
                self.check_completion()
            }
            KeyCode::Backspace => {
                self.session.backspace();
                None
            }
            _ => None,
        }
    }

    /// Clicking the typing area starts an idle session.
    pub fn on_click(&mut self) {
        if !self.loading && !self.session.is_empty() {
            self.session.start();
        }
    }

    /// Runtime tick (~100ms): refresh the live metrics and derive the
    /// session's one-per-second timer ticks from the wall clock.
    pub fn on_tick(&mut self) -> Option<TestResult> {
        self.on_tick_at(SystemTime::now())
    }

    pub fn on_tick_at(&mut self, now: SystemTime) -> Option<TestResult> {
        if !self.session.is_active() {
            return None;
        }
        self.session.refresh_live_at(now);

        if let Some(started) = self.session.started_at() {
            let elapsed_secs = now
                .duration_since(started)
                .map(|d| d.as_secs() as u32)
                .unwrap_or(0);
            while self.ticks_applied < elapsed_secs && self.session.is_active() {
                self.ticks_applied += 1;
                self.session.tick_at(now);
            }
        }

        self.check_completion()
    }

    /// Switch practice category, discarding all progress. Returns the
    /// category to preview when the switch crosses into romantic or
    /// programming territory from a different category.
    pub fn change_mode(&mut self, mode: Mode) -> Option<ModeCategory> {
        let preview = preview_for(self.session.mode, mode);
        self.replace_session(mode);
        preview
    }

    pub fn change_duration(&mut self, duration_secs: u32) {
        self.duration_secs = duration_secs;
        let mode = self.session.mode;
        self.replace_session(mode);
    }

    /// Back to Idle with fresh text, same mode.
    pub fn reset(&mut self) {
        let mode = self.session.mode;
        self.replace_session(mode);
    }

    /// Apply an asynchronous text delivery. Deliveries for a superseded
    /// request (stale generation, or a mode/duration the controller has
    /// moved away from) are discarded.
    pub fn text_arrived(&mut self, delivery: TextDelivery) {
        if delivery.seq != self.text_seq
            || delivery.mode != self.session.mode
            || delivery.duration_secs != self.duration_secs
        {
            return;
        }
        self.session = Session::new(delivery.mode, delivery.content, self.duration_secs);
        self.ticks_applied = 0;
        self.loading = false;
    }

    fn replace_session(&mut self, mode: Mode) {
        self.session = Session::new(mode, String::new(), self.duration_secs);
        self.ticks_applied = 0;
        self.request_text();
    }

    fn request_text(&mut self) {
        self.loading = true;
        self.text_seq += 1;
        let seq = self.text_seq;
        let mode = self.session.mode;
        let duration_secs = self.duration_secs;
        let supplier = self.supplier.clone();
        let events = self.events.clone();

        thread::spawn(move || {
            let content = supplier.take(mode, duration_secs);
            let _ = events.send(AppEvent::TextReady(TextDelivery {
                mode,
                duration_secs,
                seq,
                content,
            }));
        });
    }

    fn check_completion(&mut self) -> Option<TestResult> {
        if !self.session.is_completed() {
            return None;
        }
        let result = self.session.take_result()?;
        if let Some(sink) = self.sink.as_mut() {
            let _ = sink.record(&result);
        }
        // Line up fresh text for the next idle session.
        self.request_text();
        Some(result)
    }
}

fn preview_for(old: Mode, new: Mode) -> Option<ModeCategory> {
    let category = new.category();
    if category == old.category() {
        return None;
    }
    match category {
        ModeCategory::Romantic | ModeCategory::Programming => Some(category),
        ModeCategory::Plain => None,
    }
}
