use crate::corpus::Mode;
use std::collections::HashSet;
use std::time::SystemTime;

/// Classification of a typed position.
#[derive(Clone, Debug, Copy, PartialEq)]
pub enum Outcome {
    Correct,
    Incorrect,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Active,
    Completed,
}

/// Display cache for the periodically recomputed live metrics. Never a
/// source of truth; always derivable from the position sets and clock.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LiveMetrics {
    pub wpm: u32,
    pub accuracy: u32,
}

impl Default for LiveMetrics {
    fn default() -> Self {
        // Accuracy reads 100 until something has been typed.
        Self { wpm: 0, accuracy: 100 }
    }
}

/// Immutable record emitted once per completed session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TestResult {
    pub wpm: u32,
    pub raw_wpm: u32,
    pub accuracy: u32,
    pub duration_secs: u32,
    pub mode: Mode,
    pub characters: usize,
    pub errors: usize,
}

/// One typing test: the prompt, the cursor, per-position classifications,
/// and the countdown. All mutation goes through the transition methods;
/// rendering only reads.
#[derive(Debug)]
pub struct Session {
    pub mode: Mode,
    text: String,
    chars: Vec<char>,
    cursor: usize,
    correct: HashSet<usize>,
    incorrect: HashSet<usize>,
    phase: Phase,
    duration_secs: u32,
    seconds_remaining: u32,
    started_at: Option<SystemTime>,
    live: LiveMetrics,
    result: Option<TestResult>,
}

impl Session {
    pub fn new(mode: Mode, text: String, duration_secs: u32) -> Self {
        let chars = text.chars().collect();
        Self {
            mode,
            text,
            chars,
            cursor: 0,
            correct: HashSet::new(),
            incorrect: HashSet::new(),
            phase: Phase::Idle,
            duration_secs,
            seconds_remaining: duration_secs,
            started_at: None,
            live: LiveMetrics::default(),
            result: None,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn len(&self) -> usize {
        self.chars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }

    pub fn char_at(&self, idx: usize) -> Option<char> {
        self.chars.get(idx).copied()
    }

    /// Classification of an already-typed position, None at or past the
    /// cursor.
    pub fn outcome_at(&self, idx: usize) -> Option<Outcome> {
        if self.correct.contains(&idx) {
            Some(Outcome::Correct)
        } else if self.incorrect.contains(&idx) {
            Some(Outcome::Incorrect)
        } else {
            None
        }
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_active(&self) -> bool {
        self.phase == Phase::Active
    }

    pub fn is_completed(&self) -> bool {
        self.phase == Phase::Completed
    }

    pub fn has_started(&self) -> bool {
        self.started_at.is_some()
    }

    pub fn started_at(&self) -> Option<SystemTime> {
        self.started_at
    }

    pub fn duration_secs(&self) -> u32 {
        self.duration_secs
    }

    pub fn seconds_remaining(&self) -> u32 {
        self.seconds_remaining
    }

    pub fn correct_count(&self) -> usize {
        self.correct.len()
    }

    pub fn error_count(&self) -> usize {
        self.incorrect.len()
    }

    pub fn typed_total(&self) -> usize {
        self.correct.len() + self.incorrect.len()
    }

    pub fn live(&self) -> LiveMetrics {
        self.live
    }

    pub fn result(&self) -> Option<&TestResult> {
        self.result.as_ref()
    }

    /// Hands out the completion record, at most once.
    pub fn take_result(&mut self) -> Option<TestResult> {
        self.result.take()
    }

    pub fn start(&mut self) {
        self.start_at(SystemTime::now());
    }

    /// Idle -> Active. Idempotent: a second call while Active changes
    /// nothing; Completed is terminal.
    pub fn start_at(&mut self, now: SystemTime) {
        if self.phase != Phase::Idle {
            return;
        }
        self.phase = Phase::Active;
        self.started_at = Some(now);
        self.seconds_remaining = self.duration_secs;
    }

    pub fn type_char(&mut self, c: char) {
        self.type_char_at(c, SystemTime::now());
    }

    /// Classify one keystroke against the expected character and advance.
    /// Auto-starts from Idle; a no-op once Completed or without text.
    pub fn type_char_at(&mut self, c: char, now: SystemTime) {
        if self.phase == Phase::Completed || self.chars.is_empty() {
            return;
        }
        self.start_at(now);
        if self.cursor >= self.chars.len() {
            return;
        }

        if c == self.chars[self.cursor] {
            self.correct.insert(self.cursor);
        } else {
            self.incorrect.insert(self.cursor);
        }
        self.cursor += 1;

        if self.cursor == self.chars.len() {
            self.complete_at(now);
        }
    }

    pub fn tab(&mut self) {
        self.tab_at(SystemTime::now());
    }

    /// Tab matches two literal spaces atomically; anything else ignores
    /// the key without advancing the cursor.
    pub fn tab_at(&mut self, now: SystemTime) {
        if self.phase == Phase::Completed || self.chars.is_empty() {
            return;
        }
        self.start_at(now);

        if self.cursor + 1 < self.chars.len()
            && self.chars[self.cursor] == ' '
            && self.chars[self.cursor + 1] == ' '
        {
            self.correct.insert(self.cursor);
            self.correct.insert(self.cursor + 1);
            self.cursor += 2;

            if self.cursor == self.chars.len() {
                self.complete_at(now);
            }
        }
    }

    /// Steps back one position and forgets its classification. Only
    /// meaningful while Active; never touches the timer.
    pub fn backspace(&mut self) {
        if self.phase != Phase::Active || self.cursor == 0 {
            return;
        }
        self.cursor -= 1;
        self.correct.remove(&self.cursor);
        self.incorrect.remove(&self.cursor);
    }

    pub fn tick(&mut self) {
        self.tick_at(SystemTime::now());
    }

    /// One elapsed second of the countdown. At zero the session completes
    /// regardless of how far the cursor got.
    pub fn tick_at(&mut self, now: SystemTime) {
        if self.phase != Phase::Active {
            return;
        }
        self.seconds_remaining = self.seconds_remaining.saturating_sub(1);
        if self.seconds_remaining == 0 {
            self.complete_at(now);
        }
    }

    pub fn refresh_live(&mut self) {
        self.refresh_live_at(SystemTime::now());
    }

    pub fn refresh_live_at(&mut self, now: SystemTime) {
        if self.phase == Phase::Active {
            self.live = self.live_metrics_at(now);
        }
    }

    /// Live wpm/accuracy from the position sets and elapsed wall clock.
    pub fn live_metrics_at(&self, now: SystemTime) -> LiveMetrics {
        let mut metrics = LiveMetrics::default();
        let total = self.typed_total();

        if let Some(started) = self.started_at {
            let elapsed_minutes = elapsed_minutes(started, now);
            if elapsed_minutes > 0.0 {
                let words = self.correct.len() as f64 / 5.0;
                metrics.wpm = (words / elapsed_minutes).round() as u32;
            }
        }
        if total > 0 {
            metrics.accuracy =
                ((self.correct.len() as f64 / total as f64) * 100.0).round() as u32;
        }

        metrics
    }

    fn complete_at(&mut self, now: SystemTime) {
        if self.phase == Phase::Completed {
            return;
        }
        self.phase = Phase::Completed;

        let total = self.typed_total();
        // duration - remaining covers both exits: the timer has reached 0
        // when time ran out, so only early completion shortens it.
        let effective_secs = self.duration_secs - self.seconds_remaining;

        let (wpm, accuracy, raw_wpm) = if total == 0 {
            // Timer expired with no keystrokes: report zeros, not the
            // idle default of 100% accuracy.
            (0, 0, 0)
        } else {
            let mut wpm = 0;
            if let Some(started) = self.started_at {
                let elapsed_minutes = elapsed_minutes(started, now);
                if elapsed_minutes > 0.0 {
                    wpm = ((self.correct.len() as f64 / 5.0) / elapsed_minutes).round() as u32;
                }
            }
            let accuracy =
                ((self.correct.len() as f64 / total as f64) * 100.0).round() as u32;
            let raw_minutes = effective_secs.max(1) as f64 / 60.0;
            let raw_wpm = ((total as f64 / 5.0) / raw_minutes).round() as u32;
            (wpm, accuracy, raw_wpm)
        };

        self.live = LiveMetrics { wpm, accuracy };
        self.result = Some(TestResult {
            wpm,
            raw_wpm,
            accuracy,
            duration_secs: effective_secs,
            mode: self.mode,
            characters: total,
            errors: self.incorrect.len(),
        });
    }
}

fn elapsed_minutes(started: SystemTime, now: SystemTime) -> f64 {
    now.duration_since(started)
        .map(|d| d.as_secs_f64() / 60.0)
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::time::Duration;

    fn session(text: &str) -> Session {
        Session::new(Mode::Normal, text.to_string(), 30)
    }

    fn drive_to_completion(session: &mut Session, now: SystemTime) {
        let text: Vec<char> = session.text().chars().collect();
        for c in text {
            session.type_char_at(c, now);
        }
    }

    #[test]
    fn test_new_session_is_idle() {
        let s = session("hello");
        assert_matches!(s.phase(), Phase::Idle);
        assert_eq!(s.cursor(), 0);
        assert_eq!(s.seconds_remaining(), 30);
        assert!(!s.has_started());
        assert_eq!(s.live(), LiveMetrics { wpm: 0, accuracy: 100 });
    }

    #[test]
    fn test_start_is_idempotent() {
        let mut s = session("hello");
        let t0 = SystemTime::now();
        let t1 = t0 + Duration::from_secs(5);

        s.start_at(t0);
        assert_matches!(s.phase(), Phase::Active);
        assert_eq!(s.started_at(), Some(t0));

        s.start_at(t1);
        assert_eq!(s.started_at(), Some(t0));
    }

    #[test]
    fn test_type_auto_starts() {
        let mut s = session("hello");
        s.type_char('h');
        assert!(s.has_started());
        assert_matches!(s.phase(), Phase::Active);
    }

    #[test]
    fn test_type_classifies_positions() {
        let mut s = session("hi");
        s.type_char('h');
        assert_eq!(s.outcome_at(0), Some(Outcome::Correct));

        let mut s = session("hi");
        s.type_char('x');
        assert_eq!(s.outcome_at(0), Some(Outcome::Incorrect));
        assert_eq!(s.cursor(), 1);
    }

    #[test]
    fn test_position_sets_partition_typed_prefix() {
        let mut s = session("hello world");
        for c in "hellp wxrld".chars() {
            s.type_char(c);
        }
        assert_eq!(s.typed_total(), s.cursor());
        for idx in 0..s.cursor() {
            assert!(s.outcome_at(idx).is_some());
        }
        assert_eq!(s.correct_count(), 9);
        assert_eq!(s.error_count(), 2);
    }

    #[test]
    fn test_completion_at_end_of_text() {
        let mut s = session("hi");
        s.type_char('h');
        assert_matches!(s.phase(), Phase::Active);
        s.type_char('i');
        assert_matches!(s.phase(), Phase::Completed);
        assert!(s.result().is_some());
    }

    #[test]
    fn test_type_after_completion_is_noop() {
        let mut s = session("hi");
        s.type_char('h');
        s.type_char('i');
        let cursor = s.cursor();
        s.type_char('x');
        assert_eq!(s.cursor(), cursor);
        assert_eq!(s.typed_total(), 2);
    }

    #[test]
    fn test_type_on_empty_text_is_noop() {
        let mut s = session("");
        s.type_char('a');
        assert_matches!(s.phase(), Phase::Idle);
        assert_eq!(s.cursor(), 0);
    }

    #[test]
    fn test_backspace_is_inverse_of_type() {
        let mut s = session("hello");
        s.type_char('h');
        s.type_char('x');

        let before_cursor = s.cursor();
        s.type_char('l');
        s.backspace();

        assert_eq!(s.cursor(), before_cursor);
        assert_eq!(s.outcome_at(0), Some(Outcome::Correct));
        assert_eq!(s.outcome_at(1), Some(Outcome::Incorrect));
        assert_eq!(s.outcome_at(2), None);
    }

    #[test]
    fn test_backspace_at_cursor_zero_is_noop() {
        let mut s = session("hello");
        s.start();
        s.backspace();
        assert_eq!(s.cursor(), 0);
    }

    #[test]
    fn test_backspace_while_idle_is_noop() {
        let mut s = session("hello");
        s.backspace();
        assert_eq!(s.cursor(), 0);
        assert_matches!(s.phase(), Phase::Idle);
    }

    #[test]
    fn test_backspace_does_not_touch_timer() {
        let mut s = session("hello");
        s.type_char('h');
        s.tick();
        let remaining = s.seconds_remaining();
        s.backspace();
        assert_eq!(s.seconds_remaining(), remaining);
    }

    #[test]
    fn test_tab_matches_two_spaces() {
        let mut s = session("a  b");
        s.type_char('a');
        s.tab();
        assert_eq!(s.cursor(), 3);
        assert_eq!(s.outcome_at(1), Some(Outcome::Correct));
        assert_eq!(s.outcome_at(2), Some(Outcome::Correct));
    }

    #[test]
    fn test_tab_ignored_without_two_spaces() {
        let mut s = session("a b");
        s.type_char('a');
        s.tab();
        assert_eq!(s.cursor(), 1);
        assert_eq!(s.typed_total(), 1);
    }

    #[test]
    fn test_tab_can_complete_session() {
        let mut s = session("a  ");
        s.type_char('a');
        s.tab();
        assert_matches!(s.phase(), Phase::Completed);
    }

    #[test]
    fn test_tick_only_runs_while_active() {
        let mut s = session("hello");
        s.tick();
        assert_eq!(s.seconds_remaining(), 30);

        s.start();
        s.tick();
        assert_eq!(s.seconds_remaining(), 29);
    }

    #[test]
    fn test_timer_expiry_completes_session() {
        let mut s = Session::new(Mode::Normal, "hello".to_string(), 2);
        s.type_char('h');
        s.tick();
        assert_matches!(s.phase(), Phase::Active);
        s.tick();
        assert_matches!(s.phase(), Phase::Completed);
    }

    #[test]
    fn test_zero_input_expiry_reports_zeros() {
        let mut s = Session::new(Mode::Normal, "hello".to_string(), 1);
        s.start();
        s.tick();

        let result = s.result().expect("session should have completed");
        assert_eq!(result.wpm, 0);
        assert_eq!(result.accuracy, 0);
        assert_eq!(result.raw_wpm, 0);
        assert_eq!(result.characters, 0);
        assert_eq!(result.errors, 0);
        assert_eq!(result.duration_secs, 1);
    }

    #[test]
    fn test_live_accuracy_defaults_to_100_before_typing() {
        let mut s = session("hello");
        s.start();
        let live = s.live_metrics_at(SystemTime::now());
        assert_eq!(live.accuracy, 100);
        assert_eq!(live.wpm, 0);
    }

    #[test]
    fn test_metrics_fifty_correct_ten_incorrect_in_thirty_seconds() {
        let text: String = std::iter::repeat('a').take(60).collect();
        let mut s = Session::new(Mode::Normal, text, 60);

        let t0 = SystemTime::now();
        s.start_at(t0);
        for _ in 0..50 {
            s.type_char_at('a', t0);
        }
        for _ in 0..10 {
            s.type_char_at('x', t0);
        }

        let live = s.live_metrics_at(t0 + Duration::from_secs(30));
        assert_eq!(live.wpm, 20);
        assert_eq!(live.accuracy, 83);
    }

    #[test]
    fn test_perfect_run_scores_100() {
        let mut s = session("hello world");
        let t0 = SystemTime::now();
        s.start_at(t0);
        let chars: Vec<char> = s.text().chars().collect();
        let end = t0 + Duration::from_secs(10);
        for c in chars {
            s.type_char_at(c, end);
        }

        let result = s.result().expect("completed");
        assert_eq!(result.accuracy, 100);
        assert_eq!(result.errors, 0);
        assert_eq!(result.characters, s.len());
    }

    #[test]
    fn test_early_completion_duration_accounting() {
        let mut s = Session::new(Mode::Normal, "hi".to_string(), 30);
        let t0 = SystemTime::now();
        s.start_at(t0);
        // Ten seconds tick by before the text is finished.
        for _ in 0..10 {
            s.tick_at(t0);
        }
        s.type_char_at('h', t0 + Duration::from_secs(10));
        s.type_char_at('i', t0 + Duration::from_secs(10));

        let result = s.result().expect("completed");
        assert_eq!(result.duration_secs, 10);
    }

    #[test]
    fn test_timeout_records_full_duration() {
        let mut s = Session::new(Mode::Normal, "hello".to_string(), 3);
        s.type_char('h');
        for _ in 0..3 {
            s.tick();
        }
        let result = s.result().expect("completed");
        assert_eq!(result.duration_secs, 3);
    }

    #[test]
    fn test_raw_wpm_counts_errors() {
        let text: String = std::iter::repeat('a').take(100).collect();
        let mut s = Session::new(Mode::Normal, text, 30);
        let t0 = SystemTime::now();
        s.start_at(t0);
        for _ in 0..25 {
            s.type_char_at('a', t0);
            s.type_char_at('x', t0);
        }
        for _ in 0..30 {
            s.tick_at(t0 + Duration::from_secs(30));
        }

        let result = s.result().expect("completed by timer");
        assert_eq!(result.characters, 50);
        // 50 raw chars in 30 seconds: (50/5) / 0.5 minutes.
        assert_eq!(result.raw_wpm, 20);
    }

    #[test]
    fn test_result_taken_only_once() {
        let mut s = session("hi");
        s.type_char('h');
        s.type_char('i');
        assert!(s.take_result().is_some());
        assert!(s.take_result().is_none());
    }

    #[test]
    fn test_completion_invariants() {
        let mut s = session("the quick brown fox");
        let now = SystemTime::now();
        drive_to_completion(&mut s, now);

        assert_eq!(s.typed_total(), s.cursor());
        assert!(s.typed_total() <= s.len());
        for idx in 0..s.cursor() {
            let correct = s.outcome_at(idx) == Some(Outcome::Correct);
            let incorrect = s.outcome_at(idx) == Some(Outcome::Incorrect);
            assert!(correct ^ incorrect);
        }
    }
}
