use crate::corpus::{Corpus, Mode};
use rand::seq::SliceRandom;
use std::collections::{HashMap, HashSet, VecDeque};
use std::error::Error;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// Queue depth `prefetch` fills each (mode, duration) key up to.
const CACHE_TARGET: usize = 3;
/// `take` schedules a background refill when a queue drops below this.
const REFILL_THRESHOLD: usize = 2;
/// Delay between retries while another caller's fetch is outstanding.
const INFLIGHT_RETRY: Duration = Duration::from_millis(50);

/// Returned when both the provider and local composition fail. Callers can
/// detect it with [`is_placeholder`] and offer a retry.
pub const PLACEHOLDER_TEXT: &str = "Text loading failed. Press enter to try again.";

pub fn is_placeholder(text: &str) -> bool {
    text == PLACEHOLDER_TEXT
}

pub type ProviderError = Box<dyn Error + Send + Sync>;

/// External text service: fetch `count` practice texts for a mode, sized
/// for a test duration. May fail or stall; the supplier tolerates both.
pub trait TextProvider: Send + Sync {
    fn fetch_texts(
        &self,
        mode: Mode,
        duration_secs: u32,
        count: usize,
    ) -> Result<Vec<String>, ProviderError>;
}

/// Built-in provider composing from the embedded corpora.
pub struct CorpusProvider;

impl TextProvider for CorpusProvider {
    fn fetch_texts(
        &self,
        mode: Mode,
        duration_secs: u32,
        count: usize,
    ) -> Result<Vec<String>, ProviderError> {
        let corpus = Corpus::for_mode(mode);
        let mut texts = Vec::with_capacity(count);
        for _ in 0..count {
            texts.push(compose_text(&corpus, duration_secs).ok_or("corpus has no passages")?);
        }
        Ok(texts)
    }
}

/// Character target for a test duration, assuming a 40 wpm reference
/// typist with a 50% buffer for faster ones.
pub fn target_length(duration_secs: u32) -> usize {
    match duration_secs {
        15 => 75,
        30 => 150,
        60 => 300,
        120 => 600,
        secs => secs as usize * 5,
    }
}

/// Compose a practice text of roughly `target_length` characters from the
/// corpus. Short tests use a single passage; longer tests concatenate
/// shuffled passages. Trims only at whitespace, never mid-word. Returns
/// None when the corpus has no passages.
pub fn compose_text(corpus: &Corpus, duration_secs: u32) -> Option<String> {
    let passages = &corpus.passages;
    if passages.is_empty() {
        return None;
    }

    let target = target_length(duration_secs);
    let mut rng = rand::thread_rng();

    if duration_secs <= 15 {
        let mut text = passages.choose(&mut rng)?.clone();
        if text.len() > target * 3 / 2 {
            if let Some(cut) = last_whitespace_at_or_before(&text, target) {
                text.truncate(cut);
            }
        }
        return Some(text);
    }

    let mut deck: Vec<&String> = passages.iter().collect();
    deck.shuffle(&mut rng);

    let mut result = String::new();
    let mut last_used: Option<&String> = None;

    while result.len() < target {
        if deck.is_empty() {
            deck = passages.iter().collect();
            deck.shuffle(&mut rng);
            // Don't let the reshuffle repeat the passage we just appended.
            if deck.len() > 1 && deck.last() == last_used.as_ref() {
                let end = deck.len() - 1;
                deck.swap(0, end);
            }
        }

        let next = deck.pop()?;
        if !result.is_empty() {
            result.push(' ');
        }
        result.push_str(next);
        last_used = Some(next);

        if result.len() > target * 6 / 5 {
            if let Some(cut) = last_whitespace_at_or_before(&result, target * 11 / 10) {
                // Only trim when the cut keeps the text long enough;
                // otherwise the overflow beats a too-short prompt.
                if cut >= target * 4 / 5 {
                    result.truncate(cut);
                    break;
                }
            }
        }
    }

    Some(result)
}

fn last_whitespace_at_or_before(text: &str, limit: usize) -> Option<usize> {
    text.char_indices()
        .take_while(|(i, _)| *i <= limit)
        .filter(|(_, c)| c.is_whitespace())
        .map(|(i, _)| i)
        .last()
}

type CacheKey = (Mode, u32);

#[derive(Default)]
struct CacheState {
    queues: HashMap<CacheKey, VecDeque<String>>,
    in_flight: HashSet<CacheKey>,
}

/// Process-wide text cache: per-(mode, duration) queues of unused practice
/// texts, refilled asynchronously from a [`TextProvider`] with local
/// composition as the fallback. The in-flight set keeps concurrent callers
/// from issuing duplicate fetches for the same key.
#[derive(Clone)]
pub struct TextSupplier {
    state: Arc<Mutex<CacheState>>,
    provider: Arc<dyn TextProvider>,
    fallback_corpus: Option<Arc<Corpus>>,
}

impl TextSupplier {
    pub fn new(provider: Arc<dyn TextProvider>) -> Self {
        Self {
            state: Arc::new(Mutex::new(CacheState::default())),
            provider,
            fallback_corpus: None,
        }
    }

    pub fn with_default_provider() -> Self {
        Self::new(Arc::new(CorpusProvider))
    }

    /// Override the local-composition fallback with a fixed corpus instead
    /// of the embedded per-mode ones.
    pub fn with_fallback_corpus(provider: Arc<dyn TextProvider>, corpus: Corpus) -> Self {
        Self {
            state: Arc::new(Mutex::new(CacheState::default())),
            provider,
            fallback_corpus: Some(Arc::new(corpus)),
        }
    }

    /// Asynchronously tops the queue for (mode, duration) up to three
    /// entries. Cheap to call redundantly: when the queue is already full
    /// or a fetch for the key is outstanding, nothing happens.
    pub fn prefetch(&self, mode: Mode, duration_secs: u32) {
        let supplier = self.clone();
        thread::spawn(move || supplier.prefetch_blocking(mode, duration_secs));
    }

    /// Synchronous body of [`prefetch`]; exposed so tests and worker
    /// threads can run the refill to completion.
    pub fn prefetch_blocking(&self, mode: Mode, duration_secs: u32) {
        let key = (mode, duration_secs);
        let needed = {
            let mut state = self.state.lock().unwrap();
            let len = state.queues.get(&key).map_or(0, |q| q.len());
            if len >= CACHE_TARGET || state.in_flight.contains(&key) {
                return;
            }
            state.in_flight.insert(key);
            CACHE_TARGET - len
        };

        let texts = self.fetch_or_compose(mode, duration_secs, needed);

        let mut state = self.state.lock().unwrap();
        state.in_flight.remove(&key);
        state.queues.entry(key).or_default().extend(texts);
    }

    /// Pops one practice text for (mode, duration), scheduling a refill
    /// when the queue runs low. An empty queue falls back to a direct
    /// fetch-or-compose. Callers arriving while another fetch for the key
    /// is outstanding wait and retry instead of fetching twice. Never
    /// fails: total failure yields [`PLACEHOLDER_TEXT`].
    pub fn take(&self, mode: Mode, duration_secs: u32) -> String {
        let key = (mode, duration_secs);
        loop {
            let mut state = self.state.lock().unwrap();
            if let Some(text) = state.queues.get_mut(&key).and_then(|q| q.pop_front()) {
                let low = state.queues.get(&key).map_or(0, |q| q.len()) < REFILL_THRESHOLD;
                drop(state);
                if low {
                    self.prefetch(mode, duration_secs);
                }
                return text;
            }

            if !state.in_flight.contains(&key) {
                state.in_flight.insert(key);
                drop(state);

                // Fetch a whole batch so concurrent waiters drain the
                // queue instead of issuing their own fetches.
                let mut texts = self.fetch_or_compose(mode, duration_secs, CACHE_TARGET);
                let text = texts
                    .first()
                    .cloned()
                    .unwrap_or_else(|| PLACEHOLDER_TEXT.to_string());

                let mut state = self.state.lock().unwrap();
                state.in_flight.remove(&key);
                if texts.len() > 1 {
                    state.queues.entry(key).or_default().extend(texts.drain(1..));
                }
                return text;
            }

            drop(state);
            thread::sleep(INFLIGHT_RETRY);
        }
    }

    /// Number of cached entries for a key right now.
    pub fn cached_len(&self, mode: Mode, duration_secs: u32) -> usize {
        let state = self.state.lock().unwrap();
        state
            .queues
            .get(&(mode, duration_secs))
            .map_or(0, |q| q.len())
    }

    fn fetch_or_compose(&self, mode: Mode, duration_secs: u32, count: usize) -> Vec<String> {
        match self.provider.fetch_texts(mode, duration_secs, count) {
            Ok(texts) if !texts.is_empty() => texts,
            _ => {
                let composed: Vec<String> = match &self.fallback_corpus {
                    Some(corpus) => (0..count)
                        .filter_map(|_| compose_text(corpus, duration_secs))
                        .collect(),
                    None => {
                        let corpus = Corpus::for_mode(mode);
                        (0..count)
                            .filter_map(|_| compose_text(&corpus, duration_secs))
                            .collect()
                    }
                };
                composed
            }
        }
    }
}
