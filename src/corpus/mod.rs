use clap::ValueEnum;
use include_dir::{include_dir, Dir};
use serde::Deserialize;
use serde_json::from_str;
use std::error::Error;

static CORPUS_DIR: Dir = include_dir!("src/corpus");

/// Practice category a session draws its text from.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, ValueEnum, strum_macros::Display)]
pub enum Mode {
    Normal,
    Flirty,
    Developer,
    Python,
    Java,
    CSharp,
    Go,
}

/// Coarse grouping used by the mode-preview policy.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ModeCategory {
    Plain,
    Romantic,
    Programming,
}

impl Mode {
    pub const ALL: [Mode; 7] = [
        Mode::Normal,
        Mode::Flirty,
        Mode::Developer,
        Mode::Python,
        Mode::Java,
        Mode::CSharp,
        Mode::Go,
    ];

    pub fn category(&self) -> ModeCategory {
        match self {
            Mode::Normal => ModeCategory::Plain,
            Mode::Flirty => ModeCategory::Romantic,
            Mode::Developer | Mode::Python | Mode::Java | Mode::CSharp | Mode::Go => {
                ModeCategory::Programming
            }
        }
    }

    pub fn file_name(&self) -> String {
        self.to_string().to_lowercase()
    }

    /// Lenient parse for mode strings coming back from persisted settings
    /// or history rows. Unknown strings fall back to Normal.
    pub fn parse_or_default(s: &str) -> Mode {
        Mode::ALL
            .into_iter()
            .find(|m| m.file_name() == s.to_lowercase())
            .unwrap_or(Mode::Normal)
    }
}

#[derive(Deserialize, Clone, Debug)]
pub struct Corpus {
    pub name: String,
    pub passages: Vec<String>,
}

impl Corpus {
    /// Load the embedded corpus for a mode. A mode without a bundled
    /// corpus file silently falls back to the normal corpus.
    pub fn for_mode(mode: Mode) -> Self {
        read_corpus_from_file(format!("{}.json", mode.file_name()))
            .or_else(|_| read_corpus_from_file("normal.json".to_string()))
            .expect("default corpus missing from binary")
    }
}

fn read_corpus_from_file(file_name: String) -> Result<Corpus, Box<dyn Error>> {
    let file = CORPUS_DIR
        .get_file(file_name)
        .ok_or("corpus file not found")?;

    let file_as_str = file
        .contents_utf8()
        .ok_or("unable to interpret corpus file as a string")?;

    let mut corpus: Corpus = from_str(file_as_str)?;

    // Hard tabs (the go snippets) become two spaces so the tab key's
    // two-space match is the only indentation rule the session needs.
    for passage in &mut corpus.passages {
        if passage.contains('\t') {
            *passage = passage.replace('\t', "  ");
        }
    }

    Ok(corpus)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_mode_has_a_corpus() {
        for mode in Mode::ALL {
            let corpus = Corpus::for_mode(mode);
            assert!(!corpus.passages.is_empty(), "{mode} corpus is empty");
            for passage in &corpus.passages {
                assert!(!passage.is_empty());
            }
        }
    }

    #[test]
    fn test_corpus_names_match_modes() {
        assert_eq!(Corpus::for_mode(Mode::Normal).name, "normal");
        assert_eq!(Corpus::for_mode(Mode::Go).name, "go");
    }

    #[test]
    fn test_tabs_are_normalized() {
        let corpus = Corpus::for_mode(Mode::Go);
        for passage in &corpus.passages {
            assert!(!passage.contains('\t'));
        }
        assert!(corpus.passages.iter().any(|p| p.contains("  ")));
    }

    #[test]
    fn test_parse_or_default() {
        assert_eq!(Mode::parse_or_default("python"), Mode::Python);
        assert_eq!(Mode::parse_or_default("CSHARP"), Mode::CSharp);
        assert_eq!(Mode::parse_or_default("klingon"), Mode::Normal);
        assert_eq!(Mode::parse_or_default(""), Mode::Normal);
    }

    #[test]
    fn test_categories() {
        assert_eq!(Mode::Normal.category(), ModeCategory::Plain);
        assert_eq!(Mode::Flirty.category(), ModeCategory::Romantic);
        for mode in [Mode::Developer, Mode::Python, Mode::Java, Mode::CSharp, Mode::Go] {
            assert_eq!(mode.category(), ModeCategory::Programming);
        }
    }

    #[test]
    fn test_corpus_deserialization() {
        let json_data = r#"
        {
            "name": "test",
            "passages": ["hello world", "pack my box"]
        }
        "#;

        let corpus: Corpus = from_str(json_data).expect("failed to deserialize test corpus");

        assert_eq!(corpus.name, "test");
        assert_eq!(corpus.passages.len(), 2);
    }
}
