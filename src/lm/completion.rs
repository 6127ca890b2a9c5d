//! Completion backends

use std::path::Path;
use std::sync::Arc;

use crate::error::ConfigError;
use crate::models::config::CompletionSettings;

use super::corpus::Document;

/// A completion model. Positions outside the document yield no candidates.
pub trait Completor: Send + Sync {
    fn complete(&self, doc: &Document, line: usize, column: usize) -> Vec<String>;

    fn name(&self) -> &'static str;
}

/// Never suggests anything
#[derive(Debug, Default)]
pub struct DummyCompletor;

impl Completor for DummyCompletor {
    fn complete(&self, _doc: &Document, _line: usize, _column: usize) -> Vec<String> {
        Vec::new()
    }

    fn name(&self) -> &'static str {
        "dummy"
    }
}

/// Suggests vocabulary words that extend the word under the cursor
#[derive(Debug)]
pub struct VocabCompletor {
    vocab: Vec<String>,
    num_results: usize,
}

impl VocabCompletor {
    pub fn new(vocab: Vec<String>, num_results: usize) -> Self {
        Self { vocab, num_results }
    }

    /// One word per line; blank lines are skipped.
    pub fn from_file(path: &Path, num_results: usize) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::InvalidValue {
            key: "completion.vocab_path".to_string(),
            message: format!("{}: {}", path.display(), e),
        })?;

        let vocab: Vec<String> = content
            .lines()
            .map(str::trim)
            .filter(|w| !w.is_empty())
            .map(String::from)
            .collect();

        tracing::info!("Loaded {} words from {}", vocab.len(), path.display());
        Ok(Self::new(vocab, num_results))
    }

    pub fn len(&self) -> usize {
        self.vocab.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vocab.is_empty()
    }
}

impl Completor for VocabCompletor {
    fn complete(&self, doc: &Document, line: usize, column: usize) -> Vec<String> {
        let Some(prefix) = doc.word_prefix(line, column) else {
            return Vec::new();
        };

        self.vocab
            .iter()
            .filter(|w| w.starts_with(prefix))
            .take(self.num_results)
            .cloned()
            .collect()
    }

    fn name(&self) -> &'static str {
        "vocab"
    }
}

/// Build the completor named by `settings.model_type`.
pub fn load_completor(
    settings: &CompletionSettings,
) -> Result<Arc<dyn Completor + Send + Sync>, ConfigError> {
    match settings.model_type.as_str() {
        "vocab" => match &settings.vocab_path {
            Some(path) => Ok(Arc::new(VocabCompletor::from_file(
                path,
                settings.num_results,
            )?)),
            None => {
                tracing::warn!("No vocabulary configured; completion falls back to dummy");
                Ok(Arc::new(DummyCompletor))
            }
        },
        "dummy" => Ok(Arc::new(DummyCompletor)),
        other => Err(ConfigError::InvalidValue {
            key: "completion.model_type".to_string(),
            message: format!("Unknown language model type: {}", other),
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn vocab_file(words: &[&str]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        for w in words {
            writeln!(file, "{}", w).unwrap();
        }
        file
    }

    #[test]
    fn test_vocab_filters_by_prefix_in_file_order() {
        let completor = VocabCompletor::new(
            vec!["help".into(), "hello".into(), "world".into(), "he".into()],
            10,
        );
        let doc = Document::new("hello world", 0);

        assert_eq!(completor.complete(&doc, 0, 2), vec!["help", "hello", "he"]);
        assert_eq!(completor.complete(&doc, 0, 5), vec!["hello"]);
        assert_eq!(completor.complete(&doc, 0, 8), vec!["world"]);
    }

    #[test]
    fn test_vocab_caps_results() {
        let completor = VocabCompletor::new(vec!["a".into(), "ab".into(), "abc".into()], 2);
        let doc = Document::new("a", 0);
        assert_eq!(completor.complete(&doc, 0, 1), vec!["a", "ab"]);
    }

    #[test]
    fn test_out_of_range_is_empty() {
        let completor = VocabCompletor::new(vec!["hello".into()], 10);
        let doc = Document::new("hello", 0);
        assert!(completor.complete(&doc, 0, 99).is_empty());
        assert!(completor.complete(&doc, 4, 0).is_empty());
        assert!(DummyCompletor.complete(&doc, 0, 1).is_empty());
    }

    #[test]
    fn test_load_completor() {
        let file = vocab_file(&["hello", "", "help"]);
        let settings = CompletionSettings {
            model_type: "vocab".to_string(),
            vocab_path: Some(file.path().to_path_buf()),
            num_results: 5,
        };
        let completor = load_completor(&settings).unwrap();
        assert_eq!(completor.name(), "vocab");
        assert_eq!(
            completor.complete(&Document::new("he", 0), 0, 2),
            vec!["hello", "help"]
        );

        let dummy = CompletionSettings {
            model_type: "dummy".to_string(),
            ..settings.clone()
        };
        assert_eq!(load_completor(&dummy).unwrap().name(), "dummy");

        let unpathed = CompletionSettings {
            vocab_path: None,
            ..settings.clone()
        };
        assert_eq!(load_completor(&unpathed).unwrap().name(), "dummy");
    }

    #[test]
    fn test_unknown_model_type() {
        let settings = CompletionSettings {
            model_type: "huggingface".to_string(),
            ..CompletionSettings::default()
        };
        let err = load_completor(&settings).err().unwrap();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_missing_vocab_file() {
        let settings = CompletionSettings {
            vocab_path: Some("/nonexistent/vocab.txt".into()),
            ..CompletionSettings::default()
        };
        assert!(load_completor(&settings).is_err());
    }
}
