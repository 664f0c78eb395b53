use crate::error::{GameError, GameResult};
use rand::seq::SliceRandom;
use rand::Rng;
use std::fs;
use std::path::Path;

const BUILTIN_WORDS: &[&str] = &[
    "apple", "banana", "bicycle", "castle", "cloud", "dragon", "elephant", "guitar",
    "house", "island", "jellyfish", "kite", "lighthouse", "mountain", "octopus",
    "penguin", "pizza", "rainbow", "rocket", "snowman", "spider", "sunflower",
    "tornado", "umbrella", "volcano", "whale",
];

/// The fixed pool secret words are drawn from.
#[derive(Debug, Clone)]
pub struct WordList {
    words: Vec<String>,
}

impl WordList {
    /// Parses one word per line, skipping blanks and `#` comments.
    pub fn parse(source: &str) -> Self {
        let words = source
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(str::to_string)
            .collect();
        Self { words }
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> GameResult<Self> {
        let path = path.as_ref();
        let list = Self::parse(&fs::read_to_string(path)?);
        if list.is_empty() {
            return Err(GameError::Config(format!(
                "word list {} contains no words",
                path.display()
            )));
        }
        Ok(list)
    }

    pub fn from_words<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            words: words.into_iter().map(Into::into).collect(),
        }
    }

    /// Picks a word uniformly at random.
    pub fn choose<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<&str> {
        self.words.choose(rng).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

impl Default for WordList {
    fn default() -> Self {
        Self::from_words(BUILTIN_WORDS.iter().copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_parse_skips_comments_and_blanks() {
        let list = WordList::parse("# animals\ncat\n\n  dog  \n#fish\nowl");
        assert_eq!(list.len(), 3);
    }

    #[test]
    fn test_choose_returns_member() {
        let list = WordList::from_words(["cat", "dog"]);
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..20 {
            let word = list.choose(&mut rng).unwrap();
            assert!(word == "cat" || word == "dog");
        }
    }

    #[test]
    fn test_choose_on_empty_list() {
        let list = WordList::from_words(Vec::<String>::new());
        assert!(list.choose(&mut rand::thread_rng()).is_none());
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = WordList::from_file("/definitely/not/here.txt").unwrap_err();
        assert!(matches!(err, GameError::Io(_)));
    }
}
