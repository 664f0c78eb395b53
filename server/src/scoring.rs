use std::collections::HashSet;
use std::net::SocketAddr;

/// Result of judging one guess against the secret word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuessVerdict {
    Correct,
    Wrong,
    /// The player already solved this round; the guess is ignored.
    AlreadySolved,
}

/// Tracks who has guessed the word in the current round.
#[derive(Debug, Default)]
pub struct GuessBook {
    solved: HashSet<SocketAddr>,
}

impl GuessBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Exact comparison, no trimming or case folding. A correct guess is
    /// recorded, so each player scores at most once per round.
    pub fn judge(&mut self, addr: SocketAddr, guess: &str, secret: &str) -> GuessVerdict {
        if self.solved.contains(&addr) {
            GuessVerdict::AlreadySolved
        } else if guess == secret {
            self.solved.insert(addr);
            GuessVerdict::Correct
        } else {
            GuessVerdict::Wrong
        }
    }

    /// True when at least one player solved and every one of `guessers`
    /// (the non-painters) has.
    pub fn all_solved(&self, guessers: usize) -> bool {
        guessers > 0 && self.solved.len() >= guessers
    }

    pub fn forget(&mut self, addr: &SocketAddr) {
        self.solved.remove(addr);
    }

    pub fn reset(&mut self) {
        self.solved.clear();
    }

    pub fn len(&self) -> usize {
        self.solved.len()
    }

    pub fn is_empty(&self) -> bool {
        self.solved.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([10, 0, 0, 1], port))
    }

    #[test]
    fn test_correct_guess_scores_once() {
        let mut book = GuessBook::new();
        assert_eq!(book.judge(addr(1), "kite", "kite"), GuessVerdict::Correct);
        assert_eq!(book.judge(addr(1), "kite", "kite"), GuessVerdict::AlreadySolved);
        assert_eq!(book.len(), 1);
    }

    #[test]
    fn test_no_normalization() {
        let mut book = GuessBook::new();
        assert_eq!(book.judge(addr(1), "Kite", "kite"), GuessVerdict::Wrong);
        assert_eq!(book.judge(addr(1), "kite ", "kite"), GuessVerdict::Wrong);
        assert!(book.is_empty());
    }

    #[test]
    fn test_all_solved() {
        let mut book = GuessBook::new();
        assert!(!book.all_solved(0));
        assert!(!book.all_solved(2));
        book.judge(addr(1), "kite", "kite");
        assert!(!book.all_solved(2));
        book.judge(addr(2), "kite", "kite");
        assert!(book.all_solved(2));
    }

    #[test]
    fn test_forget_and_reset() {
        let mut book = GuessBook::new();
        book.judge(addr(1), "kite", "kite");
        book.judge(addr(2), "kite", "kite");
        book.forget(&addr(1));
        assert_eq!(book.len(), 1);
        assert_eq!(book.judge(addr(2), "kite", "kite"), GuessVerdict::AlreadySolved);
        book.reset();
        assert!(book.is_empty());
    }
}
