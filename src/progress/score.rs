/// Points awarded by the reward trigger. Survives daily-progress resets.
#[derive(Debug, Clone, Default)]
pub struct Scoreboard {
    score: u64,
}

impl Scoreboard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn award(&mut self, points: u32) -> u64 {
        self.score = self.score.saturating_add(u64::from(points));
        self.score
    }

    pub fn score(&self) -> u64 {
        self.score
    }

    pub fn reset_score(&mut self) {
        self.score = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn awards_accumulate_until_reset() {
        let mut board = Scoreboard::new();
        assert_eq!(board.award(1), 1);
        assert_eq!(board.award(2), 3);
        board.reset_score();
        assert_eq!(board.score(), 0);
    }
}
