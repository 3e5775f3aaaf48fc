//! Randomness used by gossip: whether to keep mongering a rumor and which
//! peer to pick. Injected so tests can force outcomes.

use rand::Rng;

pub trait Coin: Send + Sync {
    /// `true` to resend a rumor after a duplicate answer.
    fn keep_mongering(&self) -> bool;

    /// An index in `0..len`; `len` is never zero.
    fn pick(&self, len: usize) -> usize;
}

pub struct RandomCoin {
    stop_probability: f64,
}

impl RandomCoin {
    pub fn new(stop_probability: f64) -> Self {
        Self {
            stop_probability: stop_probability.clamp(0.0, 1.0),
        }
    }
}

impl Coin for RandomCoin {
    fn keep_mongering(&self) -> bool {
        !rand::thread_rng().gen_bool(self.stop_probability)
    }

    fn pick(&self, len: usize) -> usize {
        if len <= 1 {
            return 0;
        }
        rand::thread_rng().gen_range(0..len)
    }
}

#[cfg(test)]
pub use scripted::ScriptedCoin;


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_coin_extremes() {
        let always_stop = RandomCoin::new(1.0);
        let never_stop = RandomCoin::new(0.0);
        for _ in 0..50 {
            assert!(!always_stop.keep_mongering());
            assert!(never_stop.keep_mongering());
        }
    }

    #[test]
    fn test_pick_in_range() {
        let coin = RandomCoin::new(0.5);
        assert_eq!(coin.pick(1), 0);
        for _ in 0..50 {
            assert!(coin.pick(3) < 3);
        }
    }

    #[test]
    fn test_scripted_coin() {
        let coin = ScriptedCoin::new([true, false], true);
        assert!(coin.keep_mongering());
        assert!(!coin.keep_mongering());
        assert!(coin.keep_mongering());
        assert_eq!(coin.calls(), 3);
    }
}
