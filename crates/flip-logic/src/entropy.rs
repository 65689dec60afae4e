//! Outcome randomness
//!
//! The engine only ever asks an [`EntropySource`] for one bit per
//! settlement. The source is never shown the request, so the outcome
//! cannot depend on anything a participant supplies.

use serde::{Deserialize, Serialize};

use crate::random::SeededRng;

/// Which side of the wager takes the pool
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Outcome {
    InitiatorWins,
    CounterpartyWins,
}

impl Outcome {
    pub fn from_bit(initiator_wins: bool) -> Self {
        if initiator_wins {
            Outcome::InitiatorWins
        } else {
            Outcome::CounterpartyWins
        }
    }
}

/// Supplier of unbiased, unpredictable bits.
pub trait EntropySource {
    fn flip(&mut self) -> bool;
}

impl<F: FnMut() -> bool> EntropySource for F {
    fn flip(&mut self) -> bool {
        self()
    }
}

impl EntropySource for SeededRng {
    fn flip(&mut self) -> bool {
        self.next_bit()
    }
}

/// Operating-system CSPRNG
#[cfg(feature = "os-entropy")]
#[derive(Clone, Copy, Debug, Default)]
pub struct OsEntropy;

#[cfg(feature = "os-entropy")]
impl EntropySource for OsEntropy {
    fn flip(&mut self) -> bool {
        use rand::Rng;
        rand::rngs::OsRng.gen::<bool>()
    }
}

/// Draw the outcome of one settlement.
pub fn decide<E: EntropySource + ?Sized>(source: &mut E) -> Outcome {
    Outcome::from_bit(source.flip())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closure_source() {
        let mut bits = [true, false, false].into_iter();
        let mut source = move || bits.next().unwrap_or(true);
        assert_eq!(decide(&mut source), Outcome::InitiatorWins);
        assert_eq!(decide(&mut source), Outcome::CounterpartyWins);
        assert_eq!(decide(&mut source), Outcome::CounterpartyWins);
    }

    #[test]
    fn test_seeded_source_is_reproducible() {
        let mut a = SeededRng::from_u64(99);
        let mut b = SeededRng::from_u64(99);
        let xs: Vec<_> = (0..64).map(|_| decide(&mut a)).collect();
        let ys: Vec<_> = (0..64).map(|_| decide(&mut b)).collect();
        assert_eq!(xs, ys);
    }

    #[cfg(feature = "os-entropy")]
    #[test]
    fn test_os_entropy_is_balanced() {
        // 10_000 draws: 5 sigma is 250
        let mut source = OsEntropy;
        let wins = (0..10_000)
            .filter(|_| decide(&mut source) == Outcome::InitiatorWins)
            .count();
        assert!((4_750..=5_250).contains(&wins), "{} initiator wins out of 10000", wins);
    }
}
