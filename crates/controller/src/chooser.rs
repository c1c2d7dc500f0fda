use rand::seq::SliceRandom;
use shared::domain::ShotId;

/// Picks which of several equally good shots a view should jump to.
pub trait ShotChooser: Send {
    fn choose(&mut self, candidates: &[ShotId]) -> Option<ShotId>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct RandomShotChooser;

impl ShotChooser for RandomShotChooser {
    fn choose(&mut self, candidates: &[ShotId]) -> Option<ShotId> {
        candidates.choose(&mut rand::thread_rng()).cloned()
    }
}

/// Deterministic choice: the smallest shot id.
#[derive(Debug, Default, Clone, Copy)]
pub struct FirstSortedChooser;

impl ShotChooser for FirstSortedChooser {
    fn choose(&mut self, candidates: &[ShotId]) -> Option<ShotId> {
        candidates.iter().min().cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_choice_stays_within_candidates() {
        let candidates = vec![ShotId::from("s1"), ShotId::from("s3")];
        let mut chooser = RandomShotChooser;
        for _ in 0..20 {
            let chosen = chooser.choose(&candidates).expect("choice");
            assert!(candidates.contains(&chosen));
        }
        assert_eq!(chooser.choose(&[]), None);
    }

    #[test]
    fn first_sorted_picks_smallest_id() {
        let candidates = vec![ShotId::from("s4"), ShotId::from("s2"), ShotId::from("s3")];
        assert_eq!(
            FirstSortedChooser.choose(&candidates),
            Some(ShotId::from("s2"))
        );
    }
}
