//! Vote tally: which option indices hold the most votes.

/// Outcome of counting a closed poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tally {
    /// Nobody voted.
    NoVotes,
    /// Exactly one option holds the maximum.
    Winner(usize),
    /// Several options share the maximum; indices are ascending.
    Tie(Vec<usize>),
}

impl Tally {
    /// All indices at the maximum, empty for `NoVotes`.
    pub fn winners(&self) -> Vec<usize> {
        match self {
            Tally::NoVotes => Vec::new(),
            Tally::Winner(i) => vec![*i],
            Tally::Tie(indices) => indices.clone(),
        }
    }

    /// Lowest winning index. Rerun polls settle ties with this.
    pub fn resolve_first(&self) -> Option<usize> {
        match self {
            Tally::NoVotes => None,
            Tally::Winner(i) => Some(*i),
            Tally::Tie(indices) => indices.first().copied(),
        }
    }
}

/// Count per-option votes, in option order.
pub fn tally(counts: &[u32]) -> Tally {
    let max = counts.iter().copied().max().unwrap_or(0);
    if max == 0 {
        return Tally::NoVotes;
    }

    let winners: Vec<usize> = counts
        .iter()
        .enumerate()
        .filter(|&(_, &count)| count == max)
        .map(|(i, _)| i)
        .collect();

    match winners.as_slice() {
        [single] => Tally::Winner(*single),
        _ => Tally::Tie(winners),
    }
}

/// Per-option counts from individual answers (`answers[n]` = option indices chosen by voter n).
///
/// Out-of-range indices are ignored.
pub fn counts_from_answers<'a, I>(option_count: usize, answers: I) -> Vec<u32>
where
    I: IntoIterator<Item = &'a Vec<usize>>,
{
    let mut counts = vec![0u32; option_count];
    for chosen in answers {
        for &index in chosen {
            if let Some(slot) = counts.get_mut(index) {
                *slot += 1;
            }
        }
    }
    counts
}
