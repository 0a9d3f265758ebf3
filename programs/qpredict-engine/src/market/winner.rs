use crate::state::market::{ResolutionSpec, ResolutionType};

/// Winner determination per resolution type (spec.md §4.3):
/// - `above`   => winner iff `price >= target`
/// - `below`   => winner iff `price <= target`
/// - `range`   => winner iff `target <= price <= target_high`
/// - `bracket` => first option index `i` with `price < boundaries[i]`,
///   else the last option. Boundaries come from `ai_resolution_proof`'s
///   `brackets` array when present, otherwise are evenly spaced between
///   `target` and `target_high`.
///
/// `above`/`below`/`range` only ever have two options (yes/no) so they
/// return a fixed index; `bracket` needs `option_count` to know where
/// the boundary list ends and to compute the even spacing fallback.
pub fn determine_winner(
    resolution: &ResolutionSpec,
    price: Option<f64>,
    explicit_brackets: Option<&[f64]>,
) -> Option<u8> {
    determine_winner_with_options(resolution, price, explicit_brackets, 2)
}

pub fn determine_winner_with_options(
    resolution: &ResolutionSpec,
    price: Option<f64>,
    explicit_brackets: Option<&[f64]>,
    option_count: usize,
) -> Option<u8> {
    let p = price?;
    match resolution.kind {
        ResolutionType::Above => Some(if p >= resolution.target { 0 } else { 1 }),
        ResolutionType::Below => Some(if p <= resolution.target { 0 } else { 1 }),
        ResolutionType::Range => {
            let high = resolution.target_high?;
            Some(if resolution.target <= p && p <= high { 0 } else { 1 })
        }
        ResolutionType::Bracket => {
            let option_count = option_count.max(2);
            let boundaries: Vec<f64> = match explicit_brackets {
                Some(b) => b.to_vec(),
                None => {
                    let high = resolution.target_high?;
                    let span = high - resolution.target;
                    (1..option_count)
                        .map(|k| resolution.target + span * (k as f64) / (option_count as f64))
                        .collect()
                }
            };
            for (i, boundary) in boundaries.iter().enumerate() {
                if p < *boundary {
                    return Some(i as u8);
                }
            }
            Some((option_count - 1) as u8)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::market::ResolutionSpec;

    fn spec(kind: ResolutionType, target: f64, target_high: Option<f64>) -> ResolutionSpec {
        ResolutionSpec {
            kind,
            target,
            target_high,
        }
    }

    #[test]
    fn above_winner() {
        let r = spec(ResolutionType::Above, 100_000.0, None);
        assert_eq!(determine_winner(&r, Some(105_000.0), None), Some(0));
        assert_eq!(determine_winner(&r, Some(99_000.0), None), Some(1));
    }

    #[test]
    fn bracket_evenly_spaced() {
        let r = spec(ResolutionType::Bracket, 0.0, Some(100.0));
        // 4 options => boundaries at 25, 50, 75
        assert_eq!(
            determine_winner_with_options(&r, Some(10.0), None, 4),
            Some(0)
        );
        assert_eq!(
            determine_winner_with_options(&r, Some(60.0), None, 4),
            Some(2)
        );
        assert_eq!(
            determine_winner_with_options(&r, Some(99.0), None, 4),
            Some(3)
        );
    }
}
