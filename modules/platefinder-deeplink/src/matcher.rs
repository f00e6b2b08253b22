//! Candidate scoring when several URLs pass validation.
//!
//! Names are normalized (lowercase, punctuation stripped, generic venue
//! suffixes removed) before containment checks. Title hit +50, snippet hit
//! +20, city hit +30; threshold 50; ties break on earliest search rank.

use websearch_client::SearchHit;

pub const MATCH_THRESHOLD: i32 = 50;

const GENERIC_SUFFIXES: &[&str] = &["restaurant", "bar", "cafe", "grill", "bbq"];

/// Lowercase, drop punctuation, remove generic venue words, collapse spaces.
pub fn normalize_name(name: &str) -> String {
    let lowered = name.to_lowercase();
    let cleaned: String = lowered
        .chars()
        .map(|c| if c.is_alphanumeric() || c == ' ' { c } else { ' ' })
        .collect();
    cleaned
        .split_whitespace()
        .filter(|w| !GENERIC_SUFFIXES.contains(w))
        .collect::<Vec<&str>>()
        .join(" ")
}

pub fn score_candidate(hit: &SearchHit, name_norm: &str, city_norm: Option<&str>) -> i32 {
    let title = hit.title.to_lowercase();
    let snippet = hit.snippet.to_lowercase();
    let mut score = 0;

    if !name_norm.is_empty() {
        if title.contains(name_norm) {
            score += 50;
        }
        if snippet.contains(name_norm) {
            score += 20;
        }
    }
    if let Some(city) = city_norm {
        if !city.is_empty() && (title.contains(city) || snippet.contains(city)) {
            score += 30;
        }
    }
    score
}

/// Choose among validated candidates, given in search-rank order. The best
/// score at or above the threshold wins; ties go to the earliest rank. When
/// nothing clears the threshold the earliest validated candidate stands —
/// host and path validation is the hard guarantee, scoring only
/// disambiguates.
pub fn pick_best<'a>(
    validated: &'a [SearchHit],
    name: &str,
    city: Option<&str>,
) -> Option<&'a SearchHit> {
    if validated.is_empty() {
        return None;
    }
    if validated.len() == 1 {
        return validated.first();
    }

    let name_norm = normalize_name(name);
    let city_norm = city.map(normalize_name);

    let mut best: Option<(i32, usize)> = None;
    for (rank, hit) in validated.iter().enumerate() {
        let score = score_candidate(hit, &name_norm, city_norm.as_deref());
        if score >= MATCH_THRESHOLD {
            let better = match best {
                Some((best_score, _)) => score > best_score,
                None => true,
            };
            if better {
                best = Some((score, rank));
            }
        }
    }

    match best {
        Some((_, rank)) => validated.get(rank),
        None => validated.first(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(title: &str, url: &str, snippet: &str) -> SearchHit {
        SearchHit {
            title: title.to_string(),
            url: url.to_string(),
            snippet: snippet.to_string(),
        }
    }

    #[test]
    fn normalization_strips_suffixes_and_punctuation() {
        assert_eq!(normalize_name("Pizza Joe's Restaurant!"), "pizza joe s");
        assert_eq!(normalize_name("The Grill BBQ Bar"), "the");
        assert_eq!(normalize_name("Café Noir"), "café noir");
    }

    #[test]
    fn scoring_adds_up() {
        let h = hit(
            "Pizza Joe - Wolt",
            "https://wolt.com/r",
            "Order from Pizza Joe in Tel Aviv",
        );
        let score = score_candidate(&h, "pizza joe", Some("tel aviv"));
        assert_eq!(score, 50 + 20 + 30);
    }

    #[test]
    fn best_scorer_wins_over_rank() {
        let candidates = vec![
            hit("Some Other Place", "https://wolt.com/a", ""),
            hit("Pizza Joe — order online", "https://wolt.com/b", "Pizza Joe, Tel Aviv"),
        ];
        let best = pick_best(&candidates, "Pizza Joe", Some("Tel Aviv")).unwrap();
        assert_eq!(best.url, "https://wolt.com/b");
    }

    #[test]
    fn tie_breaks_on_earliest_rank() {
        let candidates = vec![
            hit("Pizza Joe", "https://wolt.com/first", ""),
            hit("Pizza Joe", "https://wolt.com/second", ""),
        ];
        let best = pick_best(&candidates, "Pizza Joe", None).unwrap();
        assert_eq!(best.url, "https://wolt.com/first");
    }

    #[test]
    fn below_threshold_falls_back_to_first_validated() {
        let candidates = vec![
            hit("Unrelated A", "https://wolt.com/a", ""),
            hit("Unrelated B", "https://wolt.com/b", ""),
        ];
        let best = pick_best(&candidates, "Pizza Joe", None).unwrap();
        assert_eq!(best.url, "https://wolt.com/a");
    }

    #[test]
    fn single_candidate_is_taken_as_is() {
        let candidates = vec![hit("whatever", "https://wolt.com/only", "")];
        assert_eq!(
            pick_best(&candidates, "Pizza Joe", None).unwrap().url,
            "https://wolt.com/only"
        );
    }
}
