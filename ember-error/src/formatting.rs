use strsim::levenshtein;

/// Returns the candidate closest to `unknown`, if any is close enough to be a plausible typo.
///
/// A candidate differing only in letter case always wins.
pub fn did_you_mean<'a>(
    unknown: &str,
    candidates: impl IntoIterator<Item = &'a str>,
) -> Option<String> {
    let unknown_lower = unknown.to_lowercase();
    let mut best: Option<(&str, usize)> = None;
    for candidate in candidates {
        let distance = if candidate.to_lowercase() == unknown_lower {
            0
        } else {
            levenshtein(&unknown_lower, &candidate.to_lowercase())
        };
        if distance > 2 {
            continue;
        }
        if best.map_or(true, |(_, best_distance)| distance < best_distance) {
            best = Some((candidate, distance));
        }
    }
    best.map(|(candidate, _)| candidate.to_string())
}

/// Joins `items` with `", "`.
pub fn sequence_to_str<T: std::fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(|item| item.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn case_insensitive_match_first() {
        let names = ["getAInt", "getInt", "setInt"];
        assert_eq!(
            did_you_mean("GetaInt", names.iter().copied()),
            Some("getAInt".to_string())
        );
        assert_eq!(
            did_you_mean("GetInt", names.iter().copied()),
            Some("getInt".to_string())
        );
    }

    #[test]
    fn nothing_close() {
        assert_eq!(did_you_mean("Compile", ["getInt"].iter().copied()), None);
    }

    #[test]
    fn joins() {
        assert_eq!(sequence_to_str(&["number", "error"]), "number, error");
        assert_eq!(sequence_to_str::<&str>(&[]), "");
    }
}
