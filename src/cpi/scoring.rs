use crate::models::SeriesDescriptor;

/// Catalog frequency code of monthly series.
pub const MONTHLY_FREQUENCY: &str = "R/P1M";

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

/// Scores a catalog candidate as the general-level CPI series.
///
/// `None` means the candidate is excluded: not monthly, a variation or percentage
/// field, or a discontinued dataset other than the 2016-base one.
pub fn score_candidate(candidate: &SeriesDescriptor) -> Option<i32> {
    if candidate.frequency.trim() != MONTHLY_FREQUENCY {
        return None;
    }

    let desc = candidate.description.to_lowercase();
    let title = candidate.title.to_lowercase();
    let units = candidate.units.to_lowercase();

    if contains_any(&desc, &["variaci", "variation"]) || contains_any(&units, &["porcentaje", "percent"]) {
        return None;
    }
    if contains_any(&title, &["discontinuada", "discontinued"]) && !title.contains("2016") {
        return None;
    }

    let general_level = ["nivel general", "general level"];
    let index = ["índice", "indice", "index"];

    let mut score = 0;
    if contains_any(&desc, &general_level) || contains_any(&title, &general_level) {
        score += 2;
    }
    if contains_any(&desc, &index) || contains_any(&title, &index) || contains_any(&units, &index) {
        score += 2;
    }
    if contains_any(&title, &["nacional", "national"]) {
        score += 1;
    }
    if contains_any(&title, &["consumidor", "consumer"]) {
        score += 1;
    }
    Some(score)
}

/// Highest-scoring candidate id; ties keep the first seen. Falls back to `default_id`.
pub fn select_series_id(candidates: &[SeriesDescriptor], default_id: &str) -> String {
    let mut best: Option<(&str, i32)> = None;
    for candidate in candidates {
        let score = match score_candidate(candidate) {
            Some(s) => s,
            None => continue,
        };
        if candidate.id.is_empty() {
            continue;
        }
        if best.map_or(true, |(_, top)| score > top) {
            best = Some((candidate.id.as_str(), score));
        }
    }

    match best {
        Some((id, score)) => {
            tracing::debug!("Selected CPI series {} (score {})", id, score);
            id.to_string()
        }
        None => {
            tracing::info!("No CPI candidate qualified, using default series {}", default_id);
            default_id.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(id: &str, description: &str, title: &str, units: &str, frequency: &str) -> SeriesDescriptor {
        SeriesDescriptor {
            id: id.to_string(),
            description: description.to_string(),
            title: title.to_string(),
            units: units.to_string(),
            frequency: frequency.to_string(),
        }
    }

    #[test]
    fn test_general_level_index_wins() {
        let candidates = vec![
            candidate("a", "IPC regional", "Índice de precios al consumidor", "Índice", "R/P1M"),
            candidate("b", "IPC Nivel General Nacional", "Índice de Precios al Consumidor Nacional", "Índice dic-2016=100", "R/P1M"),
        ];
        assert_eq!(score_candidate(&candidates[0]), Some(3));
        assert_eq!(score_candidate(&candidates[1]), Some(6));
        assert_eq!(select_series_id(&candidates, "default"), "b");
    }

    #[test]
    fn test_exclusions() {
        assert_eq!(score_candidate(&candidate("q", "Nivel general", "IPC", "Índice", "R/P3M")), None);
        assert_eq!(score_candidate(&candidate("v", "Variación mensual nivel general", "IPC", "Índice", "R/P1M")), None);
        assert_eq!(score_candidate(&candidate("p", "Nivel general", "IPC", "Porcentaje", "R/P1M")), None);
        assert_eq!(score_candidate(&candidate("d", "Nivel general", "IPC (discontinuada)", "Índice", "R/P1M")), None);
        assert!(score_candidate(&candidate("d16", "Nivel general", "IPC base 2016 (discontinuada)", "Índice", "R/P1M")).is_some());
    }

    #[test]
    fn test_english_terms_and_case() {
        let c = candidate("en", "CPI GENERAL LEVEL", "National Consumer Price Index", "index", "R/P1M");
        assert_eq!(score_candidate(&c), Some(6));
    }

    #[test]
    fn test_ties_keep_first_seen() {
        let candidates = vec![
            candidate("first", "nivel general", "ipc", "", "R/P1M"),
            candidate("second", "nivel general", "ipc", "", "R/P1M"),
        ];
        assert_eq!(select_series_id(&candidates, "default"), "first");
    }

    #[test]
    fn test_fallback_to_default() {
        let candidates = vec![candidate("x", "variación", "ipc", "", "R/P1M")];
        assert_eq!(select_series_id(&candidates, "101.1_I2NG_2016_M_22"), "101.1_I2NG_2016_M_22");
        assert_eq!(select_series_id(&[], "dflt"), "dflt");
    }
}
