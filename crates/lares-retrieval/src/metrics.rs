//! Category coverage, hint-mapping, and gating-recall statistics.
//!
//! Offline evaluation helpers: how complete the catalog's category labels
//! are, how often type hints land in the closed category set, and whether
//! gating helps or hurts recall over labeled cases. Nothing here runs in
//! the resolution path.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use lares_devices::map_type_to_category;

/// Category label completeness over raw catalog items.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CategoryCoverage {
    pub total: usize,
    pub with_category: usize,
    pub missing: usize,
    pub coverage_rate: f64,
    pub missing_rate: f64,
}

/// How often type hints resolve into the closed category set.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MappingStats {
    pub total: usize,
    /// Hints that were present and non-blank.
    pub with_type_hint: usize,
    /// Hints the category mapping resolved.
    pub hits: usize,
    /// `hits / with_type_hint`.
    pub hit_rate: f64,
    /// `hits / total`.
    pub trigger_rate: f64,
}

/// One labeled case for the gated-versus-ungated recall comparison.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecallCase {
    /// Device ids a human accepted as correct.
    pub expected_ids: Vec<String>,
    /// Ranked ids produced with category gating on.
    pub gated_ids: Vec<String>,
    /// Ranked ids produced with gating off.
    pub ungated_ids: Vec<String>,
}

/// Recall@k curves for gated and ungated retrieval.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RecallComparison {
    pub gated: BTreeMap<usize, f64>,
    pub ungated: BTreeMap<usize, f64>,
    pub total: usize,
}

/// Count catalog items that declare at least one category.
///
/// Items follow the external catalog shape: categories live under
/// `components[].categories[].name`.
pub fn compute_category_coverage<'a>(items: impl IntoIterator<Item = &'a Value>) -> CategoryCoverage {
    let mut total = 0;
    let mut with_category = 0;
    for item in items {
        total += 1;
        if item_has_category(item) {
            with_category += 1;
        }
    }

    let missing = total - with_category;
    CategoryCoverage {
        total,
        with_category,
        missing,
        coverage_rate: ratio(with_category, total),
        missing_rate: ratio(missing, total),
    }
}

/// Hit and trigger rates for the type-hint mapping over observed hints.
pub fn compute_mapping_stats<'a>(
    type_hints: impl IntoIterator<Item = Option<&'a str>>,
) -> MappingStats {
    let mut total = 0;
    let mut with_type_hint = 0;
    let mut hits = 0;

    for hint in type_hints {
        total += 1;
        let Some(hint) = hint.map(str::trim).filter(|hint| !hint.is_empty()) else {
            continue;
        };
        with_type_hint += 1;
        if map_type_to_category(hint).is_some() {
            hits += 1;
        }
    }

    MappingStats {
        total,
        with_type_hint,
        hits,
        hit_rate: ratio(hits, with_type_hint),
        trigger_rate: ratio(hits, total),
    }
}

/// Compare recall@k with gating on and off over labeled cases.
///
/// Non-positive k values are dropped; duplicates collapse.
pub fn compare_gating_recall(cases: &[RecallCase], k_values: &[usize]) -> RecallComparison {
    let ks: BTreeSet<usize> = k_values.iter().copied().filter(|k| *k > 0).collect();
    let total = cases.len();

    let mut comparison = RecallComparison {
        total,
        ..RecallComparison::default()
    };
    for k in ks {
        let gated_hits = cases
            .iter()
            .filter(|case| has_recall(&case.expected_ids, &case.gated_ids, k))
            .count();
        let ungated_hits = cases
            .iter()
            .filter(|case| has_recall(&case.expected_ids, &case.ungated_ids, k))
            .count();
        comparison.gated.insert(k, ratio(gated_hits, total));
        comparison.ungated.insert(k, ratio(ungated_hits, total));
    }
    comparison
}

/// Whether any expected id appears in the top k of a ranking.
///
/// Vacuously true for an empty expectation.
fn has_recall(expected_ids: &[String], ranked_ids: &[String], k: usize) -> bool {
    if expected_ids.is_empty() {
        return true;
    }
    let top: BTreeSet<&str> = ranked_ids.iter().take(k).map(String::as_str).collect();
    expected_ids.iter().any(|id| top.contains(id.as_str()))
}

fn item_has_category(item: &Value) -> bool {
    let Some(components) = item.get("components").and_then(Value::as_array) else {
        return false;
    };
    components.iter().any(|component| {
        component
            .get("categories")
            .and_then(Value::as_array)
            .is_some_and(|categories| {
                categories.iter().any(|category| {
                    category
                        .get("name")
                        .and_then(Value::as_str)
                        .is_some_and(|name| !name.is_empty())
                })
            })
    })
}

fn ratio(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_category_coverage_counts_labeled_items() {
        let items = vec![
            json!({ "components": [{ "categories": [{ "name": "Light" }] }] }),
            json!({ "components": [{ "categories": [{ "name": "" }] }] }),
            json!({ "components": [] }),
            json!({}),
        ];

        let coverage = compute_category_coverage(&items);
        assert_eq!(coverage.total, 4);
        assert_eq!(coverage.with_category, 1);
        assert_eq!(coverage.missing, 3);
        assert!((coverage.coverage_rate - 0.25).abs() < 1e-9);
        assert!((coverage.missing_rate - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_category_coverage_empty_input() {
        let coverage = compute_category_coverage(&[]);
        assert_eq!(coverage.total, 0);
        assert_eq!(coverage.coverage_rate, 0.0);
    }

    #[test]
    fn test_mapping_stats_rates() {
        let hints = vec![
            Some("Light"),
            Some("lamp"),
            Some("mystery-gadget"),
            Some("   "),
            None,
        ];

        let stats = compute_mapping_stats(hints);
        assert_eq!(stats.total, 5);
        assert_eq!(stats.with_type_hint, 3);
        assert_eq!(stats.hits, 2);
        assert!((stats.hit_rate - 2.0 / 3.0).abs() < 1e-9);
        assert!((stats.trigger_rate - 0.4).abs() < 1e-9);
    }

    #[test]
    fn test_recall_comparison_curves() {
        let cases = vec![
            RecallCase {
                expected_ids: vec!["d1".to_string()],
                gated_ids: vec!["d1".to_string(), "d2".to_string()],
                ungated_ids: vec!["d9".to_string(), "d8".to_string(), "d1".to_string()],
            },
            RecallCase {
                expected_ids: vec!["d5".to_string()],
                gated_ids: vec!["d5".to_string()],
                ungated_ids: vec!["d7".to_string()],
            },
        ];

        let comparison = compare_gating_recall(&cases, &[1, 3, 3, 0]);
        assert_eq!(comparison.total, 2);
        // k=0 dropped, duplicate k=3 collapsed.
        assert_eq!(comparison.gated.keys().copied().collect::<Vec<_>>(), vec![1, 3]);

        assert!((comparison.gated[&1] - 1.0).abs() < 1e-9);
        assert!((comparison.ungated[&1] - 0.0).abs() < 1e-9);
        assert!((comparison.gated[&3] - 1.0).abs() < 1e-9);
        assert!((comparison.ungated[&3] - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_recall_vacuous_on_empty_expectation() {
        let cases = vec![RecallCase::default()];
        let comparison = compare_gating_recall(&cases, &[5]);
        assert!((comparison.gated[&5] - 1.0).abs() < 1e-9);
        assert!((comparison.ungated[&5] - 1.0).abs() < 1e-9);
    }
}
