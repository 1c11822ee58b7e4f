//! Catalog of contamination grades an operator can test against.

use serde::Serialize;

#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FilterOption {
    pub id: &'static str,
    pub name: &'static str,
    pub unit: &'static str,
    /// Closed range the simulated sensor draws from.
    pub min: f64,
    pub max: f64,
}

pub const FILTER_OPTIONS: [FilterOption; 5] = [
    FilterOption {
        id: "index_One",
        name: "Óleo Extremamente Limpo",
        unit: "%",
        min: 1.0,
        max: 13.0,
    },
    FilterOption {
        id: "index_Two",
        name: "Óleo Limpo",
        unit: "%",
        min: 13.0,
        max: 28.0,
    },
    FilterOption {
        id: "index_Three",
        name: "Óleo com Contaminação Moderada",
        unit: "%",
        min: 28.0,
        max: 50.0,
    },
    FilterOption {
        id: "index_Four",
        name: "Óleo Contaminado",
        unit: "%",
        min: 50.0,
        max: 80.0,
    },
    FilterOption {
        id: "index_Five",
        name: "Óleo Severamente Contaminado",
        unit: "%",
        min: 80.0,
        max: 100.0,
    },
];

pub fn find_filter(filter_id: &str) -> Option<&'static FilterOption> {
    FILTER_OPTIONS.iter().find(|filter| filter.id == filter_id)
}

/// Unit shown next to readings of `filter_id`, empty for unknown filters.
pub fn unit_for(filter_id: &str) -> &'static str {
    find_filter(filter_id).map(|filter| filter.unit).unwrap_or("")
}
