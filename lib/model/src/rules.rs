//! Rule-based footprint tables
//!
//! Fixed scores per questionnaire answer, used whenever a category has no
//! usable model. Answers are matched case-insensitively; a missing or unknown
//! answer scores the table's default.

use crate::category::Category;
use crate::estimator::FootprintEstimate;
use ecoprint_core::{canonical_key, UserProfile};

/// Score table for one attribute
struct RuleTable {
    attribute: &'static str,
    scores: &'static [(&'static str, f64)],
    default: f64,
}

impl RuleTable {
    fn score(&self, profile: &UserProfile) -> f64 {
        let Some(raw) = profile.text(self.attribute) else {
            return self.default;
        };
        let key = canonical_key(&raw);
        self.scores
            .iter()
            .find(|(answer, _)| canonical_key(answer) == key)
            .map_or(self.default, |(_, score)| *score)
    }
}

const DIET: RuleTable = RuleTable {
    attribute: "diet_type",
    scores: &[("Vegan", 1.5), ("Vegetarian", 2.0), ("Pescatarian", 2.5), ("Omnivore", 3.0)],
    default: 2.5,
};

const TRANSPORT_MODE: RuleTable = RuleTable {
    attribute: "transportation_mode",
    scores: &[("Public transport", 1.0), ("Private car", 3.0), ("Walking/Bicycle", 0.5)],
    default: 2.0,
};

const VEHICLE: RuleTable = RuleTable {
    attribute: "vehicle_type",
    scores: &[("Petrol", 2.5), ("Diesel", 2.0), ("Electric", 1.0), ("I don't own a vehicle", 0.0)],
    default: 1.5,
};

const HEATING: RuleTable = RuleTable {
    attribute: "heating_source",
    scores: &[("Coal", 3.0), ("Natural gas", 2.0), ("Electricity", 1.5), ("Wood", 2.5)],
    default: 2.0,
};

const EFFICIENCY: RuleTable = RuleTable {
    attribute: "home_energy_efficiency",
    scores: &[("No", 2.0), ("Sometimes", 1.5), ("Yes", 1.0)],
    default: 1.5,
};

const SHOWER: RuleTable = RuleTable {
    attribute: "shower_frequency",
    scores: &[("Daily", 1.0), ("Twice a day", 1.5), ("More frequently", 2.0), ("Less frequently", 0.8)],
    default: 1.0,
};

const HOURS: &[(&str, f64)] = &[
    ("Less than 4 hours", 0.8),
    ("4-8 hours", 1.0),
    ("8-16 hours", 1.5),
    ("More than 16 hours", 2.0),
];

const SCREEN: RuleTable = RuleTable {
    attribute: "screen_time",
    scores: HOURS,
    default: 1.0,
};

const INTERNET: RuleTable = RuleTable {
    attribute: "internet_usage",
    scores: HOURS,
    default: 1.0,
};

const CLOTHES: RuleTable = RuleTable {
    attribute: "clothes_purchases",
    scores: &[("0-10", 0.8), ("11-20", 1.2), ("21-30", 1.5), ("31+", 2.0)],
    default: 1.0,
};

const RECYCLING: RuleTable = RuleTable {
    attribute: "recycling",
    scores: &[
        ("Paper", 0.8),
        ("Plastic", 0.8),
        ("Glass", 0.8),
        ("Metal", 0.8),
        ("I do not recycle", 2.0),
    ],
    default: 1.5,
};

const TRASH_BAG: RuleTable = RuleTable {
    attribute: "trash_bag_size",
    scores: &[("Small", 0.8), ("Medium", 1.0), ("Large", 1.5), ("Extra large", 2.0)],
    default: 1.0,
};

/// Rule-based footprint of `profile` for `category`
pub fn rule_footprint(category: Category, profile: &UserProfile) -> f64 {
    match category {
        Category::Diet => DIET.score(profile),
        Category::Transportation => TRANSPORT_MODE.score(profile) + VEHICLE.score(profile),
        Category::Housing => HEATING.score(profile) * EFFICIENCY.score(profile),
        Category::Lifestyle => {
            (SHOWER.score(profile) + SCREEN.score(profile) + INTERNET.score(profile) + CLOTHES.score(profile)) / 4.0
        }
        Category::Waste => RECYCLING.score(profile) * TRASH_BAG.score(profile),
    }
}

/// Generic advice for categories whose footprint exceeds a fixed threshold,
/// in category order
pub fn rule_based_tips(estimate: &FootprintEstimate) -> Vec<String> {
    const TIPS: [(Category, f64, &str); 5] = [
        (Category::Diet, 2.0, "Consider reducing meat consumption or trying plant-based meals"),
        (Category::Transportation, 2.0, "Try using public transport or carpooling more often"),
        (
            Category::Housing,
            2.0,
            "Consider improving home insulation and using energy-efficient appliances",
        ),
        (Category::Lifestyle, 1.5, "Try reducing screen time and taking shorter showers"),
        (Category::Waste, 1.5, "Start recycling more and reduce single-use plastics"),
    ];

    TIPS.iter()
        .filter(|(category, threshold, _)| estimate.get(*category) > *threshold)
        .map(|(_, _, tip)| tip.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn profile() -> UserProfile {
        UserProfile::new("u")
            .with("diet_type", "Omnivore")
            .with("transportation_mode", "Private car")
            .with("vehicle_type", "Petrol")
            .with("heating_source", "Coal")
            .with("home_energy_efficiency", "No")
            .with("shower_frequency", "Twice a day")
            .with("screen_time", "8-16 hours")
            .with("internet_usage", "More than 16 hours")
            .with("clothes_purchases", "11-20")
            .with("recycling", "Glass")
            .with("trash_bag_size", "Large")
    }

    #[test]
    fn test_tables_match_reference_values() {
        let p = profile();
        assert_eq!(rule_footprint(Category::Diet, &p), 3.0);
        assert_eq!(rule_footprint(Category::Transportation, &p), 5.5);
        assert_eq!(rule_footprint(Category::Housing, &p), 6.0);
        assert!((rule_footprint(Category::Lifestyle, &p) - (1.5 + 1.5 + 2.0 + 1.2) / 4.0).abs() < 1e-12);
        assert!((rule_footprint(Category::Waste, &p) - 1.2).abs() < 1e-12);
    }

    #[test]
    fn test_defaults_for_missing_answers() {
        let empty = UserProfile::new("u");
        assert_eq!(rule_footprint(Category::Diet, &empty), 2.5);
        assert_eq!(rule_footprint(Category::Transportation, &empty), 3.5);
        assert_eq!(rule_footprint(Category::Housing, &empty), 3.0);
        assert_eq!(rule_footprint(Category::Lifestyle, &empty), 1.0);
        assert_eq!(rule_footprint(Category::Waste, &empty), 1.5);
    }

    #[test]
    fn test_unknown_answer_uses_default_and_case_is_ignored() {
        let p = UserProfile::new("u")
            .with("diet_type", "Flexitarian")
            .with("transportation_mode", " walking/bicycle ");
        assert_eq!(rule_footprint(Category::Diet, &p), 2.5);
        assert_eq!(rule_footprint(Category::Transportation, &p), 0.5 + 1.5);
    }

    fn estimate(values: [f64; 5]) -> FootprintEstimate {
        let breakdown: BTreeMap<Category, f64> = Category::ALL.into_iter().zip(values).collect();
        FootprintEstimate::from_breakdown(breakdown)
    }

    #[test]
    fn test_tips_thresholds_are_strict() {
        assert!(rule_based_tips(&estimate([2.0, 2.0, 2.0, 1.5, 1.5])).is_empty());

        let tips = rule_based_tips(&estimate([2.5, 1.0, 2.1, 1.0, 1.6]));
        assert_eq!(
            tips,
            vec![
                "Consider reducing meat consumption or trying plant-based meals",
                "Consider improving home insulation and using energy-efficient appliances",
                "Start recycling more and reduce single-use plastics",
            ]
        );
    }
}
