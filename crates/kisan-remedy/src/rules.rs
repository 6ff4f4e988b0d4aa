//! Deterministic remedy rules
//!
//! `(disease label, crop)` → three ordered recommendation lists. A healthy
//! label short-circuits to the maintenance set; everything else dispatches
//! on the crop to that crop's keyword table, first match wins.

use kisan_model::CropId;
use log::warn;
use serde::{Deserialize, Serialize};

/// Chemical / organic / traditional treatment lists, in display order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemedyRecommendations {
    pub chemical: Vec<String>,
    pub organic: Vec<String>,
    pub traditional: Vec<String>,
}

impl RemedyRecommendations {
    pub fn is_empty(&self) -> bool {
        self.chemical.is_empty() && self.organic.is_empty() && self.traditional.is_empty()
    }

    pub fn len(&self) -> usize {
        self.chemical.len() + self.organic.len() + self.traditional.len()
    }
}

/// A canned recommendation set.
#[derive(Debug)]
struct RemedySet {
    chemical: &'static [&'static str],
    organic: &'static [&'static str],
    traditional: &'static [&'static str],
}

impl RemedySet {
    fn to_recommendations(&self) -> RemedyRecommendations {
        fn owned(items: &[&str]) -> Vec<String> {
            items.iter().map(|s| s.to_string()).collect()
        }
        RemedyRecommendations {
            chemical: owned(self.chemical),
            organic: owned(self.organic),
            traditional: owned(self.traditional),
        }
    }
}

/// Keywords (lowercase) that select a set.
type Rule = (&'static [&'static str], &'static RemedySet);

type RuleFn = fn(&str) -> Option<&'static RemedySet>;

const HEALTHY_MARKER: &str = "healthy";

/// Maps decoded disease labels to remedies.
#[derive(Debug, Clone, Copy, Default)]
pub struct RemedyRuleEngine;

impl RemedyRuleEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn generate(&self, disease_label: &str, crop: CropId) -> RemedyRecommendations {
        let label = disease_label.to_lowercase();
        if label.contains(HEALTHY_MARKER) {
            return HEALTHY.to_recommendations();
        }

        match rule_fn(crop)(&label) {
            Some(set) => set.to_recommendations(),
            None => {
                warn!("no remedy rule for '{disease_label}' on {crop}, using generic advice");
                FALLBACK.to_recommendations()
            }
        }
    }
}

/// Case-insensitive "healthy" marker test.
pub fn is_healthy(label: &str) -> bool {
    label.to_lowercase().contains(HEALTHY_MARKER)
}

fn rule_fn(crop: CropId) -> RuleFn {
    match crop {
        CropId::Tomato => tomato,
        CropId::Potato => potato,
        CropId::Apple => apple,
        CropId::Mango => mango,
        CropId::Guava => guava,
        CropId::Cotton => cotton,
    }
}

fn first_match(label: &str, rules: &[Rule]) -> Option<&'static RemedySet> {
    rules
        .iter()
        .find(|(keywords, _)| keywords.iter().any(|k| label.contains(k)))
        .map(|(_, set)| *set)
}

fn tomato(label: &str) -> Option<&'static RemedySet> {
    first_match(label, TOMATO_RULES)
}

fn potato(label: &str) -> Option<&'static RemedySet> {
    first_match(label, POTATO_RULES)
}

fn apple(label: &str) -> Option<&'static RemedySet> {
    first_match(label, APPLE_RULES)
}

fn mango(label: &str) -> Option<&'static RemedySet> {
    first_match(label, MANGO_RULES)
}

fn guava(label: &str) -> Option<&'static RemedySet> {
    first_match(label, GUAVA_RULES)
}

fn cotton(label: &str) -> Option<&'static RemedySet> {
    first_match(label, COTTON_RULES)
}

// ------------------------------------------------------------
// keyword tables, most specific first
// ------------------------------------------------------------

static TOMATO_RULES: &[Rule] = &[
    (&["late blight"], &LATE_BLIGHT),
    (&["early blight", "target spot", "septoria", "leaf spot"], &TOMATO_LEAF_SPOT),
    (&["bacterial"], &BACTERIAL_SPOT),
    (&["mold", "mould"], &TOMATO_LEAF_MOLD),
    (&["mite"], &SPIDER_MITES),
    (&["curl", "mosaic", "virus"], &TOMATO_VIRUS),
    (&["blight"], &LATE_BLIGHT),
];

static POTATO_RULES: &[Rule] = &[
    (&["late blight"], &LATE_BLIGHT),
    (&["early blight", "blight"], &POTATO_EARLY_BLIGHT),
    (&["scab"], &POTATO_SCAB),
];

static APPLE_RULES: &[Rule] = &[
    (&["scab"], &APPLE_SCAB),
    (&["rot"], &APPLE_BLACK_ROT),
    (&["rust"], &APPLE_RUST),
    (&["mildew"], &POWDERY_MILDEW),
];

static MANGO_RULES: &[Rule] = &[
    (&["anthracnose"], &ANTHRACNOSE),
    (&["canker", "bacterial"], &BACTERIAL_CANKER),
    (&["mildew"], &POWDERY_MILDEW),
    (&["sooty"], &SOOTY_MOULD),
    (&["die back", "dieback"], &DIE_BACK),
];

static GUAVA_RULES: &[Rule] = &[
    (&["canker"], &GUAVA_CANKER),
    (&["dot", "anthracnose"], &ANTHRACNOSE),
    (&["mummif", "rot"], &GUAVA_FRUIT_ROT),
    (&["rust"], &GUAVA_RUST),
];

static COTTON_RULES: &[Rule] = &[
    (&["blight", "bacterial"], &COTTON_BACTERIAL_BLIGHT),
    (&["curl", "virus"], &COTTON_LEAF_CURL),
    (&["wilt"], &COTTON_WILT),
];

// ------------------------------------------------------------
// canned sets
// ------------------------------------------------------------

static HEALTHY: RemedySet = RemedySet {
    chemical: &[],
    organic: &[
        "Apply well-decomposed farmyard manure or vermicompost at planting",
        "Spray neem oil (0.3%) every 15 days as a preventive",
    ],
    traditional: &[
        "Keep the field free of weeds and fallen leaves",
        "Water at the base of the plant in the morning",
        "Rotate crops every season",
    ],
};

static FALLBACK: RemedySet = RemedySet {
    chemical: &["Consult a local agricultural expert for an approved treatment"],
    organic: &["Remove and destroy visibly infected leaves"],
    traditional: &["Isolate affected plants and monitor the spread for a week"],
};

static LATE_BLIGHT: RemedySet = RemedySet {
    chemical: &[
        "Metalaxyl 8% + Mancozeb 64% WP at 2.5 g/L, repeat after 10 days",
        "Copper oxychloride 50% WP at 3 g/L",
    ],
    organic: &[
        "Spray Trichoderma viride (5 g/L) on foliage",
        "Remove and burn infected plants",
    ],
    traditional: &[
        "Avoid overhead irrigation and water early in the day",
        "Spray sour buttermilk diluted 1:10",
    ],
};

static TOMATO_LEAF_SPOT: RemedySet = RemedySet {
    chemical: &[
        "Mancozeb 75% WP at 2.5 g/L",
        "Chlorothalonil 75% WP at 2 g/L",
    ],
    organic: &[
        "Spray Pseudomonas fluorescens (10 g/L)",
        "Mulch around the base to stop soil splash",
    ],
    traditional: &[
        "Remove lower leaves touching the soil",
        "Spray cow urine diluted 1:10",
    ],
};

static BACTERIAL_SPOT: RemedySet = RemedySet {
    chemical: &["Copper oxychloride 50% WP at 3 g/L with Streptocycline 0.1 g/L"],
    organic: &["Spray Bacillus subtilis formulation (5 g/L)"],
    traditional: &[
        "Use disease-free seed treated with hot water (50°C for 25 minutes)",
        "Avoid working in the field while plants are wet",
    ],
};

static TOMATO_LEAF_MOLD: RemedySet = RemedySet {
    chemical: &["Chlorothalonil 75% WP at 2 g/L"],
    organic: &["Spray neem oil (0.3%)"],
    traditional: &["Prune for airflow and keep humidity low in polyhouses"],
};

static SPIDER_MITES: RemedySet = RemedySet {
    chemical: &["Spiromesifen 22.9% SC at 0.8 ml/L"],
    organic: &["Spray neem seed kernel extract (5%)"],
    traditional: &["Wash the undersides of leaves with a strong water spray"],
};

static TOMATO_VIRUS: RemedySet = RemedySet {
    chemical: &["Imidacloprid 17.8% SL at 0.3 ml/L to control the whitefly vector"],
    organic: &[
        "Uproot and destroy infected plants",
        "Install yellow sticky traps (10 per acre)",
    ],
    traditional: &["Grow two rows of maize as a border barrier"],
};

static POTATO_EARLY_BLIGHT: RemedySet = RemedySet {
    chemical: &["Mancozeb 75% WP at 2.5 g/L at 10 day intervals"],
    organic: &["Spray Trichoderma harzianum (5 g/L)"],
    traditional: &["Rotate with cereals for at least two seasons"],
};

static POTATO_SCAB: RemedySet = RemedySet {
    chemical: &["Treat seed tubers with Boric acid 3% for 30 minutes"],
    organic: &["Incorporate green manure before planting"],
    traditional: &["Keep soil moist during tuber formation"],
};

static APPLE_SCAB: RemedySet = RemedySet {
    chemical: &[
        "Captan 50% WP at 2.5 g/L at green tip stage",
        "Hexaconazole 5% EC at 0.5 ml/L",
    ],
    organic: &["Spray lime sulphur during dormancy"],
    traditional: &["Rake and burn fallen leaves in autumn"],
};

static APPLE_BLACK_ROT: RemedySet = RemedySet {
    chemical: &["Captan 50% WP at 2.5 g/L"],
    organic: &["Prune out cankers and mummified fruit"],
    traditional: &["Paint pruning cuts with cow dung and clay paste"],
};

static APPLE_RUST: RemedySet = RemedySet {
    chemical: &["Hexaconazole 5% EC at 0.5 ml/L at pink bud stage"],
    organic: &["Spray wettable sulphur (2 g/L)"],
    traditional: &["Remove nearby juniper hosts"],
};

static POWDERY_MILDEW: RemedySet = RemedySet {
    chemical: &["Hexaconazole 5% EC at 1 ml/L"],
    organic: &["Spray wettable sulphur (2 g/L)"],
    traditional: &["Spray diluted cow milk (1:9) in the evening"],
};

static ANTHRACNOSE: RemedySet = RemedySet {
    chemical: &[
        "Carbendazim 50% WP at 1 g/L",
        "Copper oxychloride 50% WP at 3 g/L",
    ],
    organic: &["Spray Bacillus subtilis formulation (5 g/L)"],
    traditional: &["Prune dried twigs and burn them away from the orchard"],
};

static BACTERIAL_CANKER: RemedySet = RemedySet {
    chemical: &["Streptocycline 0.1 g/L with Copper oxychloride 3 g/L"],
    organic: &["Cut out cankered twigs and apply Bordeaux paste"],
    traditional: &["Avoid injuring branches during harvest"],
};

static SOOTY_MOULD: RemedySet = RemedySet {
    chemical: &["Imidacloprid 17.8% SL at 0.3 ml/L to control hoppers"],
    organic: &["Spray starch solution (20 g/L) to peel off the mould"],
    traditional: &["Wash leaves with soapnut water"],
};

static DIE_BACK: RemedySet = RemedySet {
    chemical: &["Prune 10 cm below the affected part and spray Copper oxychloride 3 g/L"],
    organic: &["Apply Bordeaux paste to cut ends"],
    traditional: &["Apply cow dung slurry around the root zone"],
};

static GUAVA_CANKER: RemedySet = RemedySet {
    chemical: &["Copper oxychloride 50% WP at 3 g/L"],
    organic: &["Remove and destroy infected fruits and twigs"],
    traditional: &["Avoid wounding fruit during handling"],
};

static GUAVA_FRUIT_ROT: RemedySet = RemedySet {
    chemical: &["Carbendazim 50% WP at 1 g/L before fruit set"],
    organic: &["Collect and bury mummified fruits"],
    traditional: &["Bag young fruits with paper covers"],
};

static GUAVA_RUST: RemedySet = RemedySet {
    chemical: &["Mancozeb 75% WP at 2 g/L"],
    organic: &["Spray wettable sulphur (2 g/L)"],
    traditional: &["Thin the canopy to let sunlight in"],
};

static COTTON_BACTERIAL_BLIGHT: RemedySet = RemedySet {
    chemical: &["Copper oxychloride 50% WP at 3 g/L with Streptocycline 0.1 g/L"],
    organic: &["Treat seed with Pseudomonas fluorescens (10 g/kg)"],
    traditional: &["Remove crop residue after harvest"],
};

static COTTON_LEAF_CURL: RemedySet = RemedySet {
    chemical: &[
        "Flonicamid 50% WG at 0.3 g/L against the whitefly vector",
        "Acephate 75% SP insecticide at 1 g/L",
    ],
    organic: &["Spray neem oil (0.5%) with soap solution"],
    traditional: &["Remove weed hosts such as Parthenium from field borders"],
};

static COTTON_WILT: RemedySet = RemedySet {
    chemical: &["Drench soil with Carbendazim 50% WP at 1 g/L"],
    organic: &["Apply Trichoderma viride enriched farmyard manure (2.5 kg/acre)"],
    traditional: &["Grow wilt-tolerant local varieties and avoid waterlogging"],
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn healthy_in_any_case_gives_maintenance_set() {
        let engine = RemedyRuleEngine::new();
        let cases = [
            ("Healthy", CropId::Tomato),
            ("HEALTHY leaf", CropId::Cotton),
            ("healthy", CropId::Mango),
        ];
        for (label, crop) in cases {
            assert!(is_healthy(label));
            let recs = engine.generate(label, crop);
            assert_eq!(recs, HEALTHY.to_recommendations());
            assert!(recs.chemical.is_empty());
            assert!(!recs.organic.is_empty());
            assert!(!recs.traditional.is_empty());
        }
    }

    #[test]
    fn late_blight_wins_over_generic_blight() {
        let recs = RemedyRuleEngine.generate("Late Blight", CropId::Tomato);
        assert!(recs.chemical[0].starts_with("Metalaxyl"));

        let recs = RemedyRuleEngine.generate("Early Blight", CropId::Tomato);
        assert!(recs.chemical[0].starts_with("Mancozeb"));
    }

    #[test]
    fn keyword_matching_is_case_insensitive() {
        let a = RemedyRuleEngine.generate("APPLE SCAB", CropId::Apple);
        let b = RemedyRuleEngine.generate("apple scab", CropId::Apple);
        assert_eq!(a, b);
        assert!(a.chemical.iter().any(|c| c.contains("Captan")));
    }

    #[test]
    fn same_label_dispatches_per_crop() {
        let tomato = RemedyRuleEngine.generate("Mosaic Virus", CropId::Tomato);
        let mango = RemedyRuleEngine.generate("Mosaic Virus", CropId::Mango);
        assert_ne!(tomato, mango);
        assert_eq!(mango, FALLBACK.to_recommendations());
    }

    #[test]
    fn unmatched_label_falls_back_to_expert_advice() {
        let recs = RemedyRuleEngine.generate("Unknown", CropId::Guava);
        assert_eq!(
            recs.chemical,
            vec!["Consult a local agricultural expert for an approved treatment".to_string()]
        );
        assert!(!recs.organic.is_empty() && !recs.traditional.is_empty());
    }

    #[test]
    fn every_builtin_label_gets_a_non_empty_answer() {
        let catalog = kisan_model::CropCatalog::builtin();
        for profile in catalog.iter() {
            for label in &profile.labels {
                let recs = RemedyRuleEngine.generate(label, profile.id);
                assert!(!recs.is_empty(), "{} / {label}", profile.id);
                if !is_healthy(label) {
                    assert_ne!(recs, FALLBACK.to_recommendations(), "{} / {label}", profile.id);
                }
            }
        }
    }
}
