//! Chemical safety screening against a banned-substance registry
//!
//! Matching is case-insensitive substring containment in both directions:
//! a query hits an entry when either string contains the other. That lets
//! "Monocrotophos 36% SL" hit the "Monocrotophos" entry, and a bare
//! "Parathion" hit both parathion entries.

use std::fs;
use std::path::{Path, PathBuf};

use kisan_model::{CropCategory, CropId};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::rules::RemedyRecommendations;

/// Protective equipment required for substances restricted on a crop
/// category but not banned outright.
pub const MANDATORY_GEAR: [&str; 6] = [
    "Full body protective suit",
    "N95 or higher grade respirator mask",
    "Chemical-resistant gloves",
    "Safety goggles or face shield",
    "Rubber boots",
    "Head protection",
];

/// Suffixes that usually follow a product name in free-text advice.
const HAZARD_KEYWORDS: [&str; 4] = ["fungicide", "pesticide", "insecticide", "herbicide"];

const CIBRC_GLOBAL: [&str; 16] = [
    "Monocrotophos",
    "Endosulfan",
    "Carbofuran",
    "Phorate",
    "Triazophos",
    "Methomyl",
    "Aluminium Phosphide",
    "Zinc Phosphide",
    "Dichlorvos",
    "Chlorpyrifos",
    "Acephate",
    "Fenitrothion",
    "Quinalphos",
    "Phosphamidon",
    "Methyl Parathion",
    "Ethyl Parathion",
];

const CIBRC_VEGETABLE: [&str; 9] = [
    "Monocrotophos",
    "Chlorpyrifos",
    "Acephate",
    "Fenitrothion",
    "Quinalphos",
    "Dichlorvos",
    "Phorate",
    "Triazophos",
    "Methomyl",
];

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("cannot read registry {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed registry JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// One regulated substance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubstanceEntry {
    pub name: String,
    #[serde(default)]
    pub banned_globally: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub banned_for: Vec<CropCategory>,
}

impl SubstanceEntry {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), banned_globally: false, banned_for: Vec::new() }
    }

    pub fn globally_banned(mut self) -> Self {
        self.banned_globally = true;
        self
    }

    pub fn banned_for(mut self, category: CropCategory) -> Self {
        if !self.banned_for.contains(&category) {
            self.banned_for.push(category);
        }
        self
    }

    /// `query` must already be trimmed and lowercased.
    fn matches(&self, query: &str) -> bool {
        let name = self.name.to_lowercase();
        name.contains(query) || query.contains(&name)
    }

    /// The full name appears in `text` (already lowercased).
    fn named_in(&self, text: &str) -> bool {
        let name = self.name.to_lowercase();
        !name.is_empty() && text.contains(&name)
    }
}

/// The regulatory list a [`SafetyFilter`] screens against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BannedSubstanceRegistry {
    /// Shown in warning messages ("... as per CIBRC 2025 guidelines")
    pub authority: String,
    pub substances: Vec<SubstanceEntry>,
}

impl BannedSubstanceRegistry {
    /// Central Insecticides Board & Registration Committee list, 2025.
    pub fn cibrc_2025() -> Self {
        let substances = CIBRC_GLOBAL
            .iter()
            .map(|&name| {
                let entry = SubstanceEntry::new(name).globally_banned();
                if CIBRC_VEGETABLE.contains(&name) {
                    entry.banned_for(CropCategory::Vegetable)
                } else {
                    entry
                }
            })
            .collect();
        Self { authority: "CIBRC 2025".to_string(), substances }
    }

    pub fn from_json_str(json: &str) -> Result<Self, RegistryError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json_string(&self) -> Result<String, RegistryError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, RegistryError> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)
            .map_err(|source| RegistryError::Io { path: path.to_path_buf(), source })?;
        let registry = Self::from_json_str(&json)?;
        debug!(
            "loaded {} substances ({}) from {}",
            registry.len(),
            registry.authority,
            path.display()
        );
        Ok(registry)
    }

    pub fn len(&self) -> usize {
        self.substances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.substances.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SubstanceEntry> {
        self.substances.iter()
    }
}

impl Default for BannedSubstanceRegistry {
    fn default() -> Self {
        Self::cibrc_2025()
    }
}

/// Outcome of checking one substance for one crop.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafetyWarning {
    pub is_restricted: bool,
    pub warning_message: Option<String>,
    /// `None` for outright bans: no amount of gear makes those acceptable.
    pub mandatory_gear: Option<Vec<String>>,
}

/// A chemical recommendation that tripped the filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafetyNotice {
    pub recommendation: String,
    pub substance: String,
    pub warning: SafetyWarning,
    /// The recommendation was removed from the chemical list.
    pub redacted: bool,
}

#[derive(Debug, Clone, Copy, Default)]
struct Verdict {
    banned_globally: bool,
    banned_for_crop: bool,
}

impl Verdict {
    fn with(self, entry: &SubstanceEntry, category: CropCategory) -> Self {
        Self {
            banned_globally: self.banned_globally || entry.banned_globally,
            banned_for_crop: self.banned_for_crop || entry.banned_for.contains(&category),
        }
    }
}

/// Screens chemical advice against a [`BannedSubstanceRegistry`].
#[derive(Debug, Clone, Default)]
pub struct SafetyFilter {
    registry: BannedSubstanceRegistry,
}

impl SafetyFilter {
    pub fn new(registry: BannedSubstanceRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &BannedSubstanceRegistry {
        &self.registry
    }

    /// Check a substance against a free-text crop ("tomato", "brinjal", ...).
    pub fn check(&self, substance: &str, crop: &str) -> SafetyWarning {
        let crop = crop.trim();
        self.warning(substance, CropCategory::classify(crop), crop)
    }

    pub fn check_category(&self, substance: &str, category: CropCategory) -> SafetyWarning {
        self.warning(substance, category, category.as_str())
    }

    /// Candidate substance names mentioned in `texts`.
    ///
    /// Registry names are reported title-cased. A hazard keyword such as
    /// "fungicide" also contributes up to two capitalized words (longer than
    /// three characters) right before its first occurrence. First-seen order,
    /// no duplicates.
    pub fn extract_substances<S: AsRef<str>>(&self, texts: &[S]) -> Vec<String> {
        let names: Vec<String> = self.registry.iter().map(|e| e.name.to_lowercase()).collect();
        let mut found: Vec<String> = Vec::new();
        let mut push = |candidate: String| {
            if !found.contains(&candidate) {
                found.push(candidate);
            }
        };

        for text in texts {
            let text = text.as_ref();
            // ASCII lowering keeps byte offsets valid for slicing `text`
            let lower = text.to_ascii_lowercase();

            for name in names.iter().filter(|n| !n.is_empty() && lower.contains(n.as_str())) {
                push(title_case(name));
            }

            for keyword in HAZARD_KEYWORDS {
                let Some(at) = lower.find(keyword) else { continue };
                if at == 0 {
                    continue;
                }
                let before: Vec<&str> = text[..at].split_whitespace().collect();
                let tail = &before[before.len().saturating_sub(2)..];
                for word in tail {
                    let capitalized = word.chars().next().is_some_and(char::is_uppercase);
                    if capitalized && word.chars().count() > 3 {
                        push(word.to_string());
                    }
                }
            }
        }
        found
    }

    /// Filter the chemical list of `recs` for `crop`.
    ///
    /// Entries naming a globally banned substance are dropped; entries only
    /// restricted for the crop's category are kept. Both produce notices.
    /// Organic and traditional advice pass through untouched.
    ///
    /// Unlike [`check`](Self::check), a candidate only counts when it
    /// contains a full registry name: "Methyl" alone never hits
    /// "Methyl Parathion".
    pub fn screen(
        &self,
        recs: &RemedyRecommendations,
        crop: CropId,
    ) -> (RemedyRecommendations, Vec<SafetyNotice>) {
        let category = crop.category();
        let mut chemical = Vec::with_capacity(recs.chemical.len());
        let mut notices = Vec::new();

        for entry in &recs.chemical {
            let mut hits = Vec::new();
            let mut redact = false;
            for substance in self.extract_substances(std::slice::from_ref(entry)) {
                let verdict = self.named_verdict(&substance, category);
                if !(verdict.banned_globally || verdict.banned_for_crop) {
                    continue;
                }
                redact |= verdict.banned_globally;
                let warning = self.compose(&substance, crop.display_name(), verdict);
                hits.push((substance, warning));
            }

            if redact {
                warn!("{crop}: dropped banned recommendation '{entry}'");
            } else {
                chemical.push(entry.clone());
            }
            notices.extend(hits.into_iter().map(|(substance, warning)| SafetyNotice {
                recommendation: entry.clone(),
                substance,
                warning,
                redacted: redact,
            }));
        }

        let screened = RemedyRecommendations {
            chemical,
            organic: recs.organic.clone(),
            traditional: recs.traditional.clone(),
        };
        (screened, notices)
    }

    fn warning(&self, substance: &str, category: CropCategory, crop_name: &str) -> SafetyWarning {
        let verdict = self.verdict(substance, category);
        self.compose(substance, crop_name, verdict)
    }

    fn verdict(&self, substance: &str, category: CropCategory) -> Verdict {
        let query = substance.trim().to_lowercase();
        // "" is contained in every name; treat it as naming nothing
        if query.is_empty() {
            return Verdict::default();
        }
        self.registry
            .iter()
            .filter(|entry| entry.matches(&query))
            .fold(Verdict::default(), |acc, entry| acc.with(entry, category))
    }

    fn named_verdict(&self, candidate: &str, category: CropCategory) -> Verdict {
        let text = candidate.to_lowercase();
        self.registry
            .iter()
            .filter(|entry| entry.named_in(&text))
            .fold(Verdict::default(), |acc, entry| acc.with(entry, category))
    }

    fn compose(&self, substance: &str, crop_name: &str, verdict: Verdict) -> SafetyWarning {
        let authority = &self.registry.authority;
        let message = if verdict.banned_for_crop {
            format!(
                "BANNED CHEMICAL DETECTED: {substance} is banned for {crop_name} crops as per \
                 {authority} guidelines. Please use safe alternatives recommended by \
                 agricultural experts."
            )
        } else if verdict.banned_globally {
            format!(
                "BANNED CHEMICAL DETECTED: {substance} is banned as per {authority} guidelines. \
                 It is prohibited for use in agriculture. Please use safe alternatives."
            )
        } else {
            return SafetyWarning::default();
        };

        let mandatory_gear = (!verdict.banned_globally)
            .then(|| MANDATORY_GEAR.iter().map(|g| g.to_string()).collect());

        SafetyWarning { is_restricted: true, warning_message: Some(message), mandatory_gear }
    }
}

fn title_case(name: &str) -> String {
    name.split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
