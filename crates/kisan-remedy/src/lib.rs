//! # kisan-remedy
//!
//! Turns a diagnosed disease into treatment advice and keeps that advice
//! inside the law.
//!
//! - [`RemedyRuleEngine`]: `(label, crop)` → chemical / organic / traditional
//!   lists from static per-crop rule tables
//! - [`SafetyFilter`]: checks substances against a [`BannedSubstanceRegistry`]
//!   (CIBRC 2025 by default) and redacts banned chemical advice

pub mod rules;
pub mod safety;

pub use rules::{is_healthy, RemedyRecommendations, RemedyRuleEngine};
pub use safety::{
    BannedSubstanceRegistry, RegistryError, SafetyFilter, SafetyNotice, SafetyWarning,
    SubstanceEntry, MANDATORY_GEAR,
};
