//! Crop catalog
//!
//! One [`CropProfile`] per supported crop binds the crop to its model
//! artifact, input resolution, normalization scheme and label table.
//! The built-in catalog is compiled in; a JSON file with the same shape
//! can replace it at start-up (see [`CropCatalog::from_json_str`]).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Default model input edge, matching the exported classifiers.
pub const DEFAULT_INPUT_SIZE: u32 = 224;

/// Closed set of crops with a trained classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CropId {
    Apple,
    Tomato,
    Potato,
    Mango,
    Guava,
    Cotton,
}

impl CropId {
    pub const ALL: [CropId; 6] = [
        CropId::Apple,
        CropId::Tomato,
        CropId::Potato,
        CropId::Mango,
        CropId::Guava,
        CropId::Cotton,
    ];

    /// Stable lowercase identifier, also used in config files.
    pub fn as_str(self) -> &'static str {
        match self {
            CropId::Apple => "apple",
            CropId::Tomato => "tomato",
            CropId::Potato => "potato",
            CropId::Mango => "mango",
            CropId::Guava => "guava",
            CropId::Cotton => "cotton",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            CropId::Apple => "Apple",
            CropId::Tomato => "Tomato",
            CropId::Potato => "Potato",
            CropId::Mango => "Mango",
            CropId::Guava => "Guava",
            CropId::Cotton => "Cotton",
        }
    }

    /// Artifact filename shipped alongside the application.
    pub fn model_file(self) -> String {
        format!("{}_model_unquant.onnx", self.display_name())
    }

    pub fn category(self) -> CropCategory {
        match self {
            CropId::Tomato | CropId::Potato => CropCategory::Vegetable,
            CropId::Apple | CropId::Mango | CropId::Guava => CropCategory::Fruit,
            CropId::Cotton => CropCategory::Fibre,
        }
    }

    /// Case-insensitive lookup by identifier or display name.
    pub fn parse(name: &str) -> Option<CropId> {
        let name = name.trim();
        CropId::ALL
            .into_iter()
            .find(|id| id.as_str().eq_ignore_ascii_case(name))
    }
}

impl Default for CropId {
    fn default() -> Self {
        CropId::Tomato
    }
}

impl fmt::Display for CropId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Regulatory grouping used by the chemical safety policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CropCategory {
    Vegetable,
    Fruit,
    Fibre,
}

impl CropCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            CropCategory::Vegetable => "vegetable",
            CropCategory::Fruit => "fruit",
            CropCategory::Fibre => "fibre",
        }
    }

    /// Classify a free-text crop description ("tomato", "brinjal field", ...).
    ///
    /// Anything that is not recognised as a vegetable or a known crop falls
    /// back to [`CropCategory::Fruit`], which carries no vegetable-only bans.
    pub fn classify(crop: &str) -> CropCategory {
        const VEGETABLE_MARKERS: [&str; 6] =
            ["vegetable", "tomato", "potato", "brinjal", "chilli", "okra"];

        let crop = crop.trim().to_lowercase();
        if VEGETABLE_MARKERS.iter().any(|m| crop.contains(m)) {
            return CropCategory::Vegetable;
        }
        match CropId::parse(&crop) {
            Some(id) => id.category(),
            None if crop.contains("cotton") => CropCategory::Fibre,
            None => CropCategory::Fruit,
        }
    }
}

impl From<CropId> for CropCategory {
    fn from(id: CropId) -> Self {
        id.category()
    }
}

/// How raw 8-bit channel values become model inputs.
///
/// Belongs to each profile: feeding a model the wrong scheme does not fail,
/// it just quietly ruins accuracy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Normalization {
    /// `v / 255.0`, range [0, 1].
    #[default]
    UnitScale,
    /// `(v - 128.0) / 128.0`, range [-1, 1).
    Centered,
}

impl Normalization {
    #[inline]
    pub fn apply(self, v: u8) -> f32 {
        match self {
            Normalization::UnitScale => v as f32 / 255.0,
            Normalization::Centered => (v as f32 - 128.0) / 128.0,
        }
    }
}

/// Memory layout of the model's input tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TensorLayout {
    /// 1 × H × W × 3, channel-interleaved.
    #[default]
    Nhwc,
    /// 1 × 3 × H × W, planar.
    Nchw,
}

/// Static descriptor binding a crop to its model artifact and input size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CropProfile {
    pub id: CropId,
    pub display_name: String,
    /// Artifact filename, resolved against the loader's model directory
    pub model_file: String,
    pub input_width: u32,
    pub input_height: u32,
    #[serde(default)]
    pub normalization: Normalization,
    #[serde(default)]
    pub layout: TensorLayout,
    /// Index-aligned with the classifier's output vector
    pub labels: Vec<String>,
}

impl CropProfile {
    /// Built-in profile for `id`.
    pub fn builtin(id: CropId) -> Self {
        Self {
            id,
            display_name: id.display_name().to_string(),
            model_file: id.model_file(),
            input_width: DEFAULT_INPUT_SIZE,
            input_height: DEFAULT_INPUT_SIZE,
            normalization: Normalization::UnitScale,
            layout: TensorLayout::Nhwc,
            labels: builtin_labels(id).iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn category(&self) -> CropCategory {
        self.id.category()
    }

    /// Human-readable label for `index`, `None` when outside the table.
    pub fn label(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(String::as_str)
    }

    pub fn with_normalization(mut self, normalization: Normalization) -> Self {
        self.normalization = normalization;
        self
    }

    pub fn with_input_size(mut self, width: u32, height: u32) -> Self {
        self.input_width = width;
        self.input_height = height;
        self
    }
}

fn builtin_labels(id: CropId) -> &'static [&'static str] {
    match id {
        CropId::Apple => &["Apple Scab", "Black Rot", "Cedar Apple Rust", "Healthy"],
        CropId::Tomato => &[
            "Bacterial Spot",
            "Early Blight",
            "Late Blight",
            "Leaf Mold",
            "Septoria Leaf Spot",
            "Spider Mites",
            "Target Spot",
            "Yellow Leaf Curl Virus",
            "Mosaic Virus",
            "Healthy",
        ],
        CropId::Potato => &["Early Blight", "Late Blight", "Healthy"],
        CropId::Mango => &[
            "Anthracnose",
            "Bacterial Canker",
            "Die Back",
            "Powdery Mildew",
            "Sooty Mould",
            "Healthy",
        ],
        CropId::Guava => &["Canker", "Dot", "Mummification", "Rust", "Healthy"],
        CropId::Cotton => &["Bacterial Blight", "Curl Virus", "Fusarium Wilt", "Healthy"],
    }
}

/// Enumerable list of profiles, one per supported crop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CropCatalog {
    profiles: Vec<CropProfile>,
}

impl CropCatalog {
    pub fn builtin() -> Self {
        Self {
            profiles: CropId::ALL.into_iter().map(CropProfile::builtin).collect(),
        }
    }

    /// Parse a catalog override. Crops missing from the file keep their
    /// built-in profile so the catalog always covers every [`CropId`].
    pub fn from_json_str(json: &str) -> serde_json::Result<Self> {
        let parsed: CropCatalog = serde_json::from_str(json)?;
        let mut catalog = Self::builtin();
        for profile in parsed.profiles {
            if let Some(slot) = catalog.profiles.iter_mut().find(|p| p.id == profile.id) {
                *slot = profile;
            }
        }
        Ok(catalog)
    }

    pub fn to_json_string(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CropProfile> {
        self.profiles.iter()
    }

    pub fn get(&self, id: CropId) -> Option<&CropProfile> {
        self.profiles.iter().find(|p| p.id == id)
    }

    /// Lookup by identifier or display name, case-insensitive.
    pub fn find(&self, name: &str) -> Option<&CropProfile> {
        let name = name.trim();
        self.profiles.iter().find(|p| {
            p.id.as_str().eq_ignore_ascii_case(name) || p.display_name.eq_ignore_ascii_case(name)
        })
    }

    pub fn default_profile(&self) -> Option<&CropProfile> {
        self.get(CropId::default())
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

impl Default for CropCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}
