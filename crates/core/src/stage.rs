//! Pipeline Stages
//!
//! Every orchestrated operation is identified by a [`Stage`]. The camelCase
//! name is used on the wire, in durable storage keys, and on the command
//! line; the kebab-case slug is used to build backend routes.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// One orchestrated analysis operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Stage {
    /// Competitor/keyword parsing (may require external authorization)
    Parsing,
    Cleaning,
    SearchSuggestions,
    Frequencies,
    DemandClicks,
    Competition,
    Commercialization,
    Clustering,
    /// LSI n-gram extraction (fanned out over n-gram sizes)
    LsiAnalysis,
    /// Tag-scoped keyword comparison
    KeywordsAnalysis,
    /// Collocation / PMI analysis
    CollocationAnalysis,
}

/// How a stage is dispatched to the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestPlan {
    /// One request, one envelope
    Single,
    /// One request per n-gram size, joined after all settle
    NgramFanOut,
}

impl Stage {
    /// All stages in pipeline order.
    pub const ALL: [Stage; 11] = [
        Stage::Parsing,
        Stage::Cleaning,
        Stage::SearchSuggestions,
        Stage::Frequencies,
        Stage::DemandClicks,
        Stage::Competition,
        Stage::Commercialization,
        Stage::Clustering,
        Stage::LsiAnalysis,
        Stage::KeywordsAnalysis,
        Stage::CollocationAnalysis,
    ];

    /// Wire name (camelCase).
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Parsing => "parsing",
            Stage::Cleaning => "cleaning",
            Stage::SearchSuggestions => "searchSuggestions",
            Stage::Frequencies => "frequencies",
            Stage::DemandClicks => "demandClicks",
            Stage::Competition => "competition",
            Stage::Commercialization => "commercialization",
            Stage::Clustering => "clustering",
            Stage::LsiAnalysis => "lsiAnalysis",
            Stage::KeywordsAnalysis => "keywordsAnalysis",
            Stage::CollocationAnalysis => "collocationAnalysis",
        }
    }

    /// Route segment (kebab-case).
    pub fn slug(&self) -> &'static str {
        match self {
            Stage::Parsing => "parsing",
            Stage::Cleaning => "cleaning",
            Stage::SearchSuggestions => "search-suggestions",
            Stage::Frequencies => "frequencies",
            Stage::DemandClicks => "demand-clicks",
            Stage::Competition => "competition",
            Stage::Commercialization => "commercialization",
            Stage::Clustering => "clustering",
            Stage::LsiAnalysis => "lsi-analysis",
            Stage::KeywordsAnalysis => "keywords-analysis",
            Stage::CollocationAnalysis => "collocation-analysis",
        }
    }

    /// PascalCase form, used to build durable storage keys.
    pub fn pascal_name(&self) -> String {
        let name = self.as_str();
        let mut chars = name.chars();
        match chars.next() {
            Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
            None => String::new(),
        }
    }

    pub fn request_plan(&self) -> RequestPlan {
        match self {
            Stage::LsiAnalysis => RequestPlan::NgramFanOut,
            _ => RequestPlan::Single,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = CoreError;

    /// Accepts the camelCase wire name or the kebab-case slug.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Stage::ALL
            .iter()
            .copied()
            .find(|stage| stage.as_str() == trimmed || stage.slug() == trimmed)
            .ok_or_else(|| CoreError::unknown_stage(trimmed))
    }
}

/// N-gram sizes requested by the LSI fan-out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NgramSize {
    Unigram,
    Bigram,
    Trigram,
}

impl NgramSize {
    pub const ALL: [NgramSize; 3] = [NgramSize::Unigram, NgramSize::Bigram, NgramSize::Trigram];

    /// Number of tokens per n-gram.
    pub fn n(&self) -> u8 {
        match self {
            NgramSize::Unigram => 1,
            NgramSize::Bigram => 2,
            NgramSize::Trigram => 3,
        }
    }

    /// Sub-request name, also the key in the joined result.
    pub fn label(&self) -> &'static str {
        match self {
            NgramSize::Unigram => "unigrams",
            NgramSize::Bigram => "bigrams",
            NgramSize::Trigram => "trigrams",
        }
    }
}

impl fmt::Display for NgramSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
