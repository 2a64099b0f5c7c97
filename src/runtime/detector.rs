//! Provider detection by required-key subset matching.
//!
//! Signatures are scanned in declaration order (providers first, then each
//! provider's signatures) and the first one whose required keys are all
//! present wins. The cost depends on the number of compiled signatures, not
//! on the size of the input map.

use std::borrow::Borrow;
use std::collections::HashSet;
use std::hash::Hash;

use crate::record::{Attributes, UNKNOWN_PROVIDER};
use crate::runtime::bundle::ProviderBundle;

#[derive(Debug, Clone)]
struct SignatureEntry {
    provider: String,
    name: String,
    required: Vec<String>,
    optional: Vec<String>,
    confidence: f64,
}

/// The signature that identified a provider.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionMatch {
    pub provider: String,
    pub signature: String,
    pub confidence: f64,
    /// How many of the signature's optional keys were also present
    pub optional_matched: usize,
}

#[derive(Debug, Clone, Default)]
pub struct Detector {
    entries: Vec<SignatureEntry>,
}

impl Detector {
    pub fn new(bundle: &ProviderBundle) -> Self {
        let entries = bundle
            .providers
            .iter()
            .flat_map(|provider| {
                provider.signatures.iter().map(move |signature| SignatureEntry {
                    provider: provider.id.clone(),
                    name: signature.name.clone(),
                    required: signature.required.clone(),
                    optional: signature.optional.clone(),
                    confidence: signature.confidence,
                })
            })
            .collect();

        Self { entries }
    }

    pub fn signature_count(&self) -> usize {
        self.entries.len()
    }

    /// Provider identifier for an attribute map, or `"unknown"`.
    pub fn detect(&self, attributes: &Attributes) -> &str {
        self.find(|key| attributes.contains_key(key))
            .map(|entry| entry.provider.as_str())
            .unwrap_or(UNKNOWN_PROVIDER)
    }

    /// Provider identifier for a bare key set, or `"unknown"`.
    pub fn detect_keys<S>(&self, keys: &HashSet<S>) -> &str
    where
        S: Borrow<str> + Hash + Eq,
    {
        self.find(|key| keys.contains(key))
            .map(|entry| entry.provider.as_str())
            .unwrap_or(UNKNOWN_PROVIDER)
    }

    /// Full detail of the winning signature.
    pub fn detect_match(&self, attributes: &Attributes) -> Option<DetectionMatch> {
        let contains = |key: &str| attributes.contains_key(key);
        self.find(contains).map(|entry| DetectionMatch {
            provider: entry.provider.clone(),
            signature: entry.name.clone(),
            confidence: entry.confidence,
            optional_matched: entry.optional.iter().filter(|k| contains(k)).count(),
        })
    }

    fn find(&self, contains: impl Fn(&str) -> bool) -> Option<&SignatureEntry> {
        let found = self
            .entries
            .iter()
            .find(|entry| entry.required.iter().all(|key| contains(key)));

        if found.is_none() {
            tracing::debug!("No provider signature matched");
        }
        found
    }
}
