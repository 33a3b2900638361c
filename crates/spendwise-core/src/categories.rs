//! Budget category set and category resolution
//!
//! The vision and text models are asked to pick from the user's categories,
//! but they misspell, pluralise or invent names. Resolution maps whatever the
//! model said back onto the supplied set, falling back to the default bucket.

use strsim::jaro_winkler;

/// Fallback bucket for items that match no supplied category
pub const DEFAULT_CATEGORY: &str = "Miscellaneous";

/// Minimum Jaro-Winkler similarity for a fuzzy category match
const FUZZY_THRESHOLD: f64 = 0.85;

/// Ordered set of budget category names supplied by the caller
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategorySet {
    names: Vec<String>,
}

impl CategorySet {
    /// Build a set, dropping blanks and case-insensitive duplicates
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut set = Self::default();
        for name in names {
            let name: String = name.into();
            let trimmed = name.trim();
            if trimmed.is_empty() || set.position(trimmed).is_some() {
                continue;
            }
            set.names.push(trimmed.to_string());
        }
        set
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Comma-separated list for prompt substitution
    ///
    /// The default bucket is appended when the caller's set lacks it so the
    /// model is always offered a legal fallback.
    pub fn prompt_list(&self) -> String {
        let mut names: Vec<&str> = self.names.iter().map(String::as_str).collect();
        if self.position(DEFAULT_CATEGORY).is_none() {
            names.push(DEFAULT_CATEGORY);
        }
        names.join(", ")
    }

    /// Map a model-assigned category onto this set
    ///
    /// Case-insensitive exact match first, then the closest name by
    /// Jaro-Winkler similarity (first listed wins ties), else the default.
    pub fn resolve(&self, candidate: Option<&str>) -> String {
        let candidate = match candidate.map(str::trim) {
            Some(c) if !c.is_empty() => c,
            _ => return DEFAULT_CATEGORY.to_string(),
        };

        if let Some(idx) = self.position(candidate) {
            return self.names[idx].clone();
        }

        let lowered = candidate.to_lowercase();
        let mut best: Option<(usize, f64)> = None;
        for (idx, name) in self.names.iter().enumerate() {
            let score = jaro_winkler(&lowered, &name.to_lowercase());
            if score >= FUZZY_THRESHOLD && best.map_or(true, |(_, s)| score > s) {
                best = Some((idx, score));
            }
        }

        match best {
            Some((idx, score)) => {
                tracing::debug!(
                    candidate,
                    resolved = %self.names[idx],
                    score,
                    "Fuzzy-matched category"
                );
                self.names[idx].clone()
            }
            None => DEFAULT_CATEGORY.to_string(),
        }
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n.eq_ignore_ascii_case(name))
    }
}

impl<S: Into<String>> FromIterator<S> for CategorySet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self::new(iter)
    }
}
