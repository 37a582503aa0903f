//! The closed figurative-language category set.
//!
//! Every candidate flag, validation verdict, and final record is keyed by one
//! of these labels. Anything a model emits outside this set is ignored at the
//! normalizer boundary.

use serde::{Deserialize, Serialize};

/// One figurative-language category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Metaphor,
    Simile,
    Personification,
    Idiom,
    Hyperbole,
    Metonymy,
    /// Catch-all for figurative language outside the named types. Also the
    /// default target when a reclassification names an unknown category.
    Other,
}

/// All categories, in canonical order.
pub const ALL_CATEGORIES: [Category; 7] = [
    Category::Metaphor,
    Category::Simile,
    Category::Personification,
    Category::Idiom,
    Category::Hyperbole,
    Category::Metonymy,
    Category::Other,
];

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Metaphor => "metaphor",
            Category::Simile => "simile",
            Category::Personification => "personification",
            Category::Idiom => "idiom",
            Category::Hyperbole => "hyperbole",
            Category::Metonymy => "metonymy",
            Category::Other => "other",
        }
    }

    /// Case-insensitive parse against the closed set. Trailing punctuation is
    /// tolerated because validation replies often write "personification -".
    pub fn parse(s: &str) -> Option<Category> {
        let cleaned = s
            .trim()
            .trim_matches(|c: char| !c.is_ascii_alphabetic())
            .to_ascii_lowercase();
        ALL_CATEGORIES
            .iter()
            .copied()
            .find(|c| c.as_str() == cleaned)
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-category boolean flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryFlags {
    pub metaphor: bool,
    pub simile: bool,
    pub personification: bool,
    pub idiom: bool,
    pub hyperbole: bool,
    pub metonymy: bool,
    pub other: bool,
}

impl CategoryFlags {
    pub fn get(&self, category: Category) -> bool {
        match category {
            Category::Metaphor => self.metaphor,
            Category::Simile => self.simile,
            Category::Personification => self.personification,
            Category::Idiom => self.idiom,
            Category::Hyperbole => self.hyperbole,
            Category::Metonymy => self.metonymy,
            Category::Other => self.other,
        }
    }

    pub fn set(&mut self, category: Category, value: bool) {
        match category {
            Category::Metaphor => self.metaphor = value,
            Category::Simile => self.simile = value,
            Category::Personification => self.personification = value,
            Category::Idiom => self.idiom = value,
            Category::Hyperbole => self.hyperbole = value,
            Category::Metonymy => self.metonymy = value,
            Category::Other => self.other = value,
        }
    }

    /// OR over all category flags.
    pub fn any(&self) -> bool {
        ALL_CATEGORIES.iter().any(|&c| self.get(c))
    }

    /// Categories currently flagged true, in canonical order.
    pub fn set_categories(&self) -> Vec<Category> {
        ALL_CATEGORIES
            .iter()
            .copied()
            .filter(|&c| self.get(c))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_case_insensitive() {
        assert_eq!(Category::parse("Metaphor"), Some(Category::Metaphor));
        assert_eq!(Category::parse("SIMILE"), Some(Category::Simile));
        assert_eq!(Category::parse("  idiom  "), Some(Category::Idiom));
    }

    #[test]
    fn parse_tolerates_punctuation() {
        assert_eq!(
            Category::parse("personification -"),
            Some(Category::Personification)
        );
        assert_eq!(Category::parse("metonymy."), Some(Category::Metonymy));
    }

    #[test]
    fn parse_rejects_unknown() {
        assert_eq!(Category::parse("sarcasm"), None);
        assert_eq!(Category::parse(""), None);
    }

    #[test]
    fn flags_round_trip() {
        let mut flags = CategoryFlags::default();
        assert!(!flags.any());
        flags.set(Category::Hyperbole, true);
        assert!(flags.get(Category::Hyperbole));
        assert!(flags.any());
        assert_eq!(flags.set_categories(), vec![Category::Hyperbole]);
    }
}
