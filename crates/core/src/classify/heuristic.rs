use regex::Regex;

use super::Verdict;
use super::keywords::{CATEGORY_KEYWORDS, LEGITIMATE_PATTERNS};

/// Keywords this short only match as whole words.
const WORD_BOUNDARY_MAX_LEN: usize = 3;

#[derive(Debug, Clone)]
enum Matcher {
    Word(Regex),
    Substring(String),
}

impl Matcher {
    fn new(keyword: &str) -> Self {
        let keyword = keyword.to_lowercase();
        if keyword.chars().count() <= WORD_BOUNDARY_MAX_LEN {
            let pattern = format!(r"\b{}\b", regex::escape(&keyword));
            match Regex::new(&pattern) {
                Ok(re) => Self::Word(re),
                Err(_) => Self::Substring(keyword),
            }
        } else {
            Self::Substring(keyword)
        }
    }

    fn is_match(&self, haystack: &str) -> bool {
        match self {
            Self::Word(re) => re.is_match(haystack),
            Self::Substring(s) => haystack.contains(s.as_str()),
        }
    }
}

/// Deterministic keyword-and-pattern classifier.
///
/// Matching is case-insensitive. The domain is checked against the
/// legitimate patterns first; a hit there labels the site clean before any
/// keyword is considered.
#[derive(Debug, Clone)]
pub struct HeuristicClassifier {
    categories: Vec<(String, Vec<Matcher>)>,
    legitimate: Vec<String>,
}

impl Default for HeuristicClassifier {
    fn default() -> Self {
        Self::new(CATEGORY_KEYWORDS, LEGITIMATE_PATTERNS)
    }
}

impl HeuristicClassifier {
    /// Builds a classifier from a category table and a legitimate-pattern list.
    pub fn new(categories: &[(&str, &[&str])], legitimate: &[&str]) -> Self {
        let categories = categories
            .iter()
            .map(|(category, keywords)| (category.to_string(), keywords.iter().map(|k| Matcher::new(k)).collect()))
            .collect();
        let legitimate = legitimate.iter().map(|p| p.to_lowercase()).collect();
        Self { categories, legitimate }
    }

    /// Whether the domain matches one of the legitimate structural patterns.
    pub fn is_legitimate(&self, domain: &str) -> bool {
        let domain = domain.to_lowercase();
        self.legitimate.iter().any(|p| domain.contains(p.as_str()))
    }

    /// Labels a site from its domain and page text.
    pub fn classify(&self, domain: &str, title: &str, description: &str) -> Verdict {
        if self.is_legitimate(domain) {
            return Verdict::clean();
        }

        let haystack = format!("{} {} {}", domain, title, description).to_lowercase();
        self.categories
            .iter()
            .find(|(_, matchers)| matchers.iter().any(|m| m.is_match(&haystack)))
            .map(|(category, _)| Verdict::flagged(category.clone()))
            .unwrap_or_else(Verdict::clean)
    }

    /// Labels a bare domain name.
    pub fn classify_domain(&self, domain: &str) -> Verdict {
        self.classify(domain, "", "")
    }
}
