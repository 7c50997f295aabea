//! Include/ignore filtering of entities before they reach the debouncer.

use regex::Regex;

#[derive(Debug, Default)]
pub struct EntityFilter {
    include: Vec<Regex>,
    ignore: Vec<Regex>,
}

impl EntityFilter {
    /// Compiles both lists. Patterns that fail to compile are logged and
    /// dropped so one typo doesn't disable tracking.
    pub fn new(include: &[String], ignore: &[String]) -> Self {
        Self {
            include: compile_all(include, "include"),
            ignore: compile_all(ignore, "ignore"),
        }
    }

    /// Include wins over ignore.
    pub fn should_track(&self, entity: &str) -> bool {
        if self.include.iter().any(|re| re.is_match(entity)) {
            return true;
        }
        !self.ignore.iter().any(|re| re.is_match(entity))
    }
}

fn compile_all(patterns: &[String], list: &str) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .filter_map(|pattern| match Regex::new(pattern) {
            Ok(re) => Some(re),
            Err(err) => {
                tracing::warn!(list, pattern, error = %err, "Skipping invalid pattern");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn empty_filter_tracks_everything() {
        assert!(EntityFilter::default().should_track("/tmp/x"));
    }

    #[test]
    fn ignore_drops_matches() {
        let filter = EntityFilter::new(&[], &strings(&["^/tmp/", "COMMIT_EDITMSG$"]));
        assert!(!filter.should_track("/tmp/scratch.txt"));
        assert!(!filter.should_track("/repo/.git/COMMIT_EDITMSG"));
        assert!(filter.should_track("/repo/src/lib.rs"));
    }

    #[test]
    fn include_overrides_ignore() {
        let filter = EntityFilter::new(&strings(&["^/tmp/keep/"]), &strings(&["^/tmp/"]));
        assert!(filter.should_track("/tmp/keep/notes.md"));
        assert!(!filter.should_track("/tmp/other.md"));
    }

    #[test]
    fn invalid_patterns_are_skipped() {
        let filter = EntityFilter::new(&[], &strings(&["(unclosed", "", "\\.log$"]));
        assert!(!filter.should_track("/var/app.log"));
        assert!(filter.should_track("/var/app.rs"));
    }
}
