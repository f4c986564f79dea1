/// Object names given on the command line. Each pattern is an exact
/// (case-insensitive) object path, `*`, or a case-sensitive prefix ending
/// at a `*`. Patterns remember whether they matched anything.
#[derive(Debug, Clone, Default)]
pub struct Selector {
    patterns: Vec<String>,
    used: Vec<bool>,
}

fn pattern_matches(pattern: &str, name: &str) -> bool {
    if pattern == "*" || pattern.eq_ignore_ascii_case(name) {
        return true;
    }
    pattern
        .match_indices('*')
        .any(|(star, _)| name.len() >= star && name.as_bytes()[..star] == pattern.as_bytes()[..star])
}

impl Selector {
    pub fn new(patterns: Vec<String>) -> Self {
        let used = vec![false; patterns.len()];
        Selector { patterns, used }
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Tests `path` against the patterns in order and marks the first one
    /// that matches as used.
    pub fn matches(&mut self, path: &str) -> bool {
        match self.patterns.iter().position(|p| pattern_matches(p, path)) {
            Some(i) => {
                self.used[i] = true;
                true
            }
            None => false,
        }
    }

    /// Like [`Selector::matches`], but an empty selector selects
    /// everything.
    pub fn selects(&mut self, path: &str) -> bool {
        self.is_empty() || self.matches(path)
    }

    pub fn unused(&self) -> impl Iterator<Item = &str> {
        self.patterns
            .iter()
            .zip(&self.used)
            .filter(|(_, used)| !**used)
            .map(|(pattern, _)| pattern.as_str())
    }
}
