use super::record::LogRecord;

/// Predicate deciding whether the capture engine keeps a record
pub trait AcceptFilter: Send + Sync {
    fn accept(&self, record: &LogRecord) -> bool;
}

/// Keeps every record
#[derive(Debug, Default, Clone, Copy)]
pub struct AcceptAll;

impl AcceptFilter for AcceptAll {
    fn accept(&self, _record: &LogRecord) -> bool {
        true
    }
}

/// Keeps records whose URL contains at least one pattern.
/// An empty pattern list keeps everything.
#[derive(Debug, Default, Clone)]
pub struct UrlFilter {
    patterns: Vec<String>,
}

impl UrlFilter {
    pub fn new(patterns: Vec<String>) -> Self {
        Self {
            patterns: patterns.into_iter().filter(|p| !p.is_empty()).collect(),
        }
    }
}

impl AcceptFilter for UrlFilter {
    fn accept(&self, record: &LogRecord) -> bool {
        self.patterns.is_empty() || self.patterns.iter().any(|p| record.url.contains(p.as_str()))
    }
}
