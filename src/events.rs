/// Ordered progress log for one query.
///
/// Scoped to a single search: the core functions append human-readable entries
/// as they go, and the caller decides what to do with them afterwards (print
/// them, or merge them into an API response). Append-only; entries are never
/// reordered or dropped.
#[derive(Debug, Default)]
pub struct EventLog {
    entries: Vec<String>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push<S: Into<String>>(&mut self, entry: S) {
        self.entries.push(entry.into());
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }
}
