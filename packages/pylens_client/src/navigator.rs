//! Inspection path navigation with back/forward history.

use pylens_protocol::{Category, Command};

/// Path texts the runtime always evaluates to a mapping, whatever category it
/// reports for them.
pub const MAPPING_ROOTS: &[&str] = &["sys.modules", "globals()"];

/// Visited paths plus a cursor.
///
/// `index` is `None` only while `entries` is empty; otherwise it points at an
/// entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathHistory {
    entries: Vec<String>,
    index: Option<usize>,
}

impl PathHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget everything and start over at `path`.
    pub fn reset(&mut self, path: String) {
        self.entries.clear();
        self.entries.push(path);
        self.index = Some(0);
    }

    /// Drop any forward entries, then append `path` and move to it.
    pub fn push(&mut self, path: String) {
        let keep = self.index.map_or(0, |i| i + 1);
        self.entries.truncate(keep);
        self.entries.push(path);
        self.index = Some(self.entries.len() - 1);
    }

    pub fn back(&mut self) -> Option<&str> {
        if !self.can_go_back() {
            return None;
        }
        self.index = self.index.map(|i| i - 1);
        self.current()
    }

    pub fn forward(&mut self) -> Option<&str> {
        if !self.can_go_forward() {
            return None;
        }
        self.index = Some(self.index.map_or(0, |i| i + 1));
        self.current()
    }

    pub fn can_go_back(&self) -> bool {
        self.index.is_some_and(|i| i > 0)
    }

    pub fn can_go_forward(&self) -> bool {
        match self.index {
            Some(i) => i + 1 < self.entries.len(),
            None => false,
        }
    }

    pub fn current(&self) -> Option<&str> {
        self.index
            .and_then(|i| self.entries.get(i))
            .map(String::as_str)
    }

    pub fn index(&self) -> Option<usize> {
        self.index
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }
}

/// Turns path changes into inspect requests.
#[derive(Debug, Clone, Default)]
pub struct PathNavigator {
    history: PathHistory,
}

impl PathNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Manual entry: a fresh history rooted at `input`.
    pub fn enter(&mut self, input: &str) -> Option<Command> {
        let path = input.trim();
        if path.is_empty() {
            return None;
        }
        self.history.reset(path.to_string());
        Some(Command::inspect(path))
    }

    /// Follow a member of the current object.
    pub fn navigate(&mut self, path: impl Into<String>) -> Option<Command> {
        let path = path.into();
        if path.trim().is_empty() {
            return None;
        }
        self.history.push(path.clone());
        Some(Command::inspect(path))
    }

    pub fn back(&mut self) -> Option<Command> {
        self.history.back().map(Command::inspect)
    }

    pub fn forward(&mut self) -> Option<Command> {
        self.history.forward().map(Command::inspect)
    }

    pub fn can_go_back(&self) -> bool {
        self.history.can_go_back()
    }

    pub fn can_go_forward(&self) -> bool {
        self.history.can_go_forward()
    }

    pub fn current(&self) -> Option<&str> {
        self.history.current()
    }

    pub fn history(&self) -> &PathHistory {
        &self.history
    }
}

/// True for names usable after a `.`: `[A-Za-z_][A-Za-z0-9_]*`.
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Single-quoted key literal that evaluates back to `name`.
pub fn quote_key(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 2);
    out.push('\'');
    for c in name.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}

/// Inspection path of member `name` of the object at `parent`.
pub fn child_path(parent: &str, parent_category: Category, name: &str) -> String {
    if parent.is_empty() {
        return if is_identifier(name) {
            name.to_string()
        } else {
            format!("globals()[{}]", quote_key(name))
        };
    }

    let mapping = parent_category == Category::Dictionary || MAPPING_ROOTS.contains(&parent);
    if mapping || !is_identifier(name) {
        format!("{parent}[{}]", quote_key(name))
    } else {
        format!("{parent}.{name}")
    }
}
