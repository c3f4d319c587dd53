// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::sync::OnceLock;

use regex::Regex;

/// Source text substituted for a variable known to be null.
pub const NULL_SENTINEL: &str = "None";

/// Source text substituted for a variable known to be non-null.
pub const NOT_NULL_SENTINEL: &str = "NotNone";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Binding {
    Null,
    NotNull,
    Literal(String),
}

impl Binding {
    pub fn as_source(&self) -> &str {
        match self {
            Self::Null => NULL_SENTINEL,
            Self::NotNull => NOT_NULL_SENTINEL,
            Self::Literal(text) => text,
        }
    }
}

fn comparison_line() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r"^(?P<name>[A-Za-z_$][\w$]*)\s*(?P<op>==|!=)\s*(?P<value>.+)$")
            .expect("comparison regex failed to compile")
    })
}

fn assignment_line() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r"^(?P<name>[A-Za-z_$][\w$]*)\s*=\s*(?P<value>[^=\s].*)$")
            .expect("assignment regex failed to compile")
    })
}

/// Variable bindings recovered from the context lines logged ahead of a
/// condition.
///
/// Entries keep the order in which each name was first bound, and that is
/// the order substitution is applied in.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Bindings {
    entries: Vec<(String, Binding)>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds bindings from context lines, oldest first.
    ///
    /// `name == value` binds `name` to null and `name != value` binds it to
    /// non-null; the compared value itself is not kept. `name = value` binds
    /// the value text as written, with `null` mapped to the null sentinel.
    /// Other lines are skipped.
    pub fn resolve<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut bindings = Self::new();

        for line in lines {
            let line = line.as_ref().trim();

            if let Some(captures) = comparison_line().captures(line) {
                let binding = match &captures["op"] {
                    "==" => Binding::Null,
                    _ => Binding::NotNull,
                };
                bindings.bind(&captures["name"], binding);
            } else if let Some(captures) = assignment_line().captures(line) {
                let binding = match captures["value"].trim() {
                    "null" => Binding::Null,
                    value => Binding::Literal(value.to_owned()),
                };
                bindings.bind(&captures["name"], binding);
            }
        }

        bindings
    }

    /// Whether `resolve` would bind a name from `line`.
    pub fn is_context_line(line: &str) -> bool {
        let line = line.trim();
        comparison_line().is_match(line) || assignment_line().is_match(line)
    }

    /// Binds `name`, replacing any earlier binding in place.
    pub fn bind(&mut self, name: &str, binding: Binding) {
        match self.entries.iter_mut().find(|(n, _)| n == name) {
            Some((_, existing)) => *existing = binding,
            None => self.entries.push((name.to_owned(), binding)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Binding> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, binding)| binding)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Binding)> {
        self.entries.iter().map(|(n, b)| (n.as_str(), b))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Replaces every occurrence of each bound name in `raw` with its value.
    ///
    /// This is plain substring replacement, not token-aware: a name that
    /// also occurs inside a longer name, a literal or an earlier
    /// substitution is replaced there too.
    pub fn substitute(&self, raw: &str) -> String {
        let mut text = raw.to_owned();

        for (name, binding) in &self.entries {
            text = text.replace(name.as_str(), binding.as_source());
        }

        text
    }
}
