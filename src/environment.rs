// src/environment.rs

//! Key/value environments passed into containers.
//!
//! An [`Environment`] is built from ordered `KEY=VALUE` sources where later
//! sources override earlier keys. Values may reference other variables with
//! `${NAME}` or `$NAME`; [`Environment::expand_string`] resolves those
//! references repeatedly until the result stops changing.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::errors::{IjError, Result};

/// Number of expansion passes before a template is considered divergent.
pub const MAX_EXPANSION_DEPTH: usize = 50;

static VARIABLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}|\$([A-Za-z_][A-Za-z0-9_]*)")
        .expect("variable pattern is valid")
});

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment {
    vars: BTreeMap<String, String>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `KEY=VALUE` lines.
    ///
    /// A bare `KEY` takes its value from the process environment and is
    /// skipped when the process does not define it. Lines with an empty key
    /// are ignored.
    pub fn from_lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut vars = BTreeMap::new();
        for line in lines {
            let line = line.as_ref().trim();
            match line.split_once('=') {
                Some((key, value)) => {
                    let key = key.trim();
                    if !key.is_empty() {
                        vars.insert(key.to_string(), value.to_string());
                    }
                }
                None if !line.is_empty() => {
                    if let Ok(value) = std::env::var(line) {
                        vars.insert(line.to_string(), value);
                    }
                }
                None => {}
            }
        }
        Self { vars }
    }

    /// Merge environments in order; later environments override earlier keys.
    pub fn merge<'a, I>(envs: I) -> Self
    where
        I: IntoIterator<Item = &'a Environment>,
    {
        let mut merged = Self::new();
        for env in envs {
            merged.extend(env);
        }
        merged
    }

    /// Overlay `other` onto `self`.
    pub fn extend(&mut self, other: &Environment) {
        for (key, value) in &other.vars {
            self.vars.insert(key.clone(), value.clone());
        }
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.vars.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.vars.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// `KEY=VALUE` lines sorted by key.
    pub fn serialize(&self) -> Vec<String> {
        self.vars.iter().map(|(k, v)| format!("{k}={v}")).collect()
    }

    /// Required keys that are not bound in this environment, in input order.
    pub fn missing(&self, required: &[String]) -> Vec<String> {
        required
            .iter()
            .filter(|key| !self.vars.contains_key(key.as_str()))
            .cloned()
            .collect()
    }

    /// Expand `${NAME}` / `$NAME` references until the output stabilises.
    ///
    /// Unbound names are rewritten to `${NAME}` and left in place. If the
    /// template still changes after [`MAX_EXPANSION_DEPTH`] passes, the
    /// definitions are mutually referential and expansion fails.
    pub fn expand_string(&self, template: &str) -> Result<String> {
        let mut current = template.to_string();
        for _ in 0..MAX_EXPANSION_DEPTH {
            let next = self.expand_once(&current);
            if next == current {
                return Ok(next);
            }
            current = next;
        }
        Err(IjError::ExpansionOverflow(current))
    }

    pub fn expand_slice(&self, templates: &[String]) -> Result<Vec<String>> {
        templates.iter().map(|t| self.expand_string(t)).collect()
    }

    pub fn expand_option(&self, template: Option<&str>) -> Result<Option<String>> {
        template.map(|t| self.expand_string(t)).transpose()
    }

    /// Expand every value against this environment.
    pub fn normalize(&self) -> Result<Environment> {
        let mut vars = BTreeMap::new();
        for (key, value) in &self.vars {
            vars.insert(key.clone(), self.expand_string(value)?);
        }
        Ok(Self { vars })
    }

    fn expand_once(&self, template: &str) -> String {
        VARIABLE
            .replace_all(template, |caps: &Captures<'_>| {
                let name = caps
                    .get(1)
                    .or_else(|| caps.get(2))
                    .map(|m| m.as_str())
                    .unwrap_or_default();
                match self.vars.get(name) {
                    Some(value) => value.clone(),
                    None => format!("${{{name}}}"),
                }
            })
            .into_owned()
    }
}

impl<K, V> FromIterator<(K, V)> for Environment
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self {
            vars: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}
