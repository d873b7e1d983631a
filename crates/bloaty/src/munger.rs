use regex::Regex;

use crate::demangle;

/// One `{pattern, replacement}` rewrite rule from a custom data source
/// definition (spec.md §6).
pub struct RewriteRule {
    pub pattern: Regex,
    pub replacement: String,
}

/// `-C`/`--demangle` mode (spec.md §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DemangleMode {
    /// Leave mangled names as-is.
    None,
    /// Demangle and strip template/generic parameter lists.
    #[default]
    Short,
    /// Demangle with full template/generic parameter lists.
    Full,
}

impl DemangleMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "none" => Some(Self::None),
            "short" => Some(Self::Short),
            "full" => Some(Self::Full),
            _ => None,
        }
    }
}

/// Rewrites incoming range labels before they reach a `DualMap`. Names
/// are demangled first (spec.md §4.2 "symbols are demangled before the
/// munger runs"), then the first matching rewrite rule is applied
/// (spec.md §6 "the munger applies the first matching regex per
/// name"); with no rules and `DemangleMode::None` it's the identity
/// function.
#[derive(Default)]
pub struct NameMunger {
    rules: Vec<RewriteRule>,
    demangle_mode: DemangleMode,
}

impl NameMunger {
    pub fn new() -> Self {
        Self {
            rules: Vec::new(),
            demangle_mode: DemangleMode::default(),
        }
    }

    pub fn with_demangle_mode(mode: DemangleMode) -> Self {
        Self {
            rules: Vec::new(),
            demangle_mode: mode,
        }
    }

    pub fn with_rule(pattern: &str, replacement: &str) -> crate::error::Result<Self> {
        let mut m = Self::new();
        m.add_rule(pattern, replacement)?;
        Ok(m)
    }

    pub fn add_rule(&mut self, pattern: &str, replacement: &str) -> crate::error::Result<()> {
        let re = Regex::new(pattern)?;
        self.rules.push(RewriteRule {
            pattern: re,
            replacement: replacement.to_string(),
        });
        Ok(())
    }

    pub fn apply<'a>(&self, name: &'a str) -> std::borrow::Cow<'a, str> {
        let demangled = match self.demangle_mode {
            DemangleMode::None => std::borrow::Cow::Borrowed(name),
            DemangleMode::Short => std::borrow::Cow::Owned(demangle::demangle_short(name)),
            DemangleMode::Full => std::borrow::Cow::Owned(demangle::demangle(name)),
        };
        for rule in &self.rules {
            if rule.pattern.is_match(&demangled) {
                return std::borrow::Cow::Owned(
                    rule.pattern
                        .replace(&demangled, rule.replacement.as_str())
                        .into_owned(),
                );
            }
        }
        demangled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_with_no_rules() {
        let m = NameMunger::new();
        assert_eq!(m.apply("foo::bar"), "foo::bar");
    }

    #[test]
    fn first_matching_rule_wins() {
        let mut m = NameMunger::new();
        m.add_rule(r"^foo::(.*)", "F::$1").unwrap();
        m.add_rule(r"^foo::bar$", "never").unwrap();
        assert_eq!(m.apply("foo::bar"), "F::bar");
    }

    #[test]
    fn no_match_is_passthrough() {
        let mut m = NameMunger::new();
        m.add_rule(r"^zzz", "nope").unwrap();
        assert_eq!(m.apply("foo::bar"), "foo::bar");
    }
}
