//! Grammar model for context-sensitive rules.
//!
//! A context-sensitive production like `b C a → b c a` is represented as the
//! context-free core `〈 C → c 〉` plus a positive expectation `&b` on the left
//! and `&a` on the right. Expectations are not enforced when the rule fires
//! but later, when the resulting match is placed next to a neighbor: a rule
//! `S → z C` does not combine with that `C` because `z` cannot quench the
//! left expectation, while `R → b C` does.
//!
//! Expectations come in two polarities: `&b` accepts only a neighbor with
//! external name `b`, `!b` accepts any neighbor except one named `b`.
//!
//! Two kinds of rules exist:
//! - terminal rules match the input directly through a regular expression,
//!   written `〈 a → /a[^a]+a/ 〉`;
//! - substitution rules rewrite a sequence of externals into a new external,
//!   written `!a〈 S → a 〉&b`.
//!
//! Rules are registered through [`crate::Parser::new`], which compiles them
//! into the interned, indexed form the chart engine consumes. Registration
//! is closed before parsing.

use std::collections::{HashMap, HashSet};
use std::fmt;

use log::warn;
use regex::Regex;

/// Interned external name, an index into the grammar-wide name table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct ExtId(pub(crate) u32);

/// Rule name assigned at registration, in registration order. It is the
/// rule's identity for deduplication and display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct RuleId(pub(crate) u32);

/// Polarity of an expectation: `&` accepts a matching external, `!` accepts
/// anything else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Polarity {
    Positive,
    Negative,
}

impl Polarity {
    pub(crate) fn symbol(self) -> char {
        match self {
            Polarity::Positive => '&',
            Polarity::Negative => '!',
        }
    }
}

/// A context expectation: a polarity plus the external name it tests.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Expectation {
    pub polarity: Polarity,
    pub ext: String,
}

impl Expectation {
    /// The expectation `&ext`, satisfied only by a neighbor named `ext`.
    pub fn positive(ext: impl Into<String>) -> Self {
        Expectation {
            polarity: Polarity::Positive,
            ext: ext.into(),
        }
    }

    /// The expectation `!ext`, satisfied by any neighbor not named `ext`.
    pub fn negative(ext: impl Into<String>) -> Self {
        Expectation {
            polarity: Polarity::Negative,
            ext: ext.into(),
        }
    }

    /// Whether a neighbor with the given external name satisfies this
    /// expectation.
    pub fn admits(&self, external: &str) -> bool {
        match self.polarity {
            Polarity::Positive => self.ext == external,
            Polarity::Negative => self.ext != external,
        }
    }
}

impl fmt::Display for Expectation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.polarity.symbol(), self.ext)
    }
}

/// A grammar rule as supplied at registration.
///
/// Use [`Rule::terminal`] and [`Rule::substitution`] to build rules;
/// expectations are attached with [`Rule::with_left`] / [`Rule::with_right`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Rule {
    Terminal {
        ext: String,
        pattern: String,
    },
    Substitution {
        ext: String,
        act: Vec<String>,
        left: Option<Expectation>,
        right: Option<Expectation>,
    },
}

impl Rule {
    /// A terminal rule `〈 ext → /pattern/ 〉`. The pattern is compiled at
    /// registration and applied anchored at each scan position.
    pub fn terminal(ext: impl Into<String>, pattern: impl Into<String>) -> Rule {
        Rule::Terminal {
            ext: ext.into(),
            pattern: pattern.into(),
        }
    }

    /// A substitution rule `〈 ext → act... 〉` without context expectations.
    pub fn substitution<I, S>(ext: impl Into<String>, act: I) -> Rule
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Rule::Substitution {
            ext: ext.into(),
            act: act.into_iter().map(Into::into).collect(),
            left: None,
            right: None,
        }
    }

    /// Attach a left expectation. Terminal rules carry no expectations.
    pub fn with_left(mut self, expectation: Expectation) -> Rule {
        match &mut self {
            Rule::Substitution { left, .. } => *left = Some(expectation),
            Rule::Terminal { .. } => debug_assert!(false, "terminal rules have no expectations"),
        }
        self
    }

    /// Attach a right expectation. Terminal rules carry no expectations.
    pub fn with_right(mut self, expectation: Expectation) -> Rule {
        match &mut self {
            Rule::Substitution { right, .. } => *right = Some(expectation),
            Rule::Terminal { .. } => debug_assert!(false, "terminal rules have no expectations"),
        }
        self
    }

    /// The external name this rule produces.
    pub fn ext(&self) -> &str {
        match self {
            Rule::Terminal { ext, .. } => ext,
            Rule::Substitution { ext, .. } => ext,
        }
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rule::Terminal { ext, pattern } => write!(f, "〈{ext} → /{pattern}/〉"),
            Rule::Substitution {
                ext,
                act,
                left,
                right,
            } => {
                if let Some(l) = left {
                    write!(f, "{l}")?;
                }
                write!(f, "〈{ext} → {}〉", act.join(" "))?;
                if let Some(r) = right {
                    write!(f, "{r}")?;
                }
                Ok(())
            }
        }
    }
}

/// Errors raised while compiling a rule set.
#[derive(Debug, Clone, PartialEq)]
pub enum GrammarError {
    /// A substitution rule with an empty action tuple.
    EmptyAction { ext: String },
    /// The same rule was registered twice.
    DuplicateRule { rule: String },
    /// A terminal rule whose pattern is not a valid regular expression.
    InvalidPattern { ext: String, message: String },
}

impl fmt::Display for GrammarError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GrammarError::EmptyAction { ext } => {
                write!(f, "substitution rule for '{ext}' has an empty action")
            }
            GrammarError::DuplicateRule { rule } => {
                write!(f, "rule {rule} registered twice")
            }
            GrammarError::InvalidPattern { ext, message } => {
                write!(f, "invalid pattern in terminal rule for '{ext}': {message}")
            }
        }
    }
}

impl std::error::Error for GrammarError {}

/// Compiled expectation, over interned names.
#[derive(Debug, Clone)]
pub(crate) struct CompiledExpectation {
    pub(crate) polarity: Polarity,
    pub(crate) ext: ExtId,
}

impl CompiledExpectation {
    pub(crate) fn admits(&self, external: ExtId) -> bool {
        match self.polarity {
            Polarity::Positive => self.ext == external,
            Polarity::Negative => self.ext != external,
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct CompiledTerminal {
    pub(crate) ext: ExtId,
    regex: Regex,
}

impl CompiledTerminal {
    /// Length of the terminal match anchored at `at`, if any. Zero-width
    /// matches are discarded: every match must cover at least one byte.
    pub(crate) fn match_len(&self, input: &str, at: usize) -> Option<usize> {
        self.regex
            .find(&input[at..])
            .map(|m| m.end())
            .filter(|&len| len > 0)
    }
}

#[derive(Debug, Clone)]
pub(crate) struct CompiledSubstitution {
    pub(crate) ext: ExtId,
    pub(crate) act: Vec<ExtId>,
    pub(crate) left: Option<CompiledExpectation>,
    pub(crate) right: Option<CompiledExpectation>,
}

#[derive(Debug, Clone)]
pub(crate) enum CompiledRule {
    Terminal(CompiledTerminal),
    Substitution(CompiledSubstitution),
}

/// The compiled, indexed rule set the chart engine works against.
#[derive(Debug)]
pub(crate) struct Grammar {
    rules: Vec<CompiledRule>,
    externals: Vec<String>,
    ext_ids: HashMap<String, ExtId>,
    /// Substitution rules keyed by the external they await first.
    by_first_ext: HashMap<ExtId, Vec<RuleId>>,
    /// Substitution rules carrying a left expectation, in registration order.
    context_rules: Vec<RuleId>,
    terminals: Vec<RuleId>,
}

impl Grammar {
    pub(crate) fn compile(rules: &[Rule]) -> Result<Grammar, GrammarError> {
        let mut seen = HashSet::new();
        for rule in rules {
            if !seen.insert(rule) {
                return Err(GrammarError::DuplicateRule {
                    rule: rule.to_string(),
                });
            }
        }

        let mut grammar = Grammar {
            rules: Vec::with_capacity(rules.len()),
            externals: Vec::new(),
            ext_ids: HashMap::new(),
            by_first_ext: HashMap::new(),
            context_rules: Vec::new(),
            terminals: Vec::new(),
        };

        let mut produced = HashSet::new();
        let mut referenced: Vec<ExtId> = Vec::new();

        for (index, rule) in rules.iter().enumerate() {
            let id = RuleId(index as u32);
            match rule {
                Rule::Terminal { ext, pattern } => {
                    // Anchored so scanning matches exactly at the position.
                    let regex = Regex::new(&format!(r"\A(?:{pattern})")).map_err(|e| {
                        GrammarError::InvalidPattern {
                            ext: ext.clone(),
                            message: e.to_string(),
                        }
                    })?;
                    if regex.is_match("") {
                        warn!(
                            "terminal rule 〈{ext} → /{pattern}/〉 can match the empty string; \
                             zero-width matches are ignored"
                        );
                    }
                    let ext = grammar.intern(ext);
                    produced.insert(ext);
                    grammar
                        .rules
                        .push(CompiledRule::Terminal(CompiledTerminal { ext, regex }));
                    grammar.terminals.push(id);
                }
                Rule::Substitution {
                    ext,
                    act,
                    left,
                    right,
                } => {
                    if act.is_empty() {
                        return Err(GrammarError::EmptyAction { ext: ext.clone() });
                    }
                    let ext = grammar.intern(ext);
                    produced.insert(ext);
                    let act: Vec<ExtId> = act.iter().map(|a| grammar.intern(a)).collect();
                    referenced.extend(&act);
                    let left = left.as_ref().map(|e| CompiledExpectation {
                        polarity: e.polarity,
                        ext: grammar.intern(&e.ext),
                    });
                    let right = right.as_ref().map(|e| CompiledExpectation {
                        polarity: e.polarity,
                        ext: grammar.intern(&e.ext),
                    });
                    referenced.extend(left.iter().chain(right.iter()).map(|e| e.ext));
                    grammar.by_first_ext.entry(act[0]).or_default().push(id);
                    if left.is_some() {
                        grammar.context_rules.push(id);
                    }
                    grammar
                        .rules
                        .push(CompiledRule::Substitution(CompiledSubstitution {
                            ext,
                            act,
                            left,
                            right,
                        }));
                }
            }
        }

        let mut reported = HashSet::new();
        for ext in referenced {
            if !produced.contains(&ext) && reported.insert(ext) {
                // Such rules simply never fire; still worth surfacing.
                warn!(
                    "external '{}' is referenced but produced by no rule",
                    grammar.ext_name(ext)
                );
            }
        }

        Ok(grammar)
    }

    fn intern(&mut self, name: &str) -> ExtId {
        if let Some(&id) = self.ext_ids.get(name) {
            return id;
        }
        let id = ExtId(self.externals.len() as u32);
        self.externals.push(name.to_string());
        self.ext_ids.insert(name.to_string(), id);
        id
    }

    pub(crate) fn ext_name(&self, id: ExtId) -> &str {
        &self.externals[id.0 as usize]
    }

    pub(crate) fn ext_id(&self, name: &str) -> Option<ExtId> {
        self.ext_ids.get(name).copied()
    }

    pub(crate) fn external_count(&self) -> usize {
        self.externals.len()
    }

    pub(crate) fn external_ids(&self) -> impl Iterator<Item = ExtId> {
        (0..self.externals.len() as u32).map(ExtId)
    }

    pub(crate) fn rule(&self, id: RuleId) -> &CompiledRule {
        &self.rules[id.0 as usize]
    }

    pub(crate) fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// The substitution rule behind `id`. Callers only hold substitution ids
    /// where this is used.
    pub(crate) fn substitution(&self, id: RuleId) -> &CompiledSubstitution {
        match self.rule(id) {
            CompiledRule::Substitution(rule) => rule,
            CompiledRule::Terminal(_) => unreachable!("rule {id:?} is not a substitution"),
        }
    }

    pub(crate) fn terminal_rules(&self) -> impl Iterator<Item = (RuleId, &CompiledTerminal)> {
        self.terminals.iter().map(|&id| match self.rule(id) {
            CompiledRule::Terminal(rule) => (id, rule),
            CompiledRule::Substitution(_) => unreachable!("terminal index holds terminals only"),
        })
    }

    /// Substitution rules whose first awaited external is `ext`.
    pub(crate) fn rules_awaiting_first(&self, ext: ExtId) -> &[RuleId] {
        self.by_first_ext
            .get(&ext)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Substitution rules with a left expectation.
    pub(crate) fn context_rules(&self) -> &[RuleId] {
        &self.context_rules
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expectation_admits() {
        let positive = Expectation::positive("b");
        assert!(positive.admits("b"));
        assert!(!positive.admits("a"));

        let negative = Expectation::negative("b");
        assert!(!negative.admits("b"));
        assert!(negative.admits("a"));
    }

    #[test]
    fn test_rule_display() {
        let terminal = Rule::terminal("a", "a[^a]+a");
        assert_eq!(terminal.to_string(), "〈a → /a[^a]+a/〉");

        let plain = Rule::substitution("S", ["a", "b"]);
        assert_eq!(plain.to_string(), "〈S → a b〉");

        let contextual = Rule::substitution("S", ["a"])
            .with_left(Expectation::negative("a"))
            .with_right(Expectation::positive("b"));
        assert_eq!(contextual.to_string(), "!a〈S → a〉&b");
    }

    #[test]
    fn test_compile_rejects_empty_action() {
        let err = Grammar::compile(&[Rule::substitution("S", Vec::<String>::new())]).unwrap_err();
        assert_eq!(
            err,
            GrammarError::EmptyAction {
                ext: "S".to_string()
            }
        );
    }

    #[test]
    fn test_compile_rejects_duplicate_rule() {
        let rules = vec![Rule::terminal("a", "a"), Rule::terminal("a", "a")];
        let err = Grammar::compile(&rules).unwrap_err();
        assert!(matches!(err, GrammarError::DuplicateRule { .. }));
    }

    #[test]
    fn test_compile_rejects_invalid_pattern() {
        let err = Grammar::compile(&[Rule::terminal("a", "(a")]).unwrap_err();
        assert!(matches!(err, GrammarError::InvalidPattern { ext, .. } if ext == "a"));
    }

    #[test]
    fn test_first_awaited_index() {
        let grammar = Grammar::compile(&[
            Rule::terminal("a", "a"),
            Rule::substitution("S", ["a", "B"]),
            Rule::substitution("W", ["a"]),
            Rule::substitution("B", ["b"]),
        ])
        .unwrap();

        let a = grammar.ext_id("a").unwrap();
        assert_eq!(grammar.rules_awaiting_first(a).len(), 2);
        let b = grammar.ext_id("b").unwrap();
        assert_eq!(grammar.rules_awaiting_first(b).len(), 1);
        let s = grammar.ext_id("S").unwrap();
        assert!(grammar.rules_awaiting_first(s).is_empty());
    }

    #[test]
    fn test_context_rule_index() {
        let grammar = Grammar::compile(&[
            Rule::terminal("a", "a"),
            Rule::substitution("B", ["a"]).with_left(Expectation::positive("a")),
            Rule::substitution("C", ["a"]).with_right(Expectation::positive("a")),
        ])
        .unwrap();

        assert_eq!(grammar.context_rules().len(), 1);
    }

    #[test]
    fn test_terminal_match_is_anchored() {
        let grammar =
            Grammar::compile(&[Rule::terminal("a", "ab"), Rule::terminal("z", "b*")]).unwrap();
        let mut terminals = grammar.terminal_rules();

        let (_, ab) = terminals.next().unwrap();
        assert_eq!(ab.match_len("abab", 0), Some(2));
        assert_eq!(ab.match_len("abab", 2), Some(2));
        assert_eq!(ab.match_len("xab", 0), None);

        // `b*` matches everywhere, but zero-width results are discarded.
        let (_, bs) = terminals.next().unwrap();
        assert_eq!(bs.match_len("bba", 0), Some(2));
        assert_eq!(bs.match_len("bba", 2), None);
    }
}
