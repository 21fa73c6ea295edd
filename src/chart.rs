//! Deduplicating match store and its lookup indexes.
//!
//! The chart owns the per-parse arenas of complete and forward matches and
//! guarantees idempotent insertion: inserting a match that is already
//! present is a silent no-op. The final chart is therefore a function of
//! (grammar, input) alone, whatever order the agenda processed work in.
//!
//! ## Identity
//!
//! Matches are deduplicated by structural keys, not by arena ids. Two
//! matches are the same when they apply the same rule over the same span to
//! structurally-equal children and record structurally-equal context
//! witnesses:
//!
//! - the *core* of a match is (rule, span, children cores) — context
//!   witnesses excluded;
//! - the *left key* is the chain of cores of the left witness, its left
//!   witness, and so on leftwards;
//! - the *right key* is the same chain rightwards.
//!
//! Keying contexts by core chains rather than full identity is what keeps
//! the chart finite: a witness variant of a witness does not spawn a new
//! identity for the matches that recorded it. All three keys are interned
//! to small ids, so a dedup probe hashes a few integers.
//!
//! ## Indexes
//!
//! Complete matches are indexed by (external, start), (external, end) and by
//! bare position; forward matches by (awaited external, end), where a
//! forward match waiting for its right context is filed under every
//! external its expectation admits. Buckets are vectors in insertion order,
//! so iteration is deterministic.

use std::collections::HashMap;

use crate::grammar::{ExtId, Grammar, RuleId};
use crate::matches::{CompleteId, CompleteMatch, ForwardId, ForwardMatch};

/// Interned core key (rule, span, children cores).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct CoreId(u32);

/// Interned chain of cores to the left. `LeftKey(0)` is the empty chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct LeftKey(u32);

/// Interned chain of cores to the right. `RightKey(0)` is the empty chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct RightKey(u32);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CoreKey {
    rule: RuleId,
    start: usize,
    end: usize,
    children: Vec<CoreId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ForwardKey {
    rule: RuleId,
    start: usize,
    end: usize,
    children: Vec<CoreId>,
    left: LeftKey,
    right: RightKey,
}

#[derive(Debug, Default)]
pub(crate) struct Chart {
    completes: Vec<CompleteMatch>,
    complete_keys: Vec<(CoreId, LeftKey, RightKey)>,
    complete_ids: HashMap<(CoreId, LeftKey, RightKey), CompleteId>,
    forwards: Vec<ForwardMatch>,
    forward_ids: HashMap<ForwardKey, ForwardId>,
    cores: HashMap<CoreKey, CoreId>,
    left_keys: HashMap<(LeftKey, CoreId), LeftKey>,
    right_keys: HashMap<(CoreId, RightKey), RightKey>,
    by_ext_start: HashMap<(ExtId, usize), Vec<CompleteId>>,
    by_ext_end: HashMap<(ExtId, usize), Vec<CompleteId>>,
    by_start: HashMap<usize, Vec<CompleteId>>,
    by_end: HashMap<usize, Vec<CompleteId>>,
    waiting: HashMap<(ExtId, usize), Vec<ForwardId>>,
}

impl Chart {
    pub(crate) fn new() -> Chart {
        Chart::default()
    }

    pub(crate) fn complete(&self, id: CompleteId) -> &CompleteMatch {
        &self.completes[id.0 as usize]
    }

    pub(crate) fn forward(&self, id: ForwardId) -> &ForwardMatch {
        &self.forwards[id.0 as usize]
    }

    pub(crate) fn complete_count(&self) -> usize {
        self.completes.len()
    }

    pub(crate) fn forward_count(&self) -> usize {
        self.forwards.len()
    }

    /// Insert a complete match unless an equal one is present. Returns the
    /// arena id on fresh insertion only.
    pub(crate) fn insert_complete(&mut self, m: CompleteMatch) -> Option<CompleteId> {
        debug_assert!(m.start < m.end, "complete matches cover at least one byte");
        debug_assert!(
            m.children.iter().all(|&c| (c.0 as usize) < self.completes.len()),
            "children are inserted before their parent"
        );

        let children: Vec<CoreId> = m.children.iter().map(|&c| self.core_of(c)).collect();
        let core = self.intern_core(CoreKey {
            rule: m.rule,
            start: m.start,
            end: m.end,
            children,
        });
        let left = self.left_key_for(m.left_ctx);
        let right = self.right_key_for(m.right_ctx);

        if self.complete_ids.contains_key(&(core, left, right)) {
            return None;
        }
        let id = CompleteId(self.completes.len() as u32);
        self.complete_ids.insert((core, left, right), id);
        self.complete_keys.push((core, left, right));
        self.by_ext_start.entry((m.ext, m.start)).or_default().push(id);
        self.by_ext_end.entry((m.ext, m.end)).or_default().push(id);
        self.by_start.entry(m.start).or_default().push(id);
        self.by_end.entry(m.end).or_default().push(id);
        self.completes.push(m);
        Some(id)
    }

    /// Insert a forward match unless an equal one is present, filing it
    /// under the externals it can consume next.
    pub(crate) fn insert_forward(
        &mut self,
        m: ForwardMatch,
        grammar: &Grammar,
    ) -> Option<ForwardId> {
        let rule = grammar.substitution(m.rule);
        debug_assert!(m.dot() <= rule.act.len());

        let children: Vec<CoreId> = m.children.iter().map(|&c| self.core_of(c)).collect();
        let left = self.left_key_for(m.left_brother);
        let right = match m.children.last() {
            None => RightKey(0),
            Some(&last) => {
                let witness = self.complete(last).right_ctx;
                self.right_key_for(witness)
            }
        };
        let key = ForwardKey {
            rule: m.rule,
            start: m.start,
            end: m.end,
            children,
            left,
            right,
        };
        if self.forward_ids.contains_key(&key) {
            return None;
        }

        let id = ForwardId(self.forwards.len() as u32);
        if m.dot() < rule.act.len() {
            self.waiting.entry((rule.act[m.dot()], m.end)).or_default().push(id);
        } else if let Some(exp) = &rule.right {
            // All children are in; the forward match now waits for a right
            // context, under every external its expectation admits.
            for ext in grammar.external_ids() {
                if exp.admits(ext) {
                    self.waiting.entry((ext, m.end)).or_default().push(id);
                }
            }
        }
        self.forward_ids.insert(key, id);
        self.forwards.push(m);
        Some(id)
    }

    fn core_of(&self, id: CompleteId) -> CoreId {
        self.complete_keys[id.0 as usize].0
    }

    fn intern_core(&mut self, key: CoreKey) -> CoreId {
        let next = CoreId(self.cores.len() as u32);
        *self.cores.entry(key).or_insert(next)
    }

    fn left_key_for(&mut self, ctx: Option<CompleteId>) -> LeftKey {
        match ctx {
            None => LeftKey(0),
            Some(id) => {
                let (core, left, _) = self.complete_keys[id.0 as usize];
                let next = LeftKey(self.left_keys.len() as u32 + 1);
                *self.left_keys.entry((left, core)).or_insert(next)
            }
        }
    }

    fn right_key_for(&mut self, ctx: Option<CompleteId>) -> RightKey {
        match ctx {
            None => RightKey(0),
            Some(id) => {
                let (core, _, right) = self.complete_keys[id.0 as usize];
                let next = RightKey(self.right_keys.len() as u32 + 1);
                *self.right_keys.entry((core, right)).or_insert(next)
            }
        }
    }

    pub(crate) fn starting_at(&self, ext: ExtId, position: usize) -> &[CompleteId] {
        self.by_ext_start
            .get(&(ext, position))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub(crate) fn ending_at(&self, ext: ExtId, position: usize) -> &[CompleteId] {
        self.by_ext_end
            .get(&(ext, position))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub(crate) fn all_starting_at(&self, position: usize) -> &[CompleteId] {
        self.by_start.get(&position).map(Vec::as_slice).unwrap_or(&[])
    }

    pub(crate) fn all_ending_at(&self, position: usize) -> &[CompleteId] {
        self.by_end.get(&position).map(Vec::as_slice).unwrap_or(&[])
    }

    pub(crate) fn waiting_at(&self, ext: ExtId, position: usize) -> &[ForwardId] {
        self.waiting
            .get(&(ext, position))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// The matches closing where `id` closes: `id` itself, then its last
    /// child, recursively down to a terminal. Newest first.
    pub(crate) fn history_at_close(&self, id: CompleteId) -> Vec<CompleteId> {
        let mut history = vec![id];
        let mut current = id;
        while let Some(&last) = self.complete(current).children.last() {
            history.push(last);
            current = last;
        }
        history
    }

    /// The matches starting where `id` starts: `id` itself, then its first
    /// child, recursively down to a terminal. Newest first.
    pub(crate) fn history_at_start(&self, id: CompleteId) -> Vec<CompleteId> {
        let mut history = vec![id];
        let mut current = id;
        while let Some(&first) = self.complete(current).children.first() {
            history.push(first);
            current = first;
        }
        history
    }

    /// Whether `ext` already names a match in the unit-rename chain of `id`:
    /// `id` itself, its single child, that child's single child, and so on
    /// while the chain keeps width one.
    pub(crate) fn in_rename_chain(&self, mut id: CompleteId, ext: ExtId) -> bool {
        loop {
            let m = self.complete(id);
            if m.ext == ext {
                return true;
            }
            match m.children.as_slice() {
                [only] => id = *only,
                _ => return false,
            }
        }
    }

    /// Human-readable form of a complete match:
    /// `*b1 ((C → c))2 *a1 [2:3]`, with `/.../` standing in for a terminal
    /// pattern and `*ext<depth>` for recorded context witnesses.
    pub(crate) fn render_complete(&self, grammar: &Grammar, id: CompleteId) -> String {
        let m = self.complete(id);
        let mut out = String::new();
        if let Some(l) = m.left_ctx {
            let l = self.complete(l);
            out.push_str(&format!("*{}{} ", grammar.ext_name(l.ext), l.depth));
        }
        let body = if m.is_terminal() {
            "/.../".to_string()
        } else {
            m.children
                .iter()
                .map(|&c| grammar.ext_name(self.complete(c).ext))
                .collect::<Vec<_>>()
                .join(" ")
        };
        out.push_str(&format!(
            "(({} → {})){}",
            grammar.ext_name(m.ext),
            body,
            m.depth
        ));
        if let Some(r) = m.right_ctx {
            let r = self.complete(r);
            out.push_str(&format!(" *{}{}", grammar.ext_name(r.ext), r.depth));
        }
        out.push_str(&format!(" [{}:{}]", m.start, m.end));
        out
    }

    /// Human-readable form of a forward match:
    /// `*b1 (C → c • d) &a [2:3]`, the dot separating completed children
    /// from awaited externals.
    pub(crate) fn render_forward(&self, grammar: &Grammar, id: ForwardId) -> String {
        let m = self.forward(id);
        let rule = grammar.substitution(m.rule);
        let mut out = String::new();
        if let Some(l) = m.left_brother {
            let l = self.complete(l);
            out.push_str(&format!("*{}{} ", grammar.ext_name(l.ext), l.depth));
        }
        let done = m
            .children
            .iter()
            .map(|&c| grammar.ext_name(self.complete(c).ext))
            .collect::<Vec<_>>()
            .join(" ");
        let awaited = rule.act[m.dot()..]
            .iter()
            .map(|&e| grammar.ext_name(e))
            .collect::<Vec<_>>()
            .join(" ");
        out.push_str(&format!(
            "({} → {} • {})",
            grammar.ext_name(m.ext),
            done,
            awaited
        ));
        if let Some(exp) = &rule.right {
            out.push_str(&format!(
                " {}{}",
                exp.polarity.symbol(),
                grammar.ext_name(exp.ext)
            ));
        }
        out.push_str(&format!(" [{}:{}]", m.start, m.end));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::{Expectation, Rule};

    fn test_grammar() -> Grammar {
        Grammar::compile(&[
            Rule::terminal("a", "a"),
            Rule::terminal("b", "b"),
            Rule::substitution("B", ["b"]),
            Rule::substitution("S", ["a", "B"]),
            Rule::substitution("A", ["a"]).with_right(Expectation::negative("b")),
        ])
        .unwrap()
    }

    fn ext(grammar: &Grammar, name: &str) -> ExtId {
        grammar.ext_id(name).unwrap()
    }

    #[test]
    fn test_insertion_is_idempotent() {
        let grammar = test_grammar();
        let mut chart = Chart::new();

        let m = CompleteMatch::terminal(RuleId(0), ext(&grammar, "a"), 0, 1);
        let first = chart.insert_complete(m.clone());
        assert!(first.is_some());
        assert_eq!(chart.insert_complete(m), None);
        assert_eq!(chart.complete_count(), 1);
    }

    #[test]
    fn test_duplicate_forward_is_dropped() {
        let grammar = test_grammar();
        let mut chart = Chart::new();

        let f = ForwardMatch::seed(RuleId(3), ext(&grammar, "S"), 0, None);
        assert!(chart.insert_forward(f.clone(), &grammar).is_some());
        assert_eq!(chart.insert_forward(f, &grammar), None);
        assert_eq!(chart.forward_count(), 1);
    }

    #[test]
    fn test_context_witness_distinguishes_matches() {
        let grammar = test_grammar();
        let mut chart = Chart::new();
        let b = ext(&grammar, "b");

        let witness = chart
            .insert_complete(CompleteMatch::terminal(RuleId(1), b, 0, 1))
            .unwrap();
        let plain = CompleteMatch {
            rule: RuleId(2),
            ext: ext(&grammar, "B"),
            start: 1,
            end: 2,
            depth: 2,
            children: vec![chart
                .insert_complete(CompleteMatch::terminal(RuleId(1), b, 1, 2))
                .unwrap()],
            left_ctx: None,
            right_ctx: None,
        };
        let contextual = CompleteMatch {
            left_ctx: Some(witness),
            ..plain.clone()
        };

        assert!(chart.insert_complete(plain).is_some());
        assert!(chart.insert_complete(contextual).is_some());
        assert_eq!(chart.complete_count(), 4);
    }

    #[test]
    fn test_position_indexes() {
        let grammar = test_grammar();
        let mut chart = Chart::new();
        let a = ext(&grammar, "a");
        let b = ext(&grammar, "b");

        let id = chart
            .insert_complete(CompleteMatch::terminal(RuleId(0), a, 0, 1))
            .unwrap();
        chart
            .insert_complete(CompleteMatch::terminal(RuleId(1), b, 1, 2))
            .unwrap();

        assert_eq!(chart.starting_at(a, 0), &[id]);
        assert_eq!(chart.ending_at(a, 1), &[id]);
        assert!(chart.starting_at(a, 1).is_empty());
        assert_eq!(chart.all_starting_at(0).len(), 1);
        assert_eq!(chart.all_ending_at(2).len(), 1);
    }

    #[test]
    fn test_waiting_index_follows_the_dot() {
        let grammar = test_grammar();
        let mut chart = Chart::new();
        let a = ext(&grammar, "a");
        let s = ext(&grammar, "S");

        let fid = chart
            .insert_forward(ForwardMatch::seed(RuleId(3), s, 0, None), &grammar)
            .unwrap();
        assert_eq!(chart.waiting_at(a, 0), &[fid]);
        assert!(chart.waiting_at(a, 1).is_empty());
    }

    #[test]
    fn test_histories_walk_the_spine() {
        let grammar = test_grammar();
        let mut chart = Chart::new();
        let b = ext(&grammar, "b");

        let leaf = chart
            .insert_complete(CompleteMatch::terminal(RuleId(1), b, 0, 1))
            .unwrap();
        let wrap = chart
            .insert_complete(CompleteMatch {
                rule: RuleId(2),
                ext: ext(&grammar, "B"),
                start: 0,
                end: 1,
                depth: 2,
                children: vec![leaf],
                left_ctx: None,
                right_ctx: None,
            })
            .unwrap();

        assert_eq!(chart.history_at_close(wrap), vec![wrap, leaf]);
        assert_eq!(chart.history_at_start(wrap), vec![wrap, leaf]);
        assert_eq!(chart.history_at_close(leaf), vec![leaf]);
    }

    #[test]
    fn test_rename_chain_membership() {
        let grammar = test_grammar();
        let mut chart = Chart::new();
        let b = ext(&grammar, "b");
        let big_b = ext(&grammar, "B");

        let leaf = chart
            .insert_complete(CompleteMatch::terminal(RuleId(1), b, 0, 1))
            .unwrap();
        let wrap = chart
            .insert_complete(CompleteMatch {
                rule: RuleId(2),
                ext: big_b,
                start: 0,
                end: 1,
                depth: 2,
                children: vec![leaf],
                left_ctx: None,
                right_ctx: None,
            })
            .unwrap();

        assert!(chart.in_rename_chain(wrap, big_b));
        assert!(chart.in_rename_chain(wrap, b));
        assert!(!chart.in_rename_chain(leaf, big_b));
        assert!(!chart.in_rename_chain(wrap, ext(&grammar, "S")));
    }

    #[test]
    fn test_render_forms() {
        let grammar = test_grammar();
        let mut chart = Chart::new();
        let a = ext(&grammar, "a");
        let b = ext(&grammar, "b");

        let left = chart
            .insert_complete(CompleteMatch::terminal(RuleId(0), a, 0, 1))
            .unwrap();
        assert_eq!(chart.render_complete(&grammar, left), "((a → /.../))1 [0:1]");

        let leaf = chart
            .insert_complete(CompleteMatch::terminal(RuleId(1), b, 1, 2))
            .unwrap();
        let wrap = chart
            .insert_complete(CompleteMatch {
                rule: RuleId(2),
                ext: ext(&grammar, "B"),
                start: 1,
                end: 2,
                depth: 2,
                children: vec![leaf],
                left_ctx: Some(left),
                right_ctx: None,
            })
            .unwrap();
        assert_eq!(
            chart.render_complete(&grammar, wrap),
            "*a1 ((B → b))2 [1:2]"
        );

        let fid = chart
            .insert_forward(
                ForwardMatch {
                    rule: RuleId(3),
                    ext: ext(&grammar, "S"),
                    start: 0,
                    end: 1,
                    children: vec![left],
                    left_brother: None,
                },
                &grammar,
            )
            .unwrap();
        assert_eq!(chart.render_forward(&grammar, fid), "(S → a • B) [0:1]");

        // A finished forward match shows its pending right expectation.
        let awaiting = chart
            .insert_forward(
                ForwardMatch {
                    rule: RuleId(4),
                    ext: ext(&grammar, "A"),
                    start: 0,
                    end: 1,
                    children: vec![left],
                    left_brother: None,
                },
                &grammar,
            )
            .unwrap();
        assert_eq!(
            chart.render_forward(&grammar, awaiting),
            "(A → a • ) !b [0:1]"
        );
    }
}
