//! Parser driver: scan, saturate, harvest.
//!
//! The driver runs a bottom-up variant of Earley's algorithm. Scanning
//! applies every terminal rule at every position of the input and inserts
//! the resulting matches. Saturation then drains an agenda of fresh
//! matches: a new complete match is offered to the forward matches waiting
//! where it starts and spawns forward matches for the rules it can begin
//! or contextualize; a new forward match is paired with the complete
//! matches already in the chart. The chart deduplicates, so the loop
//! terminates and the final chart does not depend on processing order.
//!
//! Harvesting collects the complete matches spanning the whole input,
//! optionally restricted to an expected external name.
//!
//! ```
//! use earlex::{Expectation, Parser, Rule};
//!
//! let parser = Parser::new(vec![
//!     Rule::terminal("a", "a"),
//!     Rule::terminal("b", "b"),
//!     Rule::substitution("B", ["b"]).with_left(Expectation::positive("a")),
//!     Rule::substitution("S", ["a", "B"]),
//! ])?;
//!
//! let parse = parser.parse("ab");
//! let solutions = parse.solutions_for("S");
//! assert_eq!(solutions.len(), 1);
//! assert_eq!(solutions[0].to_string(), "((S → a B))1 [0:2]");
//! # Ok::<(), earlex::GrammarError>(())
//! ```

use std::collections::VecDeque;
use std::fmt;

use log::{debug, trace};

use crate::chart::Chart;
use crate::grammar::{Grammar, GrammarError, Polarity, Rule};
use crate::interact::{feed, settle, settle_at_boundary, Interaction};
use crate::matches::{CompleteId, CompleteMatch, ForwardId, ForwardMatch};

/// A parser for a fixed context-sensitive grammar. Rules are compiled once
/// at construction; the parser itself is immutable and reusable across
/// inputs.
#[derive(Debug)]
pub struct Parser {
    grammar: Grammar,
}

/// Agenda entry: a freshly inserted match of either kind.
#[derive(Debug, Clone, Copy)]
enum Task {
    Complete(CompleteId),
    Forward(ForwardId),
}

impl Parser {
    /// Compile a rule set. Rules may be given in any order; each receives
    /// its name from its position in the list.
    pub fn new(rules: Vec<Rule>) -> Result<Parser, GrammarError> {
        let grammar = Grammar::compile(&rules)?;
        debug!(
            "grammar compiled: {} rules over {} externals",
            grammar.rule_count(),
            grammar.external_count()
        );
        Ok(Parser { grammar })
    }

    /// Parse `input` from scratch, returning the saturated chart.
    pub fn parse(&self, input: &str) -> Parse<'_> {
        let mut chart = Chart::new();
        let mut agenda = VecDeque::new();

        // Scan: every terminal rule at every position.
        for at in (0..=input.len()).filter(|&p| input.is_char_boundary(p)) {
            for (rule, terminal) in self.grammar.terminal_rules() {
                if let Some(len) = terminal.match_len(input, at) {
                    let m = CompleteMatch::terminal(rule, terminal.ext, at, at + len);
                    self.admit_complete(&mut chart, &mut agenda, m);
                }
            }
        }

        // Saturate.
        while let Some(task) = agenda.pop_front() {
            match task {
                Task::Complete(id) => self.process_complete(&mut chart, &mut agenda, id),
                Task::Forward(id) => self.process_forward(&mut chart, &mut agenda, input.len(), id),
            }
        }
        debug!(
            "chart saturated: {} complete, {} forward matches",
            chart.complete_count(),
            chart.forward_count()
        );

        Parse {
            grammar: &self.grammar,
            chart,
            input_len: input.len(),
        }
    }

    /// Handle a fresh complete match: offer it to waiting forward matches,
    /// then spawn the rules it can start or serve as left context for.
    fn process_complete(&self, chart: &mut Chart, agenda: &mut VecDeque<Task>, id: CompleteId) {
        let (ext, start, end) = {
            let m = chart.complete(id);
            (m.ext, m.start, m.end)
        };

        // Forward matches waiting where this match starts.
        let waiting: Vec<ForwardId> = chart.waiting_at(ext, start).to_vec();
        for fid in waiting {
            self.pair(chart, agenda, fid, id);
        }

        // Rules whose first awaited external this match provides.
        for &rule in self.grammar.rules_awaiting_first(ext) {
            let sub = self.grammar.substitution(rule);
            match &sub.left {
                None => {
                    self.admit_forward(
                        chart,
                        agenda,
                        ForwardMatch::seed(rule, sub.ext, start, None),
                    );
                }
                Some(exp) => {
                    // Left witnesses already in the chart; late arrivals are
                    // handled below when the witness itself is processed.
                    let candidates: Vec<CompleteId> = match exp.polarity {
                        Polarity::Positive => chart.ending_at(exp.ext, start).to_vec(),
                        Polarity::Negative => chart
                            .all_ending_at(start)
                            .iter()
                            .copied()
                            .filter(|&l| chart.complete(l).ext != exp.ext)
                            .collect(),
                    };
                    for brother in candidates {
                        self.admit_forward(
                            chart,
                            agenda,
                            ForwardMatch::seed(rule, sub.ext, start, Some(brother)),
                        );
                    }
                    // A negative demand at the left edge of the input is
                    // satisfied by the absence of any neighbor.
                    if exp.polarity == Polarity::Negative && start == 0 {
                        self.admit_forward(
                            chart,
                            agenda,
                            ForwardMatch::seed(rule, sub.ext, start, None),
                        );
                    }
                }
            }
        }

        // Rules this match can serve as left brother for.
        for &rule in self.grammar.context_rules() {
            let sub = self.grammar.substitution(rule);
            if let Some(exp) = &sub.left {
                if exp.admits(ext) {
                    self.admit_forward(
                        chart,
                        agenda,
                        ForwardMatch::seed(rule, sub.ext, end, Some(id)),
                    );
                }
            }
        }
    }

    /// Handle a fresh forward match: pair it with the complete matches
    /// already in the chart, or close it at the input boundary.
    fn process_forward(
        &self,
        chart: &mut Chart,
        agenda: &mut VecDeque<Task>,
        input_len: usize,
        id: ForwardId,
    ) {
        let (rule, end, dot) = {
            let m = chart.forward(id);
            (m.rule, m.end, m.dot())
        };
        let sub = self.grammar.substitution(rule);

        if dot < sub.act.len() {
            let awaited = sub.act[dot];
            let candidates: Vec<CompleteId> = chart.starting_at(awaited, end).to_vec();
            for cid in candidates {
                self.pair(chart, agenda, id, cid);
            }
            return;
        }

        // All children are in: look for a right context.
        let Some(exp) = &sub.right else {
            // Rules without a right expectation close inside `feed`.
            return;
        };
        let candidates: Vec<CompleteId> = match exp.polarity {
            Polarity::Positive => chart.starting_at(exp.ext, end).to_vec(),
            Polarity::Negative => chart
                .all_starting_at(end)
                .iter()
                .copied()
                .filter(|&c| chart.complete(c).ext != exp.ext)
                .collect(),
        };
        for cid in candidates {
            self.pair(chart, agenda, id, cid);
        }
        // The right edge of the input satisfies a negative demand.
        if exp.polarity == Polarity::Negative && end == input_len {
            let fm = chart.forward(id).clone();
            let outcome = settle_at_boundary(chart, &fm);
            self.admit(chart, agenda, outcome);
        }
    }

    /// Offer the complete match to the forward match, admitting whatever
    /// the interaction produces.
    fn pair(&self, chart: &mut Chart, agenda: &mut VecDeque<Task>, fid: ForwardId, cid: CompleteId) {
        let fm = chart.forward(fid).clone();
        let sub = self.grammar.substitution(fm.rule);
        let outcome = if fm.dot() < sub.act.len() {
            feed(chart, &self.grammar, &fm, cid)
        } else {
            settle(chart, &self.grammar, &fm, cid)
        };
        self.admit(chart, agenda, outcome);
    }

    fn admit(&self, chart: &mut Chart, agenda: &mut VecDeque<Task>, outcome: Interaction) {
        match outcome {
            Interaction::Advanced(fm) => self.admit_forward(chart, agenda, fm),
            Interaction::Closed(cm) => self.admit_complete(chart, agenda, cm),
            Interaction::Rejected => {}
        }
    }

    fn admit_complete(&self, chart: &mut Chart, agenda: &mut VecDeque<Task>, m: CompleteMatch) {
        debug_assert!(
            (m.depth as usize) <= self.grammar.external_count(),
            "depth stays within the external-name count"
        );
        if let Some(id) = chart.insert_complete(m) {
            trace!("new {}", chart.render_complete(&self.grammar, id));
            agenda.push_back(Task::Complete(id));
        }
    }

    fn admit_forward(&self, chart: &mut Chart, agenda: &mut VecDeque<Task>, m: ForwardMatch) {
        if let Some(id) = chart.insert_forward(m, &self.grammar) {
            trace!("await {}", chart.render_forward(&self.grammar, id));
            agenda.push_back(Task::Forward(id));
        }
    }
}

/// The saturated chart for one input, with harvesting accessors.
#[derive(Debug)]
pub struct Parse<'g> {
    grammar: &'g Grammar,
    chart: Chart,
    input_len: usize,
}

impl<'g> Parse<'g> {
    /// Every complete match spanning the whole input, in chart order.
    pub fn solutions(&self) -> Vec<MatchHandle<'_>> {
        self.chart
            .all_starting_at(0)
            .iter()
            .copied()
            .filter(|&id| self.chart.complete(id).end == self.input_len)
            .map(|id| self.handle(id))
            .collect()
    }

    /// The spanning matches whose external name is `ext`.
    pub fn solutions_for(&self, ext: &str) -> Vec<MatchHandle<'_>> {
        let Some(ext) = self.grammar.ext_id(ext) else {
            return Vec::new();
        };
        self.chart
            .starting_at(ext, 0)
            .iter()
            .copied()
            .filter(|&id| self.chart.complete(id).end == self.input_len)
            .map(|id| self.handle(id))
            .collect()
    }

    /// Number of complete matches generated during the parse.
    pub fn complete_count(&self) -> usize {
        self.chart.complete_count()
    }

    /// Number of forward matches generated during the parse.
    pub fn forward_count(&self) -> usize {
        self.chart.forward_count()
    }

    fn handle(&self, id: CompleteId) -> MatchHandle<'_> {
        MatchHandle { parse: self, id }
    }
}

/// A view of one complete match inside a [`Parse`].
#[derive(Clone, Copy)]
pub struct MatchHandle<'a> {
    parse: &'a Parse<'a>,
    id: CompleteId,
}

impl<'a> MatchHandle<'a> {
    fn record(&self) -> &'a CompleteMatch {
        self.parse.chart.complete(self.id)
    }

    /// The external name of the matched rule.
    pub fn external(&self) -> &'a str {
        self.parse.grammar.ext_name(self.record().ext)
    }

    /// Byte offset where the match starts.
    pub fn start(&self) -> usize {
        self.record().start
    }

    /// Byte offset just past the match.
    pub fn end(&self) -> usize {
        self.record().end
    }

    /// Length of the unit-rename chain ending in this match.
    pub fn depth(&self) -> u32 {
        self.record().depth
    }

    /// Whether the match was produced by a terminal rule.
    pub fn is_terminal(&self) -> bool {
        self.record().is_terminal()
    }

    /// The completed sub-matches, left to right. Empty for terminals.
    pub fn children(&self) -> Vec<MatchHandle<'a>> {
        self.record()
            .children
            .iter()
            .map(|&id| MatchHandle {
                parse: self.parse,
                id,
            })
            .collect()
    }

    /// The recorded left-context witness, if any.
    pub fn left_context(&self) -> Option<MatchHandle<'a>> {
        self.record().left_ctx.map(|id| MatchHandle {
            parse: self.parse,
            id,
        })
    }

    /// The recorded right-context witness, if any.
    pub fn right_context(&self) -> Option<MatchHandle<'a>> {
        self.record().right_ctx.map(|id| MatchHandle {
            parse: self.parse,
            id,
        })
    }
}

impl fmt::Display for MatchHandle<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.parse.chart.render_complete(self.parse.grammar, self.id))
    }
}

impl fmt::Debug for MatchHandle<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MatchHandle({self})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::Expectation;

    #[test]
    fn test_plain_sequence() {
        let parser = Parser::new(vec![
            Rule::terminal("a", "a"),
            Rule::terminal("b", "b"),
            Rule::substitution("S", ["a", "b"]),
        ])
        .unwrap();

        let parse = parser.parse("ab");
        let solutions = parse.solutions_for("S");
        assert_eq!(solutions.len(), 1);
        assert_eq!(solutions[0].to_string(), "((S → a b))1 [0:2]");
        assert!(parser.parse("ba").solutions_for("S").is_empty());
    }

    #[test]
    fn test_no_spanning_match_is_empty_not_an_error() {
        let parser = Parser::new(vec![
            Rule::terminal("a", "a"),
            Rule::substitution("S", ["a", "a"]),
        ])
        .unwrap();

        assert_eq!(parser.parse("a").solutions().len(), 1); // the terminal spans
        assert!(parser.parse("aaa").solutions().is_empty());
        assert!(parser.parse("").solutions().is_empty());
    }

    #[test]
    fn test_multichar_terminal() {
        let parser = Parser::new(vec![
            Rule::terminal("word", "[a-z]+"),
            Rule::terminal("num", "[0-9]+"),
            Rule::substitution("S", ["word", "num"]),
        ])
        .unwrap();

        let parse = parser.parse("abc42");
        let solutions = parse.solutions_for("S");
        assert_eq!(solutions.len(), 1);
        let children = solutions[0].children();
        assert_eq!(children[0].end(), 3);
        assert_eq!(children[1].start(), 3);
    }

    #[test]
    fn test_left_context_restricts_placement() {
        // A `B` may only stand after an `a`.
        let parser = Parser::new(vec![
            Rule::terminal("a", "a"),
            Rule::terminal("b", "b"),
            Rule::substitution("B", ["b"]).with_left(Expectation::positive("a")),
            Rule::substitution("S", ["a", "B"]),
            Rule::substitution("S", ["b", "B"]),
        ])
        .unwrap();

        assert_eq!(parser.parse("ab").solutions_for("S").len(), 1);
        // `b B` never forms: the b before it is not an a.
        assert!(parser.parse("bb").solutions_for("S").is_empty());
    }

    #[test]
    fn test_solutions_for_unknown_external() {
        let parser = Parser::new(vec![Rule::terminal("a", "a")]).unwrap();
        assert!(parser.parse("a").solutions_for("missing").is_empty());
    }

    #[test]
    fn test_match_counts_are_exposed() {
        let parser = Parser::new(vec![
            Rule::terminal("a", "a"),
            Rule::substitution("A", ["a"]),
        ])
        .unwrap();

        let parse = parser.parse("a");
        assert!(parse.complete_count() >= 2);
        assert!(parse.forward_count() >= 1);
    }
}
