//! # earlex
//!
//! A chart parser for context-sensitive grammars.
//!
//! Grammars are context-free cores decorated with context expectations: a
//! production like `b C a → b c a` becomes the rule `〈 C → c 〉` with the
//! positive expectation `&b` on the left and `&a` on the right. Negative
//! expectations (`!b`) admit any neighbor except the named one. Terminal
//! rules (`〈 a → /a[^a]+a/ 〉`) match the input directly through regular
//! expressions.
//!
//! Parsing runs an Earley-style saturation over a deduplicating chart of
//! complete and forward matches. Context expectations are checked when
//! matches become neighbors, each match recording the witnesses that
//! satisfied its demands; unit-renaming cycles (`A → B`, `B → A`) are cut
//! off when an external name reappears in its own rename chain.
//!
//! ```
//! use earlex::{Expectation, Parser, Rule};
//!
//! let parser = Parser::new(vec![
//!     Rule::terminal("a", "a"),
//!     Rule::terminal("b", "b"),
//!     Rule::terminal("c", "c"),
//!     // `C → c` only after a b; `B → b` only after an a.
//!     Rule::substitution("C", ["c"]).with_left(Expectation::positive("b")),
//!     Rule::substitution("B", ["b"]).with_left(Expectation::positive("a")),
//!     Rule::substitution("S", ["a", "B", "C"]),
//! ])?;
//!
//! let parse = parser.parse("abc");
//! assert_eq!(parse.solutions_for("S").len(), 1);
//! assert!(parser.parse("acb").solutions_for("S").is_empty());
//! # Ok::<(), earlex::GrammarError>(())
//! ```

pub mod grammar;
pub mod parser;

mod chart;
mod compat;
mod interact;
mod matches;

pub use crate::grammar::{Expectation, GrammarError, Polarity, Rule};
pub use crate::parser::{MatchHandle, Parse, Parser};
