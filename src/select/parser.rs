//! Textual selection syntax.
//!
//! ```text
//! selection := segment*
//! segment   := '/' attr [ '-' spec ( ',' spec )* ]
//! spec      := node [ ':' node ]
//! attr      := digits | name          (ordinal or display name)
//! node      := '.' | digits           ('.' = every node)
//! ```
//!
//! A segment without a node list selects every node. An omitted remote
//! means every remote for Link parameters and node 0 otherwise.
//!
//! Segments are applied as they are parsed. When a later segment fails,
//! the earlier ones stay applied.

use std::iter::Peekable;
use std::str::CharIndices;

use crate::context::Context;
use crate::model::{NodeId, MAX_NODES};
use crate::param::{Cardinality, Param};
use crate::{Error, Result};

use super::{NodeSel, SelectionSet};

impl SelectionSet {
    /// Parse `text` into a fresh selection set.
    pub fn parse(ctx: &Context, text: &str) -> Result<SelectionSet> {
        let mut set = SelectionSet::empty();
        set.parse_into(ctx, text)?;
        Ok(set)
    }

    /// Parse `text` and add its selections to `self`.
    pub fn parse_into(&mut self, ctx: &Context, text: &str) -> Result<()> {
        let mut p = Parser { text, chars: text.char_indices().peekable() };
        p.skip_ws();
        while !p.at_end() {
            p.expect('/')?;
            let param = p.attr(ctx)?;
            let specs = if p.eat('-') { p.spec_list()? } else { vec![(NodeSel::All, None)] };
            for (queried, remote) in specs {
                let remote = match (remote, ctx.describe(param).cardinality) {
                    (Some(r), _) => r,
                    (None, Cardinality::Link) => NodeSel::All,
                    (None, _) => NodeSel::One(NodeId::ZERO),
                };
                self.include_wildcard(ctx, param, queried, remote);
            }
            p.skip_ws();
        }
        Ok(())
    }
}

struct Parser<'a> {
    text: &'a str,
    chars: Peekable<CharIndices<'a>>,
}

impl Parser<'_> {
    fn pos(&mut self) -> usize {
        self.chars.peek().map_or(self.text.len(), |(i, _)| *i)
    }

    fn at_end(&mut self) -> bool {
        self.chars.peek().is_none()
    }

    fn skip_ws(&mut self) {
        while matches!(self.chars.peek(), Some((_, c)) if c.is_whitespace()) {
            self.chars.next();
        }
    }

    fn eat(&mut self, want: char) -> bool {
        if matches!(self.chars.peek(), Some((_, c)) if *c == want) {
            self.chars.next();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, want: char) -> Result<()> {
        if self.eat(want) {
            return Ok(());
        }
        let position = self.pos();
        let found = self.chars.peek().map_or("end of input".to_string(), |(_, c)| format!("'{c}'"));
        Err(Error::SyntaxError { position, message: format!("expected '{want}', found {found}") })
    }

    fn word(&mut self) -> (usize, &str) {
        let start = self.pos();
        while matches!(self.chars.peek(), Some((_, c)) if c.is_ascii_alphanumeric() || *c == '_') {
            self.chars.next();
        }
        let end = self.pos();
        (start, &self.text[start..end])
    }

    fn attr(&mut self, ctx: &Context) -> Result<Param> {
        let (position, word) = self.word();
        if word.is_empty() {
            return Err(Error::SyntaxError { position, message: "expected parameter id or name".into() });
        }
        let found = if word.bytes().all(|b| b.is_ascii_digit()) {
            word.parse::<usize>().ok().and_then(Param::from_index)
        } else {
            ctx.params().lookup(word)
        };
        found.ok_or_else(|| Error::SyntaxError { position, message: format!("unknown parameter '{word}'") })
    }

    fn node(&mut self) -> Result<NodeSel> {
        if self.eat('.') {
            return Ok(NodeSel::All);
        }
        let start = self.pos();
        while matches!(self.chars.peek(), Some((_, c)) if c.is_ascii_digit()) {
            self.chars.next();
        }
        let digits = &self.text[start..self.pos()];
        if digits.is_empty() {
            return Err(Error::SyntaxError { position: start, message: "expected node id or '.'".into() });
        }
        digits
            .parse::<u8>()
            .ok()
            .and_then(NodeId::new)
            .map(NodeSel::One)
            .ok_or_else(|| Error::SyntaxError {
                position: start,
                message: format!("node id {digits} out of range (0..{MAX_NODES})"),
            })
    }

    fn spec_list(&mut self) -> Result<Vec<(NodeSel, Option<NodeSel>)>> {
        let mut specs = Vec::new();
        loop {
            let queried = self.node()?;
            let remote = if self.eat(':') { Some(self.node()?) } else { None };
            specs.push((queried, remote));
            if !self.eat(',') {
                return Ok(specs);
            }
        }
    }
}
