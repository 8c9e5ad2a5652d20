//! Parsed form of a catalog SQL template.
//!
//! A template is scanned once into an ordered list of literal text and named
//! slots (`{{where_clause}}`, `{{account_id_clause}}`). The trailing top-level
//! `ORDER BY` and `LIMIT` clauses are captured separately so rendering can
//! swap them without touching the body, and a trailing `;` is dropped so the
//! statement can be nested as a subquery.
//!
//! The scanner understands only what it must to stay out of trouble: string
//! literals, quoted identifiers, comments, and parenthesis depth. Window
//! clauses such as `OVER (ORDER BY ...)` and CTE bodies sit at depth > 0 and
//! are never mistaken for the statement tail.

use crate::error::TemplateError;
use std::fmt;

/// A named hole in a template body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Slot {
    /// Filled with the compiled filter predicate (scope first).
    WhereClause,
    /// Filled with the account scope predicate only.
    AccountIdClause,
}

impl Slot {
    pub const ALL: [Slot; 2] = [Slot::WhereClause, Slot::AccountIdClause];

    pub fn name(&self) -> &'static str {
        match self {
            Slot::WhereClause => "where_clause",
            Slot::AccountIdClause => "account_id_clause",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|slot| slot.name() == name)
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{{{}}}}}", self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    Slot(Slot),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    body: Vec<Segment>,
    order_by: Option<String>,
    limit: Option<String>,
    table_ref: Option<String>,
}

impl Template {
    pub fn parse(text: &str) -> Result<Self, TemplateError> {
        let scan = Scanner::new(text).run()?;

        let end = scan.end;
        let order_at = scan.order_at;
        let limit_at = scan.limit_at;
        let body_end = order_at.or(limit_at).unwrap_or(end);

        let order_by = order_at.map(|o| text[o..limit_at.unwrap_or(end)].trim().to_string());
        let limit = limit_at.map(|l| text[l..end].trim().to_string());

        let mut body = Vec::new();
        let mut cursor = 0;
        for (start, stop, slot) in scan.slots {
            if start >= body_end {
                return Err(TemplateError::SlotInTail(slot.name().to_string()));
            }
            if start > cursor {
                body.push(Segment::Literal(text[cursor..start].to_string()));
            }
            body.push(Segment::Slot(slot));
            cursor = stop;
        }
        if body_end > cursor {
            body.push(Segment::Literal(text[cursor..body_end].to_string()));
        }
        trim_body(&mut body);

        Ok(Self {
            body,
            order_by,
            limit,
            table_ref: scan.backtick.or(scan.quoted_table),
        })
    }

    pub fn segments(&self) -> &[Segment] {
        &self.body
    }

    pub fn slots(&self) -> impl Iterator<Item = Slot> + '_ {
        self.body.iter().filter_map(|seg| match seg {
            Segment::Slot(slot) => Some(*slot),
            Segment::Literal(_) => None,
        })
    }

    pub fn has_slot(&self, slot: Slot) -> bool {
        self.slots().any(|s| s == slot)
    }

    /// The template's own trailing `ORDER BY ...`, if any.
    pub fn order_by_tail(&self) -> Option<&str> {
        self.order_by.as_deref()
    }

    /// The template's own trailing `LIMIT ...`, if any.
    pub fn limit_tail(&self) -> Option<&str> {
        self.limit.as_deref()
    }

    /// The first backtick-quoted identifier, or failing that the first
    /// double-quoted string shaped like `dataset.table`.
    pub fn table_ref(&self) -> Option<&str> {
        self.table_ref.as_deref()
    }
}

fn trim_body(body: &mut Vec<Segment>) {
    if let Some(Segment::Literal(first)) = body.first_mut() {
        *first = first.trim_start().to_string();
    }
    if let Some(Segment::Literal(last)) = body.last_mut() {
        *last = last.trim_end().to_string();
    }
    body.retain(|seg| !matches!(seg, Segment::Literal(text) if text.is_empty()));
}

#[derive(Debug, Default)]
struct ScanResult {
    slots: Vec<(usize, usize, Slot)>,
    order_at: Option<usize>,
    limit_at: Option<usize>,
    end: usize,
    backtick: Option<String>,
    quoted_table: Option<String>,
}

struct Scanner<'a> {
    text: &'a str,
    bytes: &'a [u8],
    pos: usize,
    depth: usize,
}

impl<'a> Scanner<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            text,
            bytes: text.as_bytes(),
            pos: 0,
            depth: 0,
        }
    }

    fn peek(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    fn run(mut self) -> Result<ScanResult, TemplateError> {
        let mut out = ScanResult {
            end: self.bytes.len(),
            ..Default::default()
        };
        let mut terminated = false;

        while let Some(b) = self.peek(0) {
            if self.skip_comment()? {
                continue;
            }
            if terminated {
                if !b.is_ascii_whitespace() {
                    return Err(TemplateError::MultipleStatements);
                }
                self.pos += 1;
                continue;
            }

            match b {
                b'\'' | b'"' => {
                    let (start, stop) = self.skip_string(b)?;
                    if b == b'"' && out.quoted_table.is_none() {
                        let content = &self.text[start..stop];
                        if looks_like_table_id(content) {
                            out.quoted_table = Some(content.to_string());
                        }
                    }
                }
                b'`' => {
                    let open = self.pos;
                    let close = self.bytes[open + 1..]
                        .iter()
                        .position(|&c| c == b'`')
                        .map(|rel| open + 1 + rel)
                        .ok_or(TemplateError::Unterminated {
                            what: "quoted identifier",
                            offset: open,
                        })?;
                    if out.backtick.is_none() {
                        out.backtick = Some(self.text[open + 1..close].to_string());
                    }
                    self.pos = close + 1;
                }
                b'(' => {
                    self.depth += 1;
                    self.pos += 1;
                }
                b')' => {
                    self.depth = self.depth.saturating_sub(1);
                    self.pos += 1;
                }
                b'{' if self.peek(1) == Some(b'{') => {
                    out.slots.push(self.read_slot()?);
                }
                b';' if self.depth == 0 => {
                    out.end = self.pos;
                    terminated = true;
                    self.pos += 1;
                }
                _ if self.at_word_start() => {
                    let start = self.pos;
                    let word = self.read_word();
                    if self.depth == 0 {
                        self.note_keyword(word, start, &mut out);
                    }
                }
                _ => self.pos += 1,
            }
        }

        Ok(out)
    }

    fn note_keyword(&mut self, word: &str, start: usize, out: &mut ScanResult) {
        if word.eq_ignore_ascii_case("ORDER") {
            let save = self.pos;
            while self.peek(0).is_some_and(|c| c.is_ascii_whitespace()) {
                self.pos += 1;
            }
            if self.at_word_start() && self.read_word().eq_ignore_ascii_case("BY") {
                out.order_at = Some(start);
                out.limit_at = None;
            } else {
                self.pos = save;
            }
        } else if word.eq_ignore_ascii_case("LIMIT") {
            out.limit_at = Some(start);
        } else if ["SELECT", "UNION", "INTERSECT", "EXCEPT"]
            .iter()
            .any(|kw| word.eq_ignore_ascii_case(kw))
        {
            out.order_at = None;
            out.limit_at = None;
        }
    }

    fn at_word_start(&self) -> bool {
        let Some(b) = self.peek(0) else {
            return false;
        };
        if !(b.is_ascii_alphabetic() || b == b'_') {
            return false;
        }
        match self.pos.checked_sub(1).map(|p| self.bytes[p]) {
            Some(prev) => !(is_ident_byte(prev) || matches!(prev, b'@' | b'.' | b'$')),
            None => true,
        }
    }

    fn read_word(&mut self) -> &'a str {
        let text = self.text;
        let start = self.pos;
        while self.peek(0).is_some_and(is_ident_byte) {
            self.pos += 1;
        }
        &text[start..self.pos]
    }

    /// Skips `-- ...`, `# ...` and `/* ... */`. Returns whether it moved.
    fn skip_comment(&mut self) -> Result<bool, TemplateError> {
        match (self.peek(0), self.peek(1)) {
            (Some(b'-'), Some(b'-')) | (Some(b'#'), _) => {
                while self.peek(0).is_some_and(|c| c != b'\n') {
                    self.pos += 1;
                }
                Ok(true)
            }
            (Some(b'/'), Some(b'*')) => {
                let open = self.pos;
                let close = self.text[open + 2..].find("*/").ok_or(TemplateError::Unterminated {
                    what: "block comment",
                    offset: open,
                })?;
                self.pos = open + 2 + close + 2;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Skips a quoted string (single or triple quoted) and returns the byte
    /// range of its content.
    fn skip_string(&mut self, quote: u8) -> Result<(usize, usize), TemplateError> {
        let open = self.pos;
        let triple = self.peek(1) == Some(quote) && self.peek(2) == Some(quote);
        let width = if triple { 3 } else { 1 };
        let start = open + width;
        let mut i = start;
        while i < self.bytes.len() {
            match self.bytes[i] {
                b'\\' => i += 2,
                c if c == quote => {
                    let closes = !triple
                        || (self.bytes.get(i + 1) == Some(&quote)
                            && self.bytes.get(i + 2) == Some(&quote));
                    if closes {
                        self.pos = i + width;
                        return Ok((start, i));
                    }
                    i += 1;
                }
                _ => i += 1,
            }
        }
        Err(TemplateError::Unterminated {
            what: "string literal",
            offset: open,
        })
    }

    fn read_slot(&mut self) -> Result<(usize, usize, Slot), TemplateError> {
        let open = self.pos;
        let close = self.text[open + 2..]
            .find("}}")
            .ok_or(TemplateError::Unterminated {
                what: "slot",
                offset: open,
            })?;
        let name = self.text[open + 2..open + 2 + close].trim();
        let slot =
            Slot::from_name(name).ok_or_else(|| TemplateError::UnknownSlot(name.to_string()))?;
        self.pos = open + 2 + close + 2;
        Ok((open, self.pos, slot))
    }
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

fn looks_like_table_id(content: &str) -> bool {
    match content.split_once('.') {
        Some((dataset, table)) => {
            !dataset.is_empty()
                && !table.is_empty()
                && !table.contains('.')
                && content
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
        }
        None => false,
    }
}

/// A `dataset.table` reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableRef {
    pub dataset: String,
    pub table: String,
}

impl TableRef {
    /// Splits on the first `.`; both halves must be non-empty and the table
    /// half may not contain another `.`.
    pub fn parse(table_id: &str) -> Result<Self, TemplateError> {
        match table_id.split_once('.') {
            Some((dataset, table))
                if !dataset.is_empty() && !table.is_empty() && !table.contains('.') =>
            {
                Ok(Self {
                    dataset: dataset.to_string(),
                    table: table.to_string(),
                })
            }
            _ => Err(TemplateError::MalformedTableIdentifier(
                table_id.to_string(),
            )),
        }
    }

    /// Locates and parses the table a template reads from.
    pub fn from_template(template: &Template) -> Result<Self, TemplateError> {
        let table_id = template.table_ref().ok_or(TemplateError::TableNotDetected)?;
        Self::parse(table_id)
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.dataset, self.table)
    }
}
