use regex_automata::util::syntax;
use std::borrow::Cow;
use std::fmt;
use thiserror::Error;

/// Reasons a single pattern expression can be rejected
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PatternError {
    #[error("unknown flag `{0}`")]
    UnknownFlag(char),
    #[error("empty expression")]
    EmptyExpression,
    #[error("syntax error: {0}")]
    Syntax(String),
}

/// Compile flags attached to a pattern with the `/body/flags` notation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Flags(u16);

impl Flags {
    pub const CASELESS: Flags = Flags(1 << 0);
    pub const MULTILINE: Flags = Flags(1 << 1);
    pub const DOTALL: Flags = Flags(1 << 2);
    pub const SINGLE_MATCH: Flags = Flags(1 << 3);
    pub const ALLOW_EMPTY: Flags = Flags(1 << 4);
    pub const UTF8: Flags = Flags(1 << 5);
    pub const UNICODE_PROPERTY: Flags = Flags(1 << 6);
    pub const PREFILTER: Flags = Flags(1 << 7);
    pub const SOM_LEFTMOST: Flags = Flags(1 << 8);

    // Order here is the order flags are rendered back out.
    const TABLE: [(char, Flags); 9] = [
        ('i', Flags::CASELESS),
        ('m', Flags::MULTILINE),
        ('s', Flags::DOTALL),
        ('H', Flags::SINGLE_MATCH),
        ('V', Flags::ALLOW_EMPTY),
        ('8', Flags::UTF8),
        ('W', Flags::UNICODE_PROPERTY),
        ('P', Flags::PREFILTER),
        ('L', Flags::SOM_LEFTMOST),
    ];

    pub const fn empty() -> Self {
        Flags(0)
    }

    pub fn from_char(c: char) -> Option<Flags> {
        Self::TABLE
            .iter()
            .find(|(flag_char, _)| *flag_char == c)
            .map(|(_, flag)| *flag)
    }

    /// Parses a run of flag characters, failing on the first unknown one
    pub fn parse(flags: &str) -> Result<Flags, PatternError> {
        flags.chars().try_fold(Flags::empty(), |acc, c| {
            Flags::from_char(c)
                .map(|flag| acc | flag)
                .ok_or(PatternError::UnknownFlag(c))
        })
    }

    pub const fn contains(self, other: Flags) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Inline group (e.g. `(?is)`) carrying the flags the automaton understands.
    /// `H`, `V`, `P` and `L` do not change which patterns match, so they are
    /// handled outside the regex syntax or ignored.
    pub(crate) fn inline_group(self) -> String {
        let mut group = String::new();
        if self.contains(Flags::CASELESS) {
            group.push('i');
        }
        if self.contains(Flags::MULTILINE) {
            group.push('m');
        }
        if self.contains(Flags::DOTALL) {
            group.push('s');
        }
        if self.contains(Flags::UTF8) || self.contains(Flags::UNICODE_PROPERTY) {
            group.push('u');
        }

        if group.is_empty() {
            group
        } else {
            format!("(?{group})")
        }
    }
}

impl std::ops::BitOr for Flags {
    type Output = Flags;

    fn bitor(self, rhs: Flags) -> Flags {
        Flags(self.0 | rhs.0)
    }
}

impl fmt::Display for Flags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (c, flag) in Self::TABLE {
            if self.contains(flag) {
                write!(f, "{c}")?;
            }
        }
        Ok(())
    }
}

/// A parsed, syntax-checked pattern expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledPattern {
    /// Position of the expression in the list it was compiled from
    pub id: usize,
    /// The expression body without delimiters or flags
    pub expression: String,
    pub flags: Flags,
}

impl CompiledPattern {
    /// Parses `/body/flags`, `n:/body/flags` or a bare body.
    ///
    /// A numeric `n:` prefix is accepted for compatibility but discarded: the id
    /// is always the position the caller passes in.
    pub fn parse(id: usize, input: &str) -> Result<Self, PatternError> {
        let input = strip_id_prefix(input);
        let (expression, flags) = match split_delimited(input) {
            Some((body, flags)) => (body, Flags::parse(flags)?),
            None => (input, Flags::empty()),
        };

        if expression.is_empty() {
            return Err(PatternError::EmptyExpression);
        }

        let pattern = Self {
            id,
            expression: expression.to_string(),
            flags,
        };
        syntax::parse_with(&pattern.regex_source(), &super::database::syntax_config())
            .map_err(|e| PatternError::Syntax(e.to_string()))?;

        Ok(pattern)
    }

    /// The source handed to the automaton builder, flags folded inline.
    /// Outside multiline mode `$` also matches before a final newline.
    pub(crate) fn regex_source(&self) -> String {
        let body = if self.flags.contains(Flags::MULTILINE) {
            Cow::Borrowed(self.expression.as_str())
        } else {
            end_anchor_before_final_newline(&self.expression)
        };
        format!("{}{}", self.flags.inline_group(), body)
    }
}

impl fmt::Display for CompiledPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}/{}", self.expression, self.flags)
    }
}

/// Rewrites every `$` that is an anchor (not escaped, not inside a class)
fn end_anchor_before_final_newline(body: &str) -> Cow<'_, str> {
    if !body.contains('$') {
        return Cow::Borrowed(body);
    }

    let mut out = String::with_capacity(body.len() + 8);
    let mut chars = body.chars().peekable();
    let mut class_depth = 0usize;
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                out.push(c);
                if let Some(escaped) = chars.next() {
                    out.push(escaped);
                }
            }
            '[' => {
                class_depth += 1;
                out.push(c);
                // A leading `]` (after an optional `^`) is a literal
                if chars.peek() == Some(&'^') {
                    out.push('^');
                    chars.next();
                }
                if chars.peek() == Some(&']') {
                    out.push(']');
                    chars.next();
                }
            }
            ']' if class_depth > 0 => {
                class_depth -= 1;
                out.push(c);
            }
            '$' if class_depth == 0 => out.push_str(r"(?:\n?\z)"),
            _ => out.push(c),
        }
    }
    Cow::Owned(out)
}

fn strip_id_prefix(input: &str) -> &str {
    match input.find(":/") {
        Some(n) if n > 0 && input[..n].bytes().all(|b| b.is_ascii_digit()) => &input[n + 1..],
        _ => input,
    }
}

fn split_delimited(input: &str) -> Option<(&str, &str)> {
    let rest = input.strip_prefix('/')?;
    let end = rest.rfind('/')?;
    Some((&rest[..end], &rest[end + 1..]))
}
