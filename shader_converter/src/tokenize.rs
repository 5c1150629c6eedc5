//! Lexical preprocessing for legacy GLSL source.
//!
//! Declarations are found with a flat whitespace separated token stream
//! instead of a full GLSL grammar.
//! The entry point body is lexed separately with the glsl-lang lexer
//! so that references can be detected and renamed on identifier boundaries.
use std::collections::HashMap;

use glsl_lang::{
    lexer::{LangLexer, ParseContext, Token as LexToken},
    parse::{DefaultLexer, ParseOptions},
};
use log::warn;
use smol_str::SmolStr;

use crate::{Stage, error::ConvertError};

/// A single whitespace separated word like `uniform` or `mvp;`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'a> {
    pub text: &'a str,
    /// The zero based line in the normalized source.
    pub line: usize,
}

/// Replace tabs with four spaces and remove all comments.
///
/// Block comments end at the first `*/` and are replaced by a space
/// followed by any newlines they contained to preserve line numbers.
/// An unterminated block comment removes the rest of the text.
pub fn normalize(source: &str) -> String {
    let source = source.replace('\t', "    ");

    let mut output = String::with_capacity(source.len());
    let mut rest = source.as_str();
    loop {
        let block = rest.find("/*");
        let line = rest.find("//");
        match (block, line) {
            (Some(b), l) if l.is_none_or(|l| b < l) => {
                output.push_str(&rest[..b]);
                let comment = &rest[b + 2..];
                let (inner, remaining) = match comment.find("*/") {
                    Some(end) => (&comment[..end], &comment[end + 2..]),
                    None => (comment, ""),
                };
                output.push(' ');
                output.extend(inner.chars().filter(|c| *c == '\n'));
                rest = remaining;
            }
            (_, Some(l)) => {
                output.push_str(&rest[..l]);
                // Keep the newline so the next line is still separate.
                rest = match rest[l..].find('\n') {
                    Some(end) => &rest[l + end..],
                    None => "",
                };
            }
            _ => {
                output.push_str(rest);
                break;
            }
        }
    }

    output
}

/// Split normalized source into whitespace separated tokens.
///
/// The iterator borrows the text, so calling this again restarts tokenization.
pub fn tokens(normalized: &str) -> impl Iterator<Item = Token<'_>> + '_ {
    normalized
        .lines()
        .enumerate()
        .flat_map(|(line, text)| text.split_whitespace().map(move |text| Token { text, line }))
}

/// Find the text between the braces of `void main()`.
pub fn entry_point_body(normalized: &str, stage: Stage) -> Result<&str, ConvertError> {
    for (start, _) in normalized.match_indices("main") {
        let before = normalized[..start].trim_end();
        let after = &normalized[start + "main".len()..];
        if !is_identifier_end(before, "void") || after.starts_with(is_identifier_char) {
            continue;
        }

        if let Some(open) = entry_point_open_brace(after) {
            let body_start = start + "main".len() + open + 1;
            if let Some(len) = balanced_brace_len(&normalized[body_start..]) {
                return Ok(&normalized[body_start..body_start + len]);
            }
        }
    }

    Err(ConvertError::EntryPointNotFound { stage })
}

// Check for "void" as a whole word at the end of the text.
fn is_identifier_end(text: &str, word: &str) -> bool {
    text.strip_suffix(word)
        .is_some_and(|prefix| !prefix.ends_with(is_identifier_char))
}

// The offset of the opening brace for text like "( void ) {".
fn entry_point_open_brace(after_name: &str) -> Option<usize> {
    let rest = after_name.trim_start().strip_prefix('(')?.trim_start();
    let rest = match rest.strip_prefix("void") {
        Some(r) if !r.starts_with(is_identifier_char) => r.trim_start(),
        _ => rest,
    };
    let rest = rest.strip_prefix(')')?.trim_start();
    rest.starts_with('{').then(|| after_name.len() - rest.len())
}

// The length of the text before the closing brace matching an already consumed opening brace.
fn balanced_brace_len(text: &str) -> Option<usize> {
    let mut depth = 1usize;
    for (i, c) in text.char_indices() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => (),
        }
    }
    None
}

fn is_identifier_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// A lexical element of the entry point body.
///
/// Concatenating the text of all tokens reproduces the body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BodyToken {
    /// A free standing identifier like `mvp` in `mvp * position`.
    Ident(SmolStr),
    /// An identifier following `.` like `xy` in `uv.xy`.
    Field(SmolStr),
    /// A literal like `1.0`, `2`, or `true`.
    Number(SmolStr),
    Space(String),
    /// One of `.`, `[`, or `]`.
    Punct(char),
    /// Keywords, operators, and any other text copied unchanged.
    Text(SmolStr),
}

impl BodyToken {
    fn text(&self) -> &str {
        match self {
            BodyToken::Ident(s) | BodyToken::Field(s) | BodyToken::Number(s) => s,
            BodyToken::Text(s) => s,
            BodyToken::Space(s) => s,
            BodyToken::Punct(_) => "",
        }
    }
}

/// The tokenized body of the entry point function without the enclosing braces.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EntryBody {
    pub tokens: Vec<BodyToken>,
}

impl EntryBody {
    /// Lex `text` with the GLSL lexer.
    ///
    /// Token text and the text between tokens are taken from the lexer spans,
    /// so the original formatting is preserved.
    pub fn parse(text: &str) -> Self {
        let options = ParseOptions::default();
        let lexer = DefaultLexer::new(text, &options);

        let mut tokens = Vec::new();
        let mut last = 0;
        let mut after_dot = false;
        for item in lexer.run(ParseContext::default()) {
            let Ok((start, token, end)) = item else {
                warn!("Unable to lex entry point body after byte {last}");
                break;
            };

            let (start, end) = (usize::from(start.offset), usize::from(end.offset));
            let Some(span) = text.get(start..end).filter(|_| start >= last) else {
                continue;
            };
            push_space(&mut tokens, &text[last..start]);
            last = end;

            let token = match token {
                LexToken::Identifier(_) | LexToken::TypeName(_) if after_dot => {
                    BodyToken::Field(span.into())
                }
                LexToken::Identifier(_) | LexToken::TypeName(_) => BodyToken::Ident(span.into()),
                LexToken::IntConstant(_)
                | LexToken::UIntConstant(_)
                | LexToken::FloatConstant(_)
                | LexToken::DoubleConstant(_)
                | LexToken::BoolConstant(_) => BodyToken::Number(span.into()),
                LexToken::Dot => BodyToken::Punct('.'),
                LexToken::LeftBracket => BodyToken::Punct('['),
                LexToken::RightBracket => BodyToken::Punct(']'),
                _ if span.trim().is_empty() => BodyToken::Space(span.to_string()),
                _ => BodyToken::Text(span.into()),
            };
            if !matches!(token, BodyToken::Space(_)) {
                after_dot = token == BodyToken::Punct('.');
            }
            tokens.push(token);
        }
        push_space(&mut tokens, &text[last..]);

        Self { tokens }
    }

    /// Returns `true` if `name` appears as a whole identifier outside of a field access.
    pub fn references(&self, name: &str) -> bool {
        self.tokens
            .iter()
            .any(|t| matches!(t, BodyToken::Ident(i) if i == name))
    }

    /// Rewrite constant index accesses like `name[1]` to `name_1` for indices less than `length`.
    pub fn expand_indexed(&mut self, name: &str, length: u32) {
        let mut tokens = Vec::with_capacity(self.tokens.len());

        let mut i = 0;
        while i < self.tokens.len() {
            let token = &self.tokens[i];
            if matches!(token, BodyToken::Ident(n) if n == name) {
                if let Some((index, end)) = self.constant_index(i + 1)
                    && index < length
                {
                    tokens.push(BodyToken::Ident(format!("{name}_{index}").into()));
                    i = end;
                    continue;
                }
                warn!("Unable to expand access to array {name:?} with a non constant index");
            }
            tokens.push(token.clone());
            i += 1;
        }

        self.tokens = tokens;
    }

    // Find "[ N ]" starting at the given token and return N and the index after "]".
    fn constant_index(&self, start: usize) -> Option<(u32, usize)> {
        let open = self.skip_space(start);
        if self.tokens.get(open) != Some(&BodyToken::Punct('[')) {
            return None;
        }

        let number = self.skip_space(open + 1);
        let index = match self.tokens.get(number)? {
            BodyToken::Number(n) => n.parse().ok()?,
            _ => return None,
        };

        let close = self.skip_space(number + 1);
        (self.tokens.get(close) == Some(&BodyToken::Punct(']'))).then_some((index, close + 1))
    }

    fn skip_space(&self, mut i: usize) -> usize {
        while matches!(self.tokens.get(i), Some(BodyToken::Space(_))) {
            i += 1;
        }
        i
    }

    /// Replace every identifier found in `replacements` in a single pass.
    pub fn replace_identifiers(&mut self, replacements: &HashMap<SmolStr, SmolStr>) {
        for token in &mut self.tokens {
            if let BodyToken::Ident(name) = token
                && let Some(new_name) = replacements.get(&*name)
            {
                *name = new_name.clone();
            }
        }
    }

    pub fn to_text(&self) -> String {
        let mut text = String::new();
        for token in &self.tokens {
            match token {
                BodyToken::Punct(c) => text.push(*c),
                t => text.push_str(t.text()),
            }
        }
        text
    }
}

// Text skipped by the lexer like whitespace.
fn push_space(tokens: &mut Vec<BodyToken>, text: &str) {
    if text.is_empty() {
        return;
    }
    if text.trim().is_empty() {
        tokens.push(BodyToken::Space(text.to_string()));
    } else {
        tokens.push(BodyToken::Text(text.into()));
    }
}
