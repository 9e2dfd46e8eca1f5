//! Shell syntax: lexer, parser and the lenient word splitter used by completion.
//!
//! Source is tokenized with logos, adjacent word fragments (`a"b"$C`) are
//! glued into one word token, and the token stream is parsed with chumsky
//! combinators. The grammar is a small POSIX-flavoured subset:
//!
//! ```text
//! script    := item ((';' | '\n') item)*
//! item      := pipeline (('&&' | '||') pipeline)*
//! pipeline  := command ('|' command)*
//! command   := NAME '(' ')' '{' script '}'
//!            | (NAME=word)* word*
//! word      := (literal | 'single' | "double $VAR" | \x | $VAR | ${VAR})+
//! ```
//!
//! Malformed input is reported as a [`ParseError`]; the lexer never panics.

use std::fmt;
use std::ops::Range;

use chumsky::{input::ValueInput, prelude::*};
use logos::{Filter, Lexer, Logos};

/// Malformed shell source.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("syntax error at offset {offset}: {message}")]
pub struct ParseError {
    pub message: String,
    /// Byte offset into the source.
    pub offset: usize,
}

impl ParseError {
    fn new(message: impl Into<String>, offset: usize) -> Self {
        Self {
            message: message.into(),
            offset,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
// AST
// ═══════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq)]
pub enum WordPart {
    /// Literal text; `quoted` disables tilde, alias and assignment handling.
    Lit { text: String, quoted: bool },
    /// `$NAME`, `${NAME}` or a special parameter (`?`, `#`, `@`, `0`-`9`).
    Var(String),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Word {
    pub parts: Vec<WordPart>,
}

impl Word {
    /// The word's text when it consists solely of unquoted literals.
    pub fn as_plain(&self) -> Option<String> {
        let mut out = String::new();
        for part in &self.parts {
            match part {
                WordPart::Lit {
                    text,
                    quoted: false,
                } => out.push_str(text),
                _ => return None,
            }
        }
        Some(out)
    }

    fn push_str(&mut self, s: &str, quoted: bool) {
        if let Some(WordPart::Lit { text, quoted: q }) = self.parts.last_mut() {
            if *q == quoted {
                text.push_str(s);
                return;
            }
        }
        self.parts.push(WordPart::Lit {
            text: s.to_string(),
            quoted,
        });
    }

    fn append(&mut self, parts: Vec<WordPart>) {
        for part in parts {
            match part {
                WordPart::Lit { text, quoted } => self.push_str(&text, quoted),
                var => self.parts.push(var),
            }
        }
    }

    fn is_brace(&self, brace: &str) -> bool {
        self.as_plain().as_deref() == Some(brace)
    }

    /// Split an unquoted leading `NAME=` off this word.
    fn split_assignment(&self) -> Option<(String, Word)> {
        let Some(WordPart::Lit {
            text,
            quoted: false,
        }) = self.parts.first()
        else {
            return None;
        };
        let (name, rest) = text.split_once('=')?;
        if !is_valid_name(name) {
            return None;
        }
        let mut value = Word::default();
        if !rest.is_empty() {
            value.parts.push(WordPart::Lit {
                text: rest.to_string(),
                quoted: false,
            });
        }
        value.parts.extend(self.parts[1..].iter().cloned());
        Some((name.to_string(), value))
    }
}

impl fmt::Display for Word {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for part in &self.parts {
            match part {
                WordPart::Lit { text, .. } => f.write_str(text)?,
                WordPart::Var(name) => write!(f, "${{{}}}", name)?,
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimpleCommand {
    pub assignments: Vec<(String, Word)>,
    pub words: Vec<Word>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Simple(SimpleCommand),
    /// `name() { body }`; the body is kept as source and parsed per call.
    FunctionDef { name: String, body: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Pipeline {
    pub commands: Vec<Command>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connector {
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AndOrList {
    pub first: Pipeline,
    pub rest: Vec<(Connector, Pipeline)>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Script {
    pub items: Vec<AndOrList>,
}

/// Returns true for a valid shell variable/function name.
pub fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn is_special_param(name: &str) -> bool {
    matches!(name, "?" | "#" | "@") || (name.len() == 1 && name.chars().all(|c| c.is_ascii_digit()))
}

// ═══════════════════════════════════════════════════════════════════════
// Lexer
// ═══════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Default, thiserror::Error)]
pub enum LexError {
    #[default]
    #[error("unexpected character")]
    UnexpectedCharacter,
    #[error("unterminated single quote")]
    UnterminatedSingleQuote,
    #[error("unterminated double quote")]
    UnterminatedDoubleQuote,
    #[error("unterminated ${{")]
    UnterminatedBrace,
    #[error("bad substitution: ${{{0}}}")]
    BadSubstitution(String),
    #[error("redirections are not supported")]
    Redirection,
    #[error("background jobs are not supported")]
    Background,
}

/// Tokens of shell source.
///
/// Word fragments (`Text`, quotes, escapes, variables) are glued into
/// [`Token::Word`] by [`tokenize`] when they touch; the parser only ever
/// sees words and operators.
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(error = LexError)]
#[logos(skip r"[ \t\r]+")]
enum Token {
    #[token("&&")]
    AndIf,

    #[token("||")]
    OrIf,

    #[token("|")]
    Pipe,

    #[token(";")]
    Semi,

    #[token("\n")]
    Newline,

    #[token("(")]
    LParen,

    #[token(")")]
    RParen,

    #[token("&", |_| reject(LexError::Background))]
    Background,

    #[regex(r"[<>]", |_| reject(LexError::Redirection))]
    Redirect,

    /// Unquoted literal text. `#` starts a comment only at a word boundary.
    #[regex(r#"[^ \t\r\n'"\\$;&|()<>#][^ \t\r\n'"\\$;&|()<>]*"#, |lex| lex.slice().to_string())]
    #[token("#", comment_or_text)]
    #[token("$", |lex| lex.slice().to_string())]
    #[token("\\", |lex| lex.slice().to_string())]
    Text(String),

    #[regex(r"'[^']*'", |lex| trim_quotes(lex.slice()))]
    SingleQuoted(String),

    #[regex(r"'[^']*", |_| reject(LexError::UnterminatedSingleQuote))]
    UnterminatedSingle,

    #[regex(r#""([^"\\]|\\(.|\n))*""#, double_quoted)]
    DoubleQuoted(Vec<WordPart>),

    #[regex(r#""([^"\\]|\\(.|\n))*\\?"#, |_| reject(LexError::UnterminatedDoubleQuote))]
    UnterminatedDouble,

    #[regex(r"\\[^\n]", |lex| lex.slice()[1..].to_string())]
    Escaped(String),

    #[token("\\\n")]
    LineContinuation,

    #[regex(r"\$\{[^}]*\}", |lex| braced_name(lex.slice()))]
    #[regex(r"\$[a-zA-Z_][a-zA-Z0-9_]*", |lex| lex.slice()[1..].to_string())]
    #[regex(r"\$[?#@0-9]", |lex| lex.slice()[1..].to_string())]
    Var(String),

    #[regex(r"\$\{[^}]*", |_| reject(LexError::UnterminatedBrace))]
    UnterminatedBrace,

    /// Glued word fragments; synthesized by [`tokenize`], never lexed.
    Word(Word),
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::AndIf => f.write_str("&&"),
            Token::OrIf => f.write_str("||"),
            Token::Pipe => f.write_str("|"),
            Token::Semi => f.write_str(";"),
            Token::Newline => f.write_str("newline"),
            Token::LParen => f.write_str("("),
            Token::RParen => f.write_str(")"),
            Token::Background => f.write_str("&"),
            Token::Redirect => f.write_str("redirection"),
            Token::Word(word) => write!(f, "word `{}`", word),
            Token::Text(s) | Token::SingleQuoted(s) | Token::Escaped(s) => f.write_str(s),
            Token::Var(name) => write!(f, "${}", name),
            Token::DoubleQuoted(_) => f.write_str("string"),
            Token::LineContinuation => f.write_str("line continuation"),
            Token::UnterminatedSingle | Token::UnterminatedDouble | Token::UnterminatedBrace => {
                f.write_str("unterminated text")
            }
        }
    }
}

/// Double-quoted interior: literal text, the four escapable characters
/// and `$` expansions.
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(error = LexError)]
enum QuotedToken {
    #[regex(r"[^\\$]+", |lex| lex.slice().to_string())]
    #[regex(r#"\\[^"\\$`\n]"#, |lex| lex.slice().to_string())]
    #[token("\\", |lex| lex.slice().to_string())]
    #[token("$", |lex| lex.slice().to_string())]
    Text(String),

    #[regex(r#"\\["\\$`]"#, |lex| lex.slice()[1..].to_string())]
    Escaped(String),

    #[token("\\\n")]
    Continuation,

    #[regex(r"\$\{[^}]*\}", |lex| braced_name(lex.slice()))]
    #[regex(r"\$[a-zA-Z_][a-zA-Z0-9_]*", |lex| lex.slice()[1..].to_string())]
    #[regex(r"\$[?#@0-9]", |lex| lex.slice()[1..].to_string())]
    Var(String),

    #[regex(r"\$\{[^}]*", |_| reject(LexError::UnterminatedBrace))]
    UnterminatedBrace,
}

fn reject(error: LexError) -> Result<(), LexError> {
    Err(error)
}

fn trim_quotes(slice: &str) -> String {
    slice[1..slice.len() - 1].to_string()
}

fn braced_name(slice: &str) -> Result<String, LexError> {
    let name = &slice[2..slice.len() - 1];
    if is_valid_name(name) || is_special_param(name) {
        Ok(name.to_string())
    } else {
        Err(LexError::BadSubstitution(name.to_string()))
    }
}

fn double_quoted(lex: &mut Lexer<Token>) -> Result<Vec<WordPart>, LexError> {
    let slice = lex.slice();
    let mut word = Word::default();
    // An empty "" still produces an (empty) quoted part.
    word.push_str("", true);
    for token in QuotedToken::lexer(&slice[1..slice.len() - 1]) {
        match token? {
            QuotedToken::Text(text) | QuotedToken::Escaped(text) => word.push_str(&text, true),
            QuotedToken::Continuation => {}
            QuotedToken::Var(name) => word.parts.push(WordPart::Var(name)),
            QuotedToken::UnterminatedBrace => return Err(LexError::UnterminatedBrace),
        }
    }
    Ok(word.parts)
}

/// `#` at a word boundary comments out the rest of the line; inside a
/// word (`a#b`, `"x"#y`) it is literal.
fn comment_or_text(lex: &mut Lexer<Token>) -> Filter<String> {
    let before = &lex.source()[..lex.span().start];
    if continues_word(before) {
        return Filter::Emit("#".to_string());
    }
    let rest = lex.remainder();
    lex.bump(rest.find('\n').unwrap_or(rest.len()));
    Filter::Skip
}

fn continues_word(before: &str) -> bool {
    let mut rev = before.chars().rev();
    match rev.next() {
        None | Some('\n' | ';' | '&' | '|' | '(' | ')') => false,
        Some(' ' | '\t' | '\r') => rev.next() == Some('\\'),
        Some(_) => true,
    }
}

type Span = SimpleSpan;

/// Lex `src` and glue touching word fragments into [`Token::Word`]s.
fn tokenize(src: &str) -> Result<Vec<(Token, Span)>, ParseError> {
    let mut tokens = Vec::new();
    let mut pending: Option<(Word, Range<usize>)> = None;

    for (result, span) in Token::lexer(src).spanned() {
        let token = result.map_err(|e| ParseError::new(e.to_string(), span.start))?;
        let parts = match token {
            Token::Text(text) => vec![WordPart::Lit {
                text,
                quoted: false,
            }],
            Token::SingleQuoted(text) | Token::Escaped(text) => {
                vec![WordPart::Lit { text, quoted: true }]
            }
            Token::DoubleQuoted(parts) => parts,
            Token::Var(name) => vec![WordPart::Var(name)],
            Token::LineContinuation => Vec::new(),
            operator => {
                flush_word(&mut pending, &mut tokens);
                tokens.push((operator, span.into()));
                continue;
            }
        };
        match pending.as_mut() {
            Some((word, range)) if range.end == span.start => {
                word.append(parts);
                range.end = span.end;
            }
            _ => {
                flush_word(&mut pending, &mut tokens);
                let mut word = Word::default();
                word.append(parts);
                pending = Some((word, span));
            }
        }
    }
    flush_word(&mut pending, &mut tokens);
    Ok(tokens)
}

fn flush_word(pending: &mut Option<(Word, Range<usize>)>, tokens: &mut Vec<(Token, Span)>) {
    if let Some((word, range)) = pending.take() {
        // A bare line continuation contributes no word.
        if !word.parts.is_empty() {
            tokens.push((Token::Word(word), range.into()));
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Parser
// ═══════════════════════════════════════════════════════════════════════

type Extra<'tokens> = extra::Err<Rich<'tokens, Token, Span>>;

/// Parse shell source into a [`Script`].
pub fn parse(src: &str) -> Result<Script, ParseError> {
    let tokens = tokenize(src)?;
    let end_span: Span = (src.len()..src.len()).into();

    let result = script_parser(src)
        .then_ignore(end())
        .parse(tokens.as_slice().map(end_span, |(t, s)| (t, s)))
        .into_result()
        .map_err(|errors| match errors.into_iter().next() {
            Some(e) => ParseError::new(e.to_string(), e.span().start),
            None => ParseError::new("invalid syntax", 0),
        });
    result
}

/// Statement lists, recursing into function bodies.
fn script_parser<'tokens, I>(
    src: &'tokens str,
) -> impl Parser<'tokens, I, Script, Extra<'tokens>> + Clone
where
    I: ValueInput<'tokens, Token = Token, Span = Span>,
{
    recursive(move |script| {
        let word = select! { Token::Word(word) => word };
        let newlines = just(Token::Newline).repeated();
        let separator = choice((just(Token::Semi), just(Token::Newline)));

        let assignment = word.clone().try_map(|word: Word, span| {
            word.split_assignment()
                .ok_or_else(|| Rich::custom(span, "expected an assignment"))
        });
        let simple = assignment
            .repeated()
            .collect::<Vec<_>>()
            .then(
                word.clone()
                    .filter(|w: &Word| !w.is_brace("{") && !w.is_brace("}"))
                    .then(word.clone().repeated().collect::<Vec<_>>())
                    .or_not(),
            )
            .try_map(|(assignments, words), span| {
                let words: Vec<Word> = match words {
                    Some((first, rest)) => std::iter::once(first).chain(rest).collect(),
                    None => Vec::new(),
                };
                if assignments.is_empty() && words.is_empty() {
                    return Err(Rich::custom(span, "expected a command"));
                }
                Ok(Command::Simple(SimpleCommand { assignments, words }))
            });

        let name = word.clone().try_map(|word: Word, span| match word.as_plain() {
            Some(name) if is_valid_name(&name) => Ok(name),
            _ => Err(Rich::custom(span, "invalid function name")),
        });
        let brace =
            |b: &'static str| word.clone().filter(move |w: &Word| w.is_brace(b));
        let function_def = name
            .then_ignore(just(Token::LParen))
            .then_ignore(just(Token::RParen))
            .then_ignore(newlines.clone())
            .then_ignore(brace("{"))
            .then(script.map_with(|_, e| e.span()))
            .then_ignore(brace("}"))
            .map(move |(name, body): (String, Span)| Command::FunctionDef {
                name,
                body: src.get(body.start..body.end).unwrap_or("").trim().to_string(),
            })
            .labelled("function definition");

        let command = choice((function_def, simple)).boxed();

        let pipeline = command
            .separated_by(just(Token::Pipe).then(newlines.clone()))
            .at_least(1)
            .collect::<Vec<_>>()
            .map(|commands| Pipeline { commands })
            .labelled("pipeline")
            .boxed();

        let connector = choice((
            just(Token::AndIf).to(Connector::And),
            just(Token::OrIf).to(Connector::Or),
        ));
        let and_or = pipeline
            .clone()
            .then(
                connector
                    .then_ignore(newlines)
                    .then(pipeline)
                    .repeated()
                    .collect::<Vec<_>>(),
            )
            .map(|(first, rest)| AndOrList { first, rest })
            .boxed();

        separator
            .clone()
            .repeated()
            .ignore_then(
                and_or
                    .separated_by(separator.repeated().at_least(1))
                    .allow_trailing()
                    .collect::<Vec<_>>(),
            )
            .map(|items| Script { items })
    })
}

// ═══════════════════════════════════════════════════════════════════════
// Lenient word splitting (completion)
// ═══════════════════════════════════════════════════════════════════════

/// A whitespace-delimited word of a partially typed line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WordSpan {
    /// Unquoted text of the word.
    pub text: String,
    /// Character offset where the word starts.
    pub start: usize,
    /// Character offset one past the word's end.
    pub end: usize,
}

/// Fragments of a line being typed. Every input lexes: an open quote
/// runs to the end of the line.
#[derive(Logos, Debug, Clone, PartialEq)]
enum Fragment {
    #[regex(r"\s+")]
    Blank,

    #[regex(r#"[^\s'"\\]+"#, |lex| lex.slice().to_string())]
    #[regex(r"'[^']*'?", |lex| unquote_single(lex.slice()))]
    #[regex(r#""([^"\\]|\\(.|\n))*"?"#, |lex| unquote_double(lex.slice()))]
    #[regex(r"\\(.|\n)", |lex| lex.slice()[1..].to_string())]
    #[token("\\", |lex| lex.slice().to_string())]
    Text(String),
}

fn unquote_single(slice: &str) -> String {
    let inner = &slice[1..];
    inner.strip_suffix('\'').unwrap_or(inner).to_string()
}

fn unquote_double(slice: &str) -> String {
    let mut out = String::new();
    let mut chars = slice[1..].chars();
    while let Some(c) = chars.next() {
        match c {
            '"' => break,
            '\\' => out.extend(chars.next()),
            _ => out.push(c),
        }
    }
    out
}

/// Split `chars` into words, honoring quotes and escapes.
///
/// Unlike [`parse`], an unterminated quote is not an error: the open
/// quote extends to the end of the input, as it does while typing.
/// The second value is true when the input ends in unquoted, unescaped
/// whitespace.
pub fn split_words(chars: &[char]) -> (Vec<WordSpan>, bool) {
    let line: String = chars.iter().collect();
    let mut words = Vec::new();
    let mut current: Option<WordSpan> = None;
    let mut trailing_space = false;
    let mut pos = 0;

    for (fragment, span) in Fragment::lexer(&line).spanned() {
        let start = pos;
        pos += line[span].chars().count();
        match fragment {
            Ok(Fragment::Text(text)) => {
                trailing_space = false;
                match current.as_mut() {
                    Some(word) => {
                        word.text.push_str(&text);
                        word.end = pos;
                    }
                    None => {
                        current = Some(WordSpan {
                            text,
                            start,
                            end: pos,
                        })
                    }
                }
            }
            Ok(Fragment::Blank) => {
                trailing_space = true;
                words.extend(current.take());
            }
            Err(()) => {}
        }
    }
    words.extend(current);
    (words, trailing_space)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lit(text: &str) -> WordPart {
        WordPart::Lit {
            text: text.to_string(),
            quoted: false,
        }
    }

    fn simple(script: &Script, item: usize) -> &SimpleCommand {
        match &script.items[item].first.commands[0] {
            Command::Simple(cmd) => cmd,
            other => panic!("expected simple command, got {:?}", other),
        }
    }

    #[test]
    fn parses_words_and_quotes() {
        let script = parse(r#"echo 'a b' "c $HOME" d\ e"#).unwrap();
        let cmd = simple(&script, 0);
        assert_eq!(cmd.words.len(), 4);
        assert_eq!(cmd.words[0].parts, vec![lit("echo")]);
        assert_eq!(
            cmd.words[2].parts,
            vec![
                WordPart::Lit { text: "c ".into(), quoted: true },
                WordPart::Var("HOME".into()),
            ]
        );
        assert_eq!(cmd.words[3].as_plain(), None);
    }

    #[test]
    fn parses_lists_and_pipelines() {
        let script = parse("a && b || c; d | e\nf").unwrap();
        assert_eq!(script.items.len(), 3);
        assert_eq!(script.items[0].rest.len(), 2);
        assert_eq!(script.items[0].rest[0].0, Connector::And);
        assert_eq!(script.items[0].rest[1].0, Connector::Or);
        assert_eq!(script.items[1].first.commands.len(), 2);
    }

    #[test]
    fn parses_assignments() {
        let script = parse("FOO=bar BAZ=\"q x\" env").unwrap();
        let cmd = simple(&script, 0);
        assert_eq!(cmd.assignments.len(), 2);
        assert_eq!(cmd.assignments[0].0, "FOO");
        assert_eq!(cmd.words.len(), 1);
    }

    #[test]
    fn parses_function_definitions() {
        let script = parse("greet() { echo hi $1; }\ngreet bob").unwrap();
        assert_eq!(
            script.items[0].first.commands[0],
            Command::FunctionDef {
                name: "greet".into(),
                body: "echo hi $1;".into()
            }
        );
        assert_eq!(script.items.len(), 2);
    }

    #[test]
    fn comments_are_ignored() {
        let script = parse("# nothing here\necho hi # trailing").unwrap();
        assert_eq!(simple(&script, 0).words.len(), 2);
    }

    #[test]
    fn malformed_input_is_a_parse_error() {
        assert!(parse("echo 'open").is_err());
        assert!(parse("echo \"open").is_err());
        assert!(parse("| grep x").is_err());
        assert!(parse("a &&").is_err());
        assert!(parse("f() { echo").is_err());
        assert!(parse("echo ${").is_err());
        assert!(parse("sleep 1 &").is_err());
    }

    #[test]
    fn empty_source_is_empty_script() {
        assert!(parse("").unwrap().items.is_empty());
        assert!(parse("  ;\n ").unwrap().items.is_empty());
    }

    #[test]
    fn split_words_tracks_offsets() {
        let chars: Vec<char> = "git  commit -m".chars().collect();
        let (words, trailing) = split_words(&chars);
        assert!(!trailing);
        assert_eq!(words.len(), 3);
        assert_eq!(words[1].text, "commit");
        assert_eq!((words[1].start, words[1].end), (5, 11));
    }

    #[test]
    fn split_words_handles_quotes_and_trailing_space() {
        let chars: Vec<char> = "cat 'my file' ".chars().collect();
        let (words, trailing) = split_words(&chars);
        assert!(trailing);
        assert_eq!(words[1].text, "my file");

        let chars: Vec<char> = "cat \"unterminated dir".chars().collect();
        let (words, trailing) = split_words(&chars);
        assert!(!trailing);
        assert_eq!(words[1].text, "unterminated dir");

        let chars: Vec<char> = r"cd my\ ".chars().collect();
        let (words, trailing) = split_words(&chars);
        assert!(!trailing);
        assert_eq!(words[1].text, "my ");
    }

    #[test]
    fn escaped_backslash_before_space_still_ends_the_word() {
        let chars: Vec<char> = r"svc a\\ ".chars().collect();
        let (words, trailing) = split_words(&chars);
        assert!(trailing);
        assert_eq!(words.len(), 2);
        assert_eq!(words[1].text, "a\\");
        assert_eq!((words[1].start, words[1].end), (4, 7));
    }

    #[test]
    fn split_words_counts_characters_not_bytes() {
        let chars: Vec<char> = "cat é.txt 'ü x'".chars().collect();
        let (words, _) = split_words(&chars);
        assert_eq!((words[1].start, words[1].end), (4, 9));
        assert_eq!(words[2].text, "ü x");
        assert_eq!((words[2].start, words[2].end), (10, 15));
    }

    #[test]
    fn hash_inside_a_word_is_literal() {
        let script = parse("echo a#b \"x\"#y # gone").unwrap();
        let cmd = simple(&script, 0);
        assert_eq!(cmd.words.len(), 3);
        assert_eq!(cmd.words[1].as_plain().as_deref(), Some("a#b"));
        assert_eq!(cmd.words[2].to_string(), "x#y");
    }

    #[test]
    fn adjacent_fragments_form_one_word() {
        let script = parse("echo pre'mid'\"$X\"post\\ end").unwrap();
        let cmd = simple(&script, 0);
        assert_eq!(cmd.words.len(), 2);
        assert_eq!(
            cmd.words[1].parts,
            vec![
                lit("pre"),
                WordPart::Lit { text: "mid".into(), quoted: true },
                WordPart::Var("X".into()),
                lit("post"),
                WordPart::Lit { text: " ".into(), quoted: true },
                lit("end"),
            ]
        );
    }

    #[test]
    fn line_continuation_joins_lines() {
        let script = parse("echo one \\\n two").unwrap();
        assert_eq!(script.items.len(), 1);
        assert_eq!(simple(&script, 0).words.len(), 3);
    }

    #[test]
    fn double_quotes_only_unescape_special_characters() {
        let script = parse(r#"echo "a\"b\$c\n""#).unwrap();
        let cmd = simple(&script, 0);
        assert_eq!(
            cmd.words[1].parts,
            vec![WordPart::Lit { text: r#"a"b$c\n"#.into(), quoted: true }]
        );
    }

    #[test]
    fn unsupported_operators_name_the_problem() {
        let err = parse("echo hi > out").unwrap_err();
        assert_eq!(err.message, "redirections are not supported");
        assert_eq!(err.offset, 8);
        let err = parse("sleep 1 &").unwrap_err();
        assert_eq!(err.message, "background jobs are not supported");
        let err = parse("echo ${1x}").unwrap_err();
        assert_eq!(err.message, "bad substitution: ${1x}");
    }

    #[test]
    fn nested_function_bodies_keep_their_source() {
        let script = parse("outer() {\n  inner() { echo in; }\n  inner\n}").unwrap();
        assert_eq!(
            script.items[0].first.commands[0],
            Command::FunctionDef {
                name: "outer".into(),
                body: "inner() { echo in; }\n  inner".into()
            }
        );
    }
}
