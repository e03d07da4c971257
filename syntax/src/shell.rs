//! POSIX-like word splitting and quoting, for commands written in suite files
//! and for the MPI launch and submission strings in the launcher config.

use std::borrow::Cow;

use combine::error::ParseError;
use combine::parser::char::{char, spaces};
use combine::{any, between, choice, eof, many, many1, none_of, satisfy, EasyParser, Parser, Stream};

#[derive(Debug, thiserror::Error)]
#[error("Unable to split '{text}' into words at position {pos}: {msg}")]
pub struct Error {
    text: String,
    pos: usize,
    msg: String,
}

/// Split `text` into words the way `sh` would, minus expansions.
pub fn split(text: &str) -> Result<Vec<String>, Error> {
    words()
        .easy_parse(text)
        .map(|(words, _remainder)| words)
        .map_err(|e| Error {
            text: text.to_owned(),
            pos: e.position.translate_position(text),
            msg: format!("{}", e),
        })
}

/// Quote a single word so that `sh` reads it back unchanged.
pub fn quote(word: &str) -> Cow<'_, str> {
    let safe = |c: char| c.is_ascii_alphanumeric() || "@%+=:,./-_".contains(c);
    if word.is_empty() {
        Cow::Borrowed("''")
    } else if word.chars().all(safe) {
        Cow::Borrowed(word)
    } else {
        Cow::Owned(format!("'{}'", word.replace('\'', r#"'"'"'"#)))
    }
}

/// Join words into one shell command line, quoting as needed.
pub fn join<S: AsRef<str>>(words: &[S]) -> String {
    let mut line = String::with_capacity(words.iter().map(|w| w.as_ref().len() + 1).sum());
    for (i, word) in words.iter().enumerate() {
        if i > 0 {
            line.push(' ');
        }
        line.push_str(&quote(word.as_ref()));
    }
    line
}

fn words<Input>() -> impl Parser<Input, Output = Vec<String>>
where
    Input: Stream<Token = char>,
    Input::Error: ParseError<Input::Token, Input::Range, Input::Position>,
{
    spaces()
        .with(many::<Vec<String>, _, _>(word().skip(spaces())))
        .skip(eof())
}

fn word<Input>() -> impl Parser<Input, Output = String>
where
    Input: Stream<Token = char>,
    Input::Error: ParseError<Input::Token, Input::Range, Input::Position>,
{
    many1::<Vec<String>, _, _>(choice((
        single_quoted(),
        double_quoted(),
        escaped(),
        unquoted(),
    )))
    .map(|parts| parts.concat())
}

fn unquoted<Input>() -> impl Parser<Input, Output = String>
where
    Input: Stream<Token = char>,
    Input::Error: ParseError<Input::Token, Input::Range, Input::Position>,
{
    many1::<String, _, _>(satisfy(|c: char| {
        !c.is_whitespace() && !matches!(c, '\'' | '"' | '\\')
    }))
}

fn escaped<Input>() -> impl Parser<Input, Output = String>
where
    Input: Stream<Token = char>,
    Input::Error: ParseError<Input::Token, Input::Range, Input::Position>,
{
    char('\\').with(any()).map(|c: char| match c {
        '\n' => String::new(),
        _ => c.to_string(),
    })
}

fn single_quoted<Input>() -> impl Parser<Input, Output = String>
where
    Input: Stream<Token = char>,
    Input::Error: ParseError<Input::Token, Input::Range, Input::Position>,
{
    between(char('\''), char('\''), many::<String, _, _>(none_of("'".chars())))
}

// inside double quotes, backslash only escapes a few characters:
fn double_quoted<Input>() -> impl Parser<Input, Output = String>
where
    Input: Stream<Token = char>,
    Input::Error: ParseError<Input::Token, Input::Range, Input::Position>,
{
    let escape = char('\\').with(any()).map(|c: char| match c {
        '"' | '\\' | '$' | '`' => c.to_string(),
        '\n' => String::new(),
        _ => format!("\\{}", c),
    });
    let plain = many1::<String, _, _>(none_of("\"\\".chars()));
    between(
        char('"'),
        char('"'),
        many::<Vec<String>, _, _>(choice((escape, plain))),
    )
    .map(|parts| parts.concat())
}
