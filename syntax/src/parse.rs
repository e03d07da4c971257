use std::cmp::Ordering;
use std::path::Path;

use anyhow::{Context, Result};

use crate::value::{Mapping, Value};

#[derive(Debug, thiserror::Error)]
#[error("{file}:{line}: File parse error: {kind}")]
pub struct Error {
    pub file: String,
    /// 1-based
    pub line: usize,
    pub kind: ErrorKind,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ErrorKind {
    #[error("Indent with spaces only")]
    Tab,
    #[error("Data not allowed on previous sequence/mapping line, when nesting")]
    DataBeforeNesting,
    #[error("Invalid indentation")]
    InvalidIndentation,
    #[error("Invalid entry type: sequence and mapping entries mixed at the same level")]
    MixedEntries,
    #[error("Duplicate key: {0}")]
    DuplicateKey(String),
    #[error("Non-empty, non-comment lines must start with - or contain :")]
    InvalidLine,
}

/// Read and parse a file.
pub fn parse_file(path: &Path) -> Result<Value> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("while reading {:?}", path))?;
    let value = parse(&text, &path.display().to_string())?;
    Ok(value)
}

/// Parse a block-style document. `filename` is only used for error messages.
/// An empty document yields an empty mapping.
pub fn parse(text: &str, filename: &str) -> Result<Value, Error> {
    let mut stack: Vec<Frame> = Vec::with_capacity(8);
    for (i, line) in text.lines().enumerate() {
        let err = |kind: ErrorKind| Error {
            file: filename.to_owned(),
            line: i + 1,
            kind,
        };
        for entry in split_line(line).map_err(err)? {
            place(&mut stack, entry).map_err(err)?;
        }
    }
    Ok(fold(stack).unwrap_or_else(|| Value::Map(Mapping::default())))
}

/// One open collection on the parse stack.
#[derive(Debug)]
struct Frame {
    indent: usize,
    data: Value,
}

impl Frame {
    fn open(indent: usize, entry: &EntryKind<'_>) -> Self {
        let data = match entry {
            EntryKind::Item(_) => Value::Seq(Vec::new()),
            EntryKind::Pair(..) => Value::Map(Mapping::default()),
        };
        Self { indent, data }
    }

    fn add(&mut self, entry: EntryKind<'_>) -> Result<(), ErrorKind> {
        match (&mut self.data, entry) {
            (Value::Seq(items), EntryKind::Item(v)) => items.push(v.into()),
            (Value::Map(map), EntryKind::Pair(k, v)) => {
                if !map.insert(k.to_owned(), v.into()) {
                    return Err(ErrorKind::DuplicateKey(k.to_owned()));
                }
            }
            _ => return Err(ErrorKind::MixedEntries),
        }
        Ok(())
    }

    fn last_mut(&mut self) -> Option<&mut Value> {
        match &mut self.data {
            Value::Seq(items) => items.last_mut(),
            Value::Map(map) => map.last_mut(),
            Value::Scalar(_) => None,
        }
    }

    fn can_nest(&mut self) -> bool {
        self.last_mut().is_some_and(|v| v.is_empty_scalar())
    }

    fn attach(&mut self, child: Value) {
        if let Some(slot) = self.last_mut() {
            *slot = child;
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum EntryKind<'a> {
    /// `- value`
    Item(&'a str),
    /// `key: value`
    Pair(&'a str, &'a str),
}

#[derive(Debug, PartialEq, Eq)]
struct Entry<'a> {
    indent: usize,
    kind: EntryKind<'a>,
}

fn place(stack: &mut Vec<Frame>, entry: Entry<'_>) -> Result<(), ErrorKind> {
    match stack.last_mut() {
        None => stack.push(Frame::open(entry.indent, &entry.kind)),
        Some(top) => match entry.indent.cmp(&top.indent) {
            Ordering::Greater => {
                if !top.can_nest() {
                    return Err(ErrorKind::DataBeforeNesting);
                }
                stack.push(Frame::open(entry.indent, &entry.kind));
            }
            Ordering::Less => unwind(stack, entry.indent)?,
            Ordering::Equal => {}
        },
    }
    stack
        .last_mut()
        .ok_or(ErrorKind::InvalidIndentation)?
        .add(entry.kind)
}

/// Close frames until the top one sits at `indent`.
fn unwind(stack: &mut Vec<Frame>, indent: usize) -> Result<(), ErrorKind> {
    loop {
        let top = stack.last().ok_or(ErrorKind::InvalidIndentation)?;
        match top.indent.cmp(&indent) {
            Ordering::Equal => return Ok(()),
            Ordering::Less => return Err(ErrorKind::InvalidIndentation),
            Ordering::Greater => {
                if stack.len() == 1 {
                    return Err(ErrorKind::InvalidIndentation);
                }
                if let Some(child) = stack.pop() {
                    if let Some(parent) = stack.last_mut() {
                        parent.attach(child.data);
                    }
                }
            }
        }
    }
}

/// Collapse the remaining stack into a single value.
fn fold(mut stack: Vec<Frame>) -> Option<Value> {
    let mut value = None;
    while let Some(mut frame) = stack.pop() {
        if let Some(child) = value.take() {
            frame.attach(child);
        }
        value = Some(frame.data);
    }
    value
}

/// Split a line into zero, one or two entries.
/// `- key: value` becomes a sequence item holding a new mapping.
fn split_line(line: &str) -> Result<Vec<Entry<'_>>, ErrorKind> {
    let content = strip_comment(line).trim_end();
    let mut entries = Vec::with_capacity(2);
    if content.is_empty() {
        return Ok(entries);
    }
    let indent = indentation(content)?;
    let rest = &content[indent..];

    match rest.strip_prefix('-') {
        Some(item) if item.is_empty() || item.starts_with(' ') => {
            let value = item.trim_start();
            if separator(value).is_some() {
                entries.push(Entry {
                    indent,
                    kind: EntryKind::Item(""),
                });
                let nested_indent = indent + 1 + (item.len() - value.len());
                entries.push(pair(nested_indent, value)?);
            } else {
                entries.push(Entry {
                    indent,
                    kind: EntryKind::Item(value),
                });
            }
        }
        _ => entries.push(pair(indent, rest)?),
    }
    Ok(entries)
}

fn pair(indent: usize, text: &str) -> Result<Entry<'_>, ErrorKind> {
    let i = separator(text).ok_or(ErrorKind::InvalidLine)?;
    let key = text[..i].trim();
    if key.is_empty() {
        return Err(ErrorKind::InvalidLine);
    }
    Ok(Entry {
        indent,
        kind: EntryKind::Pair(key, text[i + 1..].trim()),
    })
}

/// Position of the first `:` that ends a key, i.e. one followed by a space or end of line.
fn separator(text: &str) -> Option<usize> {
    let bytes = text.as_bytes();
    bytes
        .iter()
        .enumerate()
        .find(|&(i, &b)| b == b':' && bytes.get(i + 1).map_or(true, |&n| n == b' '))
        .map(|(i, _)| i)
}

/// A `#` at the start of a line or after whitespace begins a comment.
fn strip_comment(line: &str) -> &str {
    let mut prev_is_space = true;
    for (i, c) in line.char_indices() {
        if c == '#' && prev_is_space {
            return &line[..i];
        }
        prev_is_space = c.is_whitespace();
    }
    line
}

fn indentation(content: &str) -> Result<usize, ErrorKind> {
    let indent = content.len() - content.trim_start_matches(' ').len();
    match content[indent..].chars().next() {
        Some(c) if c.is_whitespace() => Err(ErrorKind::Tab),
        _ => Ok(indent),
    }
}
