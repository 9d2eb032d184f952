//! Dotenv parsing and serialization.
//!
//! Tracked files and remote records both carry dotenv-formatted text
//! (`KEY=value` per line, `#` comments). Parsing is zero-copy over the
//! input string and preserves comments and blank lines, so a
//! parse-then-serialize pass only canonicalizes whitespace around keys
//! and values. [`EnvFile::merge_defaults`] implements the merge used by
//! `sync --merge`: the receiver's entries win on key conflicts and
//! entries only present in the defaults are appended at the end.

use std::{borrow::Cow, convert::TryFrom, fmt};

use tracing::trace;

const COMMENT_PREFIX: &str = "#";
const ASSIGNMENT_OPERATOR: &str = "=";

/// A parsed dotenv document: variables, comments and blank lines in
/// source order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EnvFile<'a> {
  pub entries: Vec<EnvEntry<'a>>,
}

impl<'a> fmt::Display for EnvFile<'a> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    for entry in &self.entries {
      write!(f, "{}", entry)?;
    }
    Ok(())
  }
}

impl<'a> TryFrom<&'a str> for EnvFile<'a> {
  type Error = ParseError;

  fn try_from(s: &'a str) -> Result<Self, Self::Error> {
    let mut entries = Vec::new();
    let mut pending_comments = Vec::new();

    for line in s.lines() {
      let mut entry: EnvEntry = line.try_into()?;

      if let EnvEntry::Variable(ref mut var) = entry {
        trace!(key = %var.key, pending = pending_comments.len(), "parsed variable");
        var.preceding_comments = std::mem::take(&mut pending_comments);
      } else if let EnvEntry::OrphanComment(comment) = entry {
        pending_comments.push(comment);
        continue;
      } else if matches!(entry, EnvEntry::EmptyLine) && !pending_comments.is_empty() {
        // A blank line detaches the pending comments from whatever follows.
        for comment in pending_comments.drain(..) {
          entries.push(EnvEntry::OrphanComment(comment));
        }
      }

      entries.push(entry);
    }

    for comment in pending_comments {
      entries.push(EnvEntry::OrphanComment(comment));
    }

    Ok(Self { entries })
  }
}

impl<'a> EnvFile<'a> {
  pub fn get(&self, key: &str) -> Option<&EnvVariable<'a>> {
    self.entries.iter().find_map(|entry| {
      if let EnvEntry::Variable(var) = entry {
        if var.key == key { Some(var) } else { None }
      } else {
        None
      }
    })
  }

  pub fn contains_key(&self, key: &str) -> bool {
    self.get(key).is_some()
  }

  /// Iterates over the variables in source order.
  pub fn variables(&self) -> impl Iterator<Item = &EnvVariable<'a>> {
    self.entries.iter().filter_map(|entry| {
      if let EnvEntry::Variable(var) = entry {
        Some(var)
      } else {
        None
      }
    })
  }

  /// Merges `defaults` under `self`: the receiver keeps all of its
  /// entries (comments and layout included) and variables that only
  /// exist in `defaults` are appended at the end, carrying their own
  /// comments along.
  pub fn merge_defaults(mut self, defaults: &EnvFile<'a>) -> EnvFile<'a> {
    let missing: Vec<EnvEntry<'a>> = defaults
      .variables()
      .filter(|var| !self.contains_key(&var.key))
      .map(|var| EnvEntry::Variable(var.clone()))
      .collect();

    trace!(appended = missing.len(), "merged default entries");
    self.entries.extend(missing);
    self
  }
}

/// Parses dotenv text and serializes it straight back, canonicalizing
/// formatting without touching semantics.
pub fn normalize(content: &str) -> Result<String, ParseError> {
  let parsed: EnvFile = content.try_into()?;
  Ok(parsed.to_string())
}

#[derive(Debug, Clone, PartialEq)]
pub enum EnvEntry<'a> {
  Variable(EnvVariable<'a>),
  OrphanComment(EnvComment<'a>),
  EmptyLine,
}

impl<'a> fmt::Display for EnvEntry<'a> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      EnvEntry::Variable(var) => {
        write!(f, "{}", var)?;
        writeln!(f)
      }
      EnvEntry::OrphanComment(comment) => {
        writeln!(f, "{}", comment)
      }
      EnvEntry::EmptyLine => {
        writeln!(f)
      }
    }
  }
}

impl<'a> TryFrom<&'a str> for EnvEntry<'a> {
  type Error = ParseError;

  fn try_from(s: &'a str) -> Result<Self, Self::Error> {
    let trimmed = s.trim();

    if trimmed.is_empty() {
      Ok(EnvEntry::EmptyLine)
    } else if trimmed.starts_with(COMMENT_PREFIX) {
      Ok(EnvEntry::OrphanComment(trimmed.try_into()?))
    } else {
      Ok(EnvEntry::Variable(trimmed.try_into()?))
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnvVariable<'a> {
  pub key: Cow<'a, str>,
  pub value: Cow<'a, str>,
  pub preceding_comments: Vec<EnvComment<'a>>,
  pub inline_comment: Option<EnvComment<'a>>,
}

impl<'a> fmt::Display for EnvVariable<'a> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    for comment in &self.preceding_comments {
      writeln!(f, "{}", comment)?;
    }
    write!(f, "{}{}{}", self.key, ASSIGNMENT_OPERATOR, self.value)?;
    if let Some(comment) = &self.inline_comment {
      write!(f, " {}", comment)?;
    }
    Ok(())
  }
}

impl<'a> TryFrom<&'a str> for EnvVariable<'a> {
  type Error = ParseError;

  fn try_from(s: &'a str) -> Result<Self, Self::Error> {
    if let Some((key, value_part)) = s.split_once(ASSIGNMENT_OPERATOR) {
      let key = key.trim();

      let (value, inline_comment) =
        if let Some((value, comment)) = value_part.split_once(COMMENT_PREFIX) {
          (value.trim(), Some(EnvComment(Cow::Borrowed(comment))))
        } else {
          (value_part.trim(), None)
        };

      Ok(EnvVariable {
        key: Cow::Borrowed(key),
        value: Cow::Borrowed(value),
        preceding_comments: Vec::new(),
        inline_comment,
      })
    } else {
      Err(ParseError::InvalidLine(s.to_string()))
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnvComment<'a>(Cow<'a, str>);

impl<'a> fmt::Display for EnvComment<'a> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}{}", COMMENT_PREFIX, self.0)
  }
}

impl<'a> TryFrom<&'a str> for EnvComment<'a> {
  type Error = ParseError;

  fn try_from(s: &'a str) -> Result<Self, Self::Error> {
    let trimmed = s.trim();
    if let Some(content) = trimmed.strip_prefix(COMMENT_PREFIX) {
      Ok(EnvComment(Cow::Borrowed(content)))
    } else {
      Err(ParseError::InvalidLine(s.to_string()))
    }
  }
}

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
  #[error("Invalid line: {0}")]
  InvalidLine(String),
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_parse_simple() {
    let input = "KEY=value\nANOTHER=test";
    let env: EnvFile = input.try_into().unwrap();

    assert_eq!(env.entries.len(), 2);
    match &env.entries[0] {
      EnvEntry::Variable(var) => {
        assert_eq!(var.key, "KEY");
        assert_eq!(var.value, "value");
      }
      _ => panic!("Expected variable"),
    }
    match &env.entries[1] {
      EnvEntry::Variable(var) => {
        assert_eq!(var.key, "ANOTHER");
        assert_eq!(var.value, "test");
      }
      _ => panic!("Expected variable"),
    }
  }

  #[test]
  fn test_parse_with_comments() {
    let input = "# This is a comment\nKEY=value\n# Another comment\n# Multi line\nTEST=123";
    let env: EnvFile = input.try_into().unwrap();

    let mut iter = env.entries.iter();

    match iter.next().unwrap() {
      EnvEntry::Variable(var) => {
        assert_eq!(var.key, "KEY");
        assert_eq!(var.value, "value");
        assert_eq!(var.preceding_comments.len(), 1);
        assert_eq!(var.preceding_comments[0].to_string(), "# This is a comment");
      }
      _ => panic!("Expected variable"),
    }

    match iter.next().unwrap() {
      EnvEntry::Variable(var) => {
        assert_eq!(var.key, "TEST");
        assert_eq!(var.value, "123");
        assert_eq!(var.preceding_comments.len(), 2);
        assert_eq!(var.preceding_comments[0].to_string(), "# Another comment");
        assert_eq!(var.preceding_comments[1].to_string(), "# Multi line");
      }
      _ => panic!("Expected variable"),
    }

    assert!(iter.next().is_none());
  }

  #[test]
  fn test_parse_inline_comments() {
    let input = "KEY=value # This is inline\nTEST=123";
    let env: EnvFile = input.try_into().unwrap();

    match &env.entries[0] {
      EnvEntry::Variable(var) => {
        assert_eq!(var.key, "KEY");
        assert_eq!(var.value, "value");
        assert_eq!(
          var.inline_comment,
          Some(EnvComment(Cow::Owned(" This is inline".to_string())))
        );
      }
      _ => panic!("Expected variable"),
    }
  }

  #[test]
  fn test_roundtrip() {
    let input = "# Comment\nKEY=value\n\n# Orphan\nTEST=123 # inline";
    let env: EnvFile = input.try_into().unwrap();
    let output = env.to_string();

    let env2: EnvFile = output.as_str().try_into().unwrap();
    assert_eq!(env, env2);
  }

  #[test]
  fn test_normalize_canonicalizes_whitespace() {
    let normalized = normalize("KEY =  value\nOTHER=x").unwrap();
    assert_eq!(normalized, "KEY=value\nOTHER=x\n");
  }

  #[test]
  fn test_normalize_rejects_invalid_line() {
    assert!(normalize("not an assignment").is_err());
  }

  #[test]
  fn test_merge_defaults_remote_wins() {
    let remote: EnvFile = "A=2\nB=3".try_into().unwrap();
    let local: EnvFile = "A=1".try_into().unwrap();

    let merged = remote.merge_defaults(&local);
    assert_eq!(merged.get("A").unwrap().value, "2");
    assert_eq!(merged.get("B").unwrap().value, "3");
    assert_eq!(merged.variables().count(), 2);
  }

  #[test]
  fn test_merge_defaults_appends_local_only_keys() {
    let remote: EnvFile = "A=2".try_into().unwrap();
    let local: EnvFile = "# local secret\nTOKEN=abc\nA=1".try_into().unwrap();

    let merged = remote.merge_defaults(&local);
    assert_eq!(merged.to_string(), "A=2\n# local secret\nTOKEN=abc\n");
  }

  #[test]
  fn test_merge_defaults_empty_local() {
    let remote: EnvFile = "A=2\nB=3".try_into().unwrap();
    let local = EnvFile::default();

    let merged = remote.clone().merge_defaults(&local);
    assert_eq!(merged, remote);
  }

  #[test]
  fn test_key_without_value() {
    let entry: EnvEntry = "KEY=".try_into().unwrap();
    match entry {
      EnvEntry::Variable(var) => {
        assert_eq!(var.key, "KEY");
        assert_eq!(var.value, "");
        assert!(var.inline_comment.is_none());
      }
      _ => panic!("Expected Variable"),
    }

    let entry: EnvEntry = "KEY=   ".try_into().unwrap();
    match entry {
      EnvEntry::Variable(var) => {
        assert_eq!(var.key, "KEY");
        assert_eq!(var.value, "");
        assert!(var.inline_comment.is_none());
      }
      _ => panic!("Expected Variable"),
    }
  }

  #[test]
  fn test_invalid_line() {
    assert!(EnvEntry::try_from("invalid line without equals").is_err());
  }
}
