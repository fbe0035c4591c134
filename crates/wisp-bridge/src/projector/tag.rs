//! Tagged values, tags and rows as the guest describes them

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::error::{BridgeError, BridgeResult};

/// One machine word produced by the guest. Opaque to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaggedValue(pub u32);

impl TaggedValue {
    pub fn raw(self) -> u32 {
        self.0
    }
}

impl From<u32> for TaggedValue {
    fn from(raw: u32) -> Self {
        Self(raw)
    }
}

impl fmt::Display for TaggedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

/// Guest handle resolved by the string accessor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StringHandle(pub u32);

/// Variant label reported by the guest classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tag {
    /// Immediate integer
    Int,
    /// System constant (`NIL`, `T`, ...)
    Sys,
    /// Pair cell
    Duo,
    /// Symbol
    Sym,
    /// Classifier code the host has no case for
    Unknown(u32),
}

impl Tag {
    pub fn label(&self) -> &'static str {
        match self {
            Tag::Int => "int",
            Tag::Sys => "sys",
            Tag::Duo => "duo",
            Tag::Sym => "sym",
            Tag::Unknown(_) => "unknown",
        }
    }

    /// Number of words in this tag's row, if it has one
    pub fn row_width(&self) -> Option<u32> {
        match self {
            Tag::Duo => Some(2),
            Tag::Sym => Some(1),
            Tag::Int | Tag::Sys | Tag::Unknown(_) => None,
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tag::Unknown(code) => write!(f, "unknown:{}", code),
            other => write!(f, "{}", other.label()),
        }
    }
}

/// Mapping between guest classifier codes and [`Tag`]s
#[derive(Debug, Clone, Default)]
pub struct TagTable {
    by_code: HashMap<u32, Tag>,
}

impl TagTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, tag: Tag, code: u32) -> Self {
        self.insert(tag, code);
        self
    }

    pub fn insert(&mut self, tag: Tag, code: u32) {
        self.by_code.insert(code, tag);
    }

    /// Tag for a classifier code; unmapped codes become `Tag::Unknown`
    pub fn classify(&self, code: u32) -> Tag {
        self.by_code.get(&code).copied().unwrap_or(Tag::Unknown(code))
    }

    /// Guest code for a known tag
    pub fn code_of(&self, tag: Tag) -> Option<u32> {
        match tag {
            Tag::Unknown(code) => Some(code),
            known => self
                .by_code
                .iter()
                .find_map(|(code, t)| (*t == known).then_some(*code)),
        }
    }

    pub fn len(&self) -> usize {
        self.by_code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_code.is_empty()
    }
}

/// Guest-exported constants, compared by identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sentinels {
    pub nil: TaggedValue,
    pub t: TaggedValue,
}

/// Positional decode of one value's payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    tag: Tag,
    cells: Vec<u32>,
}

impl Row {
    pub fn new(tag: Tag, cells: Vec<u32>) -> Self {
        Self { tag, cells }
    }

    pub fn tag(&self) -> Tag {
        self.tag
    }

    pub fn cells(&self) -> &[u32] {
        &self.cells
    }

    pub fn cell(&self, index: usize) -> BridgeResult<u32> {
        self.cells.get(index).copied().ok_or_else(|| BridgeError::TypeMismatch {
            expected: format!("{} row with column {}", self.tag, index),
            actual: format!("{} columns", self.cells.len()),
        })
    }

    /// `(car, cdr)` of a pair cell
    pub fn duo(&self) -> BridgeResult<(TaggedValue, TaggedValue)> {
        self.require_tag(Tag::Duo)?;
        Ok((TaggedValue(self.cell(0)?), TaggedValue(self.cell(1)?)))
    }

    /// Name handle of a symbol
    pub fn sym(&self) -> BridgeResult<StringHandle> {
        self.require_tag(Tag::Sym)?;
        Ok(StringHandle(self.cell(0)?))
    }

    fn require_tag(&self, tag: Tag) -> BridgeResult<()> {
        if self.tag == tag {
            Ok(())
        } else {
            Err(BridgeError::TypeMismatch {
                expected: tag.label().to_string(),
                actual: self.tag.to_string(),
            })
        }
    }
}
