//! Host-side rendering tree for guest values

use serde::Serialize;
use std::fmt;

use super::tag::Tag;

/// Decoded shape of a guest value
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Projection {
    Int { value: u32 },
    Nil,
    True,
    Duo {
        car: Box<Projection>,
        cdr: Box<Projection>,
    },
    Sym { name: String },
    /// Unrecognised tag, or a `sys` word that is neither sentinel
    Unknown { tag: Tag, raw: u32 },
    /// Symbol whose name is not valid UTF-8
    Undecodable { raw: u32, len: u32 },
    /// Pair cell that is its own ancestor
    Cycle { raw: u32 },
    /// Depth limit reached
    Elided { raw: u32 },
}

impl Projection {
    pub fn duo(car: Projection, cdr: Projection) -> Self {
        Projection::Duo {
            car: Box::new(car),
            cdr: Box::new(cdr),
        }
    }

    /// True for the leaves that stand in for something the host could not show
    pub fn is_fallback(&self) -> bool {
        matches!(
            self,
            Projection::Unknown { .. }
                | Projection::Undecodable { .. }
                | Projection::Cycle { .. }
                | Projection::Elided { .. }
        )
    }

    /// Nesting depth; leaves are 0
    pub fn depth(&self) -> usize {
        match self {
            Projection::Duo { car, cdr } => 1 + car.depth().max(cdr.depth()),
            _ => 0,
        }
    }

    /// Leaves in left-to-right order
    pub fn leaves(&self) -> Vec<&Projection> {
        let mut out = Vec::new();
        self.collect_leaves(&mut out);
        out
    }

    fn collect_leaves<'a>(&'a self, out: &mut Vec<&'a Projection>) {
        match self {
            Projection::Duo { car, cdr } => {
                car.collect_leaves(out);
                cdr.collect_leaves(out);
            }
            leaf => out.push(leaf),
        }
    }

    fn fmt_leaf(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Projection::Int { value } => write!(f, "{}", value),
            Projection::Nil => write!(f, "NIL"),
            Projection::True => write!(f, "T"),
            Projection::Sym { name } => write!(f, "{}", name),
            Projection::Unknown { tag, raw } => write!(f, "#<{} {:#x}>", tag, raw),
            Projection::Undecodable { raw, len } => {
                write!(f, "#<undecodable {:#x} {} bytes>", raw, len)
            }
            Projection::Cycle { raw } => write!(f, "#<cycle {:#x}>", raw),
            Projection::Elided { .. } => write!(f, "..."),
            Projection::Duo { .. } => fmt::Display::fmt(self, f),
        }
    }
}

impl fmt::Display for Projection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Projection::Duo { car, cdr } = self else {
            return self.fmt_leaf(f);
        };

        write!(f, "({}", car)?;
        let mut tail = cdr.as_ref();
        loop {
            match tail {
                Projection::Nil => break,
                Projection::Duo { car, cdr } => {
                    write!(f, " {}", car)?;
                    tail = cdr;
                }
                other => {
                    write!(f, " . {}", other)?;
                    break;
                }
            }
        }
        write!(f, ")")
    }
}
