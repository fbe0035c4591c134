//! Value projector
//!
//! Turns opaque guest words into [`Projection`] trees for rendering. The
//! projector never interprets bit patterns itself: the tag comes from the
//! guest classifier, payloads come from the guest row accessor, and symbol
//! names come from the guest string accessor. All three are reached through
//! [`HeapAccess`].
//!
//! The guest heap is untrusted input. Decoding is bounded by
//! [`DecodeOptions::max_depth`] and, when enabled, stops at pair cells that
//! are their own ancestors. Decoding, rendering and dropping a projection
//! all recurse once per level, so the depth bound is also the stack bound
//! and is never allowed past [`MAX_DECODE_DEPTH`].

mod guest;
mod projection;
mod tag;

pub use guest::{DecodingContext, View};
pub(crate) use guest::typed_func;
pub use projection::Projection;
pub use tag::{Row, Sentinels, StringHandle, Tag, TagTable, TaggedValue};

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, warn};

use crate::error::{BridgeError, BridgeResult};

/// Read access to a guest heap
pub trait HeapAccess {
    /// Ask the guest classifier for the value's variant
    fn tag_of(&mut self, value: TaggedValue) -> BridgeResult<Tag>;

    /// Fetch the payload row for `value` under `tag`
    fn row(&mut self, tag: Tag, value: TaggedValue) -> BridgeResult<Row>;

    /// Resolve a string handle to text
    fn resolve_string(&mut self, handle: StringHandle) -> BridgeResult<String>;

    fn sentinels(&self) -> Sentinels;
}

/// Hard ceiling on [`DecodeOptions::max_depth`]
pub const MAX_DECODE_DEPTH: usize = 2048;

/// Bounds applied while decoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecodeOptions {
    /// Deepest nesting level that is still expanded (root is 0).
    /// Values above [`MAX_DECODE_DEPTH`] are clamped.
    pub max_depth: usize,
    /// Replace pair cells that repeat an ancestor with a cycle marker
    pub detect_cycles: bool,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            max_depth: 1024,
            detect_cycles: true,
        }
    }
}

impl DecodeOptions {
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self.clamped()
    }

    /// Pull `max_depth` down to [`MAX_DECODE_DEPTH`]
    pub fn clamped(mut self) -> Self {
        if self.max_depth > MAX_DECODE_DEPTH {
            warn!(
                "decode.max_depth {} exceeds {}, clamping",
                self.max_depth, MAX_DECODE_DEPTH
            );
            self.max_depth = MAX_DECODE_DEPTH;
        }
        self
    }

    pub fn with_cycle_detection(mut self, enabled: bool) -> Self {
        self.detect_cycles = enabled;
        self
    }
}

/// Decodes guest values into [`Projection`]s
#[derive(Debug, Clone, Copy, Default)]
pub struct ValueProjector {
    options: DecodeOptions,
}

impl ValueProjector {
    pub fn new(options: DecodeOptions) -> Self {
        Self {
            options: options.clamped(),
        }
    }

    pub fn options(&self) -> &DecodeOptions {
        &self.options
    }

    /// Decode `value` and everything reachable from it, within the bounds.
    ///
    /// Unknown tags, stray system words and undecodable symbol names become
    /// fallback leaves. Memory faults and guest traps abort the whole decode.
    pub fn decode<A: HeapAccess + ?Sized>(
        &self,
        access: &mut A,
        value: TaggedValue,
    ) -> BridgeResult<Projection> {
        let mut ancestors = HashSet::new();
        self.decode_at(access, value, 0, &mut ancestors)
    }

    fn decode_at<A: HeapAccess + ?Sized>(
        &self,
        access: &mut A,
        value: TaggedValue,
        depth: usize,
        ancestors: &mut HashSet<TaggedValue>,
    ) -> BridgeResult<Projection> {
        if depth > self.options.max_depth.min(MAX_DECODE_DEPTH) {
            return Ok(Projection::Elided { raw: value.raw() });
        }

        let projection = match access.tag_of(value)? {
            Tag::Int => Projection::Int { value: value.raw() },
            Tag::Sys => {
                let sentinels = access.sentinels();
                if value == sentinels.nil {
                    Projection::Nil
                } else if value == sentinels.t {
                    Projection::True
                } else {
                    debug!("System value {} matches no known sentinel", value);
                    Projection::Unknown {
                        tag: Tag::Sys,
                        raw: value.raw(),
                    }
                }
            }
            Tag::Duo => {
                if self.options.detect_cycles && !ancestors.insert(value) {
                    return Ok(Projection::Cycle { raw: value.raw() });
                }
                let (car, cdr) = access.row(Tag::Duo, value)?.duo()?;
                let car = self.decode_at(access, car, depth + 1, ancestors)?;
                let cdr = self.decode_at(access, cdr, depth + 1, ancestors)?;
                ancestors.remove(&value);
                Projection::duo(car, cdr)
            }
            Tag::Sym => {
                let handle = access.row(Tag::Sym, value)?.sym()?;
                match access.resolve_string(handle) {
                    Ok(name) => Projection::Sym { name },
                    Err(BridgeError::Encoding { len, .. }) => {
                        warn!("Symbol {} has a name that is not UTF-8", value);
                        Projection::Undecodable {
                            raw: value.raw(),
                            len,
                        }
                    }
                    Err(e) => return Err(e),
                }
            }
            tag @ Tag::Unknown(code) => {
                debug!("Unrecognized tag code {} for {}", code, value);
                Projection::Unknown {
                    tag,
                    raw: value.raw(),
                }
            }
        };

        Ok(projection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const NIL: u32 = 0x2000_0000;
    const T: u32 = 0x2000_0001;

    /// Heap with the same word layout as the stub guest used by the
    /// integration tests: the top nibble selects the variant.
    #[derive(Default)]
    struct FakeHeap {
        duos: HashMap<u32, (u32, u32)>,
        names: HashMap<u32, Result<String, u32>>,
        next_duo: u32,
        row_calls: usize,
    }

    impl FakeHeap {
        fn cons(&mut self, car: u32, cdr: u32) -> u32 {
            let value = 0x3000_0000 | self.next_duo;
            self.next_duo += 1;
            self.duos.insert(value, (car, cdr));
            value
        }

        fn set_cdr(&mut self, duo: u32, cdr: u32) {
            self.duos.get_mut(&duo).unwrap().1 = cdr;
        }

        fn sym(&mut self, index: u32, name: Result<&str, u32>) -> u32 {
            self.names.insert(index, name.map(str::to_string));
            0x4000_0000 | index
        }
    }

    impl HeapAccess for FakeHeap {
        fn tag_of(&mut self, value: TaggedValue) -> BridgeResult<Tag> {
            Ok(match value.raw() >> 28 {
                0 => Tag::Int,
                2 => Tag::Sys,
                3 => Tag::Duo,
                4 => Tag::Sym,
                other => Tag::Unknown(other),
            })
        }

        fn row(&mut self, tag: Tag, value: TaggedValue) -> BridgeResult<Row> {
            self.row_calls += 1;
            match tag {
                Tag::Duo => {
                    let (car, cdr) =
                        self.duos
                            .get(&value.raw())
                            .copied()
                            .ok_or(BridgeError::MemoryFault {
                                offset: value.raw(),
                                len: 8,
                                size: 0,
                            })?;
                    Ok(Row::new(tag, vec![car, cdr]))
                }
                Tag::Sym => Ok(Row::new(tag, vec![value.raw() & 0x0fff_ffff])),
                other => Err(BridgeError::MissingRow(other.to_string())),
            }
        }

        fn resolve_string(&mut self, handle: StringHandle) -> BridgeResult<String> {
            match self.names.get(&handle.0) {
                Some(Ok(name)) => Ok(name.clone()),
                Some(Err(len)) => Err(BridgeError::Encoding {
                    handle: handle.0,
                    len: *len,
                }),
                None => Err(BridgeError::MemoryFault {
                    offset: handle.0,
                    len: 4,
                    size: 0,
                }),
            }
        }

        fn sentinels(&self) -> Sentinels {
            Sentinels {
                nil: TaggedValue(NIL),
                t: TaggedValue(T),
            }
        }
    }

    fn decode(heap: &mut FakeHeap, value: u32) -> Projection {
        ValueProjector::default()
            .decode(heap, TaggedValue(value))
            .unwrap()
    }

    #[test]
    fn test_sentinels_decode() {
        let mut heap = FakeHeap::default();
        assert_eq!(decode(&mut heap, NIL), Projection::Nil);
        assert_eq!(decode(&mut heap, T), Projection::True);
        assert_eq!(heap.row_calls, 0);
    }

    #[test]
    fn test_unknown_sys_value_is_not_a_pair() {
        let mut heap = FakeHeap::default();
        let projection = decode(&mut heap, 0x2000_0002);
        assert_eq!(
            projection,
            Projection::Unknown {
                tag: Tag::Sys,
                raw: 0x2000_0002
            }
        );
        assert_eq!(heap.row_calls, 0);
    }

    #[test]
    fn test_two_element_list() {
        let mut heap = FakeHeap::default();
        let tail = heap.cons(2, NIL);
        let list = heap.cons(1, tail);

        let projection = decode(&mut heap, list);
        assert_eq!(projection.depth(), 2);
        assert_eq!(
            projection.leaves(),
            vec![
                &Projection::Int { value: 1 },
                &Projection::Int { value: 2 },
                &Projection::Nil
            ]
        );
        assert_eq!(projection.to_string(), "(1 2)");
    }

    #[test]
    fn test_unknown_tag_keeps_its_slot() {
        let mut heap = FakeHeap::default();
        let list = heap.cons(0x7000_0005, NIL);

        let projection = decode(&mut heap, list);
        assert_eq!(
            projection,
            Projection::duo(
                Projection::Unknown {
                    tag: Tag::Unknown(7),
                    raw: 0x7000_0005
                },
                Projection::Nil
            )
        );
    }

    #[test]
    fn test_symbols() {
        let mut heap = FakeHeap::default();
        let quote = heap.sym(0, Ok("quote"));
        let garbled = heap.sym(1, Err(3));
        let list = heap.cons(quote, garbled);

        let projection = decode(&mut heap, list);
        assert_eq!(
            projection,
            Projection::duo(
                Projection::Sym {
                    name: "quote".into()
                },
                Projection::Undecodable {
                    raw: garbled,
                    len: 3
                }
            )
        );
    }

    #[test]
    fn test_cycle_detection() {
        let mut heap = FakeHeap::default();
        let cell = heap.cons(1, NIL);
        heap.set_cdr(cell, cell);

        let projection = decode(&mut heap, cell);
        assert_eq!(
            projection,
            Projection::duo(Projection::Int { value: 1 }, Projection::Cycle { raw: cell })
        );
    }

    #[test]
    fn test_shared_substructure_is_not_a_cycle() {
        let mut heap = FakeHeap::default();
        let shared = heap.cons(7, NIL);
        let pair = heap.cons(shared, shared);

        let projection = decode(&mut heap, pair);
        assert_eq!(projection.to_string(), "((7) 7)");
    }

    #[test]
    fn test_depth_bound_without_cycle_detection() {
        let mut heap = FakeHeap::default();
        let cell = heap.cons(1, NIL);
        heap.set_cdr(cell, cell);

        let projector = ValueProjector::new(
            DecodeOptions::default()
                .with_max_depth(3)
                .with_cycle_detection(false),
        );
        let projection = projector.decode(&mut heap, TaggedValue(cell)).unwrap();
        // levels 0..=3 expand, their children at level 4 are elided
        assert_eq!(projection.depth(), 4);
        assert_eq!(projection.to_string(), "(1 1 1 ... . ...)");
    }

    #[test]
    fn test_memory_fault_aborts_decode() {
        let mut heap = FakeHeap::default();
        let dangling = 0x3000_0fff;
        let list = heap.cons(1, dangling);

        let err = ValueProjector::default()
            .decode(&mut heap, TaggedValue(list))
            .unwrap_err();
        assert!(err.is_memory_fault());
    }

    #[test]
    fn test_depth_bound_is_clamped() {
        let options = DecodeOptions {
            max_depth: 1_000_000,
            detect_cycles: false,
        };
        assert_eq!(options.clamped().max_depth, MAX_DECODE_DEPTH);
        assert_eq!(
            DecodeOptions::default().with_max_depth(usize::MAX).max_depth,
            MAX_DECODE_DEPTH
        );
        assert_eq!(DecodeOptions::default().clamped().max_depth, 1024);
    }

    #[test]
    fn test_endless_list_is_elided_at_the_ceiling() {
        // Debug builds use large frames; give the recursion room
        let handle = std::thread::Builder::new()
            .stack_size(64 * 1024 * 1024)
            .spawn(|| {
                let mut heap = FakeHeap::default();
                let cell = heap.cons(1, NIL);
                heap.set_cdr(cell, cell);

                let projector = ValueProjector::new(DecodeOptions {
                    max_depth: 1_000_000,
                    detect_cycles: false,
                });
                let projection = projector.decode(&mut heap, TaggedValue(cell)).unwrap();
                (projection.depth(), heap.row_calls)
            })
            .unwrap();

        let (depth, row_calls) = handle.join().unwrap();
        assert_eq!(depth, MAX_DECODE_DEPTH + 1);
        assert_eq!(row_calls, MAX_DECODE_DEPTH + 1);
    }
}
