//! TID bitmaps.
//!
//! A `TidBitmap` is the candidate set an index hands to a bitmap heap fetch.
//! Each block appears at most once and is either *exact* (a set of offsets) or
//! *lossy* (some rows on the block may match; the consumer must recheck the
//! original predicate against row contents).
//!
//! Pages live in a dense arena (`Vec<PageSlot>`) addressed through a
//! block-number index, and exact offsets are stored as a word bitset per page.
//!
//! Combination rules:
//!
//! - AND keeps a block only if both inputs have it. Two exact pages keep the
//!   intersection of their offsets; if either side is lossy the result is lossy.
//! - OR keeps every block of either input. Two exact pages keep the union of
//!   their offsets; if either side is lossy the result is lossy.
//!
//! An exact page whose AND-intersection is empty stays in the bitmap with no
//! offsets. It produces no candidates, and keeping it makes AND associative in
//! the presence of lossy pages.
//!
//! Memory is bounded by `BitmapLimits`. Lossification is one-way: a page never
//! returns from lossy to exact.

use alloc::vec::Vec;
use hashbrown::HashMap;
use strata_core::{BlockNumber, OffsetNumber, Tid, MAX_TUPLES_PER_PAGE};

const BITS_PER_WORD: usize = 64;

/// Thresholds at which exact entries degrade to lossy pages.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BitmapLimits {
    /// A page holding more exact offsets than this becomes lossy.
    pub max_exact_per_block: usize,
    /// When exact offsets plus lossy pages exceed this, the densest pages are
    /// lossified until the total drops to half of it.
    ///
    /// Pages with a single offset gain nothing from lossifying, so a sparse
    /// bitmap can exceed this bound. The bitmap then doubles its working cap
    /// instead of retrying on every insert.
    pub max_entries: usize,
}

impl BitmapLimits {
    /// Limits that never lossify.
    pub const fn unbounded() -> Self {
        Self {
            max_exact_per_block: usize::MAX,
            max_entries: usize::MAX,
        }
    }
}

impl Default for BitmapLimits {
    fn default() -> Self {
        Self {
            max_exact_per_block: MAX_TUPLES_PER_PAGE,
            max_entries: 1 << 20,
        }
    }
}

/// Dense bitset of the offsets on one page.
#[derive(Clone, Debug, Default)]
struct OffsetSet {
    words: Vec<u64>,
    len: usize,
}

impl OffsetSet {
    #[inline]
    fn word_and_bit(offset: OffsetNumber) -> (usize, u64) {
        let bit = offset as usize;
        (bit / BITS_PER_WORD, 1u64 << (bit % BITS_PER_WORD))
    }

    /// Inserts an offset, returning true if it was not present.
    fn insert(&mut self, offset: OffsetNumber) -> bool {
        let (word, mask) = Self::word_and_bit(offset);
        if word >= self.words.len() {
            self.words.resize(word + 1, 0);
        }
        if self.words[word] & mask != 0 {
            return false;
        }
        self.words[word] |= mask;
        self.len += 1;
        true
    }

    fn contains(&self, offset: OffsetNumber) -> bool {
        let (word, mask) = Self::word_and_bit(offset);
        self.words.get(word).is_some_and(|w| w & mask != 0)
    }

    fn len(&self) -> usize {
        self.len
    }

    fn iter(&self) -> impl Iterator<Item = OffsetNumber> + '_ {
        self.words.iter().enumerate().flat_map(|(i, &word)| {
            let mut w = word;
            core::iter::from_fn(move || {
                if w == 0 {
                    return None;
                }
                let bit = w.trailing_zeros() as usize;
                w &= w - 1;
                Some((i * BITS_PER_WORD + bit) as OffsetNumber)
            })
        })
    }

    fn intersect(&self, other: &OffsetSet) -> OffsetSet {
        let words: Vec<u64> = self
            .words
            .iter()
            .zip(other.words.iter())
            .map(|(a, b)| a & b)
            .collect();
        Self::from_words(words)
    }

    fn union_with(&mut self, other: &OffsetSet) {
        if other.words.len() > self.words.len() {
            self.words.resize(other.words.len(), 0);
        }
        for (a, b) in self.words.iter_mut().zip(other.words.iter()) {
            *a |= b;
        }
        self.len = self.words.iter().map(|w| w.count_ones() as usize).sum();
    }

    fn from_words(mut words: Vec<u64>) -> OffsetSet {
        while words.last() == Some(&0) {
            words.pop();
        }
        let len = words.iter().map(|w| w.count_ones() as usize).sum();
        OffsetSet { words, len }
    }
}

impl PartialEq for OffsetSet {
    fn eq(&self, other: &Self) -> bool {
        // Trailing zero words carry no offsets.
        let n = self.words.len().max(other.words.len());
        self.len == other.len
            && (0..n).all(|i| self.words.get(i).copied().unwrap_or(0) == other.words.get(i).copied().unwrap_or(0))
    }
}

impl Eq for OffsetSet {}

#[derive(Clone, Debug, PartialEq, Eq)]
enum PageEntry {
    Exact(OffsetSet),
    Lossy,
}

#[derive(Clone, Debug)]
struct PageSlot {
    block: BlockNumber,
    entry: PageEntry,
}

/// How a TID relates to a bitmap.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TidMatch {
    /// The TID is not a candidate.
    Absent,
    /// The TID is an exact candidate.
    Exact,
    /// The TID's block is lossy; the row must be rechecked.
    Recheck,
}

/// One page produced by bitmap iteration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BitmapPage {
    /// Block number.
    pub block: BlockNumber,
    /// Candidate offsets in ascending order; empty when `recheck` is set.
    pub offsets: Vec<OffsetNumber>,
    /// Every row on the block is a candidate and must be rechecked.
    pub recheck: bool,
}

/// A set of candidate TIDs with exact and lossy entries.
#[derive(Clone, Debug)]
pub struct TidBitmap {
    /// Block number -> position in `pages`.
    index: HashMap<BlockNumber, usize>,
    pages: Vec<PageSlot>,
    exact_entries: usize,
    lossy_pages: usize,
    limits: BitmapLimits,
    /// Starts at `limits.max_entries`; raised when lossifying cannot help.
    entry_cap: usize,
}

impl Default for TidBitmap {
    fn default() -> Self {
        Self::new()
    }
}

impl TidBitmap {
    /// Creates an empty bitmap with default limits.
    pub fn new() -> Self {
        Self::with_limits(BitmapLimits::default())
    }

    /// Creates an empty bitmap with the given limits.
    pub fn with_limits(limits: BitmapLimits) -> Self {
        Self {
            index: HashMap::new(),
            pages: Vec::new(),
            exact_entries: 0,
            lossy_pages: 0,
            limits,
            entry_cap: limits.max_entries,
        }
    }

    /// Returns the limits this bitmap enforces.
    pub fn limits(&self) -> BitmapLimits {
        self.limits
    }

    /// Returns the number of blocks present.
    pub fn num_blocks(&self) -> usize {
        self.pages.len()
    }

    /// Returns the number of exact offsets across all exact pages.
    pub fn exact_entries(&self) -> usize {
        self.exact_entries
    }

    /// Returns the number of lossy pages.
    pub fn lossy_blocks(&self) -> usize {
        self.lossy_pages
    }

    /// Returns exact offsets plus lossy pages, the quantity bounded by
    /// `BitmapLimits::max_entries`.
    pub fn total_entries(&self) -> usize {
        self.exact_entries + self.lossy_pages
    }

    /// Returns true if no block is present.
    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Returns true if iteration would produce at least one candidate.
    pub fn has_candidates(&self) -> bool {
        self.lossy_pages > 0 || self.exact_entries > 0
    }

    /// Adds one exact candidate. Ignored if the page is already lossy.
    pub fn add_tid(&mut self, tid: Tid) {
        debug_assert!(tid.is_valid(), "offset numbers start at 1");
        let per_block = self.limits.max_exact_per_block;
        let idx = self.page_index(tid.block());
        let overflow = match &mut self.pages[idx].entry {
            PageEntry::Lossy => return,
            PageEntry::Exact(set) => {
                if set.insert(tid.offset()) {
                    self.exact_entries += 1;
                }
                set.len() > per_block
            }
        };
        if overflow {
            self.make_lossy(idx);
        }
        self.enforce_total();
    }

    /// Adds several exact candidates.
    pub fn add_tids<I: IntoIterator<Item = Tid>>(&mut self, tids: I) {
        for tid in tids {
            self.add_tid(tid);
        }
    }

    /// Marks a whole block as a lossy candidate.
    pub fn add_page(&mut self, block: BlockNumber) {
        let idx = self.page_index(block);
        self.make_lossy(idx);
        self.enforce_total();
    }

    /// Reports whether a TID is a candidate.
    pub fn lookup(&self, tid: Tid) -> TidMatch {
        match self.page(tid.block()) {
            None => TidMatch::Absent,
            Some(PageEntry::Lossy) => TidMatch::Recheck,
            Some(PageEntry::Exact(set)) if set.contains(tid.offset()) => TidMatch::Exact,
            Some(PageEntry::Exact(_)) => TidMatch::Absent,
        }
    }

    /// Returns whether a block is lossy, or None if it is absent.
    pub fn is_lossy(&self, block: BlockNumber) -> Option<bool> {
        self.page(block).map(|e| matches!(e, PageEntry::Lossy))
    }

    /// Returns the exact offsets of a block, or None if it is absent or lossy.
    pub fn offsets(&self, block: BlockNumber) -> Option<Vec<OffsetNumber>> {
        match self.page(block)? {
            PageEntry::Exact(set) => Some(set.iter().collect()),
            PageEntry::Lossy => None,
        }
    }

    /// AND: blocks present in both inputs.
    pub fn intersect(&self, other: &TidBitmap) -> TidBitmap {
        let mut out = TidBitmap::with_limits(self.limits);
        for slot in &self.pages {
            let Some(theirs) = other.page(slot.block) else {
                continue;
            };
            let entry = match (&slot.entry, theirs) {
                (PageEntry::Exact(a), PageEntry::Exact(b)) => PageEntry::Exact(a.intersect(b)),
                _ => PageEntry::Lossy,
            };
            out.push_page(slot.block, entry);
        }
        out.enforce_total();
        out
    }

    /// OR: blocks present in either input.
    pub fn union(&self, other: &TidBitmap) -> TidBitmap {
        let mut out = self.clone();
        out.union_with(other);
        out
    }

    /// In-place AND.
    pub fn intersect_with(&mut self, other: &TidBitmap) {
        *self = self.intersect(other);
    }

    /// In-place OR. This bitmap's limits apply to the result.
    pub fn union_with(&mut self, other: &TidBitmap) {
        let per_block = self.limits.max_exact_per_block;
        for slot in &other.pages {
            let idx = self.page_index(slot.block);
            let lossify = match (&mut self.pages[idx].entry, &slot.entry) {
                (PageEntry::Lossy, _) => false,
                (PageEntry::Exact(_), PageEntry::Lossy) => true,
                (PageEntry::Exact(mine), PageEntry::Exact(theirs)) => {
                    let before = mine.len();
                    mine.union_with(theirs);
                    self.exact_entries += mine.len() - before;
                    mine.len() > per_block
                }
            };
            if lossify {
                self.make_lossy(idx);
            }
        }
        self.enforce_total();
    }

    /// Iterates candidate pages in block order.
    ///
    /// Exact pages without offsets are skipped.
    pub fn iter(&self) -> BitmapIter<'_> {
        let mut order: Vec<usize> = (0..self.pages.len()).collect();
        order.sort_unstable_by_key(|&i| self.pages[i].block);
        BitmapIter {
            bitmap: self,
            order,
            pos: 0,
        }
    }

    /// Returns every exact candidate TID in order, skipping lossy pages.
    pub fn exact_tids(&self) -> Vec<Tid> {
        self.iter()
            .filter(|p| !p.recheck)
            .flat_map(|p| {
                let block = p.block;
                p.offsets.into_iter().map(move |off| Tid::new(block, off))
            })
            .collect()
    }

    fn page(&self, block: BlockNumber) -> Option<&PageEntry> {
        self.index.get(&block).map(|&i| &self.pages[i].entry)
    }

    /// Returns the arena position of a block, creating an empty exact page.
    fn page_index(&mut self, block: BlockNumber) -> usize {
        if let Some(&idx) = self.index.get(&block) {
            return idx;
        }
        self.push_page(block, PageEntry::Exact(OffsetSet::default()))
    }

    fn push_page(&mut self, block: BlockNumber, entry: PageEntry) -> usize {
        match &entry {
            PageEntry::Exact(set) => self.exact_entries += set.len(),
            PageEntry::Lossy => self.lossy_pages += 1,
        }
        let idx = self.pages.len();
        self.pages.push(PageSlot { block, entry });
        self.index.insert(block, idx);
        idx
    }

    fn make_lossy(&mut self, idx: usize) {
        if let PageEntry::Exact(set) = &self.pages[idx].entry {
            self.exact_entries -= set.len();
            self.lossy_pages += 1;
            self.pages[idx].entry = PageEntry::Lossy;
        }
    }

    fn enforce_total(&mut self) {
        if self.total_entries() <= self.entry_cap {
            return;
        }
        let target = self.limits.max_entries / 2;
        let mut candidates: Vec<(usize, usize)> = self
            .pages
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| match &slot.entry {
                PageEntry::Exact(set) if set.len() > 1 => Some((i, set.len())),
                _ => None,
            })
            .collect();
        // Densest pages first: each frees the most entries.
        candidates.sort_unstable_by(|a, b| b.1.cmp(&a.1));

        let before = self.total_entries();
        for (idx, _) in candidates {
            if self.total_entries() <= target {
                break;
            }
            self.make_lossy(idx);
        }
        let after = self.total_entries();
        if after > target {
            self.entry_cap = self.entry_cap.max(after.saturating_mul(2));
        }
        tracing::debug!(
            before,
            after,
            lossy_pages = self.lossy_pages,
            entry_cap = self.entry_cap,
            "lossified tid bitmap"
        );
    }
}

impl PartialEq for TidBitmap {
    fn eq(&self, other: &Self) -> bool {
        self.pages.len() == other.pages.len()
            && self
                .pages
                .iter()
                .all(|slot| other.page(slot.block) == Some(&slot.entry))
    }
}

impl Eq for TidBitmap {}

/// Iterator over the candidate pages of a `TidBitmap`, in block order.
pub struct BitmapIter<'a> {
    bitmap: &'a TidBitmap,
    order: Vec<usize>,
    pos: usize,
}

impl Iterator for BitmapIter<'_> {
    type Item = BitmapPage;

    fn next(&mut self) -> Option<BitmapPage> {
        while let Some(&idx) = self.order.get(self.pos) {
            self.pos += 1;
            let slot = &self.bitmap.pages[idx];
            match &slot.entry {
                PageEntry::Lossy => {
                    return Some(BitmapPage {
                        block: slot.block,
                        offsets: Vec::new(),
                        recheck: true,
                    })
                }
                PageEntry::Exact(set) if set.len() > 0 => {
                    return Some(BitmapPage {
                        block: slot.block,
                        offsets: set.iter().collect(),
                        recheck: false,
                    })
                }
                PageEntry::Exact(_) => continue,
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    fn exact(block: BlockNumber, offsets: &[OffsetNumber]) -> TidBitmap {
        let mut bm = TidBitmap::with_limits(BitmapLimits::unbounded());
        bm.add_tids(offsets.iter().map(|&o| Tid::new(block, o)));
        bm
    }

    #[test]
    fn test_and_or_scenario() {
        let a = exact(1, &[1, 2]);
        let b = exact(1, &[2, 3]);

        let and = a.intersect(&b);
        assert_eq!(and.offsets(1), Some(vec![2]));
        assert_eq!(and.is_lossy(1), Some(false));
        assert_eq!(and, exact(1, &[2]));

        let or = a.union(&b);
        assert_eq!(or.offsets(1), Some(vec![1, 2, 3]));
        assert_eq!(or, exact(1, &[1, 2, 3]));
    }

    #[test]
    fn test_and_drops_blocks_missing_on_one_side() {
        let mut a = exact(1, &[1]);
        a.add_tid(Tid::new(2, 4));
        let b = exact(2, &[4, 5]);

        let and = a.intersect(&b);
        assert_eq!(and.num_blocks(), 1);
        assert_eq!(and.is_lossy(1), None);
        assert_eq!(and.offsets(2), Some(vec![4]));
    }

    #[test]
    fn test_lossy_is_pessimistic_union() {
        let mut a = exact(1, &[1, 2]);
        a.add_page(2);
        let mut b = exact(2, &[7]);
        b.add_page(1);

        let and = a.intersect(&b);
        assert_eq!(and.is_lossy(1), Some(true));
        assert_eq!(and.is_lossy(2), Some(true));

        let or = a.union(&b);
        assert_eq!(or.is_lossy(1), Some(true));
        assert_eq!(or.is_lossy(2), Some(true));
        assert_eq!(or.exact_entries(), 0);
        assert_eq!(or.lossy_blocks(), 2);
    }

    #[test]
    fn test_empty_intersection_produces_no_candidates() {
        let and = exact(1, &[1]).intersect(&exact(1, &[2]));
        assert_eq!(and.num_blocks(), 1);
        assert!(!and.has_candidates());
        assert_eq!(and.iter().count(), 0);
    }

    #[test]
    fn test_lookup() {
        let mut bm = exact(1, &[3]);
        bm.add_page(5);
        assert_eq!(bm.lookup(Tid::new(1, 3)), TidMatch::Exact);
        assert_eq!(bm.lookup(Tid::new(1, 4)), TidMatch::Absent);
        assert_eq!(bm.lookup(Tid::new(5, 9)), TidMatch::Recheck);
        assert_eq!(bm.lookup(Tid::new(2, 1)), TidMatch::Absent);
    }

    #[test]
    fn test_lossy_page_absorbs_later_tids() {
        let mut bm = TidBitmap::new();
        bm.add_page(3);
        bm.add_tid(Tid::new(3, 1));
        assert_eq!(bm.exact_entries(), 0);
        assert_eq!(bm.lossy_blocks(), 1);
    }

    #[test]
    fn test_per_block_threshold_lossifies() {
        let mut bm = TidBitmap::with_limits(BitmapLimits {
            max_exact_per_block: 3,
            max_entries: usize::MAX,
        });
        bm.add_tids((1..=3).map(|o| Tid::new(0, o)));
        assert_eq!(bm.is_lossy(0), Some(false));
        bm.add_tid(Tid::new(0, 4));
        assert_eq!(bm.is_lossy(0), Some(true));
        assert_eq!(bm.exact_entries(), 0);

        // One-way: more tids never bring the page back.
        bm.add_tid(Tid::new(0, 5));
        assert_eq!(bm.is_lossy(0), Some(true));
    }

    #[test]
    fn test_total_threshold_lossifies_densest_pages() {
        let mut bm = TidBitmap::with_limits(BitmapLimits {
            max_exact_per_block: usize::MAX,
            max_entries: 8,
        });
        bm.add_tids((1..=6).map(|o| Tid::new(0, o)));
        bm.add_tids((1..=2).map(|o| Tid::new(1, o)));
        assert_eq!(bm.total_entries(), 8);
        assert_eq!(bm.lossy_blocks(), 0);

        bm.add_tid(Tid::new(2, 1));
        assert_eq!(bm.is_lossy(0), Some(true));
        assert!(bm.total_entries() <= 4);
        // Every original candidate is still covered.
        for o in 1..=6 {
            assert_ne!(bm.lookup(Tid::new(0, o)), TidMatch::Absent);
        }
        assert_ne!(bm.lookup(Tid::new(2, 1)), TidMatch::Absent);
    }

    #[test]
    fn test_sparse_bitmap_raises_entry_cap() {
        let mut bm = TidBitmap::with_limits(BitmapLimits {
            max_exact_per_block: usize::MAX,
            max_entries: 4,
        });
        bm.add_tids((0..2000).map(|b| Tid::new(b, 1)));
        assert_eq!(bm.total_entries(), 2000);
        assert_eq!(bm.lossy_blocks(), 0);
        // The cap doubles past the total, so inserts stop rescanning pages.
        assert!(bm.entry_cap >= 2000 && bm.entry_cap <= 4002);
        assert_eq!(bm.limits().max_entries, 4);

        // Dense pages added later are still lossified.
        for block in 5000..5006 {
            bm.add_tids((1..=200).map(|o| Tid::new(block, o)));
        }
        assert_eq!(bm.is_lossy(5000), Some(true));
        assert_eq!(bm.lookup(Tid::new(5000, 7)), TidMatch::Recheck);
    }

    #[test]
    fn test_iter_is_block_ordered() {
        let mut bm = TidBitmap::new();
        bm.add_tid(Tid::new(9, 2));
        bm.add_page(4);
        bm.add_tid(Tid::new(1, 70));
        bm.add_tid(Tid::new(1, 3));

        let pages: Vec<BitmapPage> = bm.iter().collect();
        assert_eq!(pages.len(), 3);
        assert_eq!(pages[0], BitmapPage { block: 1, offsets: vec![3, 70], recheck: false });
        assert_eq!(pages[1], BitmapPage { block: 4, offsets: vec![], recheck: true });
        assert_eq!(pages[2].block, 9);
        assert_eq!(bm.exact_tids(), vec![Tid::new(1, 3), Tid::new(1, 70), Tid::new(9, 2)]);
    }

    #[test]
    fn test_equality_ignores_insertion_order() {
        let mut a = TidBitmap::new();
        a.add_tid(Tid::new(1, 1));
        a.add_tid(Tid::new(2, 1));
        let mut b = TidBitmap::new();
        b.add_tid(Tid::new(2, 1));
        b.add_tid(Tid::new(1, 1));
        assert_eq!(a, b);
    }
}
