//! The substrate every other component builds on: a cursor over a finite
//! sequence of tokens with push-back and nestable marks (spec.md §3, §4.1).
//!
//! The whole input is materialized up front (spec.md §5: "the input is
//! fully in memory"), so `source` is a plain `Vec<T>` walked by a
//! monotonically increasing cursor. Consumption that gets rewound doesn't
//! move the cursor backwards — it replays recorded tokens through a
//! separate push-back stack instead. That means `source_pos` alone is
//! already the "farthest position ever reached" spec.md §7 wants for error
//! reporting; no extra bookkeeping is needed for it.

#[derive(Debug, Clone)]
pub struct InputStream<T: Clone> {
    source: Vec<T>,
    source_pos: usize,
    /// Last-in-first-out: `next` pops from the end, `push`/`rewind` append.
    pushback: Vec<T>,
    /// One buffer per active mark, indexed by mark id. Every token produced
    /// while N marks are active is appended to all N buffers (invariant
    /// (b) in spec.md §3).
    mark_buffers: Vec<Vec<T>>,
    last: Option<T>,
}

impl<T: Clone + PartialEq> InputStream<T> {
    pub fn new(source: Vec<T>) -> Self {
        InputStream { source, source_pos: 0, pushback: Vec::new(), mark_buffers: Vec::new(), last: None }
    }

    /// Tokens yielded in original order, push-back first. `None` is
    /// end-of-input (not an error at this layer — primitives that consume
    /// convert it to `ParseFailure`).
    pub fn next(&mut self) -> Option<T> {
        let tok = if let Some(t) = self.pushback.pop() {
            t
        } else if self.source_pos < self.source.len() {
            let t = self.source[self.source_pos].clone();
            self.source_pos += 1;
            t
        } else {
            return None;
        };
        for buf in &mut self.mark_buffers {
            buf.push(tok.clone());
        }
        self.last = Some(tok.clone());
        Some(tok)
    }

    /// Single-token step-back. Only ever called by a primitive that just
    /// called `next` and wants to undo it (spec.md §4.1: "programmer error"
    /// otherwise) — the panic documents that invariant rather than silently
    /// corrupting the mark buffers.
    pub fn prev(&mut self) {
        let tok = self.last.take().expect("prev() called with no token produced since the last mark/rewind boundary");
        for buf in &mut self.mark_buffers {
            buf.pop();
        }
        self.pushback.push(tok);
    }

    /// Enqueues a token so the next `next()` returns it. Used directly for
    /// single values and, by `Machine::apply`, for argument-passing.
    pub fn push(&mut self, token: T) {
        self.pushback.push(token);
    }

    /// Allocates a mark one higher than the last; mark ids form a
    /// contiguous LIFO stack (spec.md §4.1).
    pub fn mark(&mut self) -> usize {
        let id = self.mark_buffers.len();
        self.mark_buffers.push(Vec::new());
        id
    }

    /// Commits everything consumed since mark `m`: the tokens stay
    /// consumed, only the bookkeeping for marks `>= m` is discarded.
    pub fn unmark(&mut self, m: usize) {
        self.mark_buffers.truncate(m);
    }

    /// Reverses all consumption since mark `m`. Tokens recorded in mark
    /// `m`'s buffer are replayed through push-back in original order; marks
    /// `>= m` are discarded; lower marks still active lose the same
    /// trailing tokens from their own recordings, since they saw that
    /// consumption too.
    pub fn rewind(&mut self, m: usize) {
        let recorded = self.mark_buffers[m].clone();
        self.mark_buffers.truncate(m);
        let n = recorded.len();
        for buf in &mut self.mark_buffers {
            let keep = buf.len().saturating_sub(n);
            buf.truncate(keep);
        }
        self.pushback.extend(recorded.into_iter().rev());
    }

    pub fn has_remaining(&self) -> bool {
        !self.pushback.is_empty() || self.source_pos < self.source.len()
    }

    /// High-water mark of raw consumption — see the module doc comment.
    pub fn farthest(&self) -> usize {
        self.source_pos
    }

    /// Peeks up to `n` upcoming tokens without consuming them, for error
    /// messages (trailing-garbage previews). Push-back is checked first,
    /// then the untouched tail of `source`.
    pub fn peek_preview(&self, n: usize) -> Vec<T> {
        let mut out: Vec<T> = self.pushback.iter().rev().take(n).cloned().collect();
        if out.len() < n {
            let remaining = n - out.len();
            out.extend(self.source[self.source_pos..].iter().take(remaining).cloned());
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream(s: &str) -> InputStream<char> {
        InputStream::new(s.chars().collect())
    }

    #[test]
    fn rewind_restores_state() {
        let mut s = stream("abcdef");
        let m = s.mark();
        assert_eq!(s.next(), Some('a'));
        assert_eq!(s.next(), Some('b'));
        s.rewind(m);
        assert_eq!(s.next(), Some('a'));
        assert_eq!(s.next(), Some('b'));
        assert_eq!(s.next(), Some('c'));
    }

    #[test]
    fn unmark_commits() {
        let mut s = stream("abcdef");
        let m = s.mark();
        s.next();
        s.next();
        s.unmark(m);
        assert_eq!(s.next(), Some('c'));
    }

    #[test]
    fn nested_marks_track_independently() {
        let mut s = stream("abc");
        let m1 = s.mark();
        let m2 = s.mark();
        s.next(); // 'a' recorded in both m1 and m2
        s.rewind(m2);
        // m2 is gone; m1 must no longer think it saw 'a' either.
        assert_eq!(s.next(), Some('a'));
        s.unmark(m1);
        assert_eq!(s.next(), Some('b'));
        assert_eq!(s.next(), Some('c'));
        assert!(!s.has_remaining());
    }

    #[test]
    fn prev_is_single_step() {
        let mut s = stream("ab");
        assert_eq!(s.next(), Some('a'));
        s.prev();
        assert_eq!(s.next(), Some('a'));
        assert_eq!(s.next(), Some('b'));
        assert_eq!(s.next(), None);
    }

    #[test]
    fn push_replays_before_source() {
        let mut s = stream("bc");
        s.push('a');
        assert_eq!(s.next(), Some('a'));
        assert_eq!(s.next(), Some('b'));
    }

    #[test]
    fn farthest_is_monotonic_across_rewind() {
        let mut s = stream("abcdef");
        let m = s.mark();
        s.next();
        s.next();
        s.next();
        let high = s.farthest();
        s.rewind(m);
        assert_eq!(s.farthest(), high);
    }
}
