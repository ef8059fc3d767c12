use std::ops::Range;

/// A contiguous run of blocks sent in one provider request, plus the blocks
/// just before it that travel along as read-only context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslationWindow {
    /// 0-based position of the window in the document
    pub ordinal: usize,
    /// Blocks to translate
    pub range: Range<usize>,
    /// Blocks supplied for disambiguation only
    pub context: Range<usize>,
}

impl TranslationWindow {
    pub fn len(&self) -> usize {
        self.range.len()
    }

    pub fn is_empty(&self) -> bool {
        self.range.is_empty()
    }
}

/// Split `block_count` blocks into consecutive windows of `window_size` (the last
/// one may be shorter). A zero window size is treated as one.
pub fn plan_windows(
    block_count: usize,
    window_size: usize,
    context_size: usize,
) -> Vec<TranslationWindow> {
    let window_size = window_size.max(1);

    (0..block_count)
        .step_by(window_size)
        .enumerate()
        .map(|(ordinal, start)| TranslationWindow {
            ordinal,
            range: start..(start + window_size).min(block_count),
            context: start.saturating_sub(context_size)..start,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn windows_cover_every_block_exactly_once() {
        for block_count in 0..40 {
            for window_size in 1..12 {
                let windows = plan_windows(block_count, window_size, 3);
                let covered: Vec<usize> = windows.iter().flat_map(|w| w.range.clone()).collect();
                assert_eq!(covered, (0..block_count).collect::<Vec<_>>());
                assert!(windows.iter().all(|w| !w.is_empty() && w.len() <= window_size));
            }
        }
    }

    #[test]
    fn context_precedes_window_and_is_clamped() {
        let windows = plan_windows(25, 10, 4);

        assert_eq!(windows.len(), 3);
        assert_eq!(windows[0].context, 0..0);
        assert_eq!(windows[1].context, 6..10);
        assert_eq!(windows[2].range, 20..25);
        assert_eq!(windows[2].context, 16..20);

        let wide = plan_windows(6, 2, 50);
        assert_eq!(wide[2].context, 0..4);
    }

    #[test]
    fn zero_window_size_falls_back_to_one() {
        assert_eq!(plan_windows(3, 0, 0).len(), 3);
    }
}
