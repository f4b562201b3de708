//! Reasoning-segment scrubber.
//!
//! Reasoning-tuned upstream models embed an internal chain-of-thought in
//! their output, delimited by literal `<think>` / `</think>` sentinel tags.
//! [`TagScrubber`] removes those segments (tags included) from an ordered
//! sequence of text fragments belonging to one response, carrying a single
//! two-state flag across fragment boundaries so a pair opened in one
//! fragment can be closed in a later one.

/// Opening sentinel of a reasoning segment.
pub const OPEN_TAG: &str = "<think>";
/// Closing sentinel of a reasoning segment.
pub const CLOSE_TAG: &str = "</think>";

/// Whether the scrubber is currently inside an unclosed reasoning segment.
///
/// `Inside` holds iff an opening sentinel has been seen and its matching
/// closing sentinel has not, across the lifetime of one response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrubState {
    Outside,
    Inside,
}

/// Incremental scrubber for one in-flight response.
///
/// Never shared across responses; create one per stream and drop it when
/// the stream completes or errors. Sentinel matching is a literal substring
/// search on each fragment. A fragment that ends while a segment is still
/// open is withheld to its end (fail-open: thinking content never reaches
/// output, even when the closing tag never arrives).
#[derive(Debug)]
pub struct TagScrubber {
    state: ScrubState,
}

impl TagScrubber {
    pub fn new() -> Self {
        Self {
            state: ScrubState::Outside,
        }
    }

    pub fn state(&self) -> ScrubState {
        self.state
    }

    /// Scrub one fragment, returning the text visible to the client.
    ///
    /// Loops until the fragment is exhausted, so any number of sentinel
    /// pairs inside a single fragment collapse in one call:
    /// - `Outside`, opening tag found: emit the prefix, switch to `Inside`.
    /// - `Outside`, no opening tag: emit the fragment unchanged. A stray
    ///   closing tag here is ordinary text.
    /// - `Inside`, closing tag found: discard through the tag, switch to
    ///   `Outside`.
    /// - `Inside`, no closing tag: emit nothing for this fragment.
    pub fn scrub_fragment(&mut self, fragment: &str) -> String {
        let mut visible = String::new();
        let mut rest = fragment;

        loop {
            match self.state {
                ScrubState::Outside => match rest.find(OPEN_TAG) {
                    Some(pos) => {
                        visible.push_str(&rest[..pos]);
                        rest = &rest[pos + OPEN_TAG.len()..];
                        self.state = ScrubState::Inside;
                    }
                    None => {
                        visible.push_str(rest);
                        break;
                    }
                },
                ScrubState::Inside => match rest.find(CLOSE_TAG) {
                    Some(pos) => {
                        rest = &rest[pos + CLOSE_TAG.len()..];
                        self.state = ScrubState::Outside;
                    }
                    None => break,
                },
            }
        }

        visible
    }
}

impl Default for TagScrubber {
    fn default() -> Self {
        Self::new()
    }
}

/// Whole-string mode for fully buffered response bodies.
///
/// Removes every non-overlapping sentinel-delimited segment, drops an
/// unclosed trailing segment, and trims surrounding whitespace from the
/// result.
pub fn scrub_text(text: &str) -> String {
    let mut scrubber = TagScrubber::new();
    scrubber.scrub_fragment(text).trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Feed fragments through one scrubber and concatenate the output.
    fn scrub_all(fragments: &[&str]) -> String {
        let mut scrubber = TagScrubber::new();
        fragments
            .iter()
            .map(|f| scrubber.scrub_fragment(f))
            .collect()
    }

    #[test]
    fn identity_without_sentinels() {
        let mut scrubber = TagScrubber::new();
        assert_eq!(scrubber.scrub_fragment("Hello world"), "Hello world");
        assert_eq!(scrubber.state(), ScrubState::Outside);
    }

    #[test]
    fn pair_within_one_fragment() {
        let mut scrubber = TagScrubber::new();
        let out = scrubber.scrub_fragment("A<think>secret</think>C");
        assert_eq!(out, "AC");
        assert_eq!(scrubber.state(), ScrubState::Outside);
    }

    #[test]
    fn multiple_pairs_within_one_fragment() {
        assert_eq!(
            scrub_all(&["<think>a</think>Answer: <think>b</think>Done."]),
            "Answer: Done."
        );
    }

    #[test]
    fn pair_split_across_fragments() {
        // Rule 1 on the first fragment, rule 3 in the middle, rule 2 at the end.
        assert_eq!(
            scrub_all(&["Hello <think>", "secret reasoning", "</think> world"]),
            "Hello  world"
        );
    }

    #[test]
    fn open_tag_transitions_state() {
        let mut scrubber = TagScrubber::new();
        assert_eq!(scrubber.scrub_fragment("Hello <think>se"), "Hello ");
        assert_eq!(scrubber.state(), ScrubState::Inside);
        assert_eq!(scrubber.scrub_fragment("cret</think> world"), " world");
        assert_eq!(scrubber.state(), ScrubState::Outside);
    }

    #[test]
    fn inside_fragment_without_close_emits_nothing() {
        let mut scrubber = TagScrubber::new();
        scrubber.scrub_fragment("<think>");
        assert_eq!(scrubber.scrub_fragment("still reasoning"), "");
        assert_eq!(scrubber.state(), ScrubState::Inside);
    }

    #[test]
    fn unclosed_segment_withheld_to_end() {
        // Stream ends mid-thought: fail-open, nothing after the open tag leaks.
        assert_eq!(scrub_all(&["visible<think>never", " closed"]), "visible");
    }

    #[test]
    fn stray_close_tag_is_ordinary_text() {
        assert_eq!(scrub_all(&["no opener</think> here"]), "no opener</think> here");
    }

    #[test]
    fn second_pair_after_reopening() {
        assert_eq!(
            scrub_all(&["<think>one</think>A", "<think>", "two", "</think>B"]),
            "AB"
        );
    }

    #[test]
    fn scrub_text_removes_segment_and_trims() {
        assert_eq!(scrub_text("A <think>B</think> C"), "A  C".trim());
        assert_eq!(scrub_text("<think>only reasoning</think>  answer  "), "answer");
    }

    #[test]
    fn scrub_text_identity_when_clean() {
        assert_eq!(scrub_text("already scrubbed"), "already scrubbed");
        // Idempotence: scrubbing scrubbed text is a no-op.
        assert_eq!(scrub_text(&scrub_text("x<think>y</think>z")), "xz");
    }

    #[test]
    fn scrub_text_repeated_segments() {
        assert_eq!(scrub_text("<think>a</think>1<think>b</think>2"), "12");
    }

    #[test]
    fn scrub_text_drops_unclosed_tail() {
        assert_eq!(scrub_text("kept <think>lost forever"), "kept");
    }

    #[test]
    fn split_fragments_match_whole_string_mode() {
        // Same visible output incrementally and in whole-string mode, modulo trim.
        let whole = scrub_text("Hello <think>secret</think> world");
        let split = scrub_all(&["Hello <think>", "secret", "</think> world"]);
        assert_eq!(split.trim(), whole);
    }
}
