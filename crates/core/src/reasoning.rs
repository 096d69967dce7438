use std::sync::OnceLock;

use regex::Regex;

const OPEN_TAG: &str = "<think>";

fn think_block() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?s)<think>.*?</think>").expect("literal pattern compiles"))
}

/// Removes paired `<think>` blocks until none remain, so removal can't
/// leave a new block behind.
fn remove_blocks(text: &str) -> String {
    let mut current = text.to_string();
    loop {
        let next = think_block().replace_all(&current, "").into_owned();
        if next == current {
            return current;
        }
        current = next;
    }
}

pub fn strip_reasoning(text: &str) -> String {
    remove_blocks(text).trim().to_string()
}

/// Streaming counterpart of [`strip_reasoning`]. Only text before the first
/// open tag, minus a tail that could still grow into one, is released; an
/// unterminated block comes out in `finish`.
#[derive(Debug, Default)]
pub struct ReasoningFilter {
    raw: String,
    shown: usize,
}

impl ReasoningFilter {
    pub fn push(&mut self, fragment: &str) -> String {
        self.raw.push_str(fragment);
        let reduced = remove_blocks(&self.raw);
        let settled = match reduced.find(OPEN_TAG) {
            Some(start) => &reduced[..start],
            None => reduced.as_str(),
        };
        let cut = settled.len() - partial_tag_len(settled);
        self.release(&reduced, cut)
    }

    pub fn finish(&mut self) -> String {
        let reduced = remove_blocks(&std::mem::take(&mut self.raw));
        let rest = self.release(&reduced, reduced.len());
        self.shown = 0;
        rest
    }

    fn release(&mut self, reduced: &str, cut: usize) -> String {
        if cut <= self.shown {
            return String::new();
        }
        let fresh = reduced.get(self.shown..cut).unwrap_or_default().to_string();
        self.shown = cut;
        fresh
    }
}

fn partial_tag_len(text: &str) -> usize {
    (1..OPEN_TAG.len())
        .rev()
        .find(|&len| text.ends_with(&OPEN_TAG[..len]))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter_all(fragments: &[&str]) -> String {
        let mut filter = ReasoningFilter::default();
        let mut shown: String = fragments.iter().map(|fragment| filter.push(fragment)).collect();
        shown.push_str(&filter.finish());
        shown
    }

    #[test]
    fn reasoning_block_is_removed_and_trimmed() {
        assert_eq!(
            strip_reasoning("<think>reasoning</think>The answer is 42."),
            "The answer is 42."
        );
    }

    #[test]
    fn multiline_reasoning_is_removed() {
        let raw = "<think>\nstep one\nstep two\n</think>\n\nFinal answer.\n";
        let cleaned = strip_reasoning(raw);
        assert_eq!(cleaned, "Final answer.");
        assert!(!cleaned.contains("step"));
        assert!(!cleaned.contains("think>"));
    }

    #[test]
    fn several_blocks_are_removed_non_greedily() {
        let raw = "<think>a</think>keep this<think>b</think> and this";
        assert_eq!(strip_reasoning(raw), "keep this and this");
    }

    #[test]
    fn cleanup_is_idempotent() {
        for raw in [
            "<think>x\ny</think>  Answer  ",
            "<thi<think>inner</think>nk>outer</think>done",
            "no tags at all",
            "<think>unterminated",
            "",
        ] {
            let once = strip_reasoning(raw);
            assert_eq!(strip_reasoning(&once), once, "not idempotent for {raw:?}");
        }
    }

    #[test]
    fn unpaired_tags_are_left_alone() {
        assert_eq!(strip_reasoning("<think>never closed"), "<think>never closed");
    }

    #[test]
    fn filter_hides_reasoning_split_across_fragments() {
        let shown = filter_all(&["<th", "ink>hidden ", "thoughts</th", "ink>The answer", " is 42."]);
        assert_eq!(shown, "The answer is 42.");
    }

    #[test]
    fn filter_passes_plain_text_through_immediately() {
        let mut filter = ReasoningFilter::default();
        assert_eq!(filter.push("Hello "), "Hello ");
        assert_eq!(filter.push("world"), "world");
        assert_eq!(filter.finish(), "");
    }

    #[test]
    fn filter_holds_possible_tag_start_until_decided() {
        let mut filter = ReasoningFilter::default();
        assert_eq!(filter.push("a <"), "a ");
        assert_eq!(filter.push("b"), "<b");
    }

    #[test]
    fn filter_releases_unterminated_block_at_end() {
        assert_eq!(filter_all(&["ok ", "<think>partial"]), "ok <think>partial");
    }

    #[test]
    fn filter_agrees_with_cleanup() {
        let cases: [&[&str]; 4] = [
            &["<think>\nplan\n", "</think>", "\n\nShort ", "answer."],
            &["<thi", "<think>inner</think>", "nk>outer", "</think>done"],
            &["<thi<think>inner</think>nk>outer</think>done"],
            &["a <th", "<think>x</think>", "ink>y</think> b"],
        ];
        for fragments in cases {
            let raw: String = fragments.concat();
            assert_eq!(
                filter_all(fragments).trim(),
                strip_reasoning(&raw),
                "shown and stored text differ for {fragments:?}"
            );
        }
    }

    #[test]
    fn nested_tags_stay_hidden_while_streaming() {
        let mut filter = ReasoningFilter::default();
        assert_eq!(filter.push("<thi"), "");
        assert_eq!(filter.push("<think>inner</think>"), "");
        assert_eq!(filter.push("nk>outer"), "");
        assert_eq!(filter.push("</think>done"), "done");
        assert_eq!(filter.finish(), "");
    }
}
