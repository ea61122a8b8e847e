//! Splits one long generated text into display segments that fit Discord's
//! embed limits: a per-segment cap on each embed description and an
//! aggregate cap across everything sent in one reply. When the aggregate
//! cap would be exceeded the tail is cut and a visible notice appended;
//! chunking itself never fails.

/// Cap on a single segment body.
pub const PER_SEGMENT_CAP: usize = 3500;

/// Cap on the total characters of one reply (all segment bodies + titles).
pub const AGGREGATE_CAP: usize = 6000;

/// Headroom reserved for presentation outside the raw bodies (titles,
/// field labels). Subtracted before any truncation decision.
pub const RESERVED_OVERHEAD: usize = 100;

pub const TRUNCATION_NOTICE: &str = "... (Response truncated due to size limit)";

/// Characters given up when truncating so the notice itself fits.
const TRUNCATION_HEADROOM: usize = 50;

/// One bounded chunk of output text, ready for transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplaySegment {
    /// 1-based ordinal.
    pub index: usize,
    pub title: String,
    pub body: String,
}

fn segment_title(index: usize) -> String {
    if index == 1 {
        "Response".to_string()
    } else {
        format!("Response (Part {index})")
    }
}

/// Chunk with the standard caps. `existing_used_chars` counts characters
/// already committed to the reply by earlier embeds.
pub fn chunk_response(text: &str, existing_used_chars: usize) -> Vec<DisplaySegment> {
    chunk(
        text,
        PER_SEGMENT_CAP,
        AGGREGATE_CAP,
        RESERVED_OVERHEAD,
        existing_used_chars,
    )
}

/// Split `text` into ordered segments of at most `per_segment_cap`
/// characters, truncating first if the aggregate budget would be exceeded.
/// Empty input yields no segments. Counts are characters, not bytes.
pub fn chunk(
    text: &str,
    per_segment_cap: usize,
    aggregate_cap: usize,
    reserved_overhead: usize,
    existing_used_chars: usize,
) -> Vec<DisplaySegment> {
    let remaining = aggregate_cap.saturating_sub(existing_used_chars + reserved_overhead);

    let truncated;
    let text = if text.chars().count() > remaining {
        let keep = remaining.saturating_sub(TRUNCATION_HEADROOM);
        let mut cut: String = text.chars().take(keep).collect();
        cut.push_str(TRUNCATION_NOTICE);
        // A nearly spent budget may not even hold the notice.
        if cut.chars().count() > remaining {
            cut = cut.chars().take(remaining).collect();
        }
        truncated = cut;
        truncated.as_str()
    } else {
        text
    };

    let mut segments = Vec::new();
    let mut body = String::new();
    let mut count = 0usize;
    for ch in text.chars() {
        body.push(ch);
        count += 1;
        if count == per_segment_cap {
            let index = segments.len() + 1;
            segments.push(DisplaySegment {
                index,
                title: segment_title(index),
                body: std::mem::take(&mut body),
            });
            count = 0;
        }
    }
    if !body.is_empty() {
        let index = segments.len() + 1;
        segments.push(DisplaySegment {
            index,
            title: segment_title(index),
            body,
        });
    }
    segments
}

/// Shorten `text` to at most `max_chars` characters, appending "..." when
/// anything was cut. Used for echoing prompts back inside embeds.
pub fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars).collect();
    out.push_str("...");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_empty_yields_no_segments() {
        assert!(chunk_response("", 0).is_empty());
    }

    #[test]
    fn test_chunk_short_single_segment() {
        let segments = chunk_response("hello world", 0);
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].index, 1);
        assert_eq!(segments[0].title, "Response");
        assert_eq!(segments[0].body, "hello world");
    }

    #[test]
    fn test_chunk_exact_slices_and_titles() {
        let segments = chunk("This is a test.", 4, 10_000, RESERVED_OVERHEAD, 0);
        let bodies: Vec<&str> = segments.iter().map(|s| s.body.as_str()).collect();
        assert_eq!(bodies, vec!["This", " is ", "a te", "st."]);
        let titles: Vec<&str> = segments.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(
            titles,
            vec![
                "Response",
                "Response (Part 2)",
                "Response (Part 3)",
                "Response (Part 4)"
            ]
        );
    }

    #[test]
    fn test_chunk_multiple_segments_no_truncation() {
        // Over the per-segment cap but well under the aggregate cap.
        let text = "a".repeat(PER_SEGMENT_CAP + 100);
        let segments = chunk(&text, PER_SEGMENT_CAP, 100_000, RESERVED_OVERHEAD, 0);
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].body.len(), PER_SEGMENT_CAP);
        assert_eq!(segments[1].body.len(), 100);
        assert!(!segments[1].body.contains(TRUNCATION_NOTICE));
    }

    #[test]
    fn test_chunk_truncates_over_aggregate_budget() {
        // 5000 chars with 3000 already used: remaining budget is
        // 6000 - 3000 - 100 = 2900, so the text is cut to 2850 + notice.
        let text = "x".repeat(5000);
        let segments = chunk_response(&text, 3000);
        let total: usize = segments
            .iter()
            .map(|s| s.body.chars().count() + s.title.chars().count())
            .sum();
        assert!(total <= AGGREGATE_CAP);
        let last = segments.last().unwrap();
        assert!(last.body.ends_with(TRUNCATION_NOTICE));
    }

    #[test]
    fn test_chunk_short_text_still_truncated_when_budget_spent() {
        // Shorter than the per-segment cap, but the reply is nearly full.
        let text = "y".repeat(500);
        let segments = chunk_response(&text, AGGREGATE_CAP - RESERVED_OVERHEAD - 200);
        assert_eq!(segments.len(), 1);
        assert!(segments[0].body.ends_with(TRUNCATION_NOTICE));
        assert!(segments[0].body.chars().count() <= 200);
    }

    #[test]
    fn test_chunk_notice_clamped_to_tiny_budget() {
        // Remaining budget of 10 cannot hold the full notice.
        let segments = chunk_response(&"z".repeat(100), AGGREGATE_CAP - RESERVED_OVERHEAD - 10);
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].body.chars().count(), 10);
    }

    #[test]
    fn test_chunk_spent_budget_yields_no_segments() {
        assert!(chunk_response("anything", AGGREGATE_CAP).is_empty());
    }

    #[test]
    fn test_chunk_respects_char_boundaries() {
        let text = "é".repeat(10);
        let segments = chunk(&text, 4, 10_000, RESERVED_OVERHEAD, 0);
        assert_eq!(segments.len(), 3);
        assert_eq!(segments[0].body.chars().count(), 4);
        assert_eq!(segments[2].body.chars().count(), 2);
    }

    #[test]
    fn test_truncate_untouched_when_short() {
        assert_eq!(truncate("short", 100), "short");
    }

    #[test]
    fn test_truncate_appends_ellipsis() {
        let result = truncate(&"z".repeat(3600), 3500);
        assert_eq!(result.chars().count(), 3503);
        assert!(result.ends_with("..."));
    }
}
