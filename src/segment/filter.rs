//! Three-stage filter turning raw diarization output into training-sized segments.
//!
//! Stages run strictly as merge → cut → drop: cutting relies on short
//! neighbours having been merged already, and dropping must see final durations.

use crate::defaults::{
    DOMINANT_SPEAKER_THRESHOLD, MAX_SAMPLE_DURATION, MAX_SILENCE_GAP, MIN_SAMPLE_DURATION,
};
use crate::segment::types::Segment;
use std::collections::HashSet;

/// Run all three stages over the segments of one recording.
pub fn filter_segments(segments: &[Segment]) -> Vec<Segment> {
    let merged = merge_to_minimum(segments);
    let cut = cut_to_maximum(&merged);
    drop_unusable(cut)
}

fn join_text(left: &str, right: &str) -> String {
    format!("{} {}", left, right)
}

/// Merge segments shorter than [`MIN_SAMPLE_DURATION`] with the segments that follow them.
///
/// Absorption of a following segment stops, emitting what has been accumulated,
/// when that segment belongs to another speaker, is itself longer than
/// [`MAX_SAMPLE_DURATION`], or starts more than [`MAX_SILENCE_GAP`] after the
/// accumulated end. Segments without a speaker are passed through untouched.
pub fn merge_to_minimum(segments: &[Segment]) -> Vec<Segment> {
    let mut merged = Vec::with_capacity(segments.len());
    let mut absorbed: HashSet<usize> = HashSet::new();
    let mut passthrough = 0usize;

    for (i, segment) in segments.iter().enumerate() {
        if absorbed.contains(&i) {
            continue;
        }
        let Some(speaker) = segment.speaker.as_deref() else {
            passthrough += 1;
            merged.push(segment.clone());
            continue;
        };
        if i == segments.len() - 1 || segment.duration() >= MIN_SAMPLE_DURATION {
            merged.push(segment.clone());
            continue;
        }

        let mut current = segment.clone();
        for (j, candidate) in segments.iter().enumerate().skip(i + 1) {
            if candidate.speaker.as_deref() != Some(speaker)
                || candidate.duration() > MAX_SAMPLE_DURATION
                || candidate.start - current.end > MAX_SILENCE_GAP
            {
                break;
            }

            absorbed.insert(j);
            current.end = candidate.end;
            current.text = join_text(&current.text, &candidate.text);
            current.words.extend(candidate.words.iter().cloned());

            if current.duration() >= MIN_SAMPLE_DURATION {
                break;
            }
        }
        merged.push(current);
    }

    tracing::debug!("Passed through {} segments without speaker.", passthrough);
    tracing::debug!(
        "Absorbed {} segments into a preceding segment.",
        absorbed.len()
    );
    tracing::debug!(
        "Merge kept {} segments of the original {}.",
        merged.len(),
        segments.len()
    );
    merged
}

/// Split segments longer than [`MAX_SAMPLE_DURATION`] along their word timestamps.
///
/// A segment of duration `d` becomes at most `ceil(d / MAX_SAMPLE_DURATION)`
/// fragments. A fragment is closed before the word whose end would stretch it
/// to `d / parts`; that word opens the next fragment unless it is the last word.
/// Words without timestamps join the open fragment and never open one.
pub fn cut_to_maximum(segments: &[Segment]) -> Vec<Segment> {
    let mut out = Vec::with_capacity(segments.len());
    let mut fragments_created = 0usize;

    for segment in segments {
        let duration = segment.duration();
        if duration <= MAX_SAMPLE_DURATION {
            out.push(segment.clone());
            continue;
        }

        let parts = (duration / MAX_SAMPLE_DURATION).ceil() as usize;
        let fragment_span = duration / parts as f64;
        let fragments = split_segment(segment, parts, fragment_span);
        fragments_created += fragments.len();
        out.extend(fragments);
    }

    tracing::debug!("Cut into {} new segments.", fragments_created);
    tracing::debug!(
        "Cut produced {} segments from {}.",
        out.len(),
        segments.len()
    );
    out
}

fn split_segment(segment: &Segment, parts: usize, fragment_span: f64) -> Vec<Segment> {
    let mut fragments: Vec<Segment> = Vec::with_capacity(parts);
    let mut open: Option<Segment> = None;
    let last = segment.words.len().saturating_sub(1);

    for (j, word) in segment.words.iter().enumerate() {
        let Some((start, end)) = word.span() else {
            if j == last {
                break;
            }
            if let Some(fragment) = open.as_mut() {
                fragment.text = join_text(&fragment.text, &word.text);
                fragment.words.push(word.clone());
            }
            continue;
        };

        if let Some(fragment) = open.as_mut() {
            if end - fragment.start < fragment_span {
                fragment.end = end;
                fragment.text = join_text(&fragment.text, &word.text);
                fragment.words.push(word.clone());
                continue;
            }

            fragments.extend(open.take());
            // A boundary on the final word, or past the planned part count, opens nothing.
            if j == last || fragments.len() == parts {
                break;
            }
        }

        open = Some(Segment {
            start,
            end,
            text: word.text.clone(),
            words: vec![word.clone()],
            speaker: segment.speaker.clone(),
            is_cut: true,
        });
    }

    fragments.extend(open);
    fragments
}

/// Discard segments outside the duration bounds and segments judged complex.
pub fn drop_unusable(segments: Vec<Segment>) -> Vec<Segment> {
    let before = segments.len();
    let kept: Vec<Segment> = segments
        .into_iter()
        .filter(|segment| {
            let duration = segment.duration();
            (MIN_SAMPLE_DURATION..=MAX_SAMPLE_DURATION).contains(&duration)
                && !segment.is_complex(DOMINANT_SPEAKER_THRESHOLD)
        })
        .collect();

    tracing::debug!("Dropped {} of {} segments.", before - kept.len(), before);
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::types::Word;

    /// Segment of one speaker with one tagged word per `step` seconds.
    fn spoken(start: f64, end: f64, speaker: &str, step: f64) -> Segment {
        let mut words = Vec::new();
        let mut k = 0usize;
        loop {
            let w_start = start + k as f64 * step;
            if w_start >= end - 1e-9 {
                break;
            }
            let w_end = (w_start + step).min(end);
            words.push(Word::new(&format!("w{}", k), w_start, w_end).with_speaker(speaker));
            k += 1;
        }
        Segment::new(start, end, &format!("{}-{}", start, end))
            .with_speaker(speaker)
            .with_words(words)
    }

    #[test]
    fn three_short_segments_merge_into_one() {
        let segments = vec![
            spoken(0.0, 1.0, "A", 0.25),
            spoken(1.0, 2.0, "A", 0.25),
            spoken(2.0, 3.0, "A", 0.25),
        ];
        let merged = merge_to_minimum(&segments);

        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].start, 0.0);
        assert_eq!(merged[0].end, 2.0);
        assert!(merged[0].duration() >= MIN_SAMPLE_DURATION);
        assert_eq!(merged[0].words.len(), 8);
        assert_eq!(merged[0].text, "0-1 1-2");
        // The third segment is last and emitted as-is.
        assert_eq!(merged[1].start, 2.0);
    }

    #[test]
    fn merge_of_one_second_segments_with_small_gaps() {
        let segments = vec![
            spoken(0.0, 1.0, "A", 0.25),
            spoken(1.5, 2.5, "A", 0.25),
            spoken(3.0, 4.0, "A", 0.25),
            spoken(10.0, 13.0, "B", 0.5),
        ];
        let merged = merge_to_minimum(&segments);

        assert_eq!(merged[0].start, 0.0);
        assert_eq!(merged[0].end, 2.5);
        assert!(merged[0].duration() >= MIN_SAMPLE_DURATION);
    }

    #[test]
    fn merge_stops_at_speaker_change() {
        let segments = vec![
            spoken(0.0, 1.0, "A", 0.25),
            spoken(1.0, 2.0, "B", 0.25),
            spoken(2.0, 5.0, "B", 0.25),
        ];
        let merged = merge_to_minimum(&segments);

        // A stays alone; the short B absorbs its B neighbour.
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0], segments[0]);
        assert_eq!((merged[1].start, merged[1].end), (1.0, 5.0));
    }

    #[test]
    fn speaker_change_and_long_gap_both_stop_merge() {
        let segments = vec![
            spoken(0.0, 1.0, "A", 0.25),
            spoken(1.0, 2.0, "B", 0.25),
            spoken(4.5, 7.0, "B", 0.25),
        ];
        let merged = merge_to_minimum(&segments);

        assert_eq!(merged.len(), 3);
        assert_eq!(merged[0], segments[0]);
        assert_eq!(merged[1], segments[1]);
        assert_eq!(merged[2], segments[2]);
    }

    #[test]
    fn merge_does_not_inflate_long_neighbour() {
        let segments = vec![spoken(0.0, 1.0, "A", 0.25), spoken(1.0, 17.0, "A", 0.5)];
        let merged = merge_to_minimum(&segments);

        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].end, 1.0);
        assert_eq!(merged[1].duration(), 16.0);
    }

    #[test]
    fn merge_stops_at_long_silence() {
        let segments = vec![
            spoken(0.0, 1.0, "A", 0.25),
            spoken(3.5, 4.5, "A", 0.25),
            spoken(4.5, 8.0, "A", 0.25),
        ];
        let merged = merge_to_minimum(&segments);

        assert_eq!(merged[0].end, 1.0);
        assert_eq!(merged[1].start, 3.5);
        assert_eq!(merged[1].end, 8.0);
    }

    #[test]
    fn silence_of_exactly_max_gap_still_merges() {
        let segments = vec![
            spoken(0.0, 1.0, "A", 0.25),
            spoken(3.0, 4.0, "A", 0.25),
            spoken(4.0, 9.0, "A", 0.25),
        ];
        let merged = merge_to_minimum(&segments);
        assert_eq!(merged[0].start, 0.0);
        assert_eq!(merged[0].end, 4.0);
    }

    #[test]
    fn speakerless_segment_passes_through_and_blocks_merge() {
        let mut unknown = spoken(1.0, 2.0, "A", 0.25);
        unknown.speaker = None;
        let segments = vec![spoken(0.0, 1.0, "A", 0.25), unknown.clone(), spoken(2.0, 5.0, "A", 0.25)];
        let merged = merge_to_minimum(&segments);

        assert_eq!(merged.len(), 3);
        assert_eq!(merged[0].end, 1.0);
        assert_eq!(merged[1], unknown);
    }

    #[test]
    fn last_segment_is_emitted_as_is() {
        let segments = vec![spoken(0.0, 5.0, "A", 0.5), spoken(5.0, 5.5, "A", 0.25)];
        let merged = merge_to_minimum(&segments);
        assert_eq!(merged, segments);
    }

    #[test]
    fn cut_produces_ceil_parts_within_bounds() {
        for &(duration, step) in &[(16.5, 0.1), (31.0, 0.25), (44.0, 0.2), (15.5, 0.5)] {
            let segment = spoken(100.0, 100.0 + duration, "A", step);
            let fragments = cut_to_maximum(std::slice::from_ref(&segment));

            let parts = (duration / MAX_SAMPLE_DURATION).ceil() as usize;
            assert_eq!(fragments.len(), parts, "duration {}", duration);

            let total: f64 = fragments.iter().map(Segment::duration).sum();
            assert!(total <= duration + 1e-6);
            for fragment in &fragments {
                assert!(fragment.duration() <= MAX_SAMPLE_DURATION + 1e-6);
                assert!(fragment.is_cut);
                assert_eq!(fragment.speaker.as_deref(), Some("A"));
            }
        }
    }

    #[test]
    fn cut_leaves_short_segments_alone() {
        let segment = spoken(0.0, 15.0, "A", 0.5);
        let fragments = cut_to_maximum(std::slice::from_ref(&segment));
        assert_eq!(fragments, vec![segment]);
    }

    #[test]
    fn untimed_words_join_open_fragment() {
        let mut segment = spoken(0.0, 20.0, "A", 1.0);
        segment.words.insert(3, Word::untimed("öhm").with_speaker("A"));
        let fragments = cut_to_maximum(std::slice::from_ref(&segment));

        assert_eq!(fragments.len(), 2);
        assert!(fragments[0].text.contains("öhm"));
        assert!(fragments[0].words.iter().any(|w| w.text == "öhm"));
        // The untimed word does not move the fragment end.
        assert_eq!(fragments[0].end, 9.0);
    }

    #[test]
    fn untimed_first_word_is_not_attached() {
        let mut segment = spoken(0.0, 20.0, "A", 1.0);
        segment.words.insert(0, Word::untimed("und").with_speaker("A"));
        let fragments = cut_to_maximum(std::slice::from_ref(&segment));

        assert!(!fragments[0].text.contains("und"));
        assert_eq!(fragments[0].start, 0.0);
    }

    #[test]
    fn untimed_last_word_is_dropped() {
        let mut segment = spoken(0.0, 20.0, "A", 1.0);
        segment.words.push(Word::untimed("tschüss").with_speaker("A"));
        let fragments = cut_to_maximum(std::slice::from_ref(&segment));

        assert!(fragments.iter().all(|f| !f.text.contains("tschüss")));
    }

    #[test]
    fn trailing_boundary_word_does_not_open_fragment() {
        // 20s split in two parts of 10s; the last word reaches the boundary.
        let words = vec![
            Word::new("eis", 0.0, 4.0).with_speaker("A"),
            Word::new("zwei", 4.0, 9.5).with_speaker("A"),
            Word::new("drü", 9.5, 19.0).with_speaker("A"),
            Word::new("ende", 19.5, 20.0).with_speaker("A"),
        ];
        let segment = Segment::new(0.0, 20.0, "x").with_speaker("A").with_words(words);

        let fragments = cut_to_maximum(std::slice::from_ref(&segment));

        assert_eq!(fragments.len(), 2);
        assert_eq!((fragments[0].start, fragments[0].end), (0.0, 9.5));
        assert_eq!(fragments[0].text, "eis zwei");
        assert_eq!((fragments[1].start, fragments[1].end), (9.5, 19.0));
        assert!(fragments.iter().all(|f| !f.text.contains("ende")));
    }

    #[test]
    fn drop_removes_out_of_bounds_and_complex() {
        let mut mixed = spoken(20.0, 25.0, "A", 0.5);
        for word in mixed.words.iter_mut().skip(5) {
            word.speaker = Some("B".to_string());
        }
        let mut untagged = spoken(30.0, 33.0, "A", 0.5);
        untagged.speaker = None;

        let segments = vec![
            spoken(0.0, 1.9, "A", 0.5),
            spoken(2.0, 4.0, "A", 0.5),
            spoken(4.0, 19.0, "A", 0.5),
            spoken(19.0, 34.1, "A", 0.5),
            mixed,
            untagged,
        ];
        let kept = drop_unusable(segments);

        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].start, 2.0);
        assert_eq!(kept[1].start, 4.0);
    }

    #[test]
    fn pipeline_output_respects_bounds_and_speaker_dominance() {
        let segments = vec![
            spoken(0.0, 0.5, "A", 0.25),
            spoken(0.6, 1.4, "A", 0.2),
            spoken(1.5, 2.7, "A", 0.3),
            spoken(3.0, 40.0, "B", 0.4),
            spoken(41.0, 41.5, "A", 0.25),
            spoken(45.0, 47.2, "A", 0.2),
            spoken(47.2, 63.0, "C", 0.3),
        ];
        let output = filter_segments(&segments);

        assert!(!output.is_empty());
        for segment in &output {
            let duration = segment.duration();
            assert!((MIN_SAMPLE_DURATION..=MAX_SAMPLE_DURATION).contains(&duration));
            assert!(!segment.is_complex(DOMINANT_SPEAKER_THRESHOLD));
        }
    }

    #[test]
    fn short_run_then_long_tail() {
        let segments = vec![
            spoken(0.0, 1.0, "A", 0.25),
            spoken(1.0, 1.8, "A", 0.2),
            spoken(1.8, 2.5, "A", 0.35),
            spoken(2.5, 19.0, "A", 0.1),
        ];
        let output = filter_segments(&segments);

        assert_eq!(output.len(), 3);
        assert_eq!((output[0].start, output[0].end), (0.0, 2.5));
        assert!(!output[0].is_cut);
        for fragment in &output[1..] {
            assert!(fragment.is_cut);
            assert!((fragment.duration() - 8.25).abs() < 0.15);
        }
    }

    #[test]
    fn empty_input_yields_empty_output() {
        assert!(filter_segments(&[]).is_empty());
    }
}
