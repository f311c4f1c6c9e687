use crate::providers::DiarizedInterval;
use crate::recap::{SpeakerTurn, UNKNOWN_SPEAKER};
use crate::subtitle_processor::SentenceUnit;

/// Length of the intersection of [a_start, a_end] and [b_start, b_end]
fn overlap(a_start: f64, a_end: f64, b_start: f64, b_end: f64) -> f64 {
    (a_end.min(b_end) - a_start.max(b_start)).max(0.0)
}

/// Speaker with the largest total overlap with [start, end].
///
/// Ties go to the label whose first overlapping interval appears earliest in
/// `intervals`; intervals that miss the range do not count. No overlap at all
/// yields "UNKNOWN".
pub fn attribute_speaker(start: f64, end: f64, intervals: &[DiarizedInterval]) -> String {
    // (label, total overlap) in order of first overlap
    let mut totals: Vec<(&str, f64)> = Vec::new();
    for interval in intervals {
        let amount = overlap(start, end, interval.start, interval.end);
        if amount <= 0.0 {
            continue;
        }
        match totals.iter_mut().find(|(label, _)| *label == interval.speaker) {
            Some((_, total)) => *total += amount,
            None => totals.push((interval.speaker.as_str(), amount)),
        }
    }

    let mut best: Option<(&str, f64)> = None;
    for (label, total) in totals {
        // strict comparison keeps the earlier label on ties
        if best.map_or(true, |(_, best_total)| total > best_total) {
            best = Some((label, total));
        }
    }

    best.map(|(label, _)| label.to_string())
        .unwrap_or_else(|| UNKNOWN_SPEAKER.to_string())
}

/// Attribute every unit, then merge adjacent units with the same speaker.
///
/// With no intervals (capability unavailable or failed) every unit is "UNKNOWN"
/// and coalescing still applies.
pub fn attribute_and_coalesce(units: &[SentenceUnit], intervals: &[DiarizedInterval]) -> Vec<SpeakerTurn> {
    let attributed: Vec<(String, &SentenceUnit)> = units
        .iter()
        .map(|unit| (attribute_speaker(unit.start, unit.end, intervals), unit))
        .collect();
    coalesce_turns(attributed)
}

/// Merge consecutive (speaker, unit) pairs sharing a speaker into turns.
/// Input must be in time order.
pub fn coalesce_turns<'a, I>(attributed: I) -> Vec<SpeakerTurn>
where
    I: IntoIterator<Item = (String, &'a SentenceUnit)>,
{
    let mut turns: Vec<SpeakerTurn> = Vec::new();

    for (speaker, unit) in attributed {
        match turns.last_mut() {
            Some(turn) if turn.speaker == speaker && turn.source_file == unit.source_file => {
                turn.end = turn.end.max(unit.end);
                turn.text.push(' ');
                turn.text.push_str(&unit.text);
            }
            _ => turns.push(SpeakerTurn {
                start: unit.start,
                end: unit.end,
                speaker,
                text: unit.text.clone(),
                source_file: unit.source_file.clone(),
                file_index: unit.file_index,
            }),
        }
    }

    turns
}
