//! Score files in SUS notation
//!
//! A score is a list of `#` lines. Header commands look like
//! `#TITLE "name"`, timing definitions like `#BPM01: 160`, and note data like
//! `#00213: 1314` (measure, channel, then pairs of type and width).
//! Everything that is not understood is kept or ignored, never fatal; only
//! malformed values of known lines produce `ChartError::Parse`.

use crate::ChartError;
use std::collections::{BTreeMap, HashMap};

pub const DEFAULT_TICKS_PER_BEAT: u32 = 480;
const DEFAULT_BEATS_PER_MEASURE: f64 = 4.0;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScoreMeta {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub designer: Option<String>,
    pub difficulty: Option<String>,
    pub play_level: Option<String>,
    pub jacket: Option<String>,
    /// Header commands without a dedicated field, keyed in upper case
    pub extra: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoteChannel {
    Tap,
    Directional,
    /// Slide notes sharing an identifier belong to the same slide path
    Slide(char),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Note {
    pub measure: u32,
    /// Offset inside the measure, in `[0, 1)`
    pub position: f64,
    pub lane: u8,
    pub width: u8,
    pub kind: u8,
    pub channel: NoteChannel,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BpmChange {
    pub measure: u32,
    pub position: f64,
    pub bpm: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Score {
    pub meta: ScoreMeta,
    pub ticks_per_beat: u32,
    /// Beats per measure, effective from the keyed measure onwards
    pub bar_lengths: BTreeMap<u32, f64>,
    pub bpm_changes: Vec<BpmChange>,
    pub notes: Vec<Note>,
}

impl Default for Score {
    fn default() -> Self {
        Self {
            meta: ScoreMeta::default(),
            ticks_per_beat: DEFAULT_TICKS_PER_BEAT,
            bar_lengths: BTreeMap::new(),
            bpm_changes: Vec::new(),
            notes: Vec::new(),
        }
    }
}

impl Score {
    pub fn from_bytes(raw: &[u8]) -> Result<Self, ChartError> {
        let text = std::str::from_utf8(raw)
            .map_err(|e| ChartError::Parse(format!("score is not UTF-8: {e}")))?;
        Self::parse(text)
    }

    pub fn parse(text: &str) -> Result<Self, ChartError> {
        let mut score = Score::default();
        let mut bpm_defs: HashMap<String, f64> = HashMap::new();
        let mut bpm_refs: Vec<(u32, f64, String)> = Vec::new();

        let text = text.strip_prefix('\u{feff}').unwrap_or(text);

        for (index, raw_line) in text.lines().enumerate() {
            let line_no = index + 1;
            let line = raw_line.trim();
            let Some(body) = line.strip_prefix('#') else {
                continue;
            };

            let err = |message: String| ChartError::Parse(format!("line {line_no}: {message}"));

            match split_data_line(body) {
                Some((key, value)) if is_measure_key(key) => {
                    let measure: u32 = key[..3]
                        .parse()
                        .map_err(|_| err(format!("bad measure in {key}")))?;
                    let channel = &key[3..];

                    match channel {
                        "02" => {
                            let beats: f64 = value
                                .parse()
                                .map_err(|_| err(format!("bad bar length {value:?}")))?;
                            if !(beats > 0.0) || !beats.is_finite() {
                                return Err(err(format!("bar length must be positive, got {beats}")));
                            }
                            score.bar_lengths.insert(measure, beats);
                        }
                        "08" => {
                            for (position, pair) in data_pairs(value).map_err(err)? {
                                bpm_refs.push((measure, position, pair.to_ascii_uppercase()));
                            }
                        }
                        _ => {
                            let Some(note_channel) = note_channel(channel) else {
                                continue;
                            };
                            let lane = base36(channel.as_bytes()[1] as char)
                                .ok_or_else(|| err(format!("bad lane in {key}")))?;

                            for (position, pair) in data_pairs(value).map_err(err)? {
                                let mut chars = pair.chars();
                                let kind = chars.next().and_then(base36);
                                let width = chars.next().and_then(base36);
                                let (Some(kind), Some(width)) = (kind, width) else {
                                    return Err(err(format!("bad note data {pair:?} in {key}")));
                                };
                                score.notes.push(Note {
                                    measure,
                                    position,
                                    lane,
                                    width,
                                    kind,
                                    channel: note_channel,
                                });
                            }
                        }
                    }
                }
                Some((key, value)) if key.len() == 5 && key[..3].eq_ignore_ascii_case("BPM") => {
                    let bpm: f64 = value
                        .parse()
                        .map_err(|_| err(format!("bad BPM value {value:?}")))?;
                    if !(bpm > 0.0) || !bpm.is_finite() {
                        return Err(err(format!("BPM must be positive, got {bpm}")));
                    }
                    bpm_defs.insert(key[3..].to_ascii_uppercase(), bpm);
                }
                Some((key, value)) => {
                    score
                        .meta
                        .extra
                        .insert(key.to_ascii_uppercase(), unquote(value).to_string());
                }
                None => score.apply_command(body).map_err(err)?,
            }
        }

        for (measure, position, id) in bpm_refs {
            let bpm = bpm_defs
                .get(&id)
                .copied()
                .ok_or_else(|| ChartError::Parse(format!("measure {measure}: undefined BPM id {id}")))?;
            score.bpm_changes.push(BpmChange {
                measure,
                position,
                bpm,
            });
        }

        score
            .bpm_changes
            .sort_by(|a, b| timing_order((a.measure, a.position), (b.measure, b.position)));
        score
            .notes
            .sort_by(|a, b| timing_order((a.measure, a.position), (b.measure, b.position)));

        Ok(score)
    }

    fn apply_command(&mut self, body: &str) -> Result<(), String> {
        let (key, value) = match body.split_once(char::is_whitespace) {
            Some((key, value)) => (key, unquote(value.trim())),
            None => (body, ""),
        };

        let key = key.to_ascii_uppercase();
        match key.as_str() {
            "TITLE" => self.meta.title = Some(value.to_string()),
            "ARTIST" => self.meta.artist = Some(value.to_string()),
            "DESIGNER" => self.meta.designer = Some(value.to_string()),
            "DIFFICULTY" => self.meta.difficulty = Some(value.to_string()),
            "PLAYLEVEL" => self.meta.play_level = Some(value.to_string()),
            "JACKET" => self.meta.jacket = Some(value.to_string()),
            "REQUEST" => {
                if let Some(ticks) = value.strip_prefix("ticks_per_beat") {
                    self.ticks_per_beat = ticks
                        .trim()
                        .parse()
                        .map_err(|_| format!("bad ticks_per_beat {:?}", ticks.trim()))?;
                    if self.ticks_per_beat == 0 {
                        return Err("ticks_per_beat must be positive".to_string());
                    }
                }
                self.meta.extra.insert(key, value.to_string());
            }
            _ => {
                self.meta.extra.insert(key, value.to_string());
            }
        }
        Ok(())
    }

    /// Beats in `measure`, following the last bar length defined at or before it
    pub fn beats_in_measure(&self, measure: u32) -> f64 {
        self.bar_lengths
            .range(..=measure)
            .next_back()
            .map(|(_, beats)| *beats)
            .unwrap_or(DEFAULT_BEATS_PER_MEASURE)
    }

    /// Beat at which `measure` starts
    pub fn measure_start(&self, measure: u32) -> f64 {
        (0..measure).map(|m| self.beats_in_measure(m)).sum()
    }

    pub fn beat_at(&self, measure: u32, position: f64) -> f64 {
        self.measure_start(measure) + position * self.beats_in_measure(measure)
    }

    /// Number of measures that contain anything, at least one
    pub fn measure_count(&self) -> u32 {
        let last_note = self.notes.iter().map(|n| n.measure).max();
        let last_bpm = self.bpm_changes.iter().map(|b| b.measure).max();
        last_note.max(last_bpm).map_or(1, |m| m + 1)
    }

    pub fn total_beats(&self) -> f64 {
        self.measure_start(self.measure_count())
    }
}

/// `mmmCC: data` lines, where the key is everything before the colon
fn split_data_line(body: &str) -> Option<(&str, &str)> {
    let (key, value) = body.split_once(':')?;
    if key.is_empty() || key.contains(char::is_whitespace) {
        return None;
    }
    Some((key, value.trim()))
}

fn is_measure_key(key: &str) -> bool {
    key.len() >= 5 && key.is_ascii() && key[..3].bytes().all(|b| b.is_ascii_digit())
}

fn note_channel(channel: &str) -> Option<NoteChannel> {
    let mut chars = channel.chars();
    match (chars.next(), chars.next(), chars.next(), chars.next()) {
        (Some('1'), Some(_), None, None) => Some(NoteChannel::Tap),
        (Some('5'), Some(_), None, None) => Some(NoteChannel::Directional),
        (Some('3'), Some(_), Some(id), None) => Some(NoteChannel::Slide(id.to_ascii_uppercase())),
        _ => None,
    }
}

/// Split note data into `(position, pair)`, skipping empty `00` slots
fn data_pairs(value: &str) -> Result<Vec<(f64, &str)>, String> {
    if !value.is_ascii() {
        return Err(format!("non-ASCII data {value:?}"));
    }
    if value.len() % 2 != 0 {
        return Err(format!("odd-length data {value:?}"));
    }

    let count = value.len() / 2;
    Ok((0..count)
        .map(|i| (i as f64 / count as f64, &value[i * 2..i * 2 + 2]))
        .filter(|(_, pair)| *pair != "00")
        .collect())
}

fn timing_order(a: (u32, f64), b: (u32, f64)) -> std::cmp::Ordering {
    a.0.cmp(&b.0).then(a.1.total_cmp(&b.1))
}

fn base36(c: char) -> Option<u8> {
    c.to_digit(36).map(|d| d as u8)
}

fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
This line is a comment
#TITLE "Tell Your World"
#ARTIST "livetune"
#DESIGNER "sekai"
#PLAYLEVEL 26
#REQUEST "ticks_per_beat 480"
#WAVEOFFSET 0
#BPM01: 146
#BPM02: 73.5
#00002: 4
#00008: 01
#00216: 1200
#00113: 2300
#00334a: 1300005300002300
#00455: 3400
#00808: 02
"#;

    #[test]
    fn test_parse_header_commands() {
        let score = Score::parse(SAMPLE).unwrap();
        assert_eq!(score.meta.title.as_deref(), Some("Tell Your World"));
        assert_eq!(score.meta.artist.as_deref(), Some("livetune"));
        assert_eq!(score.meta.play_level.as_deref(), Some("26"));
        assert_eq!(score.ticks_per_beat, 480);
        assert_eq!(score.meta.extra.get("WAVEOFFSET").map(String::as_str), Some("0"));
    }

    #[test]
    fn test_parse_notes_and_positions() {
        let score = Score::parse(SAMPLE).unwrap();

        let taps: Vec<_> = score
            .notes
            .iter()
            .filter(|n| n.channel == NoteChannel::Tap)
            .collect();
        assert_eq!(taps.len(), 2);
        assert_eq!((taps[0].measure, taps[0].lane, taps[0].kind, taps[0].width), (1, 3, 2, 3));
        assert_eq!((taps[1].measure, taps[1].lane, taps[1].position), (2, 6, 0.0));

        let slides: Vec<_> = score
            .notes
            .iter()
            .filter(|n| n.channel == NoteChannel::Slide('A'))
            .collect();
        assert_eq!(slides.len(), 3);
        assert_eq!(slides[0].position, 0.0);
        assert_eq!(slides[1].position, 0.375);
        assert_eq!(slides[2].position, 0.75);

        let flicks: Vec<_> = score
            .notes
            .iter()
            .filter(|n| n.channel == NoteChannel::Directional)
            .collect();
        assert_eq!(flicks.len(), 1);
        assert_eq!((flicks[0].measure, flicks[0].lane, flicks[0].kind), (4, 5, 3));
    }

    #[test]
    fn test_bpm_changes_resolved() {
        let score = Score::parse(SAMPLE).unwrap();
        assert_eq!(
            score.bpm_changes,
            vec![
                BpmChange { measure: 0, position: 0.0, bpm: 146.0 },
                BpmChange { measure: 8, position: 0.0, bpm: 73.5 },
            ]
        );
        assert_eq!(score.measure_count(), 9);
    }

    #[test]
    fn test_bar_lengths_carry_forward() {
        let score = Score::parse("#00002: 3\n#00402: 6\n#00511: 11").unwrap();
        assert_eq!(score.beats_in_measure(0), 3.0);
        assert_eq!(score.beats_in_measure(3), 3.0);
        assert_eq!(score.beats_in_measure(4), 6.0);
        assert_eq!(score.beats_in_measure(9), 6.0);
        assert_eq!(score.measure_start(5), 18.0);
        assert_eq!(score.beat_at(5, 0.5), 21.0);
    }

    #[test]
    fn test_empty_score_is_valid() {
        let score = Score::parse("").unwrap();
        assert!(score.notes.is_empty());
        assert_eq!(score.measure_count(), 1);
        assert_eq!(score.total_beats(), 4.0);
    }

    #[test]
    fn test_malformed_values_fail() {
        for text in [
            "#00113: 123",
            "#00002: four",
            "#00002: 0",
            "#BPM01: fast",
            "#00008: 07",
            "#00113: 1!",
            "#REQUEST \"ticks_per_beat many\"",
        ] {
            let result = Score::parse(text);
            assert!(
                matches!(result, Err(ChartError::Parse(_))),
                "{text:?} should fail, got {result:?}"
            );
        }
    }

    #[test]
    fn test_non_utf8_bytes_fail() {
        assert!(matches!(
            Score::from_bytes(&[0x23, 0xff, 0xfe]),
            Err(ChartError::Parse(_))
        ));
    }

    #[test]
    fn test_unknown_channels_are_ignored() {
        let score = Score::parse("#00121: 11\n#0019a: 1111\n#TIL00: \"0'0:1.0\"").unwrap();
        assert_eq!(score.notes.len(), 1);
        assert!(score.meta.extra.contains_key("TIL00"));
    }
}
