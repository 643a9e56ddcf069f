//! Drawing a parsed score as an SVG lane chart
//!
//! The chart is split into columns of `BEATS_PER_COLUMN` beats, read left to
//! right and bottom to top. Lanes 2 through 13 of the score are playable;
//! notes outside that range are clipped to it.

use crate::{ChartError, NoteChannel, Score};
use std::collections::BTreeMap;
use std::fmt::Write;

const FIRST_LANE: u8 = 2;
const LANE_COUNT: u8 = 12;
const LANE_WIDTH: f64 = 12.0;
const PX_PER_BEAT: f64 = 48.0;
const BEATS_PER_COLUMN: f64 = 16.0;
const COLUMN_GAP: f64 = 56.0;
const MARGIN: f64 = 24.0;
const HEADER_HEIGHT: f64 = 112.0;
const JACKET_SIZE: f64 = 80.0;
const NOTE_HEIGHT: f64 = 6.0;
/// Browsers refuse to rasterize surfaces beyond this edge length
const MAX_EDGE: f64 = 32_767.0;

const COLUMN_WIDTH: f64 = LANE_WIDTH * LANE_COUNT as f64;
const COLUMN_HEIGHT: f64 = PX_PER_BEAT * BEATS_PER_COLUMN;

pub struct ChartDrawing<'a> {
    score: &'a Score,
}

impl<'a> ChartDrawing<'a> {
    pub fn new(score: &'a Score) -> Self {
        Self { score }
    }

    fn column_count(&self) -> usize {
        (self.score.total_beats() / BEATS_PER_COLUMN).ceil().max(1.0) as usize
    }

    pub fn size(&self) -> (f64, f64) {
        let columns = self.column_count() as f64;
        let body_width = columns * COLUMN_WIDTH + (columns - 1.0) * COLUMN_GAP;
        let width = MARGIN * 2.0 + body_width.max(480.0);
        let height = MARGIN * 2.0 + HEADER_HEIGHT + COLUMN_HEIGHT;
        (width, height)
    }

    /// Column and y coordinate of a beat
    fn locate(&self, beat: f64) -> (usize, f64) {
        let column = ((beat / BEATS_PER_COLUMN).floor().max(0.0) as usize)
            .min(self.column_count() - 1);
        let local = beat - column as f64 * BEATS_PER_COLUMN;
        (column, self.column_bottom() - local * PX_PER_BEAT)
    }

    fn column_bottom(&self) -> f64 {
        MARGIN + HEADER_HEIGHT + COLUMN_HEIGHT
    }

    fn column_left(&self, column: usize) -> f64 {
        MARGIN + column as f64 * (COLUMN_WIDTH + COLUMN_GAP)
    }

    fn lane_x(&self, column: usize, lane: f64) -> f64 {
        self.column_left(column) + (lane - FIRST_LANE as f64) * LANE_WIDTH
    }

    /// Lane span clipped to the playable range, as (start, end) lane positions
    fn clip_lanes(lane: u8, width: u8) -> Option<(f64, f64)> {
        let start = lane.max(FIRST_LANE) as f64;
        let end = (lane.saturating_add(width.max(1))).min(FIRST_LANE + LANE_COUNT) as f64;
        (end > start).then_some((start, end))
    }

    pub fn svg(&self) -> Result<String, ChartError> {
        let (width, height) = self.size();
        if !width.is_finite() || !height.is_finite() || width > MAX_EDGE || height > MAX_EDGE {
            return Err(ChartError::Render(format!(
                "chart of {width}x{height} px is too large to rasterize"
            )));
        }

        let mut out = String::with_capacity(64 * 1024);
        // Writing into a String cannot fail
        let _ = self.write_svg(&mut out, width, height);
        Ok(out)
    }

    fn write_svg(&self, out: &mut String, width: f64, height: f64) -> std::fmt::Result {
        writeln!(
            out,
            r#"<svg xmlns="http://www.w3.org/2000/svg" xmlns:xlink="http://www.w3.org/1999/xlink" width="{w}" height="{h}" viewBox="0 0 {w} {h}">"#,
            w = width,
            h = height
        )?;
        writeln!(
            out,
            r##"<rect x="0" y="0" width="{width}" height="{height}" fill="#1e1e2a"/>"##
        )?;

        self.write_header(out)?;
        for column in 0..self.column_count() {
            self.write_column(out, column)?;
        }
        self.write_measures(out)?;
        self.write_bpm_changes(out)?;
        self.write_slides(out)?;
        self.write_notes(out)?;

        writeln!(out, "</svg>")
    }

    fn write_header(&self, out: &mut String) -> std::fmt::Result {
        let meta = &self.score.meta;
        let mut text_x = MARGIN;

        if let Some(jacket) = &meta.jacket {
            writeln!(
                out,
                r#"<image x="{MARGIN}" y="{MARGIN}" width="{JACKET_SIZE}" height="{JACKET_SIZE}" href="{url}" xlink:href="{url}"/>"#,
                url = escape(jacket)
            )?;
            text_x += JACKET_SIZE + 16.0;
        }

        let title = meta.title.as_deref().unwrap_or("Untitled");
        writeln!(
            out,
            r##"<text x="{text_x}" y="{y}" font-family="sans-serif" font-size="26" font-weight="bold" fill="#ffffff">{}</text>"##,
            escape(title),
            y = MARGIN + 28.0
        )?;

        let credits: Vec<&str> = [meta.artist.as_deref(), meta.designer.as_deref()]
            .into_iter()
            .flatten()
            .collect();
        if !credits.is_empty() {
            writeln!(
                out,
                r##"<text x="{text_x}" y="{y}" font-family="sans-serif" font-size="14" fill="#c8c8d8">{}</text>"##,
                escape(&credits.join(" / ")),
                y = MARGIN + 52.0
            )?;
        }

        let level = match (meta.difficulty.as_deref(), meta.play_level.as_deref()) {
            (Some(d), Some(l)) => format!("{} {}", d.to_uppercase(), l),
            (Some(d), None) => d.to_uppercase(),
            (None, Some(l)) => format!("Lv.{l}"),
            (None, None) => String::new(),
        };
        if !level.is_empty() {
            writeln!(
                out,
                r##"<text x="{text_x}" y="{y}" font-family="sans-serif" font-size="14" fill="#ff77aa">{}</text>"##,
                escape(&level),
                y = MARGIN + 74.0
            )?;
        }
        Ok(())
    }

    fn write_column(&self, out: &mut String, column: usize) -> std::fmt::Result {
        let left = self.column_left(column);
        let top = MARGIN + HEADER_HEIGHT;

        writeln!(
            out,
            r##"<rect x="{left}" y="{top}" width="{COLUMN_WIDTH}" height="{COLUMN_HEIGHT}" fill="#10101a" stroke="#50506a"/>"##
        )?;
        for lane in (2..LANE_COUNT).step_by(2) {
            let x = left + lane as f64 * LANE_WIDTH;
            writeln!(
                out,
                r##"<line x1="{x}" y1="{top}" x2="{x}" y2="{bottom}" stroke="#33334a" stroke-width="1"/>"##,
                bottom = top + COLUMN_HEIGHT
            )?;
        }
        Ok(())
    }

    fn write_measures(&self, out: &mut String) -> std::fmt::Result {
        let total = self.score.total_beats();
        for measure in 0..self.score.measure_count() {
            let beat = self.score.measure_start(measure);
            if beat >= total {
                break;
            }
            let (column, y) = self.locate(beat);
            let left = self.column_left(column);
            writeln!(
                out,
                r##"<line x1="{left}" y1="{y}" x2="{right}" y2="{y}" stroke="#8888aa" stroke-width="1"/>"##,
                right = left + COLUMN_WIDTH
            )?;
            writeln!(
                out,
                r##"<text x="{x}" y="{ty}" font-family="monospace" font-size="10" fill="#8888aa" text-anchor="end">#{measure:03}</text>"##,
                x = left - 4.0,
                ty = y + 3.0
            )?;
        }
        Ok(())
    }

    fn write_bpm_changes(&self, out: &mut String) -> std::fmt::Result {
        for change in &self.score.bpm_changes {
            let beat = self.score.beat_at(change.measure, change.position);
            let (column, y) = self.locate(beat);
            writeln!(
                out,
                r##"<text x="{x}" y="{ty}" font-family="monospace" font-size="10" fill="#66ddff">{bpm}</text>"##,
                x = self.column_left(column) + COLUMN_WIDTH + 4.0,
                ty = y + 3.0,
                bpm = trim_float(change.bpm)
            )?;
        }
        Ok(())
    }

    fn write_slides(&self, out: &mut String) -> std::fmt::Result {
        let mut paths: BTreeMap<char, Vec<Vec<(f64, f64, f64)>>> = BTreeMap::new();

        for note in &self.score.notes {
            let NoteChannel::Slide(id) = note.channel else {
                continue;
            };
            let Some((start, end)) = Self::clip_lanes(note.lane, note.width) else {
                continue;
            };
            let beat = self.score.beat_at(note.measure, note.position);
            let groups = paths.entry(id).or_default();

            // Kind 1 opens a new slide on this channel
            if note.kind == 1 || groups.is_empty() {
                groups.push(Vec::new());
            }
            if let Some(current) = groups.last_mut() {
                current.push((beat, start, end));
            }
        }

        for groups in paths.values() {
            for points in groups {
                for pair in points.windows(2) {
                    self.write_slide_segment(out, pair[0], pair[1])?;
                }
            }
        }
        Ok(())
    }

    /// Quad between two slide points, split at column boundaries
    fn write_slide_segment(
        &self,
        out: &mut String,
        from: (f64, f64, f64),
        to: (f64, f64, f64),
    ) -> std::fmt::Result {
        let (b0, s0, e0) = from;
        let (b1, s1, e1) = to;
        if b1 <= b0 {
            return Ok(());
        }

        let lerp = |beat: f64| {
            let t = (beat - b0) / (b1 - b0);
            (s0 + (s1 - s0) * t, e0 + (e1 - e0) * t)
        };

        let mut lo = b0;
        while lo < b1 {
            let column_end = ((lo / BEATS_PER_COLUMN).floor() + 1.0) * BEATS_PER_COLUMN;
            let hi = column_end.min(b1);
            let (column, y_lo) = self.locate(lo);
            let y_hi = self.column_bottom() - (hi - column as f64 * BEATS_PER_COLUMN) * PX_PER_BEAT;
            let (ls, le) = lerp(lo);
            let (hs, he) = lerp(hi);

            writeln!(
                out,
                r##"<polygon points="{},{y_lo} {},{y_lo} {},{y_hi} {},{y_hi}" fill="#44dd88" fill-opacity="0.45"/>"##,
                self.lane_x(column, ls),
                self.lane_x(column, le),
                self.lane_x(column, he),
                self.lane_x(column, hs),
            )?;
            lo = hi;
        }
        Ok(())
    }

    fn write_notes(&self, out: &mut String) -> std::fmt::Result {
        for note in &self.score.notes {
            let Some((start, end)) = Self::clip_lanes(note.lane, note.width) else {
                continue;
            };
            let beat = self.score.beat_at(note.measure, note.position);
            let (column, y) = self.locate(beat);
            let x = self.lane_x(column, start);
            let w = (end - start) * LANE_WIDTH;

            match note.channel {
                NoteChannel::Tap => {
                    let fill = match note.kind {
                        2 => "#ffcc33",
                        3 => "#888888",
                        _ => "#33ccff",
                    };
                    writeln!(
                        out,
                        r##"<rect x="{x}" y="{ty}" width="{w}" height="{NOTE_HEIGHT}" rx="2" fill="{fill}"/>"##,
                        ty = y - NOTE_HEIGHT / 2.0
                    )?;
                }
                NoteChannel::Directional => {
                    let mid = x + w / 2.0;
                    let tip = match note.kind {
                        3 => x,
                        4 => x + w,
                        _ => mid,
                    };
                    writeln!(
                        out,
                        r##"<polygon points="{x},{base} {right},{base} {tip},{apex}" fill="#ff5599"/>"##,
                        base = y,
                        right = x + w,
                        apex = y - 10.0
                    )?;
                }
                NoteChannel::Slide(_) => {
                    if matches!(note.kind, 1 | 2 | 3) {
                        writeln!(
                            out,
                            r##"<rect x="{x}" y="{ty}" width="{w}" height="{NOTE_HEIGHT}" rx="2" fill="#44dd88"/>"##,
                            ty = y - NOTE_HEIGHT / 2.0
                        )?;
                    }
                }
            }
        }
        Ok(())
    }
}

fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            c => escaped.push(c),
        }
    }
    escaped
}

fn trim_float(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{value:.0}")
    } else {
        format!("{value}")
    }
}
