//! Rich-text flow object for cell and document paragraphs.
//!
//! A paragraph keeps its source markup (so overflow continuation fragments
//! can be cut from it) alongside the stripped text that is actually
//! measured and drawn. Height for a given width comes from the wrap
//! collaborator in [`crate::fonts`] plus the leading rule: `auto_leading`
//! of `max` uses per-line max(ascent − descent, leading), `min` uses
//! ascent − descent, otherwise fixed leading × line count.

use crate::dom::decode_entities;
use crate::fonts::{wrap_text, FontManager};
use crate::style::{Color, Command, CommandArg, CommandKind, HAlign, RowRef, Strictness};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AutoLeading {
    #[default]
    Off,
    Max,
    Min,
}

/// Resolved paragraph style.
#[derive(Debug, Clone, PartialEq)]
pub struct ParaStyle {
    pub font_name: String,
    pub font_size: f32,
    pub leading: f32,
    pub auto_leading: AutoLeading,
    pub text_color: Color,
    pub background: Option<Color>,
    pub alignment: HAlign,
}

impl Default for ParaStyle {
    fn default() -> Self {
        Self {
            font_name: "Helvetica".to_string(),
            font_size: 10.0,
            leading: 12.0,
            auto_leading: AutoLeading::Off,
            text_color: Color::BLACK,
            background: None,
            alignment: HAlign::Left,
        }
    }
}

impl ParaStyle {
    /// Build a paragraph style from the table commands visible at a cell,
    /// applied in command order.
    pub fn from_commands(commands: &[Command], col: usize, row: usize) -> Self {
        let mut style = Self::default();
        for cmd in commands {
            if !range_applies(cmd, col as i32, row as i32) {
                continue;
            }
            match (&cmd.kind, &cmd.arg) {
                (CommandKind::Font, CommandArg::Name(n)) => style.font_name = n.clone(),
                (CommandKind::FontSize, CommandArg::Value(v)) => style.font_size = *v,
                (CommandKind::Leading, CommandArg::Value(v)) => style.leading = *v,
                (CommandKind::TextColor, CommandArg::Color(c)) => style.text_color = *c,
                (CommandKind::Align, CommandArg::HAlign(a)) => style.alignment = *a,
                _ => {}
            }
        }
        style
    }

    /// Apply a raw declaration string (used for `<p>` elements, where no
    /// command list exists). Unknown keys are ignored per leniency policy.
    pub fn apply_raw_css(&mut self, css: &str, strictness: Strictness) -> crate::error::Result<()> {
        use crate::style::{parse_color, parse_measurement, Unit};
        for decl in css.split(';') {
            let decl = decl.trim();
            if decl.is_empty() {
                continue;
            }
            let Some((key, value)) = decl.split_once(':') else {
                return Err(crate::error::Error::Style {
                    declaration: decl.to_string(),
                    message: "missing ':' separator".to_string(),
                });
            };
            let key = key.trim().to_ascii_lowercase().replace('-', "_");
            let value = value.trim();
            match key.as_str() {
                "font" | "face" | "font_name" => self.font_name = value.to_string(),
                "size" | "font_size" => {
                    if let Some(v) = parse_measurement(value, Unit::Pt) {
                        self.font_size = v;
                    }
                }
                "leading" => {
                    if let Some(v) = parse_measurement(value, Unit::Pt) {
                        self.leading = v;
                    }
                }
                "auto_leading" => {
                    self.auto_leading = match value.to_ascii_lowercase().as_str() {
                        "max" => AutoLeading::Max,
                        "min" => AutoLeading::Min,
                        _ => AutoLeading::Off,
                    }
                }
                "text_color" => self.text_color = parse_color(value, strictness)?,
                "back_color" | "background" => {
                    self.background = Some(parse_color(value, strictness)?)
                }
                "align" | "alignment" => {
                    self.alignment = match value.to_ascii_lowercase().as_str() {
                        "center" | "centre" => HAlign::Center,
                        "right" => HAlign::Right,
                        _ => HAlign::Left,
                    }
                }
                _ => log::debug!("ignoring paragraph style key {key:?}"),
            }
        }
        Ok(())
    }

    pub fn is_bold(&self) -> bool {
        self.font_name.to_ascii_lowercase().contains("bold")
    }

    pub fn is_italic(&self) -> bool {
        let lower = self.font_name.to_ascii_lowercase();
        lower.contains("italic") || lower.contains("oblique")
    }

    /// Effective single-line height for this style.
    pub fn line_height(&self, fonts: &FontManager) -> f32 {
        match self.auto_leading {
            AutoLeading::Off => {
                if self.leading > 0.0 {
                    self.leading
                } else {
                    1.2 * self.font_size
                }
            }
            AutoLeading::Max => {
                let extent = self.ascent_extent(fonts);
                extent.max(self.leading)
            }
            AutoLeading::Min => self.ascent_extent(fonts),
        }
    }

    fn ascent_extent(&self, fonts: &FontManager) -> f32 {
        let asc = fonts.ascender_pt(
            self.font_size,
            self.is_bold(),
            self.is_italic(),
            &self.font_name,
        );
        let desc = fonts.descender_pt(
            self.font_size,
            self.is_bold(),
            self.is_italic(),
            &self.font_name,
        );
        asc - desc
    }
}

/// Mirror of the original rectangle test used when deriving paragraph
/// styles from table commands: (0,0)–(-1,-1) means "everything", otherwise
/// the literal range must contain the cell.
fn range_applies(cmd: &Command, col: i32, row: i32) -> bool {
    let r = &cmd.range;
    let (RowRef::Literal(sr), RowRef::Literal(er)) = (r.start_row, r.end_row) else {
        return false;
    };
    if r.start_col == 0 && sr == 0 && r.end_col == -1 && er == -1 {
        return true;
    }
    if sr <= row && row <= er {
        if r.start_col == 0 && r.end_col == -1 {
            return true;
        }
        if r.start_col <= col && col <= r.end_col {
            return true;
        }
    }
    false
}

// ---------------------------------------------------------------------------
// Paragraph
// ---------------------------------------------------------------------------

/// A measured block of rich text.
#[derive(Debug, Clone)]
pub struct Paragraph {
    /// Source markup, retained for overflow fragment splitting.
    pub markup: String,
    /// Stripped text content (tags removed, `<br/>` as newline).
    pub text: String,
    pub style: ParaStyle,
    /// Lines from the most recent wrap, reused by draw.
    pub(crate) lines: Vec<String>,
}

impl Paragraph {
    pub fn new(markup: impl Into<String>, style: ParaStyle) -> Self {
        let markup = markup.into();
        let text = strip_markup(&markup);
        Self {
            markup,
            text,
            style,
            lines: Vec::new(),
        }
    }

    pub fn from_text(text: impl Into<String>, style: ParaStyle) -> Self {
        let text = text.into();
        Self {
            markup: text.clone(),
            text,
            style,
            lines: Vec::new(),
        }
    }

    /// Wrap at the given width, caching lines, and return (width, height).
    pub fn wrap(&mut self, avail_width: f32, fonts: &FontManager) -> (f32, f32) {
        self.lines = self.break_lines(avail_width, fonts);
        (avail_width, self.height_of_lines(&self.lines, fonts))
    }

    /// Height the text needs at the given width, without mutating state.
    pub fn text_height(&self, avail_width: f32, fonts: &FontManager) -> f32 {
        let lines = self.break_lines(avail_width, fonts);
        self.height_of_lines(&lines, fonts)
    }

    pub(crate) fn break_lines(&self, avail_width: f32, fonts: &FontManager) -> Vec<String> {
        wrap_text(
            &self.text,
            self.style.font_size,
            self.style.is_bold(),
            self.style.is_italic(),
            &self.style.font_name,
            avail_width,
            fonts,
        )
    }

    fn height_of_lines(&self, lines: &[String], fonts: &FontManager) -> f32 {
        lines.len() as f32 * self.style.line_height(fonts)
    }

    /// Width of the widest unbreakable word; content narrower than this
    /// cannot be flowed without overflowing its box.
    pub fn min_width(&self, fonts: &FontManager) -> f32 {
        self.text
            .split_whitespace()
            .map(|word| {
                fonts.measure_text_width(
                    word,
                    self.style.font_size,
                    self.style.is_bold(),
                    self.style.is_italic(),
                    &self.style.font_name,
                )
            })
            .fold(0.0, f32::max)
    }
}

/// Remove markup tags from a fragment, converting `<br/>` to a newline and
/// decoding entities in the remaining text.
pub fn strip_markup(markup: &str) -> String {
    let mut out = String::with_capacity(markup.len());
    let mut rest = markup;
    while let Some(open) = rest.find('<') {
        out.push_str(&rest[..open]);
        match rest[open..].find('>') {
            Some(close) => {
                let tag = &rest[open..open + close + 1];
                let name = tag.trim_start_matches(['<', '/']).trim_end_matches(['>', '/']);
                if name.trim().eq_ignore_ascii_case("br") {
                    out.push('\n');
                }
                rest = &rest[open + close + 1..];
            }
            None => {
                out.push_str(&rest[open..]);
                return decode_entities(&out);
            }
        }
    }
    out.push_str(rest);
    decode_entities(&out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::style::CellRange;

    #[test]
    fn strip_markup_keeps_text_and_breaks() {
        assert_eq!(strip_markup("<td><b>one</b><br/>two</td>"), "one\ntwo");
        assert_eq!(strip_markup("plain"), "plain");
        assert_eq!(strip_markup("<td>a &amp; b</td>"), "a & b");
    }

    #[test]
    fn fixed_leading_height() {
        let fonts = FontManager::default();
        let style = ParaStyle {
            leading: 12.0,
            ..Default::default()
        };
        let para = Paragraph::from_text("one\ntwo\nthree", style);
        let h = para.text_height(500.0, &fonts);
        assert!((h - 36.0).abs() < 0.01);
    }

    #[test]
    fn auto_leading_min_uses_font_extent() {
        let fonts = FontManager::default();
        let style = ParaStyle {
            font_size: 10.0,
            leading: 20.0,
            auto_leading: AutoLeading::Min,
            ..Default::default()
        };
        let para = Paragraph::from_text("line", style);
        // ascent 7.5 − descent (−2.5) = 10pt per line
        assert!((para.text_height(500.0, &fonts) - 10.0).abs() < 0.01);
    }

    #[test]
    fn auto_leading_max_prefers_larger_of_extent_and_leading() {
        let fonts = FontManager::default();
        let style = ParaStyle {
            font_size: 10.0,
            leading: 20.0,
            auto_leading: AutoLeading::Max,
            ..Default::default()
        };
        let para = Paragraph::from_text("line", style);
        assert!((para.text_height(500.0, &fonts) - 20.0).abs() < 0.01);
    }

    #[test]
    fn style_from_commands_applies_in_order() {
        let cmds = vec![
            Command::new(
                CommandKind::FontSize,
                CellRange::new(0, 0, -1, -1),
                CommandArg::Value(8.0),
            ),
            Command::new(
                CommandKind::FontSize,
                CellRange::new(1, 2, 1, 2),
                CommandArg::Value(14.0),
            ),
        ];
        assert_eq!(ParaStyle::from_commands(&cmds, 0, 0).font_size, 8.0);
        assert_eq!(ParaStyle::from_commands(&cmds, 1, 2).font_size, 14.0);
    }

    #[test]
    fn raw_css_parses_paragraph_keys() {
        let mut style = ParaStyle::default();
        style
            .apply_raw_css(
                "font:Helvetica-Bold;size:14;leading:16;align:center",
                Strictness::Lenient,
            )
            .unwrap();
        assert_eq!(style.font_size, 14.0);
        assert_eq!(style.leading, 16.0);
        assert_eq!(style.alignment, HAlign::Center);
        assert!(style.is_bold());
    }
}
