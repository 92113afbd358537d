//! Style command model – parses the CSS-like declaration mini-language into
//! cell range commands, and resolves commands into per-cell styles.
//!
//! A command anchors a styling operation to a rectangle of (column, row)
//! coordinates. Row coordinates may be symbolic (`split-first` /
//! `split-last`), resolved to concrete indices only when a table is split.
//! Commands are order-sensitive: later commands override earlier ones for
//! overlapping ranges, and that order is preserved through every split.

use std::collections::HashMap;

use crate::error::{Error, Result};

/// Points per millimetre.
pub const MM: f32 = 2.834_645_7;

// ---------------------------------------------------------------------------
// Colors
// ---------------------------------------------------------------------------

/// RGBA colour (0.0 – 1.0).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const BLACK: Self = Self {
        r: 0.0,
        g: 0.0,
        b: 0.0,
        a: 1.0,
    };
    pub const WHITE: Self = Self {
        r: 1.0,
        g: 1.0,
        b: 1.0,
        a: 1.0,
    };

    pub fn from_hex(hex: &str) -> Option<Self> {
        let hex = hex.trim().trim_start_matches('#');
        if hex.len() == 6 {
            let r = u8::from_str_radix(&hex[0..2], 16).ok()? as f32 / 255.0;
            let g = u8::from_str_radix(&hex[2..4], 16).ok()? as f32 / 255.0;
            let b = u8::from_str_radix(&hex[4..6], 16).ok()? as f32 / 255.0;
            Some(Self { r, g, b, a: 1.0 })
        } else if hex.len() == 3 {
            let r = u8::from_str_radix(&hex[0..1].repeat(2), 16).ok()? as f32 / 255.0;
            let g = u8::from_str_radix(&hex[1..2].repeat(2), 16).ok()? as f32 / 255.0;
            let b = u8::from_str_radix(&hex[2..3].repeat(2), 16).ok()? as f32 / 255.0;
            Some(Self { r, g, b, a: 1.0 })
        } else {
            None
        }
    }

    pub fn rgba(&self) -> [f32; 4] {
        [self.r, self.g, self.b, self.a]
    }
}

/// Parse a hex colour. Invalid values are reportable but non-fatal in
/// lenient mode (fall back to black); strict mode rejects them.
pub fn parse_color(value: &str, strictness: Strictness) -> Result<Color> {
    match Color::from_hex(value) {
        Some(c) => Ok(c),
        None => {
            if strictness == Strictness::Strict {
                Err(Error::Style {
                    declaration: value.to_string(),
                    message: "invalid hex colour".to_string(),
                })
            } else {
                log::warn!("invalid hex colour {value:?}, using black");
                Ok(Color::BLACK)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Units
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    Pt,
    Mm,
}

/// Parse a numeric value with an optional unit suffix (mm, cm, in, pt) into
/// points. Bare numbers take `default_unit`.
pub fn parse_measurement(value: &str, default_unit: Unit) -> Option<f32> {
    let v = value.trim();
    let (num, factor) = if let Some(n) = v.strip_suffix("mm") {
        (n, MM)
    } else if let Some(n) = v.strip_suffix("cm") {
        (n, 10.0 * MM)
    } else if let Some(n) = v.strip_suffix("in") {
        (n, 72.0)
    } else if let Some(n) = v.strip_suffix("pt") {
        (n, 1.0)
    } else {
        let factor = match default_unit {
            Unit::Pt => 1.0,
            Unit::Mm => MM,
        };
        (v, factor)
    };
    num.trim().parse::<f32>().ok().map(|n| n * factor)
}

// ---------------------------------------------------------------------------
// Strictness
// ---------------------------------------------------------------------------

/// Leniency policy for malformed-but-recoverable input. Lenient mode (the
/// default, matching original behaviour) ignores unknown style keys and
/// substitutes black for invalid colours; strict mode rejects both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Strictness {
    #[default]
    Lenient,
    Strict,
}

// ---------------------------------------------------------------------------
// Command model
// ---------------------------------------------------------------------------

/// Row coordinate: a literal index (negative wraps from the end) or a
/// symbolic marker meaning "whichever row ends up first/last after a split".
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RowRef {
    Literal(i32),
    SplitFirst,
    SplitLast,
}

impl RowRef {
    pub fn literal(self) -> Option<i32> {
        match self {
            RowRef::Literal(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_symbolic(self) -> bool {
        !matches!(self, RowRef::Literal(_))
    }
}

/// A (column, row) rectangle a command applies to. End coordinates are
/// inclusive; negative values wrap Python-style (-1 = last).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellRange {
    pub start_col: i32,
    pub start_row: RowRef,
    pub end_col: i32,
    pub end_row: RowRef,
}

impl CellRange {
    pub fn new(start_col: i32, start_row: i32, end_col: i32, end_row: i32) -> Self {
        Self {
            start_col,
            start_row: RowRef::Literal(start_row),
            end_col,
            end_row: RowRef::Literal(end_row),
        }
    }

    /// Resolve columns against the table width, clamped to valid indices.
    pub fn resolved_cols(&self, ncols: usize) -> (usize, usize) {
        (
            resolve_index(self.start_col, ncols),
            resolve_index(self.end_col, ncols),
        )
    }

    /// Resolve rows against the table length; `None` when either row is
    /// symbolic (not applicable outside split materialisation).
    pub fn resolved_rows(&self, nrows: usize) -> Option<(usize, usize)> {
        match (self.start_row, self.end_row) {
            (RowRef::Literal(s), RowRef::Literal(e)) => {
                Some((resolve_index(s, nrows), resolve_index(e, nrows)))
            }
            _ => None,
        }
    }
}

pub(crate) fn resolve_index(v: i32, n: usize) -> usize {
    let n = n as i32;
    let r = if v < 0 { v + n } else { v };
    r.clamp(0, (n - 1).max(0)) as usize
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Span,
    NoSplit,
    Box,
    Outline,
    Grid,
    InnerGrid,
    LineAbove,
    LineBelow,
    LineBefore,
    LineAfter,
    TextColor,
    Background,
    Align,
    VAlign,
    Font,
    FontSize,
    Leading,
    LeftPadding,
    RightPadding,
    TopPadding,
    BottomPadding,
}

impl CommandKind {
    /// Line-drawing commands get their ranges re-synthesised at a split seam.
    pub fn is_line(self) -> bool {
        matches!(
            self,
            CommandKind::Box
                | CommandKind::Outline
                | CommandKind::Grid
                | CommandKind::InnerGrid
                | CommandKind::LineAbove
                | CommandKind::LineBelow
                | CommandKind::LineBefore
                | CommandKind::LineAfter
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HAlign {
    Left,
    Center,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VAlign {
    Top,
    Middle,
    Bottom,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CommandArg {
    None,
    Color(Color),
    Name(String),
    Value(f32),
    HAlign(HAlign),
    VAlign(VAlign),
    Line { weight: f32, color: Color },
}

/// A single styling command: kind + cell range + argument.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub kind: CommandKind,
    pub range: CellRange,
    pub arg: CommandArg,
}

impl Command {
    pub fn new(kind: CommandKind, range: CellRange, arg: CommandArg) -> Self {
        Self { kind, range, arg }
    }

    pub fn span(start_col: i32, start_row: i32, end_col: i32, end_row: i32) -> Self {
        Self::new(
            CommandKind::Span,
            CellRange::new(start_col, start_row, end_col, end_row),
            CommandArg::None,
        )
    }

    pub fn nosplit(start_col: i32, start_row: i32, end_col: i32, end_row: i32) -> Self {
        Self::new(
            CommandKind::NoSplit,
            CellRange::new(start_col, start_row, end_col, end_row),
            CommandArg::None,
        )
    }

    pub fn line_weight(&self) -> f32 {
        match &self.arg {
            CommandArg::Line { weight, .. } => *weight,
            _ => 1.0,
        }
    }

    pub fn line_color(&self) -> Color {
        match &self.arg {
            CommandArg::Line { color, .. } => *color,
            _ => Color::BLACK,
        }
    }
}

/// Row-level styles that are not range commands; consulted once per row.
#[derive(Debug, Clone, Default)]
pub struct OtherStyles {
    /// Explicit row height in points.
    pub row_height: Option<f32>,
}

impl OtherStyles {
    pub fn merge_height(&self, fallback: &OtherStyles) -> Option<f32> {
        self.row_height.or(fallback.row_height)
    }
}

// ---------------------------------------------------------------------------
// Declaration parsing
// ---------------------------------------------------------------------------

/// Parse a semicolon-separated declaration string, appending commands
/// anchored at `range`. Unknown keys are ignored in lenient mode; a
/// declaration missing its `:` separator is always fatal.
pub fn parse_declarations(
    css: &str,
    range: CellRange,
    commands: &mut Vec<Command>,
    other: &mut OtherStyles,
    strictness: Strictness,
) -> Result<()> {
    for decl in css.split(';') {
        let decl = decl.trim_matches(|c: char| c.is_whitespace());
        if decl.is_empty() {
            continue;
        }
        let (key, value) = match decl.split_once(':') {
            Some((k, v)) => (k, v.trim()),
            None => {
                return Err(Error::Style {
                    declaration: decl.to_string(),
                    message: "missing ':' separator".to_string(),
                })
            }
        };
        let key = key.trim().to_ascii_lowercase().replace('-', "_");

        match key.as_str() {
            "inner_grid" | "box" | "outline" | "grid" | "line_above" | "line_below"
            | "line_before" | "line_after" => {
                let kind = match key.as_str() {
                    "inner_grid" => CommandKind::InnerGrid,
                    "box" => CommandKind::Box,
                    "outline" => CommandKind::Outline,
                    "grid" => CommandKind::Grid,
                    "line_above" => CommandKind::LineAbove,
                    "line_below" => CommandKind::LineBelow,
                    "line_before" => CommandKind::LineBefore,
                    _ => CommandKind::LineAfter,
                };
                commands.push(parse_line_command(kind, value, range, strictness)?);
            }
            "text_color" => {
                let color = parse_color(value, strictness)?;
                commands.push(Command::new(
                    CommandKind::TextColor,
                    range,
                    CommandArg::Color(color),
                ));
            }
            "background" => {
                let color = parse_color(value, strictness)?;
                commands.push(Command::new(
                    CommandKind::Background,
                    range,
                    CommandArg::Color(color),
                ));
            }
            "halign" | "align" | "alignment" => {
                let halign = match value.to_ascii_lowercase().as_str() {
                    "center" | "centre" => HAlign::Center,
                    "right" => HAlign::Right,
                    _ => HAlign::Left,
                };
                commands.push(Command::new(
                    CommandKind::Align,
                    range,
                    CommandArg::HAlign(halign),
                ));
            }
            "valign" => {
                let valign = match value.to_ascii_lowercase().as_str() {
                    "middle" | "center" | "centre" => VAlign::Middle,
                    "bottom" => VAlign::Bottom,
                    _ => VAlign::Top,
                };
                commands.push(Command::new(
                    CommandKind::VAlign,
                    range,
                    CommandArg::VAlign(valign),
                ));
            }
            "font" | "face" | "font_name" => {
                commands.push(Command::new(
                    CommandKind::Font,
                    range,
                    CommandArg::Name(value.to_string()),
                ));
            }
            "left_padding" | "right_padding" | "top_padding" | "bottom_padding" => {
                let kind = match key.as_str() {
                    "left_padding" => CommandKind::LeftPadding,
                    "right_padding" => CommandKind::RightPadding,
                    "top_padding" => CommandKind::TopPadding,
                    _ => CommandKind::BottomPadding,
                };
                let pts = parse_number(value, &key, Unit::Mm)?;
                commands.push(Command::new(kind, range, CommandArg::Value(pts)));
            }
            "font_size" | "size" => {
                let pts = parse_number(value, &key, Unit::Pt)?;
                commands.push(Command::new(
                    CommandKind::FontSize,
                    range,
                    CommandArg::Value(pts),
                ));
            }
            "leading" => {
                let pts = parse_number(value, &key, Unit::Pt)?;
                commands.push(Command::new(
                    CommandKind::Leading,
                    range,
                    CommandArg::Value(pts),
                ));
            }
            "row_height" => {
                other.row_height = Some(parse_number(value, &key, Unit::Mm)?);
            }
            _ => {
                if strictness == Strictness::Strict {
                    return Err(Error::Style {
                        declaration: decl.to_string(),
                        message: format!("unknown style key {key:?}"),
                    });
                }
                log::debug!("ignoring unknown style key {key:?}");
            }
        }
    }
    Ok(())
}

fn parse_number(value: &str, key: &str, unit: Unit) -> Result<f32> {
    parse_measurement(value, unit).ok_or_else(|| Error::Style {
        declaration: format!("{key}:{value}"),
        message: "expected a number".to_string(),
    })
}

/// Line commands take a comma list: `weight[,color[,start_row[,end_row]]]`.
/// A row argument re-anchors the command to full-width rows.
fn parse_line_command(
    kind: CommandKind,
    value: &str,
    range: CellRange,
    strictness: Strictness,
) -> Result<Command> {
    let details: Vec<&str> = value.split(',').map(|s| s.trim()).collect();
    let weight = parse_number(details[0], "line weight", Unit::Pt)?;
    let color = if details.len() > 1 {
        parse_color(details[1], strictness)?
    } else {
        Color::BLACK
    };
    let range = if details.len() > 3 {
        let start = parse_number(details[2], "line start row", Unit::Pt)? as i32;
        let end = parse_number(details[3], "line end row", Unit::Pt)? as i32;
        CellRange::new(0, start, -1, end)
    } else if details.len() > 2 {
        let start = parse_number(details[2], "line start row", Unit::Pt)? as i32;
        CellRange {
            start_col: 0,
            start_row: RowRef::Literal(start),
            end_col: range.end_col,
            end_row: range.end_row,
        }
    } else {
        range
    };
    Ok(Command::new(kind, range, CommandArg::Line { weight, color }))
}

// ---------------------------------------------------------------------------
// Style classes (`<style>` element blocks)
// ---------------------------------------------------------------------------

/// Named declaration blocks registered by `<style>` elements, looked up via
/// `class` attributes.
pub type StyleClasses = HashMap<String, String>;

/// Parse `name { key:value; ... }` blocks from a `<style>` element's text.
pub fn parse_style_classes(text: &str, classes: &mut StyleClasses) {
    let mut rest = text;
    loop {
        let Some(open) = rest.find('{') else { break };
        let name = rest[..open].trim().to_string();
        let Some(close) = rest[open..].find('}') else {
            break;
        };
        let body = rest[open + 1..open + close].trim().to_string();
        if !name.is_empty() && name.chars().all(|c| c.is_alphanumeric() || c == '_') {
            classes.insert(name, body);
        }
        rest = &rest[open + close + 1..];
    }
}

/// Combined declaration text for an element: its `class` lookup (if
/// registered) followed by its inline `style` attribute. Attribute names are
/// parameterised so overflow continuation styling can reuse this.
pub fn css_for_element(
    attrs: &HashMap<String, String>,
    classes: &StyleClasses,
    style_attr: &str,
    class_attr: &str,
) -> String {
    let mut css = String::new();
    if let Some(class) = attrs.get(class_attr) {
        if let Some(body) = classes.get(class) {
            css.push_str(body);
            if !css.ends_with(';') && !css.is_empty() {
                css.push(';');
            }
        }
    }
    if let Some(style) = attrs.get(style_attr) {
        css.push_str(style);
    }
    css
}

// ---------------------------------------------------------------------------
// Per-cell style resolution
// ---------------------------------------------------------------------------

/// Fully resolved style for one cell, produced by applying commands in order.
#[derive(Debug, Clone, PartialEq)]
pub struct CellStyle {
    pub font_name: String,
    pub font_size: f32,
    pub leading: f32,
    pub text_color: Color,
    pub background: Option<Color>,
    pub halign: HAlign,
    pub valign: VAlign,
    pub left_padding: f32,
    pub right_padding: f32,
    pub top_padding: f32,
    pub bottom_padding: f32,
}

impl Default for CellStyle {
    fn default() -> Self {
        Self {
            font_name: "Helvetica".to_string(),
            font_size: 10.0,
            leading: 12.0,
            text_color: Color::BLACK,
            background: None,
            halign: HAlign::Left,
            valign: VAlign::Top,
            left_padding: 6.0,
            right_padding: 6.0,
            top_padding: 3.0,
            bottom_padding: 3.0,
        }
    }
}

/// Apply all cell-styling commands in order, producing a per-cell grid.
/// Symbolic row references and line/span commands are skipped here; ranges
/// are clamped so commands referring to rows lost in a split are harmless.
pub fn resolve_cell_styles(commands: &[Command], ncols: usize, nrows: usize) -> Vec<Vec<CellStyle>> {
    let mut grid = vec![vec![CellStyle::default(); ncols]; nrows];
    if ncols == 0 || nrows == 0 {
        return grid;
    }
    for cmd in commands {
        if cmd.kind.is_line() || matches!(cmd.kind, CommandKind::Span | CommandKind::NoSplit) {
            continue;
        }
        let Some((sr, er)) = cmd.range.resolved_rows(nrows) else {
            continue;
        };
        let (sc, ec) = cmd.range.resolved_cols(ncols);
        for row in grid.iter_mut().take(er + 1).skip(sr) {
            for cell in row.iter_mut().take(ec + 1).skip(sc) {
                apply_to_cell(cmd, cell);
            }
        }
    }
    grid
}

fn apply_to_cell(cmd: &Command, cell: &mut CellStyle) {
    match (cmd.kind, &cmd.arg) {
        (CommandKind::TextColor, CommandArg::Color(c)) => cell.text_color = *c,
        (CommandKind::Background, CommandArg::Color(c)) => cell.background = Some(*c),
        (CommandKind::Align, CommandArg::HAlign(a)) => cell.halign = *a,
        (CommandKind::VAlign, CommandArg::VAlign(a)) => cell.valign = *a,
        (CommandKind::Font, CommandArg::Name(n)) => cell.font_name = n.clone(),
        (CommandKind::FontSize, CommandArg::Value(v)) => cell.font_size = *v,
        (CommandKind::Leading, CommandArg::Value(v)) => cell.leading = *v,
        (CommandKind::LeftPadding, CommandArg::Value(v)) => cell.left_padding = *v,
        (CommandKind::RightPadding, CommandArg::Value(v)) => cell.right_padding = *v,
        (CommandKind::TopPadding, CommandArg::Value(v)) => cell.top_padding = *v,
        (CommandKind::BottomPadding, CommandArg::Value(v)) => cell.bottom_padding = *v,
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_range() -> CellRange {
        CellRange::new(0, 0, -1, -1)
    }

    #[test]
    fn parse_background_and_color() {
        let mut cmds = Vec::new();
        let mut other = OtherStyles::default();
        parse_declarations(
            "background:#e3e3e3;text_color:#721472",
            full_range(),
            &mut cmds,
            &mut other,
            Strictness::Lenient,
        )
        .unwrap();
        assert_eq!(cmds.len(), 2);
        assert_eq!(cmds[0].kind, CommandKind::Background);
        assert_eq!(cmds[1].kind, CommandKind::TextColor);
    }

    #[test]
    fn missing_separator_is_fatal() {
        let mut cmds = Vec::new();
        let mut other = OtherStyles::default();
        let err = parse_declarations(
            "background #fff",
            full_range(),
            &mut cmds,
            &mut other,
            Strictness::Lenient,
        );
        assert!(matches!(err, Err(Error::Style { .. })));
    }

    #[test]
    fn unknown_key_ignored_when_lenient() {
        let mut cmds = Vec::new();
        let mut other = OtherStyles::default();
        parse_declarations(
            "wibble:1;size:12",
            full_range(),
            &mut cmds,
            &mut other,
            Strictness::Lenient,
        )
        .unwrap();
        assert_eq!(cmds.len(), 1);
    }

    #[test]
    fn unknown_key_rejected_when_strict() {
        let mut cmds = Vec::new();
        let mut other = OtherStyles::default();
        let err = parse_declarations(
            "wibble:1",
            full_range(),
            &mut cmds,
            &mut other,
            Strictness::Strict,
        );
        assert!(err.is_err());
    }

    #[test]
    fn row_height_feeds_side_channel() {
        let mut cmds = Vec::new();
        let mut other = OtherStyles::default();
        parse_declarations(
            "row_height:10",
            full_range(),
            &mut cmds,
            &mut other,
            Strictness::Lenient,
        )
        .unwrap();
        assert!(cmds.is_empty());
        assert!((other.row_height.unwrap() - 10.0 * MM).abs() < 1e-4);
    }

    #[test]
    fn line_command_with_rows() {
        let mut cmds = Vec::new();
        let mut other = OtherStyles::default();
        parse_declarations(
            "line_below:1,#000000,2,5",
            full_range(),
            &mut cmds,
            &mut other,
            Strictness::Lenient,
        )
        .unwrap();
        assert_eq!(cmds.len(), 1);
        assert_eq!(cmds[0].kind, CommandKind::LineBelow);
        assert_eq!(cmds[0].range.start_row, RowRef::Literal(2));
        assert_eq!(cmds[0].range.end_row, RowRef::Literal(5));
        assert_eq!(cmds[0].range.end_col, -1);
    }

    #[test]
    fn invalid_hex_falls_back_to_black() {
        let c = parse_color("#zzzzzz", Strictness::Lenient).unwrap();
        assert_eq!(c, Color::BLACK);
        assert!(parse_color("#zzzzzz", Strictness::Strict).is_err());
    }

    #[test]
    fn unit_suffixes() {
        assert!((parse_measurement("10mm", Unit::Pt).unwrap() - 10.0 * MM).abs() < 1e-4);
        assert!((parse_measurement("1cm", Unit::Pt).unwrap() - 10.0 * MM).abs() < 1e-3);
        assert!((parse_measurement("1in", Unit::Pt).unwrap() - 72.0).abs() < 1e-4);
        assert!((parse_measurement("12", Unit::Pt).unwrap() - 12.0).abs() < 1e-4);
    }

    #[test]
    fn style_class_blocks() {
        let mut classes = StyleClasses::new();
        parse_style_classes(
            "heading { background:#cccccc; size:12 }\nbody_cell { size:8 }",
            &mut classes,
        );
        assert_eq!(classes.len(), 2);
        assert!(classes["heading"].contains("background"));
    }

    #[test]
    fn later_commands_override_earlier() {
        let cmds = vec![
            Command::new(
                CommandKind::FontSize,
                CellRange::new(0, 0, -1, -1),
                CommandArg::Value(8.0),
            ),
            Command::new(
                CommandKind::FontSize,
                CellRange::new(0, 1, 0, 1),
                CommandArg::Value(14.0),
            ),
        ];
        let grid = resolve_cell_styles(&cmds, 2, 3);
        assert_eq!(grid[0][0].font_size, 8.0);
        assert_eq!(grid[1][0].font_size, 14.0);
        assert_eq!(grid[1][1].font_size, 8.0);
    }

    #[test]
    fn negative_indices_wrap() {
        let range = CellRange::new(0, -2, -1, -1);
        assert_eq!(range.resolved_rows(5), Some((3, 4)));
        assert_eq!(range.resolved_cols(4), (0, 3));
    }
}
