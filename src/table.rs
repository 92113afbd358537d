//! Table data container – rows, commands, continuation header/footer sets,
//! column widths, and row classification, independent of any layout
//! decision.
//!
//! A table owns its ordered rows plus the style command list. Continuation
//! header and footer definitions are shared read-only (`Rc`) between a
//! parent table and the children produced by a split; they are referenced,
//! never copied per split.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::rc::Rc;

use crate::paragraph::Paragraph;
use crate::style::{Command, CommandKind, HAlign, VAlign};

// ---------------------------------------------------------------------------
// Variables
// ---------------------------------------------------------------------------

/// A row variable: either display text or an accumulating number.
#[derive(Debug, Clone, PartialEq)]
pub enum VarValue {
    Str(String),
    Num(f64),
}

impl VarValue {
    pub fn as_num(&self) -> Option<f64> {
        match self {
            VarValue::Num(n) => Some(*n),
            VarValue::Str(s) => s.trim().parse().ok(),
        }
    }
}

impl fmt::Display for VarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VarValue::Str(s) => f.write_str(s),
            VarValue::Num(n) => write!(f, "{n}"),
        }
    }
}

/// Ordered variable map; iteration order is stable for determinism.
pub type VarMap = BTreeMap<String, VarValue>;

/// Substitute `%(name)s` references. Returns `None` when a referenced
/// variable is missing, so callers can fall back to the static text.
pub fn substitute(text: &str, vars: &VarMap) -> Option<String> {
    if !text.contains("%(") {
        return Some(text.to_string());
    }
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find("%(") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(close) = after.find(")s") else {
            out.push_str(&rest[start..]);
            return Some(out);
        };
        let name = &after[..close];
        match vars.get(name) {
            Some(v) => out.push_str(&v.to_string()),
            None => return None,
        }
        rest = &after[close + 2..];
    }
    out.push_str(rest);
    Some(out)
}

// ---------------------------------------------------------------------------
// Rows
// ---------------------------------------------------------------------------

/// Row classification used to fine-tune where a table may split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RowKind {
    #[default]
    Data,
    Header,
    Heading,
    Total,
    Blank,
    Na,
}

impl RowKind {
    pub fn from_attr(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "header" => RowKind::Header,
            "heading" => RowKind::Heading,
            "total" => RowKind::Total,
            "blank" => RowKind::Blank,
            "na" => RowKind::Na,
            _ => RowKind::Data,
        }
    }
}

/// Keep-with-next flag: `Hold` binds a row to the rows that follow it
/// (row spans, minimum top rows); `Start`/`Middle`/`End` mark keep-block
/// membership, where only block boundaries admit a split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeepWithNext {
    #[default]
    None,
    Hold,
    Start,
    Middle,
    End,
}

impl KeepWithNext {
    /// Does this flag forbid a split immediately after its row?
    pub fn blocks_split_after(self) -> bool {
        matches!(
            self,
            KeepWithNext::Hold | KeepWithNext::Start | KeepWithNext::Middle
        )
    }
}

/// Row height: fixed, to be computed from content, or the overflow
/// sentinel (height equals whatever the sole populated cell requires).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum RowHeight {
    #[default]
    Pending,
    Fixed(f32),
    Overflow,
}

/// Image cell payload: a data-URI source with a fixed box.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageCell {
    pub src: String,
    pub width: f32,
    pub height: f32,
}

/// Cell content after row building.
#[derive(Debug, Clone)]
pub enum CellValue {
    /// Spanned-over position or genuinely empty cell.
    Empty,
    /// Plain string, possibly containing `%(name)s` references.
    Text(String),
    Paragraph(Paragraph),
    Table(Box<Table>),
    Image(ImageCell),
    /// Vector graphic placeholder with a fixed box (scaling is external).
    Svg { width: f32, height: f32 },
}

impl CellValue {
    pub fn is_empty(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(t) => t.is_empty(),
            _ => false,
        }
    }
}

/// One table row: cell values plus the per-row metadata the split engine
/// consults.
#[derive(Debug, Clone)]
pub struct Row {
    pub cells: Vec<CellValue>,
    pub height: RowHeight,
    pub variables: VarMap,
    pub kind: RowKind,
    pub nosplit: bool,
    pub keep: KeepWithNext,
}

impl Row {
    pub fn new(cells: Vec<CellValue>) -> Self {
        Self {
            cells,
            height: RowHeight::Pending,
            variables: VarMap::new(),
            kind: RowKind::Data,
            nosplit: false,
            keep: KeepWithNext::None,
        }
    }
}

// ---------------------------------------------------------------------------
// Continuation header/footer sets
// ---------------------------------------------------------------------------

/// Row data and commands for a continuation header or footer, with its own
/// fixed heights. Shared by reference between a table and its split parts.
#[derive(Debug, Clone, Default)]
pub struct RowSet {
    pub rows: Vec<Row>,
    pub commands: Vec<Command>,
    pub heights: Vec<f32>,
}

impl RowSet {
    pub fn total_height(&self) -> f32 {
        self.heights.iter().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows with the given variable snapshot substituted into plain-text
    /// cells. `None` when a referenced variable is missing: the caller
    /// falls back to the static rows as supplied.
    pub fn merged_rows(&self, vars: &VarMap) -> Option<Vec<Row>> {
        let mut out = Vec::with_capacity(self.rows.len());
        for row in &self.rows {
            let mut cells = Vec::with_capacity(row.cells.len());
            for cell in &row.cells {
                match cell {
                    CellValue::Text(t) if !t.is_empty() => {
                        cells.push(CellValue::Text(substitute(t, vars)?));
                    }
                    other => cells.push(other.clone()),
                }
            }
            out.push(Row {
                cells,
                ..row.clone()
            });
        }
        Some(out)
    }

    /// Static copy of the rows, used when no snapshot is available.
    pub fn static_rows(&self) -> Vec<Row> {
        self.rows.clone()
    }
}

// ---------------------------------------------------------------------------
// Column widths
// ---------------------------------------------------------------------------

/// Declared column width: absolute points, a percentage of the leftover
/// space, or unspecified.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum ColWidth {
    #[default]
    Auto,
    Fixed(f32),
    Percent(f32),
}

/// Distribute declared widths over the available table width: fixed widths
/// are taken as-is, percentage columns share the remaining space, and
/// unspecified columns split the leftover percentage equally.
pub fn distribute_col_widths(widths: &[ColWidth], table_width: f32) -> Vec<f32> {
    let mut undefined_count = 0usize;
    let mut defined_percentage = 0.0f32;
    let mut defined_space = 0.0f32;

    for w in widths {
        match w {
            ColWidth::Auto => undefined_count += 1,
            ColWidth::Percent(p) => defined_percentage += p,
            ColWidth::Fixed(pts) => defined_space += pts,
        }
    }

    if undefined_count == 0 && defined_percentage == 0.0 {
        return widths
            .iter()
            .map(|w| match w {
                ColWidth::Fixed(pts) => *pts,
                _ => 0.0,
            })
            .collect();
    }

    let undefined_percentage = if undefined_count > 0 {
        (100.0 - defined_percentage) / undefined_count as f32
    } else {
        0.0
    };
    let available = (table_width - defined_space).max(0.0);
    let per_percent = available / 100.0;

    widths
        .iter()
        .map(|w| match w {
            ColWidth::Fixed(pts) => *pts,
            ColWidth::Percent(p) => p * per_percent,
            ColWidth::Auto => undefined_percentage * per_percent,
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Absolute positioning
// ---------------------------------------------------------------------------

/// Flow-position override resolved against page margins.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AbsolutePos {
    pub x: f32,
    pub y: f32,
    pub x_from_right: bool,
    pub y_from_top: bool,
    pub ignore_margin: bool,
}

// ---------------------------------------------------------------------------
// Table
// ---------------------------------------------------------------------------

/// Hook invoked on each part produced by a split.
pub type OnSplit = dyn Fn(&mut Table);

/// The table container plus its resolved layout state.
#[derive(Clone)]
pub struct Table {
    pub rows: Vec<Row>,
    pub commands: Vec<Command>,
    pub header: Option<Rc<RowSet>>,
    pub footer: Option<Rc<RowSet>>,
    /// Declared column widths, shared (immutable) with split children.
    pub col_widths: Rc<Vec<ColWidth>>,
    /// Initial rows re-shown at the top of every continuation part.
    pub repeat_rows: usize,
    pub min_rows_after_header: usize,
    pub min_rows_before_total: usize,
    pub h_align: HAlign,
    pub v_align: VAlign,
    pub pos: Option<AbsolutePos>,
    /// False for continuation parts: their top rows are inserted headers,
    /// and a split may not land inside that reservation.
    pub initial: bool,
    pub on_split: Option<Rc<OnSplit>>,

    // Layout state, valid after wrap().
    pub(crate) resolved_col_widths: Vec<f32>,
    pub(crate) resolved_row_heights: Vec<f32>,
    pub(crate) width: f32,
    pub(crate) height: f32,
}

impl fmt::Debug for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Table")
            .field("rows", &self.rows.len())
            .field("commands", &self.commands.len())
            .field("repeat_rows", &self.repeat_rows)
            .field("initial", &self.initial)
            .field("width", &self.width)
            .field("height", &self.height)
            .finish()
    }
}

impl Table {
    pub fn empty() -> Self {
        Self {
            rows: Vec::new(),
            commands: Vec::new(),
            header: None,
            footer: None,
            col_widths: Rc::new(Vec::new()),
            repeat_rows: 0,
            min_rows_after_header: 1,
            min_rows_before_total: 1,
            h_align: HAlign::Left,
            v_align: VAlign::Top,
            pos: None,
            initial: true,
            on_split: None,
            resolved_col_widths: Vec::new(),
            resolved_row_heights: Vec::new(),
            width: 0.0,
            height: 0.0,
        }
    }

    pub fn nrows(&self) -> usize {
        self.rows.len()
    }

    /// Column count: the widest row, or the declared widths when wider.
    pub fn ncols(&self) -> usize {
        self.rows
            .iter()
            .map(|r| r.cells.len())
            .max()
            .unwrap_or(0)
            .max(self.col_widths.len())
    }

    /// Pad every row (and the declared widths) to the full column count.
    pub fn normalize(&mut self) {
        let ncols = self.ncols();
        for row in &mut self.rows {
            while row.cells.len() < ncols {
                row.cells.push(CellValue::Empty);
            }
        }
        if self.col_widths.len() < ncols {
            let mut widths = (*self.col_widths).clone();
            widths.resize(ncols, ColWidth::Auto);
            self.col_widths = Rc::new(widths);
        }
    }

    pub fn total_height(&self) -> f32 {
        self.height
    }

    /// Derive NOSPLIT commands from row classification: headers reserve
    /// rows after them, totals reserve rows before them, blank rows forbid
    /// a split immediately before themselves, and explicitly flagged rows
    /// bind to their successor. Split children skip this (their commands
    /// arrive re-projected from the parent).
    pub fn derive_nosplit_commands(&mut self) {
        let mut cmds = Vec::new();
        for (i, row) in self.rows.iter().enumerate() {
            let i = i as i32;
            if row.nosplit {
                cmds.push(Command::nosplit(0, i, -1, i + 1));
                continue;
            }
            match row.kind {
                RowKind::Blank => {
                    if i > 0 {
                        cmds.push(Command::nosplit(0, i - 1, -1, i));
                    }
                }
                RowKind::Header | RowKind::Heading => {
                    cmds.push(Command::nosplit(0, i, -1, i + self.min_rows_after_header as i32));
                }
                RowKind::Total => {
                    let start = (i - self.min_rows_before_total as i32).max(0);
                    cmds.push(Command::nosplit(0, start, -1, i));
                }
                _ => {}
            }
        }
        self.commands.append(&mut cmds);
    }

    /// Resolved SPAN ranges as (start_col, start_row, end_col, end_row).
    pub fn span_ranges(&self) -> Vec<(usize, usize, usize, usize)> {
        let nrows = self.nrows();
        let ncols = self.ncols();
        self.commands
            .iter()
            .filter(|c| c.kind == CommandKind::Span)
            .filter_map(|c| {
                let (sr, er) = c.range.resolved_rows(nrows)?;
                let (sc, ec) = c.range.resolved_cols(ncols);
                Some((sc, sr, ec, er))
            })
            .collect()
    }

    /// Origin cell → full range, for span-aware drawing and measuring.
    pub fn span_origins(&self) -> HashMap<(usize, usize), (usize, usize, usize, usize)> {
        self.span_ranges()
            .into_iter()
            .map(|(sc, sr, ec, er)| ((sr, sc), (sc, sr, ec, er)))
            .collect()
    }

    /// All (row, col) positions covered by a multi-row span. Non-origin
    /// members are unreliable for sizing and skipped when measuring.
    pub fn row_span_cells(&self) -> HashSet<(usize, usize)> {
        let mut set = HashSet::new();
        for (sc, sr, ec, er) in self.span_ranges() {
            if sr == er {
                continue;
            }
            for r in sr..=er {
                for c in sc..=ec {
                    set.insert((r, c));
                }
            }
        }
        set
    }

    /// Row positions where a split is impossible: every row index strictly
    /// inside a span range or a NOSPLIT range. A split index `n` means
    /// "part one holds rows [0, n)", so `n` is impossible when
    /// `start < n <= end` for any protected range.
    pub fn impossible_split_rows(&self) -> HashSet<usize> {
        let nrows = self.nrows();
        let mut impossible = HashSet::new();
        let mut mark = |sr: usize, er: usize| {
            for n in (sr + 1)..=er {
                impossible.insert(n);
            }
        };
        for (_, sr, _, er) in self.span_ranges() {
            mark(sr, er);
        }
        for cmd in &self.commands {
            if cmd.kind != CommandKind::NoSplit {
                continue;
            }
            if let Some((sr, er)) = cmd.range.resolved_rows(nrows) {
                mark(sr, er);
            }
        }
        impossible
    }
}
