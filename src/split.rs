//! Split-point engine – decides where a table may legally break across a
//! page boundary and materialises the two parts.
//!
//! The search walks rows from the top accumulating height and records the
//! latest boundary that is not inside a protected region (span interiors,
//! NOSPLIT ranges, keep-with-next rows, the continuation-header
//! reservation). Materialisation produces two fresh tables: part one takes
//! the leading rows plus the continuation footer (with the variable
//! snapshot of its last row substituted in); part two takes any repeat-row
//! prefix, the continuation header (snapshot from just before the split),
//! and the remaining rows. Every command is re-projected onto the new row
//! numbering, and box-like line commands straddling the seam are
//! decomposed into per-fragment edges.

use crate::measure::FUZZ;
use crate::style::{CellRange, Command, CommandArg, CommandKind, RowRef};
use crate::table::{KeepWithNext, Row, RowHeight, RowKind, RowSet, Table, VarMap};

/// Result of asking a measured table to fit `avail_height`.
#[derive(Debug)]
pub enum SplitOutcome {
    /// The whole table fits; nothing to do.
    Fits,
    /// No legal split point exists within the available height. The caller
    /// must treat the table as atomic (usually forcing a page break first).
    CannotSplit,
    Split {
        first: Table,
        second: Table,
        /// Set when a trailing blank row was dropped: an explicit page
        /// break must separate the parts.
        page_break: bool,
    },
}

/// Best (latest legal) split boundary: the number of rows in part one.
/// Returns 0 when no legal boundary fits. The table must be measured.
pub fn best_split_row(table: &Table, avail_height: f32) -> usize {
    let impossible = table.impossible_split_rows();
    let footer_height = table.footer.as_deref().map_or(0.0, RowSet::total_height);
    let header_count = table.header.as_deref().map_or(0, |h| h.heights.len());

    let mut h = 0.0f32;
    let mut split_at = 0usize;
    for (i, rh) in table.resolved_row_heights.iter().enumerate() {
        if h + rh > avail_height - footer_height + FUZZ {
            break;
        }
        let n = i + 1;
        let past_header_reservation = table.initial || i > header_count;
        if past_header_reservation
            && !impossible.contains(&n)
            && !table.rows[i].keep.blocks_split_after()
        {
            split_at = n;
        }
        h += rh;
    }
    split_at
}

/// Split a measured table to fit `avail_height`.
pub fn split_to_fit(table: &Table, avail_height: f32) -> SplitOutcome {
    if table.total_height() <= avail_height + FUZZ {
        return SplitOutcome::Fits;
    }
    let n = best_split_row(table, avail_height);
    if n == 0 || n <= table.repeat_rows {
        return SplitOutcome::CannotSplit;
    }
    if n == table.nrows() {
        return SplitOutcome::Fits;
    }
    let (first, second, page_break) = materialize_split(table, n);
    SplitOutcome::Split {
        first,
        second,
        page_break,
    }
}

// ---------------------------------------------------------------------------
// Materialisation
// ---------------------------------------------------------------------------

fn materialize_split(table: &Table, n: usize) -> (Table, Table, bool) {
    let nrows = table.nrows() as i32;
    let ncols = table.ncols() as i32;
    let repeat_rows = table.repeat_rows;

    // A trailing blank row may not end a page: drop it and force an
    // explicit page break between the parts instead.
    let mut insert_pagebreak = false;
    let mut r0_end = n;
    if table.rows[n - 1].kind == RowKind::Blank {
        insert_pagebreak = true;
        r0_end = n - 1;
    }

    let munged = munge_line_commands(&table.commands, n as i32, ncols, nrows);

    // ── Part one: leading rows + continuation footer ──────────────────────
    let mut first = child_table(table);
    first.rows = table.rows[..r0_end].to_vec();
    if let Some(footer) = &table.footer {
        let snapshot = r0_end
            .checked_sub(1)
            .and_then(|i| table.rows.get(i))
            .map(|r| r.variables.clone())
            .unwrap_or_default();
        first.rows.extend(continuation_rows(footer, &snapshot));
    }
    first.commands = cr_0(n as i32, nrows, &munged);
    if let Some(footer) = &table.footer {
        first
            .commands
            .extend(add_offset(r0_end as i32, &footer.commands));
    }

    // ── Part two: repeat rows + continuation header + remainder ───────────
    let mut second = child_table(table);
    second.header = table.header.clone();
    second.footer = table.footer.clone();

    let header_rows = match &table.header {
        Some(header) => {
            let snapshot = table.rows[n - 1].variables.clone();
            continuation_rows(header, &snapshot)
        }
        None => Vec::new(),
    };
    let header_count = header_rows.len();

    for row in &table.rows[..repeat_rows.min(table.rows.len())] {
        let mut repeat = row.clone();
        repeat.variables = VarMap::new();
        repeat.kind = RowKind::Data;
        repeat.keep = KeepWithNext::None;
        second.rows.push(repeat);
    }
    second.rows.extend(header_rows);
    second.rows.extend(table.rows[n..].iter().cloned());

    second.commands = if repeat_rows > 0 || header_count > 0 {
        cr_1_1(n as i32, repeat_rows as i32, header_count as i32, &munged)
    } else {
        cr_1_0(n as i32, &munged)
    };
    if header_count > 0 {
        if let Some(header) = &table.header {
            second
                .commands
                .extend(add_offset(repeat_rows as i32, &header.commands));
        }
    }

    if let Some(hook) = &table.on_split {
        hook(&mut first);
        hook(&mut second);
    }

    (first, second, insert_pagebreak)
}

/// A fresh unmeasured child sharing identity with the parent: column
/// widths by reference, alignment, limits, repeat count. Children never
/// re-derive NOSPLIT commands; theirs arrive re-projected.
fn child_table(table: &Table) -> Table {
    let mut child = Table::empty();
    child.col_widths = table.col_widths.clone();
    child.repeat_rows = table.repeat_rows;
    child.min_rows_after_header = table.min_rows_after_header;
    child.min_rows_before_total = table.min_rows_before_total;
    child.h_align = table.h_align;
    child.v_align = table.v_align;
    child.on_split = table.on_split.clone();
    child.initial = false;
    child
}

/// Continuation header/footer rows with the variable snapshot substituted
/// in; a missing variable falls back to the static rows as supplied.
fn continuation_rows(set: &RowSet, snapshot: &VarMap) -> Vec<Row> {
    let rows = set
        .merged_rows(snapshot)
        .unwrap_or_else(|| set.static_rows());
    rows.into_iter()
        .zip(set.heights.iter().copied())
        .map(|(mut row, height)| {
            row.height = RowHeight::Fixed(height);
            row.variables = VarMap::new();
            row.kind = RowKind::Heading;
            row.nosplit = true;
            row.keep = KeepWithNext::None;
            row
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Command re-projection
// ---------------------------------------------------------------------------

fn lit(r: RowRef) -> Option<i32> {
    r.literal()
}

fn with_rows(cmd: &Command, sr: i32, er: i32) -> Command {
    Command {
        kind: cmd.kind,
        range: CellRange {
            start_col: cmd.range.start_col,
            start_row: RowRef::Literal(sr),
            end_col: cmd.range.end_col,
            end_row: RowRef::Literal(er),
        },
        arg: cmd.arg.clone(),
    }
}

fn line(kind: CommandKind, sc: i32, sr: i32, ec: i32, er: i32, arg: &CommandArg) -> Command {
    Command {
        kind,
        range: CellRange::new(sc, sr, ec, er),
        arg: arg.clone(),
    }
}

/// Re-synthesise line commands around a split at `n`. Symbolic row markers
/// are resolved for this split (`split-last` → n−1, `split-first` → n)
/// while the symbolic command itself is retained for future splits.
/// Box-like commands straddling the seam are decomposed into their four
/// edges per fragment; GRID additionally closes the seam on both sides and
/// re-issues an inner grid.
fn munge_line_commands(commands: &[Command], n: i32, ncols: i32, nrows: i32) -> Vec<Command> {
    let mut out = Vec::with_capacity(commands.len());
    for cmd in commands {
        if !cmd.kind.is_line() {
            out.push(cmd.clone());
            continue;
        }
        let (mut sr, mut er) = match (lit(cmd.range.start_row), lit(cmd.range.end_row)) {
            (Some(sr), Some(er)) => (sr, er),
            _ => {
                match cmd.range.start_row {
                    RowRef::SplitFirst | RowRef::SplitLast => {
                        // Keep the symbolic command for later splits.
                        out.push(Command {
                            kind: cmd.kind,
                            range: CellRange {
                                start_col: cmd.range.start_col,
                                start_row: cmd.range.start_row,
                                end_col: cmd.range.end_col,
                                end_row: cmd.range.start_row,
                            },
                            arg: cmd.arg.clone(),
                        });
                        let row = match cmd.range.start_row {
                            RowRef::SplitLast => n - 1,
                            _ => n,
                        };
                        (row, row)
                    }
                    _ => {
                        out.push(cmd.clone());
                        continue;
                    }
                }
            }
        };
        let mut sc = cmd.range.start_col;
        let mut ec = cmd.range.end_col;
        if sc < 0 {
            sc += ncols;
        }
        if ec < 0 {
            ec += ncols;
        }
        if sr < 0 {
            sr += nrows;
        }
        if er < 0 {
            er += nrows;
        }

        let arg = &cmd.arg;
        match cmd.kind {
            CommandKind::Box | CommandKind::Outline | CommandKind::Grid => {
                if sr < n && n <= er {
                    out.push(line(CommandKind::LineAbove, sc, sr, ec, sr, arg));
                    out.push(line(CommandKind::LineBefore, sc, sr, sc, er, arg));
                    out.push(line(CommandKind::LineAfter, ec, sr, ec, er, arg));
                    out.push(line(CommandKind::LineBelow, sc, er, ec, er, arg));
                    if cmd.kind == CommandKind::Grid {
                        out.push(line(CommandKind::LineBelow, sc, n - 1, ec, n - 1, arg));
                        out.push(line(CommandKind::LineAbove, sc, n, ec, n, arg));
                        out.push(line(CommandKind::InnerGrid, sc, sr, ec, er, arg));
                    }
                } else {
                    out.push(with_rows(cmd, sr, er));
                }
            }
            CommandKind::InnerGrid | CommandKind::LineAbove => {
                if sr < n && n <= er {
                    out.push(line(CommandKind::LineBelow, sc, n - 1, ec, n - 1, arg));
                    out.push(line(CommandKind::LineAbove, sc, n, ec, n, arg));
                }
                out.push(with_rows(cmd, sr, er));
            }
            CommandKind::LineBelow => {
                if sr < n && er >= n - 1 {
                    out.push(line(CommandKind::LineAbove, sc, n, ec, n, arg));
                }
                out.push(with_rows(cmd, sr, er));
            }
            _ => out.push(with_rows(cmd, sr, er)),
        }
    }
    out
}

/// Renumber commands for part one: keep whatever starts before `n`,
/// clipping ranges at the boundary. Negative rows resolve against the
/// original row count first so "-1 = last row" does not leak onto the
/// spliced footer rows.
fn cr_0(n: i32, nrows: i32, commands: &[Command]) -> Vec<Command> {
    let mut out = Vec::new();
    for cmd in commands {
        let (Some(mut sr), Some(mut er)) = (lit(cmd.range.start_row), lit(cmd.range.end_row))
        else {
            out.push(cmd.clone());
            continue;
        };
        if sr < 0 {
            sr += nrows;
        }
        if er < 0 {
            er += nrows;
        }
        if sr >= n {
            continue;
        }
        if er >= n {
            er = n - 1;
        }
        out.push(with_rows(cmd, sr, er));
    }
    out
}

/// Renumber commands for part two when repeat rows and/or continuation
/// header rows are spliced in front of the remainder. Commands entirely
/// inside the removed range (and outside the repeat prefix) are dropped;
/// the rest shift by `repeat + header − n`, with boundary rows clamped to
/// the first remainder row. Negative coordinates stay relative to the end
/// and need no renumbering.
fn cr_1_1(n: i32, repeat_rows: i32, header_rows: i32, commands: &[Command]) -> Vec<Command> {
    let mut out = Vec::new();
    for cmd in commands {
        let (Some(mut sr), Some(mut er)) = (lit(cmd.range.start_row), lit(cmd.range.end_row))
        else {
            out.push(cmd.clone());
            continue;
        };
        if (0..n).contains(&sr) && sr >= repeat_rows && (0..n).contains(&er) {
            continue;
        }
        if repeat_rows <= sr && sr < n {
            sr = repeat_rows + header_rows;
        } else if sr >= repeat_rows && sr >= n {
            sr = sr + repeat_rows + header_rows - n;
        }
        if repeat_rows <= er && er < n {
            er = repeat_rows + header_rows;
        } else if er >= repeat_rows && er >= n {
            er = er + repeat_rows + header_rows - n;
        }
        out.push(with_rows(cmd, sr, er));
    }
    out
}

/// Renumber commands for part two in the plain case (no repeat rows, no
/// continuation header): shift everything up by `n`.
fn cr_1_0(n: i32, commands: &[Command]) -> Vec<Command> {
    let mut out = Vec::new();
    for cmd in commands {
        let (Some(mut sr), Some(mut er)) = (lit(cmd.range.start_row), lit(cmd.range.end_row))
        else {
            out.push(cmd.clone());
            continue;
        };
        if er >= 0 && er < n {
            continue;
        }
        if sr >= 0 && sr < n {
            sr = 0;
        } else if sr >= n {
            sr -= n;
        }
        if er >= n {
            er -= n;
        }
        out.push(with_rows(cmd, sr, er));
    }
    out
}

/// Shift literal row coordinates by a fixed offset; used to splice
/// header/footer command sets after the rows they follow.
fn add_offset(offset: i32, commands: &[Command]) -> Vec<Command> {
    commands
        .iter()
        .map(|cmd| {
            let (Some(sr), Some(er)) = (lit(cmd.range.start_row), lit(cmd.range.end_row)) else {
                return cmd.clone();
            };
            with_rows(cmd, sr + offset, er + offset)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fonts::FontManager;
    use crate::measure::{resolve_table_layout, MeasureCtx};
    use crate::style::{Color, Strictness};
    use crate::table::{CellValue, VarValue};
    use std::rc::Rc;

    fn measured(mut table: Table) -> Table {
        let fonts = FontManager::default();
        let ctx = MeasureCtx {
            fonts: &fonts,
            strictness: Strictness::Lenient,
            tolerate_bounds_errors: false,
        };
        resolve_table_layout(&mut table, 400.0, &ctx).unwrap();
        table
    }

    fn fixed_rows(heights: &[f32]) -> Vec<Row> {
        heights
            .iter()
            .enumerate()
            .map(|(i, h)| {
                let mut row = Row::new(vec![CellValue::Text(format!("row {i}"))]);
                row.height = RowHeight::Fixed(*h);
                row
            })
            .collect()
    }

    fn plain_table(heights: &[f32]) -> Table {
        let mut t = Table::empty();
        t.rows = fixed_rows(heights);
        measured(t)
    }

    fn data_texts(table: &Table) -> Vec<String> {
        table
            .rows
            .iter()
            .filter(|r| r.kind != RowKind::Heading)
            .map(|r| match &r.cells[0] {
                CellValue::Text(t) => t.clone(),
                _ => String::new(),
            })
            .collect()
    }

    #[test]
    fn greedy_maximal_fill() {
        let t = plain_table(&[10.0, 10.0, 10.0, 10.0]);
        assert_eq!(best_split_row(&t, 25.0), 2);
    }

    #[test]
    fn basic_split_scenario() {
        let t = plain_table(&[10.0; 5]);
        match split_to_fit(&t, 22.0) {
            SplitOutcome::Split {
                first,
                second,
                page_break,
            } => {
                assert_eq!(first.rows.len(), 2);
                assert_eq!(second.rows.len(), 3);
                assert!(!page_break);
                assert_eq!(data_texts(&second), vec!["row 2", "row 3", "row 4"]);
            }
            other => panic!("expected split, got {other:?}"),
        }
    }

    #[test]
    fn span_blocks_split() {
        let mut t = Table::empty();
        t.rows = fixed_rows(&[5.0; 5]);
        t.commands.push(Command::span(0, 1, 0, 3));
        let t = measured(t);
        // The height-limited boundary would be 3 (15pt), but rows 2 and 3
        // are inside the span, so the engine falls back to 1.
        assert_eq!(best_split_row(&t, 17.0), 1);
    }

    #[test]
    fn no_split_index_inside_span() {
        let mut t = Table::empty();
        t.rows = fixed_rows(&[5.0; 6]);
        t.commands.push(Command::span(0, 1, 0, 3));
        let t = measured(t);
        for avail in [6, 11, 16, 21, 26] {
            let n = best_split_row(&t, avail as f32);
            assert!(
                !(1 < n && n <= 3),
                "split {n} with avail {avail} falls inside span"
            );
        }
    }

    #[test]
    fn idempotent_split_when_table_fits() {
        let t = plain_table(&[10.0; 5]);
        assert!(matches!(split_to_fit(&t, 50.0), SplitOutcome::Fits));
        assert!(matches!(split_to_fit(&t, 500.0), SplitOutcome::Fits));
    }

    #[test]
    fn cannot_split_when_nothing_fits() {
        let t = plain_table(&[10.0; 5]);
        assert!(matches!(split_to_fit(&t, 5.0), SplitOutcome::CannotSplit));
    }

    #[test]
    fn row_conservation() {
        let t = plain_table(&[10.0; 7]);
        let SplitOutcome::Split { first, second, .. } = split_to_fit(&t, 32.0) else {
            panic!("expected split");
        };
        let mut all = data_texts(&first);
        all.extend(data_texts(&second));
        let expected: Vec<String> = (0..7).map(|i| format!("row {i}")).collect();
        assert_eq!(all, expected);
    }

    #[test]
    fn blank_row_pulled_back_with_page_break() {
        let mut t = Table::empty();
        t.rows = fixed_rows(&[10.0; 5]);
        t.rows[1].kind = RowKind::Blank;
        t.derive_nosplit_commands();
        let t = measured(t);
        // Height admits three rows; boundary 2 would leave the blank row
        // (index 1) last on the page, so it is dropped and a page break
        // inserted.
        let SplitOutcome::Split {
            first,
            second,
            page_break,
        } = split_to_fit(&t, 22.0)
        else {
            panic!("expected split");
        };
        assert!(page_break);
        assert_eq!(first.rows.len(), 1);
        assert_eq!(data_texts(&second), vec!["row 2", "row 3", "row 4"]);
    }

    #[test]
    fn header_reservation_blocks_early_split() {
        let mut t = Table::empty();
        t.rows = fixed_rows(&[10.0; 6]);
        t.rows[0].kind = RowKind::Header;
        t.min_rows_after_header = 2;
        t.derive_nosplit_commands();
        let t = measured(t);
        // Boundaries 1 and 2 are inside the reservation.
        assert_eq!(best_split_row(&t, 25.0), 0);
        assert_eq!(best_split_row(&t, 35.0), 3);
    }

    #[test]
    fn keep_block_is_atomic() {
        let mut t = Table::empty();
        t.rows = fixed_rows(&[10.0; 5]);
        t.rows[1].keep = KeepWithNext::Start;
        t.rows[2].keep = KeepWithNext::Middle;
        t.rows[3].keep = KeepWithNext::End;
        let t = measured(t);
        // Boundaries 2 and 3 fall inside the keep block.
        assert_eq!(best_split_row(&t, 25.0), 1);
        assert_eq!(best_split_row(&t, 35.0), 1);
        assert_eq!(best_split_row(&t, 45.0), 4);
    }

    #[test]
    fn footer_height_is_reserved() {
        let mut t = Table::empty();
        t.rows = fixed_rows(&[10.0; 5]);
        let mut footer = RowSet::default();
        footer
            .rows
            .push(Row::new(vec![CellValue::Text("Total: %(sum)s".into())]));
        footer.heights.push(12.0);
        t.footer = Some(Rc::new(footer));
        let t = measured(t);
        // 35pt available minus the 12pt footer leaves room for two rows.
        assert_eq!(best_split_row(&t, 35.0), 2);
    }

    #[test]
    fn footer_splice_substitutes_last_row_variables() {
        let mut t = Table::empty();
        t.rows = fixed_rows(&[10.0; 4]);
        for (i, row) in t.rows.iter_mut().enumerate() {
            row.variables
                .insert("sum".to_string(), VarValue::Num((i as f64 + 1.0) * 10.0));
        }
        let mut footer = RowSet::default();
        footer
            .rows
            .push(Row::new(vec![CellValue::Text("Carried: %(sum)s".into())]));
        footer.heights.push(12.0);
        t.footer = Some(Rc::new(footer));
        let t = measured(t);

        let SplitOutcome::Split { first, .. } = split_to_fit(&t, 34.0) else {
            panic!("expected split");
        };
        // Two data rows fit (20pt + 12pt footer ≤ 34pt); snapshot comes
        // from row index 1.
        let last = first.rows.last().unwrap();
        assert_eq!(last.kind, RowKind::Heading);
        match &last.cells[0] {
            CellValue::Text(text) => assert_eq!(text, "Carried: 20"),
            other => panic!("unexpected cell {other:?}"),
        }
    }

    #[test]
    fn continuation_header_inserted_in_second_part() {
        let mut t = Table::empty();
        t.rows = fixed_rows(&[10.0; 5]);
        for row in &mut t.rows {
            row.variables
                .insert("page_total".to_string(), VarValue::Str("42".into()));
        }
        let mut header = RowSet::default();
        header
            .rows
            .push(Row::new(vec![CellValue::Text("b/f %(page_total)s".into())]));
        header.heights.push(14.0);
        t.header = Some(Rc::new(header));
        let t = measured(t);

        let SplitOutcome::Split { second, .. } = split_to_fit(&t, 25.0) else {
            panic!("expected split");
        };
        assert_eq!(second.rows.len(), 1 + 3);
        assert_eq!(second.rows[0].kind, RowKind::Heading);
        match &second.rows[0].cells[0] {
            CellValue::Text(text) => assert_eq!(text, "b/f 42"),
            other => panic!("unexpected cell {other:?}"),
        }
        assert!(!second.initial);
        assert!(second.header.is_some());
    }

    #[test]
    fn repeat_rows_prefix_second_part() {
        let mut t = Table::empty();
        t.rows = fixed_rows(&[10.0; 6]);
        t.repeat_rows = 1;
        let t = measured(t);
        let SplitOutcome::Split { second, .. } = split_to_fit(&t, 35.0) else {
            panic!("expected split");
        };
        // Repeat prefix shows row 0 again, then rows 3..6.
        assert_eq!(data_texts(&second), vec!["row 0", "row 3", "row 4", "row 5"]);
    }

    #[test]
    fn grid_command_decomposed_at_seam() {
        let arg = CommandArg::Line {
            weight: 1.0,
            color: Color::BLACK,
        };
        let cmds = vec![Command {
            kind: CommandKind::Grid,
            range: CellRange::new(0, 0, -1, -1),
            arg,
        }];
        let out = munge_line_commands(&cmds, 2, 3, 4);
        let kinds: Vec<CommandKind> = out.iter().map(|c| c.kind).collect();
        assert_eq!(
            kinds,
            vec![
                CommandKind::LineAbove,
                CommandKind::LineBefore,
                CommandKind::LineAfter,
                CommandKind::LineBelow,
                CommandKind::LineBelow,
                CommandKind::LineAbove,
                CommandKind::InnerGrid,
            ]
        );
        // The seam pair closes part one at row 1 and opens part two at
        // row 2.
        assert_eq!(out[4].range.start_row, RowRef::Literal(1));
        assert_eq!(out[5].range.start_row, RowRef::Literal(2));
    }

    #[test]
    fn box_not_straddling_is_untouched() {
        let arg = CommandArg::Line {
            weight: 0.5,
            color: Color::BLACK,
        };
        let cmds = vec![Command {
            kind: CommandKind::Box,
            range: CellRange::new(0, 0, 1, 1),
            arg,
        }];
        let out = munge_line_commands(&cmds, 3, 2, 5);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].kind, CommandKind::Box);
    }

    #[test]
    fn symbolic_rows_resolve_at_split() {
        let arg = CommandArg::Line {
            weight: 1.0,
            color: Color::BLACK,
        };
        let cmds = vec![Command {
            kind: CommandKind::LineBelow,
            range: CellRange {
                start_col: 0,
                start_row: RowRef::SplitLast,
                end_col: -1,
                end_row: RowRef::SplitLast,
            },
            arg,
        }];
        let out = munge_line_commands(&cmds, 3, 2, 6);
        // Symbolic command retained first; the resolved copy is anchored
        // at n-1, preceded by the seam line it implies for part two.
        assert!(out[0].range.start_row.is_symbolic());
        assert_eq!(out[1].kind, CommandKind::LineAbove);
        assert_eq!(out[1].range.start_row, RowRef::Literal(3));
        assert_eq!(out[2].kind, CommandKind::LineBelow);
        assert_eq!(out[2].range.start_row, RowRef::Literal(2));
    }

    #[test]
    fn background_renumbered_into_both_parts() {
        let mut t = Table::empty();
        t.rows = fixed_rows(&[10.0; 6]);
        t.commands.push(Command {
            kind: CommandKind::Background,
            range: CellRange::new(0, 4, -1, 4),
            arg: CommandArg::Color(Color::WHITE),
        });
        let t = measured(t);
        let SplitOutcome::Split { first, second, .. } = split_to_fit(&t, 32.0) else {
            panic!("expected split");
        };
        // Row 4 lives in part two (rows 3..6 → local index 1).
        assert!(!first
            .commands
            .iter()
            .any(|c| c.kind == CommandKind::Background));
        let bg = second
            .commands
            .iter()
            .find(|c| c.kind == CommandKind::Background)
            .unwrap();
        assert_eq!(bg.range.start_row, RowRef::Literal(1));
    }

    #[test]
    fn on_split_hook_sees_both_parts() {
        use std::cell::Cell;
        let calls = Rc::new(Cell::new(0usize));
        let seen = calls.clone();
        let mut t = Table::empty();
        t.rows = fixed_rows(&[10.0; 4]);
        t.on_split = Some(Rc::new(move |_part: &mut Table| {
            seen.set(seen.get() + 1);
        }));
        let t = measured(t);
        let SplitOutcome::Split { first, second, .. } = split_to_fit(&t, 22.0) else {
            panic!("expected split");
        };
        assert_eq!(calls.get(), 2);
        // The hook travels with the children for further splits.
        assert!(first.on_split.is_some());
        assert!(second.on_split.is_some());
    }

    #[test]
    fn recursive_splits_conserve_rows() {
        let mut t = plain_table(&[10.0; 10]);
        let mut collected: Vec<String> = Vec::new();
        loop {
            match split_to_fit(&t, 32.0) {
                SplitOutcome::Fits => {
                    collected.extend(data_texts(&t));
                    break;
                }
                SplitOutcome::Split { first, second, .. } => {
                    collected.extend(data_texts(&first));
                    t = measured(second);
                }
                SplitOutcome::CannotSplit => panic!("unexpected"),
            }
        }
        let expected: Vec<String> = (0..10).map(|i| format!("row {i}")).collect();
        assert_eq!(collected, expected);
    }
}
