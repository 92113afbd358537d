//! Height resolution – turns pending row heights into concrete extents.
//!
//! A row's natural height is the max over its cells of content height plus
//! vertical padding. Cells consumed by a multi-row span are skipped; the
//! span's total requirement is collected separately and distributed
//! afterwards, largest constraint first, with the whole shortfall assigned
//! to the last height-pending row of the range. A constraint with no
//! adjustable row is silently unsatisfiable and rendering proceeds with
//! the visual shortfall.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::fonts::FontManager;
use crate::style::{resolve_cell_styles, Strictness};
use crate::table::{distribute_col_widths, CellValue, RowHeight, Table};

pub(crate) const FUZZ: f32 = 1e-4;

/// Measurement context shared down the flowable tree.
pub struct MeasureCtx<'a> {
    pub fonts: &'a FontManager,
    pub strictness: Strictness,
    /// When set, content wider than its cell is rendered overflowing
    /// instead of failing the build.
    pub tolerate_bounds_errors: bool,
}

/// Resolve column widths and row heights for a table at the given width.
/// After this call `table.width` / `table.height` are valid.
pub fn resolve_table_layout(table: &mut Table, avail_width: f32, ctx: &MeasureCtx) -> Result<()> {
    table.normalize();
    table.resolved_col_widths = distribute_col_widths(&table.col_widths, avail_width);
    resolve_row_heights(table, ctx)?;
    table.width = table.resolved_col_widths.iter().sum();
    table.height = table.resolved_row_heights.iter().sum();
    Ok(())
}

fn resolve_row_heights(table: &mut Table, ctx: &MeasureCtx) -> Result<()> {
    let nrows = table.nrows();
    let ncols = table.ncols();
    let styles = resolve_cell_styles(&table.commands, ncols, nrows);
    let origins = table.span_origins();
    let row_span_cells = table.row_span_cells();
    let widths = table.resolved_col_widths.clone();

    // (start_row, end_row) -> required total height across the span.
    let mut span_cons: HashMap<(usize, usize), f32> = HashMap::new();
    let mut heights = vec![0.0f32; nrows];

    for i in 0..nrows {
        let declared = table.rows[i].height;
        if let RowHeight::Fixed(h) = declared {
            heights[i] = h;
            continue;
        }
        let is_overflow = matches!(declared, RowHeight::Overflow);

        let mut h = 0.0f32;
        for j in 0..ncols {
            let span = origins.get(&(i, j)).copied();
            if row_span_cells.contains(&(i, j)) && span.is_none() {
                // Occluded by a rowspan: unreliable for sizing.
                continue;
            }
            let style = &styles[i][j];
            let cell_width = match span {
                Some((sc, _, ec, _)) => widths[sc..=ec.min(widths.len() - 1)].iter().sum(),
                None => widths.get(j).copied().unwrap_or(0.0),
            };
            let avail = cell_width - style.left_padding - style.right_padding;

            let string_leading = if is_overflow {
                1.0
            } else if style.leading > 0.0 {
                style.leading
            } else {
                1.2 * style.font_size
            };
            let mut t = match &mut table.rows[i].cells[j] {
                CellValue::Empty => string_leading,
                CellValue::Text(text) => {
                    string_leading * text.split('\n').count().max(1) as f32
                }
                CellValue::Paragraph(para) => {
                    let min = para.min_width(ctx.fonts);
                    if min > avail + FUZZ && !ctx.tolerate_bounds_errors {
                        return Err(Error::Layout(format!(
                            "content {min:.1}pt wide cannot fit cell ({i},{j}) of {avail:.1}pt"
                        )));
                    }
                    para.text_height(avail, ctx.fonts)
                }
                CellValue::Table(nested) => {
                    resolve_table_layout(nested, avail, ctx)?;
                    if nested.width > avail + FUZZ && !ctx.tolerate_bounds_errors {
                        return Err(Error::Layout(format!(
                            "nested table {0:.1}pt wide cannot fit cell ({i},{j}) of {avail:.1}pt",
                            nested.width
                        )));
                    }
                    nested.height
                }
                CellValue::Image(img) => img.height,
                CellValue::Svg { height, .. } => *height,
            };
            t += style.top_padding + style.bottom_padding;

            if let Some((_, sr, _, er)) = span {
                if sr != er {
                    let entry = span_cons.entry((sr, er)).or_insert(0.0);
                    *entry = entry.max(t);
                    t = 0.0;
                }
            }
            if t > h {
                h = t;
            }
        }
        heights[i] = h;
    }

    distribute_span_constraints(table, &mut heights, span_cons, ctx);
    table.resolved_row_heights = heights;
    Ok(())
}

/// Assign span height requirements. Constraints are applied largest first;
/// each one drops its entire shortfall on the last height-pending row of
/// its range rather than inflating every row evenly.
fn distribute_span_constraints(
    table: &Table,
    heights: &mut [f32],
    span_cons: HashMap<(usize, usize), f32>,
    ctx: &MeasureCtx,
) {
    let mut cons: Vec<((usize, usize), f32)> = span_cons.into_iter().collect();
    cons.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.0.cmp(&b.0))
    });

    for ((r0, r1), required) in cons {
        let candidates: Vec<usize> = (r0..=r1.min(heights.len().saturating_sub(1)))
            .filter(|&r| matches!(table.rows[r].height, RowHeight::Pending))
            .collect();
        let Some(&last) = candidates.last() else {
            let msg =
                format!("span rows {r0}..={r1} need {required:.1}pt but no row is adjustable");
            if ctx.strictness == Strictness::Strict {
                log::error!("{msg}");
            } else {
                log::warn!("{msg}");
            }
            continue;
        };
        let assigned: f32 = (r0..=r1)
            .filter(|&r| r != last && r < heights.len())
            .map(|r| heights[r])
            .sum();
        if assigned + heights[last] >= required - FUZZ {
            continue;
        }
        heights[last] = required - assigned;
    }
}

/// Top edge offsets for each row plus the total height.
pub fn row_positions(heights: &[f32]) -> Vec<f32> {
    let mut positions = Vec::with_capacity(heights.len() + 1);
    let mut y = 0.0;
    for h in heights {
        positions.push(y);
        y += h;
    }
    positions.push(y);
    positions
}
