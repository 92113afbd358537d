//! Flowable capability interface and the drawing adapter.
//!
//! A flowable is a content unit the page-layout host can ask three things
//! of: how big are you (`wrap`), can you split to fit this space
//! (`try_split`), and draw yourself at this position (`draw_at`). Tables,
//! paragraphs and spacers implement it; the page-break marker is inert.
//! Drawing produces [`LayoutBox`] trees in page-absolute coordinates.

use crate::error::Result;
use crate::layout_config::{LayoutBox, PageLayout, RuleSegment, TextContent, TextLine};
use crate::measure::{resolve_table_layout, row_positions, MeasureCtx};
use crate::paragraph::Paragraph;
use crate::split::{split_to_fit, SplitOutcome};
use crate::style::{resolve_cell_styles, CellStyle, Command, CommandArg, CommandKind, HAlign, VAlign};
use crate::table::{CellValue, Table};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Size {
    pub width: f32,
    pub height: f32,
}

pub trait Flowable {
    /// Measure at the given available space, returning the size consumed
    /// in normal flow. Absolutely positioned flowables report zero height.
    fn wrap(&mut self, ctx: &MeasureCtx, avail_width: f32, avail_height: f32) -> Result<Size>;

    /// Split to fit `avail_height`. `None` means the flowable is atomic at
    /// this height; a single-element result means it already fits.
    fn try_split(
        &mut self,
        ctx: &MeasureCtx,
        avail_width: f32,
        avail_height: f32,
    ) -> Result<Option<Vec<Element>>>;

    /// Draw into the page at (x, y) — the top-left corner in page space.
    fn draw_at(&self, ctx: &MeasureCtx, page: &mut PageLayout, x: f32, y: f32);
}

/// A story element: a flowable or an explicit page-break marker.
#[derive(Debug, Clone)]
pub enum Element {
    Table(Table),
    Paragraph(Paragraph),
    Spacer(Spacer),
    PageBreak,
}

/// Fixed vertical whitespace.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Spacer {
    pub height: f32,
}

impl Flowable for Element {
    fn wrap(&mut self, ctx: &MeasureCtx, avail_width: f32, avail_height: f32) -> Result<Size> {
        match self {
            Element::Table(t) => t.wrap(ctx, avail_width, avail_height),
            Element::Paragraph(p) => p.wrap_flowable(ctx, avail_width),
            Element::Spacer(s) => Ok(Size {
                width: 0.0,
                height: s.height,
            }),
            Element::PageBreak => Ok(Size {
                width: 0.0,
                height: 0.0,
            }),
        }
    }

    fn try_split(
        &mut self,
        ctx: &MeasureCtx,
        avail_width: f32,
        avail_height: f32,
    ) -> Result<Option<Vec<Element>>> {
        match self {
            Element::Table(t) => t.try_split(ctx, avail_width, avail_height),
            Element::Paragraph(p) => p.try_split_lines(ctx, avail_width, avail_height),
            Element::Spacer(_) | Element::PageBreak => Ok(None),
        }
    }

    fn draw_at(&self, ctx: &MeasureCtx, page: &mut PageLayout, x: f32, y: f32) {
        match self {
            Element::Table(t) => page.boxes.push(table_layout_box(t, ctx, x, y)),
            Element::Paragraph(p) => page.boxes.push(paragraph_layout_box(p, ctx, x, y)),
            Element::Spacer(_) | Element::PageBreak => {}
        }
    }
}

// ---------------------------------------------------------------------------
// Table as a flowable
// ---------------------------------------------------------------------------

impl Table {
    pub fn wrap(&mut self, ctx: &MeasureCtx, avail_width: f32, _avail_height: f32) -> Result<Size> {
        resolve_table_layout(self, avail_width, ctx)?;
        let flow_height = if self.pos.is_some() { 0.0 } else { self.height };
        Ok(Size {
            width: self.width,
            height: flow_height,
        })
    }

    pub fn try_split(
        &mut self,
        ctx: &MeasureCtx,
        avail_width: f32,
        avail_height: f32,
    ) -> Result<Option<Vec<Element>>> {
        if self.resolved_row_heights.len() != self.nrows() {
            resolve_table_layout(self, avail_width, ctx)?;
        }
        match split_to_fit(self, avail_height) {
            SplitOutcome::Fits => Ok(Some(vec![Element::Table(self.clone())])),
            SplitOutcome::CannotSplit => Ok(None),
            SplitOutcome::Split {
                first,
                second,
                page_break,
            } => {
                let mut parts = vec![Element::Table(first)];
                if page_break {
                    parts.push(Element::PageBreak);
                }
                parts.push(Element::Table(second));
                Ok(Some(parts))
            }
        }
    }
}

/// Render a measured table into a layout box tree: backgrounds first, cell
/// contents next, rules last so they sit on top of fills.
pub fn table_layout_box(table: &Table, ctx: &MeasureCtx, x: f32, y: f32) -> LayoutBox {
    let ncols = table.ncols();
    let nrows = table.nrows();
    let widths = &table.resolved_col_widths;
    let col_pos = positions(widths);
    let row_pos = row_positions(&table.resolved_row_heights);
    let styles = resolve_cell_styles(&table.commands, ncols, nrows);
    let origins = table.span_origins();
    let span_cells = table.row_span_cells();

    let mut root = LayoutBox::new(x, y, table.width, table.height);

    // Background fills, in command order so later commands paint over
    // earlier ones.
    for cmd in &table.commands {
        if cmd.kind != CommandKind::Background {
            continue;
        }
        let CommandArg::Color(color) = &cmd.arg else {
            continue;
        };
        let Some((sr, er)) = cmd.range.resolved_rows(nrows) else {
            continue;
        };
        let (sc, ec) = cmd.range.resolved_cols(ncols);
        let mut fill = LayoutBox::new(
            x + col_pos[sc],
            y + row_pos[sr],
            col_pos[ec + 1] - col_pos[sc],
            row_pos[er + 1] - row_pos[sr],
        );
        fill.background_color = Some(color.rgba());
        root.children.push(fill);
    }

    // Cell contents.
    for (r, row) in table.rows.iter().enumerate() {
        for (c, cell) in row.cells.iter().enumerate() {
            if c >= ncols {
                break;
            }
            let span = origins.get(&(r, c)).copied();
            if span.is_none() && span_cells.contains(&(r, c)) {
                continue;
            }
            if cell.is_empty() {
                continue;
            }
            let (ec, er) = match span {
                Some((_, _, ec, er)) => (ec.min(ncols - 1), er.min(nrows - 1)),
                None => (c, r),
            };
            let cell_x = x + col_pos[c];
            let cell_y = y + row_pos[r];
            let cell_w = col_pos[ec + 1] - col_pos[c];
            let cell_h = row_pos[er + 1] - row_pos[r];
            let style = &styles[r][c];

            if let Some(b) =
                cell_content_box(cell, style, ctx, cell_x, cell_y, cell_w, cell_h)
            {
                root.children.push(b);
            }
        }
    }

    // Rules on top.
    for cmd in &table.commands {
        if !cmd.kind.is_line() {
            continue;
        }
        push_rule_segments(
            cmd, &col_pos, &row_pos, ncols, nrows, x, y, &mut root.rules,
        );
    }

    root
}

fn cell_content_box(
    cell: &CellValue,
    style: &CellStyle,
    ctx: &MeasureCtx,
    cell_x: f32,
    cell_y: f32,
    cell_w: f32,
    cell_h: f32,
) -> Option<LayoutBox> {
    let avail = cell_w - style.left_padding - style.right_padding;
    match cell {
        CellValue::Empty => None,
        CellValue::Text(text) => {
            let line_height = if style.leading > 0.0 {
                style.leading
            } else {
                1.2 * style.font_size
            };
            let lines: Vec<String> = text.split('\n').map(str::to_string).collect();
            Some(text_box(
                &lines,
                &style.font_name,
                style.font_size,
                style.text_color.rgba(),
                line_height,
                style,
                ctx,
                cell_x,
                cell_y,
                cell_w,
                cell_h,
                style.halign,
            ))
        }
        CellValue::Paragraph(para) => {
            let lines = para.break_lines(avail, ctx.fonts);
            let line_height = para.style.line_height(ctx.fonts);
            Some(text_box(
                &lines,
                &para.style.font_name,
                para.style.font_size,
                para.style.text_color.rgba(),
                line_height,
                style,
                ctx,
                cell_x,
                cell_y,
                cell_w,
                cell_h,
                para.style.alignment,
            ))
        }
        CellValue::Table(nested) => Some(table_layout_box(
            nested,
            ctx,
            cell_x + style.left_padding,
            cell_y + style.top_padding,
        )),
        CellValue::Image(img) => {
            let mut b = LayoutBox::new(
                cell_x + style.left_padding,
                cell_y + style.top_padding,
                img.width,
                img.height,
            );
            b.image = Some(crate::layout_config::ImageContent {
                src: img.src.clone(),
                width: img.width,
                height: img.height,
            });
            Some(b)
        }
        CellValue::Svg { width, height } => Some(LayoutBox::new(
            cell_x + style.left_padding,
            cell_y + style.top_padding,
            *width,
            *height,
        )),
    }
}

#[allow(clippy::too_many_arguments)]
fn text_box(
    lines: &[String],
    font_name: &str,
    font_size: f32,
    color: [f32; 4],
    line_height: f32,
    style: &CellStyle,
    ctx: &MeasureCtx,
    cell_x: f32,
    cell_y: f32,
    cell_w: f32,
    cell_h: f32,
    halign: HAlign,
) -> LayoutBox {
    let (bold, italic) = font_flags(font_name);
    let avail = cell_w - style.left_padding - style.right_padding;
    let block_height = lines.len() as f32 * line_height;
    let top = match style.valign {
        VAlign::Top => style.top_padding,
        VAlign::Middle => ((cell_h - block_height) / 2.0).max(style.top_padding),
        VAlign::Bottom => (cell_h - style.bottom_padding - block_height).max(style.top_padding),
    };

    let text_lines: Vec<TextLine> = lines
        .iter()
        .enumerate()
        .map(|(i, line)| {
            let line_width = ctx
                .fonts
                .measure_text_width(line, font_size, bold, italic, font_name);
            let x_offset = match halign {
                HAlign::Left => style.left_padding,
                HAlign::Center => style.left_padding + ((avail - line_width) / 2.0).max(0.0),
                HAlign::Right => style.left_padding + (avail - line_width).max(0.0),
            };
            TextLine {
                text: line.clone(),
                x_offset,
                y_offset: top + i as f32 * line_height,
            }
        })
        .collect();

    let mut b = LayoutBox::new(cell_x, cell_y, cell_w, cell_h);
    b.text = Some(TextContent {
        lines: text_lines,
        font_family: font_name.to_string(),
        font_size,
        bold,
        italic,
        color,
        line_height,
    });
    b
}

pub(crate) fn font_flags(font_name: &str) -> (bool, bool) {
    let lower = font_name.to_ascii_lowercase();
    let bold = lower.contains("bold");
    let italic = lower.contains("italic") || lower.contains("oblique");
    (bold, italic)
}

fn positions(widths: &[f32]) -> Vec<f32> {
    let mut out = Vec::with_capacity(widths.len() + 1);
    let mut x = 0.0;
    for w in widths {
        out.push(x);
        x += w;
    }
    out.push(x);
    out
}

#[allow(clippy::too_many_arguments)]
fn push_rule_segments(
    cmd: &Command,
    col_pos: &[f32],
    row_pos: &[f32],
    ncols: usize,
    nrows: usize,
    x: f32,
    y: f32,
    rules: &mut Vec<RuleSegment>,
) {
    let Some((sr, er)) = cmd.range.resolved_rows(nrows) else {
        return;
    };
    let (sc, ec) = cmd.range.resolved_cols(ncols);
    let weight = cmd.line_weight();
    let color = cmd.line_color().rgba();

    let hline = |rules: &mut Vec<RuleSegment>, row_edge: usize| {
        rules.push(RuleSegment {
            x1: x + col_pos[sc],
            y1: y + row_pos[row_edge],
            x2: x + col_pos[ec + 1],
            y2: y + row_pos[row_edge],
            weight,
            color,
        });
    };
    let vline = |rules: &mut Vec<RuleSegment>, col_edge: usize| {
        rules.push(RuleSegment {
            x1: x + col_pos[col_edge],
            y1: y + row_pos[sr],
            x2: x + col_pos[col_edge],
            y2: y + row_pos[er + 1],
            weight,
            color,
        });
    };

    match cmd.kind {
        CommandKind::LineAbove => {
            for r in sr..=er {
                hline(rules, r);
            }
        }
        CommandKind::LineBelow => {
            for r in sr..=er {
                hline(rules, r + 1);
            }
        }
        CommandKind::LineBefore => {
            for c in sc..=ec {
                vline(rules, c);
            }
        }
        CommandKind::LineAfter => {
            for c in sc..=ec {
                vline(rules, c + 1);
            }
        }
        CommandKind::Box | CommandKind::Outline => {
            hline(rules, sr);
            hline(rules, er + 1);
            vline(rules, sc);
            vline(rules, ec + 1);
        }
        CommandKind::InnerGrid => {
            for r in (sr + 1)..=er {
                hline(rules, r);
            }
            for c in (sc + 1)..=ec {
                vline(rules, c);
            }
        }
        CommandKind::Grid => {
            hline(rules, sr);
            hline(rules, er + 1);
            vline(rules, sc);
            vline(rules, ec + 1);
            for r in (sr + 1)..=er {
                hline(rules, r);
            }
            for c in (sc + 1)..=ec {
                vline(rules, c);
            }
        }
        _ => {}
    }
}

// ---------------------------------------------------------------------------
// Paragraph as a flowable
// ---------------------------------------------------------------------------

impl Paragraph {
    pub fn wrap_flowable(&mut self, ctx: &MeasureCtx, avail_width: f32) -> Result<Size> {
        let (w, h) = self.wrap(avail_width, ctx.fonts);
        Ok(Size {
            width: w,
            height: h,
        })
    }

    /// Split at line granularity: the first part takes as many wrapped
    /// lines as fit, the remainder re-flows on the next page.
    pub fn try_split_lines(
        &mut self,
        ctx: &MeasureCtx,
        avail_width: f32,
        avail_height: f32,
    ) -> Result<Option<Vec<Element>>> {
        let lines = self.break_lines(avail_width, ctx.fonts);
        let line_height = self.style.line_height(ctx.fonts);
        let fit = (avail_height / line_height).floor() as usize;
        if fit == 0 {
            return Ok(None);
        }
        if fit >= lines.len() {
            return Ok(Some(vec![Element::Paragraph(self.clone())]));
        }
        let first = Paragraph::from_text(lines[..fit].join("\n"), self.style.clone());
        let rest = Paragraph::from_text(lines[fit..].join("\n"), self.style.clone());
        Ok(Some(vec![
            Element::Paragraph(first),
            Element::Paragraph(rest),
        ]))
    }
}

fn paragraph_layout_box(para: &Paragraph, ctx: &MeasureCtx, x: f32, y: f32) -> LayoutBox {
    let line_height = para.style.line_height(ctx.fonts);
    let (bold, italic) = (para.style.is_bold(), para.style.is_italic());
    let lines = &para.lines;
    let width = lines
        .iter()
        .map(|l| {
            ctx.fonts.measure_text_width(
                l,
                para.style.font_size,
                bold,
                italic,
                &para.style.font_name,
            )
        })
        .fold(0.0, f32::max);
    let mut b = LayoutBox::new(x, y, width, lines.len() as f32 * line_height);
    if let Some(bg) = para.style.background {
        b.background_color = Some(bg.rgba());
    }
    b.text = Some(TextContent {
        lines: lines
            .iter()
            .enumerate()
            .map(|(i, l)| TextLine {
                text: l.clone(),
                x_offset: 0.0,
                y_offset: i as f32 * line_height,
            })
            .collect(),
        font_family: para.style.font_name.clone(),
        font_size: para.style.font_size,
        bold,
        italic,
        color: para.style.text_color.rgba(),
        line_height,
    });
    b
}
