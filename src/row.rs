//! Row content builder – converts `table`/`tr`/`td` elements into
//! normalized rows plus per-row metadata, and assembles the table
//! container.
//!
//! Cross-row state is intentional here: variables set in one row are
//! visible to every later row and to the continuation headers/footers
//! evaluated at split time. Rows must therefore be processed strictly in
//! document order.

use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use crate::dom::{ElementNode, Tag};
use crate::error::{Error, Result};
use crate::flowable::Element;
use crate::fonts::FontManager;
use crate::paragraph::{strip_markup, ParaStyle, Paragraph};
use crate::style::{
    css_for_element, parse_declarations, parse_measurement, CellRange, Command, CommandArg,
    CommandKind, OtherStyles, Strictness, StyleClasses, Unit, MM,
};
use crate::table::{
    AbsolutePos, CellValue, ColWidth, ImageCell, KeepWithNext, Row, RowHeight, RowKind, RowSet,
    Table, VarMap, VarValue,
};

/// Shared context for building tables out of DOM elements.
pub struct BuildCtx<'a> {
    pub classes: &'a StyleClasses,
    pub fonts: &'a FontManager,
    pub object_lookup: &'a HashMap<String, Element>,
    pub strictness: Strictness,
}

/// Build a table from a `<table>` element at the given available width.
/// Returns `None` when the table has no data rows.
pub fn build_table(elem: &ElementNode, table_width: f32, ctx: &BuildCtx) -> Result<Option<Table>> {
    let mut builder = TableBuilder {
        ctx,
        table_width,
        commands: Vec::new(),
        table_other: OtherStyles::default(),
        rows: Vec::new(),
        col_widths: Vec::new(),
        span_skip: HashMap::new(),
        variables: VarMap::new(),
        hidden_columns: HashSet::new(),
    };
    builder.build(elem)
}

struct TableBuilder<'a> {
    ctx: &'a BuildCtx<'a>,
    table_width: f32,
    commands: Vec<Command>,
    table_other: OtherStyles,
    rows: Vec<Row>,
    col_widths: Vec<ColWidth>,
    /// (row, col) → column count to skip, populated by rowspans.
    span_skip: HashMap<(usize, usize), usize>,
    /// Table-persistent variable map, mutated in row order.
    variables: VarMap,
    hidden_columns: HashSet<usize>,
}

impl<'a> TableBuilder<'a> {
    fn build(mut self, elem: &ElementNode) -> Result<Option<Table>> {
        parse_declarations(
            &css_for_element(&elem.attributes, self.ctx.classes, "style", "class"),
            CellRange::new(0, 0, -1, -1),
            &mut self.commands,
            &mut self.table_other,
            self.ctx.strictness,
        )?;

        let mut min_rows_top = elem.attr_usize("min_rows_top", 0)?;
        let min_rows_bottom = elem.attr_usize("min_rows_bottom", 0)?;

        if let Some(layout_widths) = elem.attr("layout_widths") {
            for col_width in layout_widths.split(',') {
                self.col_widths.push(parse_col_width(col_width)?);
            }
        }

        let mut header = RowSet::default();
        let mut footer = RowSet::default();
        let mut suppress_header = false;
        let mut suppress_footer = false;
        let mut held_row_span = 1usize;

        for child in elem.child_elements() {
            match child.tag {
                Tag::Tr => {
                    let before = self.rows.len();
                    let (max_row_span, _overflow_rows) = self.process_tr(child)?;
                    if max_row_span > held_row_span {
                        held_row_span = max_row_span;
                    }
                    if held_row_span > 1 || min_rows_top > 0 {
                        for row in &mut self.rows[before..] {
                            row.keep = KeepWithNext::Hold;
                        }
                    }
                    min_rows_top = min_rows_top.saturating_sub(1);
                    held_row_span = held_row_span.saturating_sub(1);
                }
                Tag::Keep => {
                    let block_start = self.rows.len();
                    for tr in child.child_elements() {
                        if tr.tag != Tag::Tr {
                            continue;
                        }
                        self.process_tr(tr)?;
                        min_rows_top = min_rows_top.saturating_sub(1);
                    }
                    let block_len = self.rows.len() - block_start;
                    for (i, row) in self.rows[block_start..].iter_mut().enumerate() {
                        row.keep = if i + 1 == block_len {
                            KeepWithNext::End
                        } else if i == 0 {
                            KeepWithNext::Start
                        } else {
                            KeepWithNext::Middle
                        };
                    }
                }
                Tag::Header => {
                    for tr in child.child_elements() {
                        if tr.tag == Tag::Tr {
                            self.process_header_footer_tr(tr, &mut header)?;
                        }
                    }
                }
                Tag::Footer => {
                    for tr in child.child_elements() {
                        if tr.tag == Tag::Tr {
                            self.process_header_footer_tr(tr, &mut footer)?;
                        }
                    }
                }
                Tag::NoHeaders => suppress_header = true,
                Tag::NoFooters => suppress_footer = true,
                _ => {}
            }
        }

        if self.rows.is_empty() {
            return Ok(None);
        }

        // The last rows of the table stay together on one page.
        let len = self.rows.len();
        for x in 1..=min_rows_bottom.min(len) {
            self.rows[len - x].keep = KeepWithNext::Hold;
        }

        let mut table = Table::empty();
        table.min_rows_after_header = elem.attr_usize("min_rows_after_header", 1)?;
        table.min_rows_before_total = elem.attr_usize("min_rows_before_total", 1)?;
        table.repeat_rows = elem.attr_usize("repeat_rows", 0)?;
        table.rows = std::mem::take(&mut self.rows);
        table.commands = std::mem::take(&mut self.commands);
        table.col_widths = Rc::new(std::mem::take(&mut self.col_widths));
        if !header.is_empty() && !suppress_header {
            table.header = Some(Rc::new(header));
        }
        if !footer.is_empty() && !suppress_footer {
            table.footer = Some(Rc::new(footer));
        }

        // Table-level alignment mirrors the last halign/valign commands.
        for cmd in &table.commands {
            match (&cmd.kind, &cmd.arg) {
                (CommandKind::Align, CommandArg::HAlign(a)) => table.h_align = *a,
                (CommandKind::VAlign, CommandArg::VAlign(a)) => table.v_align = *a,
                _ => {}
            }
        }

        table.pos = self.parse_absolute_pos(elem)?;
        table.derive_nosplit_commands();
        table.normalize();
        self.apply_hidden_columns(&mut table);

        Ok(Some(table))
    }

    fn parse_absolute_pos(&self, elem: &ElementNode) -> Result<Option<AbsolutePos>> {
        let (Some(_), Some(_)) = (elem.attr("pos_x"), elem.attr("pos_y")) else {
            return Ok(None);
        };
        Ok(Some(AbsolutePos {
            x: elem.attr_f32("pos_x", 0.0)?,
            y: elem.attr_f32("pos_y", 0.0)?,
            x_from_right: elem.attr("pos_x_ref") == Some("right"),
            y_from_top: elem.attr("pos_y_ref") != Some("bottom"),
            ignore_margin: elem.attr("ignore_margin") == Some("yes"),
        }))
    }

    /// Hidden columns collapse to zero width with their content suppressed,
    /// keeping every other command coordinate valid.
    fn apply_hidden_columns(&self, table: &mut Table) {
        if self.hidden_columns.is_empty() {
            return;
        }
        let mut widths = (*table.col_widths).clone();
        for &col in &self.hidden_columns {
            if col < widths.len() {
                widths[col] = ColWidth::Fixed(0.0);
            }
            for row in &mut table.rows {
                if col < row.cells.len() {
                    row.cells[col] = CellValue::Empty;
                }
            }
        }
        table.col_widths = Rc::new(widths);
    }

    // -----------------------------------------------------------------
    // Body rows
    // -----------------------------------------------------------------

    fn process_tr(&mut self, tr: &ElementNode) -> Result<(usize, usize)> {
        let row_index = self.rows.len();
        let mut row_other = OtherStyles::default();
        parse_declarations(
            &css_for_element(&tr.attributes, self.ctx.classes, "style", "class"),
            CellRange::new(0, row_index as i32, -1, row_index as i32),
            &mut self.commands,
            &mut row_other,
            self.ctx.strictness,
        )?;

        let mut row_variables = self.variables.clone();
        self.process_variable_directives(tr, &mut row_variables)?;

        let mut row_cells: Vec<CellValue> = Vec::new();
        let mut overflow_rows: Vec<Row> = Vec::new();
        let mut offset = 0usize;
        let mut max_row_span = 0usize;
        let mut overflow_row_count = 0usize;
        let mut col_count = 0usize;
        let mut hold_row = false;

        for td in tr.child_elements() {
            if td.tag != Tag::Td {
                continue;
            }
            if self.col_widths.len() < col_count + 1 {
                self.col_widths.push(ColWidth::Auto);
            }

            // Skip grid positions claimed by an active rowspan.
            while let Some(&claimed) = self.span_skip.get(&(row_index, col_count + offset)) {
                for _ in 0..claimed {
                    row_cells.push(CellValue::Empty);
                }
                offset += claimed;
            }

            let col_span = td.attr_usize("colspan", 1)?.max(1);
            let row_span = td.attr_usize("rowspan", 1)?.max(1);
            if row_span > max_row_span {
                max_row_span = row_span;
            }
            let col0 = col_count + offset;

            let mut cell_other = OtherStyles::default();
            parse_declarations(
                &css_for_element(&td.attributes, self.ctx.classes, "style", "class"),
                CellRange::new(
                    col0 as i32,
                    row_index as i32,
                    (col0 + col_span - 1) as i32,
                    (row_index + row_span - 1) as i32,
                ),
                &mut self.commands,
                &mut cell_other,
                self.ctx.strictness,
            )?;
            if cell_other.row_height.is_some() {
                row_other.row_height = cell_other.row_height;
            }

            if attr_flag(td, "hidden_column") {
                for c in col0..col0 + col_span {
                    self.hidden_columns.insert(c);
                }
            }
            if attr_flag(td, "hold_cell") {
                hold_row = true;
            }

            let cell = self.build_cell_value(
                td,
                row_index,
                col0,
                col_span,
                row_span,
                &row_cells,
                &mut row_variables,
                &mut overflow_rows,
                &mut overflow_row_count,
            )?;
            row_cells.push(cell);

            if let Some(width) = td.attr("width") {
                if !width.is_empty() {
                    self.col_widths[col_count] = parse_col_width(width)?;
                }
            }

            if col_span > 1 || row_span > 1 {
                for _ in 1..col_span {
                    row_cells.push(CellValue::Empty);
                }
                self.commands.push(Command::span(
                    col0 as i32,
                    row_index as i32,
                    (col0 + col_span - 1) as i32,
                    (row_index + row_span - 1) as i32,
                ));
                for x in 1..=overflow_row_count {
                    self.commands.push(Command::span(
                        col0 as i32,
                        (x + row_index) as i32,
                        (col0 + col_span - 1) as i32,
                        (x + row_index + row_span - 1) as i32,
                    ));
                }
                if row_span > 1 {
                    for r in 1..row_span {
                        self.span_skip
                            .insert((r + row_index + overflow_row_count, col0), col_span);
                    }
                }
                offset += col_span - 1;
            }
            col_count += 1;
        }

        let mut row = Row::new(row_cells);
        row.kind = RowKind::from_attr(tr.attr("row_type").unwrap_or(""));
        row.nosplit = attr_flag(tr, "nosplit");
        row.variables = row_variables.clone();
        row.height = row_other
            .merge_height(&self.table_other)
            .map(RowHeight::Fixed)
            .unwrap_or(RowHeight::Pending);
        if hold_row {
            row.keep = KeepWithNext::Hold;
        }
        self.rows.push(row);

        for mut overflow in overflow_rows {
            overflow.height = RowHeight::Overflow;
            overflow.variables = row_variables.clone();
            self.rows.push(overflow);
        }

        Ok((max_row_span, overflow_row_count))
    }

    // -----------------------------------------------------------------
    // Variable directives
    // -----------------------------------------------------------------

    fn process_variable_directives(
        &mut self,
        tr: &ElementNode,
        row_variables: &mut VarMap,
    ) -> Result<()> {
        for directive in tr.child_elements() {
            match directive.tag {
                Tag::Variables => {
                    for (name, value) in &directive.attributes {
                        let v = VarValue::Str(value.clone());
                        self.variables.insert(name.clone(), v.clone());
                        row_variables.insert(name.clone(), v);
                    }
                }
                Tag::CurrencyVariables => {
                    let symbol = directive.attr("symbol").unwrap_or("").to_string();
                    for (name, value) in &directive.attributes {
                        if name == "symbol" {
                            continue;
                        }
                        let value: f64 =
                            value.trim().parse().map_err(|_| Error::Attribute {
                                name: name.clone(),
                                value: value.clone(),
                            })?;
                        let currency = format!("{symbol}{}", intcomma_currency(value / 100.0, false));
                        for (key, var) in [
                            (name.clone(), VarValue::Num(value)),
                            (format!("{name}__symbol"), VarValue::Str(symbol.clone())),
                            (format!("{name}__currency"), VarValue::Str(currency.clone())),
                        ] {
                            self.variables.insert(key.clone(), var.clone());
                            row_variables.insert(key, var);
                        }
                    }
                }
                Tag::VariableAddition => {
                    for (name, value) in &directive.attributes {
                        let Ok(addend) = value.trim().parse::<f64>() else {
                            continue;
                        };
                        let total = match self.variables.get(name).and_then(VarValue::as_num) {
                            Some(existing) => existing + addend,
                            None => addend,
                        };
                        self.variables.insert(name.clone(), VarValue::Num(total));
                        row_variables.insert(name.clone(), VarValue::Num(total));
                        self.refresh_currency_display(name, total, row_variables);
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn refresh_currency_display(&mut self, name: &str, total: f64, row_variables: &mut VarMap) {
        let currency_key = format!("{name}__currency");
        if !self.variables.contains_key(&currency_key) {
            return;
        }
        let symbol = self
            .variables
            .get(&format!("{name}__symbol"))
            .map(|v| v.to_string())
            .unwrap_or_default();
        let display = format!("{symbol}{}", intcomma_currency(total / 100.0, false));
        self.variables
            .insert(currency_key.clone(), VarValue::Str(display.clone()));
        row_variables.insert(currency_key, VarValue::Str(display));
    }

    // -----------------------------------------------------------------
    // Cell classification
    // -----------------------------------------------------------------

    #[allow(clippy::too_many_arguments)]
    fn build_cell_value(
        &mut self,
        td: &ElementNode,
        row_index: usize,
        col0: usize,
        col_span: usize,
        row_span: usize,
        row_cells: &[CellValue],
        row_variables: &mut VarMap,
        overflow_rows: &mut Vec<Row>,
        overflow_row_count: &mut usize,
    ) -> Result<CellValue> {
        if attr_flag(td, "hidden") {
            return Ok(CellValue::Empty);
        }
        let Some(child) = td.first_content_child() else {
            let text = td.text_content();
            return Ok(CellValue::Text(text));
        };

        match child.tag {
            Tag::Table => {
                let width = self.cell_flow_width(col0, col_span);
                let nested = build_table(child, width, self.ctx)?;
                Ok(match nested {
                    Some(t) => CellValue::Table(Box::new(t)),
                    None => CellValue::Empty,
                })
            }
            Tag::Svg => Ok(CellValue::Svg {
                width: parse_dim_attr(child, "width")?,
                height: parse_dim_attr(child, "height")?,
            }),
            Tag::Png => Ok(CellValue::Image(ImageCell {
                src: child
                    .attr("src")
                    .or(child.attr("data"))
                    .unwrap_or("")
                    .to_string(),
                width: parse_dim_attr(child, "width")?,
                height: parse_dim_attr(child, "height")?,
            })),
            Tag::Obj => {
                let id = child.attr("id").unwrap_or("");
                match self.ctx.object_lookup.get(id.trim()) {
                    Some(Element::Table(t)) => Ok(CellValue::Table(Box::new(t.clone()))),
                    Some(Element::Paragraph(p)) => Ok(CellValue::Paragraph(p.clone())),
                    Some(_) => Ok(CellValue::Empty),
                    None => {
                        log::warn!("object lookup id {id:?} not found, leaving cell empty");
                        Ok(CellValue::Empty)
                    }
                }
            }
            Tag::CurrencyQty => self.build_currency_qty_cell(child, row_index, col0, row_variables),
            Tag::Currency => self.build_currency_cell(child, row_variables),
            _ => self.build_rich_text_cell(
                td,
                row_index,
                col0,
                col_span,
                row_span,
                row_cells,
                overflow_rows,
                overflow_row_count,
            ),
        }
    }

    fn build_currency_cell(
        &mut self,
        child: &ElementNode,
        row_variables: &mut VarMap,
    ) -> Result<CellValue> {
        let (mut symbol, value) = match child.attr("variable") {
            Some(variable) => {
                let Some(value) = self.variables.get(variable).and_then(VarValue::as_num) else {
                    log::warn!("currency variable {variable:?} not set, leaving cell empty");
                    return Ok(CellValue::Empty);
                };
                let symbol = self
                    .variables
                    .get(&format!("{variable}__symbol"))
                    .map(|v| v.to_string())
                    .unwrap_or_default();
                (symbol, value)
            }
            None => {
                let symbol = child.attr("symbol").unwrap_or("").to_string();
                let value = child.attr_f32("value", 0.0)? as f64;
                (symbol, value)
            }
        };

        if let Some(add_to) = child.attr("add_to") {
            if symbol.is_empty() {
                symbol = self
                    .variables
                    .get(&format!("{add_to}__symbol"))
                    .map(|v| v.to_string())
                    .unwrap_or_default();
            }
            let total = self
                .variables
                .get(add_to)
                .and_then(VarValue::as_num)
                .unwrap_or(0.0)
                + value;
            self.variables
                .insert(add_to.to_string(), VarValue::Num(total));
            row_variables.insert(add_to.to_string(), VarValue::Num(total));
            self.refresh_currency_display(add_to, total, row_variables);
        }

        Ok(CellValue::Text(format!(
            "{symbol}{}",
            intcomma_currency(value / 100.0, false)
        )))
    }

    fn build_currency_qty_cell(
        &mut self,
        child: &ElementNode,
        row_index: usize,
        col0: usize,
        _row_variables: &mut VarMap,
    ) -> Result<CellValue> {
        let qty = child.attr_f32("qty", 1.0)?.max(1.0) as f64;
        let (symbol, value) = match child.attr("variable") {
            Some(variable) => {
                let value = self
                    .variables
                    .get(variable)
                    .and_then(VarValue::as_num)
                    .unwrap_or(0.0);
                let symbol = self
                    .variables
                    .get(&format!("{variable}__symbol"))
                    .map(|v| v.to_string())
                    .unwrap_or_default();
                (symbol, value)
            }
            None => {
                let mut symbol = child.attr("symbol").unwrap_or("").to_string();
                if symbol.is_empty() {
                    if let Some(from) = child.attr("symbol_from") {
                        symbol = self
                            .variables
                            .get(&format!("{from}__symbol"))
                            .map(|v| v.to_string())
                            .unwrap_or_default();
                    }
                }
                (symbol, child.attr_f32("value", 0.0)? as f64)
            }
        };

        let unit = (value / qty) / 100.0;
        let display = format!("{symbol}{}", intcomma_currency(unit, true));
        let style = ParaStyle::from_commands(&self.commands, col0, row_index);
        Ok(CellValue::Paragraph(Paragraph::from_text(display, style)))
    }

    #[allow(clippy::too_many_arguments)]
    fn build_rich_text_cell(
        &mut self,
        td: &ElementNode,
        row_index: usize,
        col0: usize,
        col_span: usize,
        row_span: usize,
        row_cells: &[CellValue],
        overflow_rows: &mut Vec<Row>,
        overflow_row_count: &mut usize,
    ) -> Result<CellValue> {
        let markup = td.to_markup();
        let style = ParaStyle::from_commands(&self.commands, col0, row_index);

        let overflow_gt_length = td.attr_usize("overflow_gt_length", 0)?;
        let overflow_gt_height = td
            .attr("overflow_gt_height")
            .and_then(|v| parse_measurement(v, Unit::Mm));

        let (primary_markup, fragments) = if overflow_gt_length > 0
            && strip_markup(&markup).chars().count() > overflow_gt_length
        {
            let overflow_length = td.attr_usize("overflow_length", 0)?;
            split_markup(&markup, overflow_length)
        } else if let Some(cap) = overflow_gt_height {
            let width = self.cell_flow_width(col0, col_span);
            split_markup_by_height(&markup, cap, width, &style, self.ctx.fonts)
        } else {
            (markup.clone(), Vec::new())
        };

        if fragments.is_empty() {
            return Ok(CellValue::Paragraph(Paragraph::new(markup, style)));
        }

        let fragment_count = fragments.len();
        for (offset_index, fragment) in fragments.into_iter().enumerate() {
            let overflow_offset = offset_index + 1;
            let position = if overflow_offset == fragment_count {
                "bottom"
            } else {
                "middle"
            };
            let rect = CellRange::new(
                col0 as i32,
                (row_index + overflow_offset) as i32,
                (col0 + col_span - 1) as i32,
                (row_index + overflow_offset + row_span - 1) as i32,
            );
            // The cell's own styling re-applies to each continuation row,
            // then any overflow-specific styling on top.
            self.parse_td_css(td, rect, "style", "class")?;
            self.parse_td_css(
                td,
                rect,
                &format!("overflow_{position}_style"),
                &format!("overflow_{position}_class"),
            )?;
            let fragment_style =
                ParaStyle::from_commands(&self.commands, col0, row_index + overflow_offset);

            let mut cells = vec![CellValue::Empty; row_cells.len()];
            cells.push(CellValue::Paragraph(Paragraph::new(
                fragment,
                fragment_style,
            )));
            overflow_rows.push(Row::new(cells));
        }
        *overflow_row_count += fragment_count;

        let rect = CellRange::new(
            col0 as i32,
            row_index as i32,
            (col0 + col_span - 1) as i32,
            (row_index + row_span - 1) as i32,
        );
        self.parse_td_css(td, rect, "overflow_top_style", "overflow_top_class")?;
        let primary_style = ParaStyle::from_commands(&self.commands, col0, row_index);
        Ok(CellValue::Paragraph(Paragraph::new(
            primary_markup,
            primary_style,
        )))
    }

    fn parse_td_css(
        &mut self,
        td: &ElementNode,
        rect: CellRange,
        style_attr: &str,
        class_attr: &str,
    ) -> Result<()> {
        let css = css_for_element(&td.attributes, self.ctx.classes, style_attr, class_attr);
        if css.is_empty() {
            return Ok(());
        }
        let mut other = OtherStyles::default();
        parse_declarations(
            &css,
            rect,
            &mut self.commands,
            &mut other,
            self.ctx.strictness,
        )
    }

    /// Width a cell's flowed content will get, estimated from the widths
    /// declared so far (used for nested tables and height-based overflow,
    /// before final distribution).
    fn cell_flow_width(&self, col0: usize, col_span: usize) -> f32 {
        let mut widths = self.col_widths.clone();
        if widths.is_empty() {
            widths.push(ColWidth::Auto);
        }
        let distributed = crate::table::distribute_col_widths(&widths, self.table_width);
        let mut w = 0.0;
        for col in col0..col0 + col_span {
            w += distributed.get(col).copied().unwrap_or(0.0);
        }
        if w <= 0.0 {
            w = self.table_width;
        }
        // Default cell side paddings.
        (w - 12.0).max(1.0)
    }

    // -----------------------------------------------------------------
    // Continuation header/footer rows
    // -----------------------------------------------------------------

    fn process_header_footer_tr(&mut self, tr: &ElementNode, set: &mut RowSet) -> Result<()> {
        let row_index = set.rows.len();
        let row_css = css_for_element(&tr.attributes, self.ctx.classes, "style", "class");
        set.heights.push(tr.attr_f32("row_height", 35.0)?);

        let mut cells = Vec::new();
        let mut col = 0usize;
        for td in tr.child_elements() {
            if td.tag != Tag::Td {
                continue;
            }
            let mut td_css = row_css.clone();
            if !td_css.is_empty() && !td_css.ends_with(';') {
                td_css.push(';');
            }
            td_css.push_str(&css_for_element(
                &td.attributes,
                self.ctx.classes,
                "style",
                "class",
            ));
            let mut other = OtherStyles::default();
            parse_declarations(
                &td_css,
                CellRange::new(col as i32, row_index as i32, col as i32, row_index as i32),
                &mut set.commands,
                &mut other,
                self.ctx.strictness,
            )?;

            let cell = match td.first_content_child() {
                Some(child) if child.tag == Tag::Currency => match child.attr("variable") {
                    Some(variable) => CellValue::Text(format!("%({variable}__currency)s")),
                    None => {
                        let value = child.attr_f32("value", 0.0)? as f64;
                        CellValue::Text(intcomma_currency(value / 100.0, false))
                    }
                },
                Some(_) => {
                    let style = ParaStyle::from_commands(&set.commands, col, row_index);
                    CellValue::Paragraph(Paragraph::new(td.to_markup(), style))
                }
                None => CellValue::Text(td.text_content()),
            };
            cells.push(cell);
            col += 1;
        }

        let mut row = Row::new(cells);
        row.kind = RowKind::Heading;
        set.rows.push(row);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Attribute helpers
// ---------------------------------------------------------------------------

fn attr_flag(elem: &ElementNode, name: &str) -> bool {
    match elem.attr(name) {
        Some(v) => matches!(v.to_ascii_lowercase().as_str(), "" | "yes" | "true" | "1"),
        None => false,
    }
}

fn parse_dim_attr(elem: &ElementNode, name: &str) -> Result<f32> {
    match elem.attr(name) {
        None => Ok(0.0),
        Some(v) => parse_measurement(v, Unit::Pt).ok_or_else(|| Error::Attribute {
            name: name.to_string(),
            value: v.to_string(),
        }),
    }
}

/// Column width attribute: `NN%` keeps its percentage, a bare number is
/// millimetres.
fn parse_col_width(value: &str) -> Result<ColWidth> {
    let v = value.trim();
    if v.is_empty() {
        return Ok(ColWidth::Auto);
    }
    if let Some(pct) = v.strip_suffix('%') {
        let pct: f32 = pct.trim().parse().map_err(|_| Error::Attribute {
            name: "width".to_string(),
            value: value.to_string(),
        })?;
        return Ok(ColWidth::Percent(pct));
    }
    let mm: f32 = v.parse().map_err(|_| Error::Attribute {
        name: "width".to_string(),
        value: value.to_string(),
    })?;
    Ok(ColWidth::Fixed(mm * MM))
}

// ---------------------------------------------------------------------------
// Currency formatting
// ---------------------------------------------------------------------------

/// Format a currency amount with thousands separators. With
/// `more_decimal_places` the value is shown to five places with trailing
/// zeros beyond two stripped.
pub fn intcomma_currency(value: f64, more_decimal_places: bool) -> String {
    if more_decimal_places {
        let display = format!("{value:.5}");
        let main: f64 = display[..display.len() - 3].parse().unwrap_or(value);
        let extra = display[display.len() - 3..].trim_end_matches('0').to_string();
        format!("{}{}", intcomma(&format!("{main:.2}")), extra)
    } else {
        intcomma(&format!("{value:.2}"))
    }
}

fn intcomma(number: &str) -> String {
    let (sign, rest) = match number.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", number),
    };
    let (int_part, frac_part) = match rest.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (rest, None),
    };
    let mut grouped = String::new();
    for (i, c) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    match frac_part {
        Some(f) => format!("{sign}{grouped}.{f}"),
        None => format!("{sign}{grouped}"),
    }
}

// ---------------------------------------------------------------------------
// Overflow markup splitting
// ---------------------------------------------------------------------------

/// Split cell markup at the first `<br/>` after `min_len` characters of
/// raw markup (counted from the end of the opening tag), then at every
/// later `<br/>`. Each fragment is repaired into independently valid
/// markup. Returns the truncated primary markup plus the continuation
/// fragments.
pub fn split_markup(markup: &str, min_len: usize) -> (String, Vec<String>) {
    let offset = markup.find('>').map(|p| p + 1).unwrap_or(0);
    let search_from = (offset + min_len).min(markup.len());
    let Some((br_start, br_len)) = find_br(markup, search_from) else {
        return (markup.to_string(), Vec::new());
    };

    let mut raw_fragments = vec![markup[..br_start].to_string()];
    let mut rest = &markup[br_start + br_len..];
    loop {
        match find_br(rest, 0) {
            Some((pos, len)) => {
                raw_fragments.push(rest[..pos].to_string());
                rest = &rest[pos + len..];
            }
            None => {
                raw_fragments.push(rest.to_string());
                break;
            }
        }
    }

    let mut repaired = repair_fragments(&raw_fragments);
    let primary = repaired.remove(0);
    (primary, repaired)
}

/// Split cell markup so the primary fragment's rendered height stays under
/// `cap`. Candidate fragments are measured in a loop against the target
/// width with the real wrapper, never estimated.
pub fn split_markup_by_height(
    markup: &str,
    cap: f32,
    width: f32,
    style: &ParaStyle,
    fonts: &FontManager,
) -> (String, Vec<String>) {
    let full = Paragraph::new(markup.to_string(), style.clone());
    if full.text_height(width, fonts) <= cap {
        return (markup.to_string(), Vec::new());
    }

    let (head, tail) = split_markup(markup, 0);
    if tail.is_empty() {
        return (markup.to_string(), Vec::new());
    }
    let mut fragments = vec![head];
    fragments.extend(tail);

    let mut fit = 1usize;
    for k in 1..=fragments.len() {
        let candidate = fragments[..k].join("<br/>");
        let height = Paragraph::new(candidate, style.clone()).text_height(width, fonts);
        if height > cap {
            break;
        }
        fit = k;
    }
    if fit >= fragments.len() {
        return (fragments.join("<br/>"), Vec::new());
    }
    let primary = fragments[..fit].join("<br/>");
    (primary, fragments[fit..].to_vec())
}

fn find_br(s: &str, from: usize) -> Option<(usize, usize)> {
    let mut search = from.min(s.len());
    while !s.is_char_boundary(search) {
        search += 1;
    }
    while let Some(rel) = s[search..].find("<br") {
        let start = search + rel;
        let rest = &s[start + 3..];
        let mut len = 3;
        let mut chars = rest.chars();
        loop {
            match chars.next() {
                Some(c) if c.is_whitespace() => len += c.len_utf8(),
                Some('/') => len += 1,
                Some('>') => {
                    len += 1;
                    return Some((start, len));
                }
                _ => break,
            }
        }
        search = start + 3;
    }
    None
}

/// Re-balance markup fragments produced by cutting at `<br/>` boundaries:
/// track the open-tag stack, close unclosed tags in reverse order at the
/// end of each fragment, and reopen them at the start of the next.
pub fn repair_fragments(fragments: &[String]) -> Vec<String> {
    let mut out = Vec::with_capacity(fragments.len());
    let mut reopen = String::new();
    for fragment in fragments {
        let working = format!("{reopen}{fragment}");
        let mut stack: Vec<(String, String)> = Vec::new();

        let mut rest = working.as_str();
        while let Some(open) = rest.find('<') {
            let Some(close) = rest[open..].find('>') else {
                break;
            };
            let token = &rest[open..open + close + 1];
            let inner = &token[1..token.len() - 1];
            if let Some(name) = inner.strip_prefix('/') {
                let name = name.trim();
                if stack.last().map(|(n, _)| n.as_str()) == Some(name) {
                    stack.pop();
                }
            } else if !inner.ends_with('/') {
                let name = inner
                    .split(|c: char| c.is_whitespace())
                    .next()
                    .unwrap_or("")
                    .to_string();
                if !name.is_empty() {
                    stack.push((name, token.to_string()));
                }
            }
            rest = &rest[open + close + 1..];
        }

        let mut repaired = working.clone();
        for (name, _) in stack.iter().rev() {
            repaired.push_str(&format!("</{name}>"));
        }
        out.push(repaired);
        reopen = stack.iter().map(|(_, token)| token.as_str()).collect();
    }
    out
}
