//! Sample report documents for testing and demonstration.
//!
//! Each template exercises different parts of the dialect.

/// Smallest useful document.
pub fn minimal_template() -> &'static str {
    r#"<document title="Minimal" page_size="a4" border_left_first="15" border_right_first="15" border_top_first="20" border_bottom_first="20">
    <p>Hello from the report engine.</p>
</document>"#
}

/// Invoice-style document: style classes, column widths, currency
/// accumulation, and a continuation footer.
pub fn invoice_template() -> &'static str {
    r#"<document title="Invoice 2024-001" page_size="a4" border_left_first="15" border_right_first="15" border_top_first="20" border_bottom_first="25">
    <style>
        heading { background:#e3e3e3; font:Helvetica-Bold; size:10 }
        money { align:right }
    </style>
    <p style="font:Helvetica-Bold;size:16">Invoice 2024-001</p>
    <spacer style="height:6"/>
    <table layout_widths="50%,15%,15%,20%" style="inner_grid:0.5;box:1">
        <header>
            <tr row_height="18"><td class="heading">Item (continued)</td><td class="heading">Qty</td><td class="heading">Price</td><td class="heading">Total</td></tr>
        </header>
        <footer>
            <tr row_height="18"><td>Carried forward</td><td></td><td></td><td class="money"><currency variable="running"/></td></tr>
        </footer>
        <tr row_type="header"><td class="heading">Item</td><td class="heading">Qty</td><td class="heading">Price</td><td class="heading">Total</td></tr>
        <tr><currency_variables symbol="&#163;" running="0"/><td>Web development</td><td>40</td><td class="money"><currency value="1500000" add_to="running"/></td><td class="money"><currency variable="running"/></td></tr>
        <tr><td>Design services</td><td>20</td><td class="money"><currency value="250000" add_to="running"/></td><td class="money"><currency variable="running"/></td></tr>
        <tr><td>Hosting (annual)</td><td>1</td><td class="money"><currency value="50000" add_to="running"/></td><td class="money"><currency variable="running"/></td></tr>
        <tr row_type="total"><td>Total</td><td></td><td></td><td class="money"><currency variable="running"/></td></tr>
    </table>
</document>"#
}

/// Spans, keep blocks, blank separators and a total row.
pub fn spans_template() -> &'static str {
    r#"<document title="Spans" page_size="a4" border_left_first="15" border_right_first="15" border_top_first="20" border_bottom_first="20">
    <table style="inner_grid:0.5;box:1" min_rows_before_total="2">
        <tr><td colspan="3" style="background:#cccccc">Section one</td></tr>
        <tr><td rowspan="2">Group</td><td>alpha</td><td>1</td></tr>
        <tr><td>beta</td><td>2</td></tr>
        <tr row_type="blank"><td></td><td></td><td></td></tr>
        <keep>
            <tr><td>kept</td><td>together</td><td>3</td></tr>
            <tr><td>kept</td><td>together</td><td>4</td></tr>
        </keep>
        <tr row_type="total"><td colspan="2">Total</td><td>10</td></tr>
    </table>
</document>"#
}

/// Cell overflow by length with continuation styling.
pub fn overflow_template() -> &'static str {
    r#"<document title="Overflow" page_size="a4" border_left_first="15" border_right_first="15" border_top_first="20" border_bottom_first="20">
    <table layout_widths="20%,80%" style="inner_grid:0.5">
        <tr>
            <td>Notes</td>
            <td overflow_gt_length="40" overflow_length="20" overflow_middle_style="text_color:#777777" overflow_bottom_style="text_color:#aaaaaa">First line of a long note<br/>second line of the note<br/>third line of the note<br/>final line</td>
        </tr>
        <tr><td>After</td><td>short</td></tr>
    </table>
</document>"#
}

/// A table long enough to paginate, with per-row variable accumulation
/// surfaced in the continuation header and footer.
pub fn long_report_template(rows: usize) -> String {
    let mut xml = String::from(
        r#"<document title="Ledger" page_size="a4" border_left_first="15" border_right_first="15" border_top_first="20" border_bottom_first="25">
    <table layout_widths="60%,40%" style="inner_grid:0.5;box:1">
        <header>
            <tr row_height="16"><td>Brought forward</td><td><currency variable="total"/></td></tr>
        </header>
        <footer>
            <tr row_height="16"><td>Carried forward</td><td><currency variable="total"/></td></tr>
        </footer>
        <tr><currency_variables symbol="&#163;" total="0"/><td>Opening</td><td><currency variable="total"/></td></tr>
"#,
    );
    for i in 0..rows {
        xml.push_str(&format!(
            "        <tr><td>Entry {i}</td><td><currency value=\"1250\" add_to=\"total\"/></td></tr>\n"
        ));
    }
    xml.push_str("    </table>\n</document>");
    xml
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::parse_document;

    #[test]
    fn templates_parse() {
        for xml in [
            minimal_template(),
            invoice_template(),
            spans_template(),
            overflow_template(),
        ] {
            parse_document(xml).unwrap();
        }
        parse_document(&long_report_template(10)).unwrap();
    }
}
