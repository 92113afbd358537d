//! Pagination – fills page frames with flowables, splitting on overflow.
//!
//! The loop is single-threaded and processes the story strictly in
//! document order (variable state in tables depends on it). Each element
//! is measured against the space left in the current frame; an element
//! that does not fit is asked to split, and an element that can neither
//! fit a fresh page nor split is a fatal layout error rather than an
//! infinite re-attempt.

use std::collections::VecDeque;

use crate::error::{Error, Result};
use crate::flowable::{Element, Flowable};
use crate::layout_config::{LayoutConfig, PageLayout};
use crate::measure::{MeasureCtx, FUZZ};
use crate::style::HAlign;
use crate::table::AbsolutePos;

/// Page geometry: size plus the border margins for the first page and for
/// continuation pages.
#[derive(Debug, Clone)]
pub struct PageSetup {
    pub title: String,
    pub page_width: f32,
    pub page_height: f32,
    pub margins_first: Margins,
    pub margins_continuation: Margins,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Margins {
    pub left: f32,
    pub right: f32,
    pub top: f32,
    pub bottom: f32,
}

impl PageSetup {
    fn margins(&self, page_index: usize) -> &Margins {
        if page_index == 0 {
            &self.margins_first
        } else {
            &self.margins_continuation
        }
    }
}

/// Lay the story out into pages.
pub fn paginate(story: Vec<Element>, setup: &PageSetup, ctx: &MeasureCtx) -> Result<LayoutConfig> {
    let mut config = LayoutConfig {
        title: setup.title.clone(),
        page_width_pt: setup.page_width,
        page_height_pt: setup.page_height,
        pages: Vec::new(),
    };

    let mut queue: VecDeque<Element> = story.into();
    let mut page = PageLayout::new(0);
    let mut cursor = setup.margins(0).top;
    let mut page_fresh = true;

    while let Some(mut element) = queue.pop_front() {
        if matches!(element, Element::PageBreak) {
            close_page(&mut config, &mut page, &mut cursor, &mut page_fresh, setup);
            continue;
        }

        let margins = *setup.margins(page.page_index);
        let frame_width = setup.page_width - margins.left - margins.right;
        let frame_bottom = setup.page_height - margins.bottom;
        let avail = frame_bottom - cursor;

        let size = element.wrap(ctx, frame_width, avail)?;

        // Absolute positioning bypasses the flow entirely.
        if let Element::Table(table) = &element {
            if let Some(pos) = table.pos {
                let (x, y) = resolve_absolute(pos, table.width, table.height, setup, &margins);
                element.draw_at(ctx, &mut page, x, y);
                continue;
            }
        }

        if size.height <= avail + FUZZ {
            let x = margins.left + aligned_offset(&element, frame_width, size.width);
            element.draw_at(ctx, &mut page, x, cursor);
            cursor += size.height;
            page_fresh = false;
            continue;
        }

        match element.try_split(ctx, frame_width, avail)? {
            Some(parts) => {
                for part in parts.into_iter().rev() {
                    queue.push_front(part);
                }
            }
            None => {
                if page_fresh {
                    return Err(Error::Layout(format!(
                        "element {:.1}pt tall cannot fit an empty page of {avail:.1}pt and cannot split",
                        size.height
                    )));
                }
                queue.push_front(element);
                close_page(&mut config, &mut page, &mut cursor, &mut page_fresh, setup);
            }
        }
    }

    if !page.boxes.is_empty() || config.pages.is_empty() {
        config.pages.push(page);
    }
    Ok(config)
}

fn close_page(
    config: &mut LayoutConfig,
    page: &mut PageLayout,
    cursor: &mut f32,
    page_fresh: &mut bool,
    setup: &PageSetup,
) {
    let next_index = page.page_index + 1;
    config
        .pages
        .push(std::mem::replace(page, PageLayout::new(next_index)));
    *cursor = setup.margins(next_index).top;
    *page_fresh = true;
}

fn aligned_offset(element: &Element, frame_width: f32, content_width: f32) -> f32 {
    let h_align = match element {
        Element::Table(t) => t.h_align,
        _ => HAlign::Left,
    };
    match h_align {
        HAlign::Left => 0.0,
        HAlign::Center => ((frame_width - content_width) / 2.0).max(0.0),
        HAlign::Right => (frame_width - content_width).max(0.0),
    }
}

/// Resolve a `pos_x`/`pos_y` override against the page, honouring the
/// reference corner and the margin escape hatch. Returns top-left page
/// coordinates.
fn resolve_absolute(
    pos: AbsolutePos,
    width: f32,
    height: f32,
    setup: &PageSetup,
    margins: &Margins,
) -> (f32, f32) {
    let x = if pos.x_from_right {
        setup.page_width - pos.x - width
    } else {
        pos.x
    };
    let y = if pos.y_from_top {
        pos.y + if pos.ignore_margin { 0.0 } else { margins.top }
    } else {
        let bottom_inset = if pos.ignore_margin { 0.0 } else { margins.bottom };
        setup.page_height - pos.y - bottom_inset - height
    };
    (x, y)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flowable::Spacer;
    use crate::fonts::FontManager;
    use crate::style::Strictness;
    use crate::table::{CellValue, Row, RowHeight, Table};

    fn setup() -> PageSetup {
        PageSetup {
            title: "test".to_string(),
            page_width: 595.28,
            page_height: 841.89,
            margins_first: Margins {
                left: 40.0,
                right: 40.0,
                top: 40.0,
                bottom: 40.0,
            },
            margins_continuation: Margins {
                left: 40.0,
                right: 40.0,
                top: 40.0,
                bottom: 40.0,
            },
        }
    }

    fn ctx(fonts: &FontManager) -> MeasureCtx<'_> {
        MeasureCtx {
            fonts,
            strictness: Strictness::Lenient,
            tolerate_bounds_errors: false,
        }
    }

    fn fixed_table(heights: &[f32]) -> Table {
        let mut t = Table::empty();
        for (i, h) in heights.iter().enumerate() {
            let mut row = Row::new(vec![CellValue::Text(format!("row {i}"))]);
            row.height = RowHeight::Fixed(*h);
            t.rows.push(row);
        }
        t
    }

    #[test]
    fn single_table_single_page() {
        let fonts = FontManager::default();
        let story = vec![Element::Table(fixed_table(&[20.0; 5]))];
        let config = paginate(story, &setup(), &ctx(&fonts)).unwrap();
        assert_eq!(config.pages.len(), 1);
        assert!(!config.pages[0].boxes.is_empty());
    }

    #[test]
    fn long_table_splits_over_pages() {
        let fonts = FontManager::default();
        // 60 rows of 20pt = 1200pt against ~762pt of frame height.
        let story = vec![Element::Table(fixed_table(&[20.0; 60]))];
        let config = paginate(story, &setup(), &ctx(&fonts)).unwrap();
        assert!(config.pages.len() > 1, "expected table to paginate");
    }

    #[test]
    fn explicit_page_break_starts_new_page() {
        let fonts = FontManager::default();
        let story = vec![
            Element::Table(fixed_table(&[20.0; 2])),
            Element::PageBreak,
            Element::Table(fixed_table(&[20.0; 2])),
        ];
        let config = paginate(story, &setup(), &ctx(&fonts)).unwrap();
        assert_eq!(config.pages.len(), 2);
    }

    #[test]
    fn spacer_advances_cursor() {
        let fonts = FontManager::default();
        let story = vec![
            Element::Spacer(Spacer { height: 100.0 }),
            Element::Table(fixed_table(&[20.0])),
        ];
        let config = paginate(story, &setup(), &ctx(&fonts)).unwrap();
        let table_box = &config.pages[0].boxes[0];
        assert!((table_box.y - 140.0).abs() < 0.01);
    }

    #[test]
    fn unsplittable_oversized_element_is_fatal() {
        let fonts = FontManager::default();
        let mut t = fixed_table(&[2000.0]);
        t.rows[0].nosplit = true;
        t.derive_nosplit_commands();
        let story = vec![Element::Table(t)];
        assert!(matches!(
            paginate(story, &setup(), &ctx(&fonts)),
            Err(Error::Layout(_))
        ));
    }

    #[test]
    fn absolute_table_does_not_consume_flow() {
        let fonts = FontManager::default();
        let mut abs = fixed_table(&[20.0]);
        abs.pos = Some(AbsolutePos {
            x: 10.0,
            y: 15.0,
            x_from_right: false,
            y_from_top: true,
            ignore_margin: false,
        });
        let story = vec![
            Element::Table(abs),
            Element::Table(fixed_table(&[20.0])),
        ];
        let config = paginate(story, &setup(), &ctx(&fonts)).unwrap();
        let boxes = &config.pages[0].boxes;
        assert_eq!(boxes.len(), 2);
        // Absolute table at margin+15, flowed table still at the frame top.
        assert!((boxes[0].y - 55.0).abs() < 0.01);
        assert!((boxes[1].y - 40.0).abs() < 0.01);
    }

    #[test]
    fn empty_story_produces_one_page() {
        let fonts = FontManager::default();
        let config = paginate(Vec::new(), &setup(), &ctx(&fonts)).unwrap();
        assert_eq!(config.pages.len(), 1);
    }
}
