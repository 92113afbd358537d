//! Pipeline – ties together parsing, row building, pagination, and
//! rendering into a single function call.

use std::collections::HashMap;
use std::rc::Rc;

use crate::dom::{parse_document, ElementNode, Tag};
use crate::error::{Error, Result};
use crate::flowable::{Element, Spacer};
use crate::fonts::FontManager;
use crate::layout_config::LayoutConfig;
use crate::measure::MeasureCtx;
use crate::paginate::{paginate, Margins, PageSetup};
use crate::paragraph::{ParaStyle, Paragraph};
use crate::render::render_pdf;
use crate::row::{build_table, BuildCtx};
use crate::style::{css_for_element, parse_measurement, parse_style_classes, Strictness, StyleClasses, Unit, MM};

/// Sink for coarse-grained build milestones, called a handful of times per
/// document.
pub type StatusSink = Rc<dyn Fn(&str)>;

/// Host-side collaborators and policies for a build.
#[derive(Clone, Default)]
pub struct PipelineConfig {
    /// Overrides the root element's `title` attribute.
    pub title: Option<String>,
    /// External id → flowable mapping consulted by `obj` cells.
    pub object_lookup: HashMap<String, Element>,
    pub strictness: Strictness,
    /// Render content wider than its cell instead of failing the build.
    pub tolerate_bounds_errors: bool,
    /// Milestone reporting; defaults to `log::info!`.
    pub status: Option<StatusSink>,
}

impl PipelineConfig {
    fn report(&self, message: &str) {
        match &self.status {
            Some(sink) => sink(message),
            None => log::info!("{message}"),
        }
    }
}

/// Full pipeline: report XML → PDF bytes plus the frozen page layout.
pub fn generate_pdf(xml: &str, config: &PipelineConfig) -> Result<(Vec<u8>, LayoutConfig)> {
    let layout = compute_layout_config(xml, config)?;
    config.report("rendering pdf");
    let bytes = render_pdf(&layout)?;
    Ok((bytes, layout))
}

/// Run the pipeline up to the frozen page layout (no PDF emission).
pub fn compute_layout_config(xml: &str, config: &PipelineConfig) -> Result<LayoutConfig> {
    // A fresh manager per document keeps the width memo cache scoped to
    // one build.
    let fonts = FontManager::default();

    config.report("parsing document");
    let root = parse_document(xml)?;
    let setup = page_setup_from_root(&root, config)?;

    config.report("building story");
    let ctx = MeasureCtx {
        fonts: &fonts,
        strictness: config.strictness,
        tolerate_bounds_errors: config.tolerate_bounds_errors,
    };
    let story = build_story(&root, &setup, config, &fonts)?;

    config.report("laying out pages");
    paginate(story, &setup, &ctx)
}

fn build_story(
    root: &ElementNode,
    setup: &PageSetup,
    config: &PipelineConfig,
    fonts: &FontManager,
) -> Result<Vec<Element>> {
    let mut classes = StyleClasses::new();
    let mut story = Vec::new();
    let table_width =
        setup.page_width - setup.margins_first.left - setup.margins_first.right;

    for child in root.child_elements() {
        match child.tag {
            Tag::Style => {
                parse_style_classes(&child.text_content(), &mut classes);
            }
            Tag::Table => {
                let build_ctx = BuildCtx {
                    classes: &classes,
                    fonts,
                    object_lookup: &config.object_lookup,
                    strictness: config.strictness,
                };
                if let Some(table) = build_table(child, table_width, &build_ctx)? {
                    story.push(Element::Table(table));
                }
            }
            Tag::P => {
                let mut style = ParaStyle::default();
                let css = css_for_element(&child.attributes, &classes, "style", "class");
                style.apply_raw_css(&css, config.strictness)?;
                story.push(Element::Paragraph(Paragraph::new(child.to_markup(), style)));
            }
            Tag::PageBreak => story.push(Element::PageBreak),
            Tag::Spacer => {
                let css = css_for_element(&child.attributes, &classes, "style", "class");
                story.push(Element::Spacer(Spacer {
                    height: spacer_height(&css)?,
                }));
            }
            _ => log::debug!("ignoring document child <{}>", child.tag.name()),
        }
    }
    Ok(story)
}

/// Spacer height from its declarations (`height:`), defaulting to 10mm.
fn spacer_height(css: &str) -> Result<f32> {
    let mut height = 10.0 * MM;
    for decl in css.split(';') {
        let decl = decl.trim();
        if decl.is_empty() {
            continue;
        }
        let Some((key, value)) = decl.split_once(':') else {
            return Err(Error::Style {
                declaration: decl.to_string(),
                message: "missing ':' separator".to_string(),
            });
        };
        if key.trim().eq_ignore_ascii_case("height") {
            if let Some(h) = parse_measurement(value, Unit::Mm) {
                height = h;
            }
        }
    }
    Ok(height)
}

fn page_setup_from_root(root: &ElementNode, config: &PipelineConfig) -> Result<PageSetup> {
    let (page_width, page_height) = page_size_from_string(
        root.attr("page_size").unwrap_or("a4"),
        root.attr("page_orientation").unwrap_or(""),
    )?;

    let left = root.attr_f32("border_left_first", 0.0)? * MM;
    let right = root.attr_f32("border_right_first", 0.0)? * MM;
    let top = root.attr_f32("border_top_first", 0.0)? * MM;
    let bottom = root.attr_f32("border_bottom_first", 0.0)? * MM;
    let margins_first = Margins {
        left,
        right,
        top,
        bottom,
    };
    let margins_continuation = Margins {
        left: root.attr_f32("border_left_continuation", left / MM)? * MM,
        right: root.attr_f32("border_right_continuation", right / MM)? * MM,
        top: root.attr_f32("border_top_continuation", top / MM)? * MM,
        bottom: root.attr_f32("border_bottom_continuation", bottom / MM)? * MM,
    };

    if let Some(style) = root.attr("page_style") {
        // Page chrome (background images, borders) is drawn by the host;
        // the style name is only logged here.
        log::debug!("page_style {style:?} delegated to host chrome");
    }

    let title = config
        .title
        .clone()
        .or_else(|| root.attr("title").map(str::to_string))
        .unwrap_or_else(|| "report".to_string());

    Ok(PageSetup {
        title,
        page_width,
        page_height,
        margins_first,
        margins_continuation,
    })
}

/// Page size lookup in points. The misspelling `leter` is accepted for
/// compatibility with existing documents.
fn page_size_from_string(page_size: &str, orientation: &str) -> Result<(f32, f32)> {
    let (w, h) = match page_size.to_ascii_lowercase().as_str() {
        "a4" | "" => (595.28, 841.89),
        "a6" => (297.64, 419.53),
        "a5" => (419.53, 595.28),
        "a3" => (841.89, 1190.55),
        "a2" => (1190.55, 1683.78),
        "a1" => (1683.78, 2383.94),
        "a0" => (2383.94, 3370.39),
        "letter" | "leter" => (612.0, 792.0),
        "legal" => (612.0, 1008.0),
        "elevenseventeen" => (792.0, 1224.0),
        other => {
            return Err(Error::Attribute {
                name: "page_size".to_string(),
                value: other.to_string(),
            })
        }
    };
    if orientation.eq_ignore_ascii_case("landscape") {
        Ok((h, w))
    } else {
        Ok((w, h))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_sizes() {
        assert_eq!(page_size_from_string("a4", "").unwrap(), (595.28, 841.89));
        assert_eq!(
            page_size_from_string("a4", "landscape").unwrap(),
            (841.89, 595.28)
        );
        assert_eq!(page_size_from_string("letter", "").unwrap(), (612.0, 792.0));
        assert_eq!(page_size_from_string("leter", "").unwrap(), (612.0, 792.0));
        assert!(page_size_from_string("b5", "").is_err());
    }

    #[test]
    fn minimal_document_layout() {
        let xml = r#"<document title="T" page_size="a4" border_left_first="10" border_right_first="10" border_top_first="10" border_bottom_first="10"><table><tr><td>hello</td></tr></table></document>"#;
        let layout = compute_layout_config(xml, &PipelineConfig::default()).unwrap();
        assert_eq!(layout.title, "T");
        assert_eq!(layout.pages.len(), 1);
        assert!(!layout.pages[0].boxes.is_empty());
    }

    #[test]
    fn title_override_wins() {
        let xml = r#"<document title="Original"><p>x</p></document>"#;
        let config = PipelineConfig {
            title: Some("Override".to_string()),
            ..Default::default()
        };
        let layout = compute_layout_config(xml, &config).unwrap();
        assert_eq!(layout.title, "Override");
    }

    #[test]
    fn spacer_height_parsing() {
        assert!((spacer_height("height:20").unwrap() - 20.0 * MM).abs() < 1e-3);
        assert!((spacer_height("").unwrap() - 10.0 * MM).abs() < 1e-3);
        assert!(spacer_height("height 20").is_err());
    }

    #[test]
    fn malformed_xml_is_fatal() {
        let xml = "<document><table><tr><td>a</td></table></document>";
        assert!(matches!(
            compute_layout_config(xml, &PipelineConfig::default()),
            Err(Error::Parse { .. })
        ));
    }

    #[test]
    fn status_sink_receives_milestones() {
        use std::cell::RefCell;
        let messages: Rc<RefCell<Vec<String>>> = Rc::new(RefCell::new(Vec::new()));
        let sink_messages = messages.clone();
        let config = PipelineConfig {
            status: Some(Rc::new(move |m: &str| {
                sink_messages.borrow_mut().push(m.to_string())
            })),
            ..Default::default()
        };
        let xml = "<document><p>x</p></document>";
        compute_layout_config(xml, &config).unwrap();
        let seen = messages.borrow();
        assert!(seen.iter().any(|m| m.contains("parsing")));
        assert!(seen.iter().any(|m| m.contains("laying out")));
    }
}
