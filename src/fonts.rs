//! Font loading and text measurement using `ttf-parser`.
//!
//! The manager doubles as the line-breaking collaborator for the table
//! engine: row heights come from flowing text at a known column width, so
//! string widths are measured here and memoised. The memo cache is valid
//! for one document build and must be cleared between independent documents.

use std::cell::RefCell;
use std::collections::HashMap;

/// A loaded font face with metrics.
#[derive(Clone)]
pub struct FontData {
    /// Raw font bytes (kept alive for ttf-parser's zero-copy API).
    pub bytes: Vec<u8>,
    pub units_per_em: f32,
    pub ascender: f32,
    pub descender: f32,
    pub line_gap: f32,
}

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct FontKey {
    pub family: String,
    pub bold: bool,
    pub italic: bool,
}

/// Manages loaded fonts and memoises string-width lookups.
pub struct FontManager {
    fonts: HashMap<FontKey, FontData>,
    /// Fallback metrics if no font is loaded.
    default_key: FontKey,
    /// String-width memo keyed by (text, font key, size in milli-points).
    width_cache: RefCell<HashMap<(String, FontKey, u32), f32>>,
}

impl FontManager {
    pub fn new() -> Self {
        Self {
            fonts: HashMap::new(),
            default_key: FontKey {
                family: "Helvetica".to_string(),
                bold: false,
                italic: false,
            },
            width_cache: RefCell::new(HashMap::new()),
        }
    }

    /// Load a TTF/OTF font from bytes.
    pub fn load_font(
        &mut self,
        family: &str,
        bold: bool,
        italic: bool,
        bytes: Vec<u8>,
    ) -> Result<(), String> {
        let face =
            ttf_parser::Face::parse(&bytes, 0).map_err(|e| format!("Failed to parse font: {e}"))?;

        let data = FontData {
            units_per_em: face.units_per_em() as f32,
            ascender: face.ascender() as f32,
            descender: face.descender() as f32,
            line_gap: face.line_gap() as f32,
            bytes,
        };

        let key = FontKey {
            family: family.to_string(),
            bold,
            italic,
        };

        if self.fonts.is_empty() {
            self.default_key = key.clone();
        }
        self.fonts.insert(key, data);
        self.clear_measure_cache();
        Ok(())
    }

    /// Register a builtin font with synthetic Helvetica-like metrics for
    /// when no TTF is available.
    pub fn ensure_default(&mut self) {
        if self.fonts.is_empty() {
            for bold in [false, true] {
                let key = FontKey {
                    family: "Helvetica".to_string(),
                    bold,
                    italic: false,
                };
                self.fonts.insert(
                    key,
                    FontData {
                        bytes: Vec::new(),
                        units_per_em: 1000.0,
                        ascender: 750.0,
                        descender: -250.0,
                        line_gap: 0.0,
                    },
                );
            }
            self.default_key = FontKey {
                family: "Helvetica".to_string(),
                bold: false,
                italic: false,
            };
        }
    }

    /// Drop all memoised widths. Call between independent documents;
    /// cached values remain valid within a single build.
    pub fn clear_measure_cache(&self) {
        self.width_cache.borrow_mut().clear();
    }

    /// Get font data for a key, falling back to the default.
    pub fn get(&self, key: &FontKey) -> &FontData {
        self.fonts
            .get(key)
            .unwrap_or_else(|| self.fonts.get(&self.default_key).expect("No fonts loaded"))
    }

    /// Measure the width of a string at a given font size in points.
    /// With real font bytes, glyph advances are summed; otherwise an
    /// average character width heuristic (0.5 × font_size) applies.
    pub fn measure_text_width(
        &self,
        text: &str,
        font_size: f32,
        bold: bool,
        italic: bool,
        family: &str,
    ) -> f32 {
        let key = FontKey {
            family: family.to_string(),
            bold,
            italic,
        };
        let cache_key = (text.to_string(), key.clone(), (font_size * 1000.0) as u32);
        if let Some(w) = self.width_cache.borrow().get(&cache_key) {
            return *w;
        }
        let w = self.measure_uncached(text, font_size, bold, &key);
        self.width_cache.borrow_mut().insert(cache_key, w);
        w
    }

    fn measure_uncached(&self, text: &str, font_size: f32, bold: bool, key: &FontKey) -> f32 {
        let data = self.get(key);

        if data.bytes.is_empty() {
            // Heuristic: average char width ≈ 0.5 × font_size for
            // proportional fonts; bold is ~10 % wider.
            let avg = if bold { 0.55 } else { 0.5 };
            return text.chars().count() as f32 * font_size * avg;
        }

        if let Ok(face) = ttf_parser::Face::parse(&data.bytes, 0) {
            let scale = font_size / data.units_per_em;
            let mut width = 0.0f32;
            for ch in text.chars() {
                if let Some(gid) = face.glyph_index(ch) {
                    let advance = face.glyph_hor_advance(gid).unwrap_or(0);
                    width += advance as f32 * scale;
                } else {
                    width += font_size * 0.5;
                }
            }
            width
        } else {
            text.chars().count() as f32 * font_size * 0.5
        }
    }

    /// Ascender in points for the given font and size.
    pub fn ascender_pt(&self, font_size: f32, bold: bool, italic: bool, family: &str) -> f32 {
        let key = FontKey {
            family: family.to_string(),
            bold,
            italic,
        };
        let data = self.get(&key);
        data.ascender * font_size / data.units_per_em
    }

    /// Descender in points (negative) for the given font and size.
    pub fn descender_pt(&self, font_size: f32, bold: bool, italic: bool, family: &str) -> f32 {
        let key = FontKey {
            family: family.to_string(),
            bold,
            italic,
        };
        let data = self.get(&key);
        data.descender * font_size / data.units_per_em
    }

    /// Get font bytes for embedding in PDF.
    pub fn font_bytes(&self, key: &FontKey) -> Option<&[u8]> {
        self.fonts.get(key).and_then(|d| {
            if d.bytes.is_empty() {
                None
            } else {
                Some(d.bytes.as_slice())
            }
        })
    }
}

impl Default for FontManager {
    fn default() -> Self {
        let mut mgr = Self::new();
        mgr.ensure_default();
        mgr
    }
}

/// Word-wrap text to fit within `max_width` points. Returns a vec of lines.
pub fn wrap_text(
    text: &str,
    font_size: f32,
    bold: bool,
    italic: bool,
    family: &str,
    max_width: f32,
    fonts: &FontManager,
) -> Vec<String> {
    if max_width <= 0.0 || text.is_empty() {
        return vec![text.to_string()];
    }

    let mut lines: Vec<String> = Vec::new();
    for paragraph in text.split('\n') {
        let words: Vec<&str> = paragraph.split_whitespace().collect();
        if words.is_empty() {
            lines.push(String::new());
            continue;
        }

        let mut current_line = String::new();
        for word in &words {
            let candidate = if current_line.is_empty() {
                word.to_string()
            } else {
                format!("{} {}", current_line, word)
            };
            let w = fonts.measure_text_width(&candidate, font_size, bold, italic, family);
            if w > max_width && !current_line.is_empty() {
                lines.push(current_line);
                current_line = word.to_string();
            } else {
                current_line = candidate;
            }
        }
        if !current_line.is_empty() {
            lines.push(current_line);
        }
    }

    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heuristic_text_width() {
        let mgr = FontManager::default();
        let w = mgr.measure_text_width("Hello", 16.0, false, false, "Helvetica");
        // 5 chars × 16 × 0.5 = 40
        assert!((w - 40.0).abs() < 0.1);
    }

    #[test]
    fn width_cache_survives_repeat_lookup() {
        let mgr = FontManager::default();
        let w1 = mgr.measure_text_width("cached", 10.0, false, false, "Helvetica");
        let w2 = mgr.measure_text_width("cached", 10.0, false, false, "Helvetica");
        assert_eq!(w1, w2);
        mgr.clear_measure_cache();
        let w3 = mgr.measure_text_width("cached", 10.0, false, false, "Helvetica");
        assert_eq!(w1, w3);
    }

    #[test]
    fn word_wrap_basic() {
        let mgr = FontManager::default();
        let lines = wrap_text(
            "Hello world foo bar",
            16.0,
            false,
            false,
            "Helvetica",
            60.0,
            &mgr,
        );
        assert!(lines.len() >= 2, "Expected wrapping, got {:?}", lines);
    }

    #[test]
    fn ascender_descender_scale() {
        let mgr = FontManager::default();
        let asc = mgr.ascender_pt(10.0, false, false, "Helvetica");
        let desc = mgr.descender_pt(10.0, false, false, "Helvetica");
        assert!((asc - 7.5).abs() < 0.01);
        assert!((desc + 2.5).abs() < 0.01);
    }
}
