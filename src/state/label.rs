use serde::{Deserialize, Serialize};

/// Color palette for label overlays and series lines, as hex strings so they
/// round-trip through the config files unchanged.
pub const COLOR_PALETTE: [&str; 12] = [
    "#1f77b4", // blue
    "#2ca02c", // green
    "#d62728", // red
    "#ff7f0e", // orange
    "#9467bd", // purple
    "#8c564b", // brown
    "#e377c2", // pink
    "#7f7f7f", // gray
    "#bcbd22", // olive
    "#17becf", // cyan
    "#aec7e8", // light blue
    "#98df8a", // light green
];

pub fn color_for_index(index: usize) -> &'static str {
    COLOR_PALETTE[index % COLOR_PALETTE.len()]
}

/// Parse a `#rrggbb` hex string into an egui color. Falls back to gray on
/// malformed input rather than failing the whole render pass.
pub fn color32_from_hex(hex: &str) -> egui::Color32 {
    let s = hex.trim_start_matches('#');
    if s.len() == 6 {
        if let (Ok(r), Ok(g), Ok(b)) = (
            u8::from_str_radix(&s[0..2], 16),
            u8::from_str_radix(&s[2..4], 16),
            u8::from_str_radix(&s[4..6], 16),
        ) {
            return egui::Color32::from_rgb(r, g, b);
        }
    }
    egui::Color32::GRAY
}

/// Which subplots a label overlay is drawn in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LabelScope {
    /// Drawn in every subplot (synchronized channel mode).
    All,
    /// Drawn only in the subplot where the interaction occurred.
    Subplot(usize),
}

/// One annotated interval. The range is expressed in canonical row indices
/// of the undownsampled table, inclusive on both ends, and never in display
/// coordinates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelEntry {
    pub name: String,
    pub range: (usize, usize),
    pub scope: LabelScope,
}

impl LabelEntry {
    pub fn new(name: impl Into<String>, range: (usize, usize), scope: LabelScope) -> Self {
        Self {
            name: name.into(),
            range,
            scope,
        }
    }

    /// Marker-column name used when re-serializing this label. Independent
    /// labels carry a `#<subplot>` channel tag so they survive a round trip.
    pub fn column_name(&self) -> String {
        match self.scope {
            LabelScope::All => self.name.clone(),
            LabelScope::Subplot(i) => format!("{}#{}", self.name, i),
        }
    }

    /// Inverse of [`column_name`](Self::column_name): given a column header
    /// and the roster names, recover the base label name and scope.
    pub fn parse_column_name(column: &str, roster_names: &[String]) -> Option<(String, LabelScope)> {
        if roster_names.iter().any(|n| n == column) {
            return Some((column.to_string(), LabelScope::All));
        }
        let (base, tag) = column.rsplit_once('#')?;
        if !roster_names.iter().any(|n| n == base) {
            return None;
        }
        let subplot: usize = tag.parse().ok()?;
        Some((base.to_string(), LabelScope::Subplot(subplot)))
    }

    pub fn start(&self) -> usize {
        self.range.0
    }

    pub fn end(&self) -> usize {
        self.range.1
    }
}

/// Ordered list of `(name, color)` pairs with a wrapping "current label"
/// cursor.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelRoster {
    names: Vec<String>,
    colors: Vec<String>,
    cursor: usize,
}

impl LabelRoster {
    pub fn new(names: Vec<String>, colors: Vec<String>) -> Self {
        let mut roster = Self {
            names,
            colors: Vec::new(),
            cursor: 0,
        };
        // Pad missing colors from the palette so the two lists stay parallel.
        roster.colors = colors;
        while roster.colors.len() < roster.names.len() {
            let idx = roster.colors.len();
            roster.colors.push(color_for_index(idx).to_string());
        }
        roster.colors.truncate(roster.names.len());
        roster
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn colors(&self) -> &[String] {
        &self.colors
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Current `(name, color)` pair, if the roster is non-empty.
    pub fn current(&self) -> Option<(&str, &str)> {
        let name = self.names.get(self.cursor)?;
        let color = self.colors.get(self.cursor)?;
        Some((name, color))
    }

    pub fn next(&mut self) {
        if !self.names.is_empty() {
            self.cursor = (self.cursor + 1) % self.names.len();
        }
    }

    pub fn prev(&mut self) {
        if !self.names.is_empty() {
            self.cursor = (self.cursor + self.names.len() - 1) % self.names.len();
        }
    }

    /// Color registered for a label name.
    pub fn color_of(&self, name: &str) -> Option<&str> {
        let idx = self.names.iter().position(|n| n == name)?;
        self.colors.get(idx).map(|c| c.as_str())
    }

    /// Replace the roster contents, keeping the cursor where possible.
    /// A roster that shrinks to `len <= cursor` resets the cursor to 0.
    pub fn set_entries(&mut self, names: Vec<String>, colors: Vec<String>) {
        let replacement = LabelRoster::new(names, colors);
        self.names = replacement.names;
        self.colors = replacement.colors;
        if self.names.len() <= self.cursor {
            self.cursor = 0;
        }
    }

    pub fn add(&mut self, name: String, color: String) {
        self.names.push(name);
        self.colors.push(color);
    }

    pub fn rename(&mut self, index: usize, name: String, color: String) {
        if index < self.names.len() {
            self.names[index] = name;
            self.colors[index] = color;
        }
    }

    pub fn remove(&mut self, index: usize) {
        if index < self.names.len() {
            self.names.remove(index);
            self.colors.remove(index);
            if self.names.len() <= self.cursor {
                self.cursor = 0;
            }
        }
    }
}

impl Default for LabelRoster {
    fn default() -> Self {
        Self::new(
            vec![
                "Label #1".to_string(),
                "Label #2".to_string(),
                "Label #3".to_string(),
            ],
            vec![
                COLOR_PALETTE[0].to_string(),
                COLOR_PALETTE[1].to_string(),
                COLOR_PALETTE[2].to_string(),
            ],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_wraps_in_both_directions() {
        let mut roster = LabelRoster::default();
        assert_eq!(roster.current().unwrap().0, "Label #1");
        roster.prev();
        assert_eq!(roster.current().unwrap().0, "Label #3");
        roster.next();
        roster.next();
        roster.next();
        roster.next();
        // 2 + 4 wraps modulo 3 back to the first entry.
        assert_eq!(roster.current().unwrap().0, "Label #1");
    }

    #[test]
    fn shrinking_roster_resets_cursor() {
        let mut roster = LabelRoster::default();
        roster.next();
        roster.next();
        assert_eq!(roster.cursor(), 2);
        roster.set_entries(
            vec!["Only".to_string(), "Two".to_string()],
            vec!["#112233".to_string(), "#445566".to_string()],
        );
        assert_eq!(roster.cursor(), 0);
    }

    #[test]
    fn missing_colors_are_padded_from_palette() {
        let roster = LabelRoster::new(
            vec!["A".to_string(), "B".to_string()],
            vec!["#000000".to_string()],
        );
        assert_eq!(roster.colors().len(), 2);
        assert_eq!(roster.color_of("B"), Some(COLOR_PALETTE[1]));
    }

    #[test]
    fn column_name_round_trips_scope() {
        let roster_names = vec!["Walk".to_string()];
        let sync = LabelEntry::new("Walk", (3, 9), LabelScope::All);
        let indep = LabelEntry::new("Walk", (3, 9), LabelScope::Subplot(2));

        assert_eq!(
            LabelEntry::parse_column_name(&sync.column_name(), &roster_names),
            Some(("Walk".to_string(), LabelScope::All))
        );
        assert_eq!(
            LabelEntry::parse_column_name(&indep.column_name(), &roster_names),
            Some(("Walk".to_string(), LabelScope::Subplot(2)))
        );
        assert_eq!(LabelEntry::parse_column_name("Run", &roster_names), None);
    }
}
