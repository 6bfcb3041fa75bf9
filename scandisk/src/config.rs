/// Directory nesting beyond which the tree walk stops descending
pub const DEFAULT_MAX_DEPTH: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckOptions {
    /// Analyse and report, but open the image read-only and write nothing
    pub dry_run: bool,
    pub max_depth: usize,
}

impl Default for CheckOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}
