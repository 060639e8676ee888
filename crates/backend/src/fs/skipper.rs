//! Compiled ignore rules for one local root.

use std::path::Path;

use ignore::gitignore::{Gitignore, GitignoreBuilder};
use tracing::warn;

/// Evaluates a root's ignore rules against sub-paths.
///
/// The strategy string is a gitignore-dialect pattern list, one pattern per
/// line; `#` comments and blank lines are ignored. `.git/` is always
/// excluded on top of the user's patterns.
pub struct Skipper {
  matcher: Gitignore,
}

impl Skipper {
  pub fn compile(root: &Path, strategy: &str) -> Result<Self, ignore::Error> {
    let mut builder = GitignoreBuilder::new(root);

    for line in strategy.lines() {
      let line = line.trim();
      if line.is_empty() || line.starts_with('#') {
        continue;
      }
      if let Err(e) = builder.add_line(None, line) {
        warn!(pattern = %line, error = %e, "Skipping unparsable ignore pattern");
      }
    }
    builder.add_line(None, ".git/")?;

    Ok(Self {
      matcher: builder.build()?,
    })
  }

  /// True if the entry at `sub` (relative to the root) should be ignored.
  pub fn skip(&self, sub: &Path, is_dir: bool) -> bool {
    self.matcher.matched(sub, is_dir).is_ignore()
  }
}
