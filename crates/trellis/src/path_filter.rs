use crate::{Error, Result};
use glob::{MatchOptions, Pattern};

const MATCH_OPTIONS: MatchOptions = MatchOptions {
  case_sensitive: true,
  require_literal_separator: true,
  require_literal_leading_dot: false,
};

/// Include/exclude glob gate over the files changed by an event.
#[derive(Debug, Clone, Default)]
pub struct PathFilter {
  include: Vec<Pattern>,
  exclude: Vec<Pattern>,
}

impl PathFilter {
  pub fn new<I, E>(include: I, exclude: E) -> Result<Self>
  where
    I: IntoIterator,
    I::Item: AsRef<str>,
    E: IntoIterator,
    E::Item: AsRef<str>,
  {
    Ok(PathFilter {
      include: compile_patterns(include)?,
      exclude: compile_patterns(exclude)?,
    })
  }

  /// An empty change set (manual dispatch, schedule) always matches.
  /// A change set made only of excluded paths never matches, whatever the
  /// include globs say. Otherwise at least one path has to be included,
  /// unless no include glob was declared at all.
  pub fn matches<S: AsRef<str>>(&self, changed_files: &[S]) -> bool {
    if changed_files.is_empty() {
      return true;
    }

    if !self.exclude.is_empty()
      && changed_files
        .iter()
        .all(|file| matches_any(&self.exclude, file.as_ref()))
    {
      log::trace!("All changed files are excluded");
      return false;
    }

    if self.include.is_empty() {
      return true;
    }

    changed_files
      .iter()
      .any(|file| matches_any(&self.include, file.as_ref()))
  }

  pub fn is_empty(&self) -> bool {
    self.include.is_empty() && self.exclude.is_empty()
  }
}

pub(crate) fn compile_patterns<I>(patterns: I) -> Result<Vec<Pattern>>
where
  I: IntoIterator,
  I::Item: AsRef<str>,
{
  patterns
    .into_iter()
    .map(|pattern| {
      let pattern = pattern.as_ref();
      Pattern::new(pattern).map_err(|err| {
        Error::configuration_error(format!("Invalid glob pattern `{}`: {}", pattern, err))
      })
    })
    .collect()
}

pub(crate) fn matches_any(patterns: &[Pattern], value: &str) -> bool {
  patterns
    .iter()
    .any(|pattern| pattern.matches_with(value, MATCH_OPTIONS))
}

#[cfg(test)]
mod tests {
  use super::*;

  fn filter(include: &[&str], exclude: &[&str]) -> PathFilter {
    PathFilter::new(include, exclude).unwrap()
  }

  #[test]
  fn empty_change_set_matches() {
    let empty: [&str; 0] = [];
    assert!(filter(&["src/**"], &["**/*.md"]).matches(&empty));
  }

  #[test]
  fn recursive_wildcard() {
    let f = filter(&["crates/**/*.rs"], &[]);

    assert!(f.matches(&["crates/core/src/lib.rs"]));
    assert!(f.matches(&["crates/lib.rs"]));
    assert!(!f.matches(&["docs/book/index.md"]));
  }

  #[test]
  fn separator_is_literal() {
    let f = filter(&["src/*.rs"], &[]);

    assert!(f.matches(&["src/main.rs"]));
    assert!(!f.matches(&["src/runner/main.rs"]));
  }

  #[test]
  fn all_excluded_suppresses_run() {
    let f = filter(&["**"], &["**/*.md", "book/**"]);

    assert!(!f.matches(&["README.md", "book/src/intro.md"]));
    assert!(!f.matches(&["book/theme/style.css"]));
  }

  #[test]
  fn partial_exclusion_still_matches() {
    let f = filter(&["src/**"], &["**/*.md"]);

    assert!(f.matches(&["README.md", "src/lib.rs"]));
  }

  #[test]
  fn exclude_only() {
    let f = filter(&[], &["docs/**"]);

    assert!(f.matches(&["docs/a.md", "Cargo.toml"]));
    assert!(!f.matches(&["docs/a.md"]));
  }

  #[test]
  fn include_must_hit() {
    let f = filter(&["docker/**", "Cargo.lock"], &[]);

    assert!(f.matches(&["Cargo.lock"]));
    assert!(!f.matches(&["src/lib.rs", "tests/it.rs"]));
  }

  #[test]
  fn malformed_glob_is_configuration_error() {
    let err = PathFilter::new(["a**/b"], Vec::<String>::new()).unwrap_err();

    assert!(matches!(err, Error::ConfigurationError(_)));
    assert!(err.to_string().contains("a**/b"));
  }
}
