//! Path-pattern analysis of a change.
//!
//! Derives the [`ChangeAttributes`] that the skill router, the routing
//! validator and rule conditions all look at, so every stage agrees on what
//! "security-sensitive" or "touches the API" means.

use regex::{Regex, RegexBuilder};

use crate::domain::models::{ChangeAttributes, ChangeDescription, SkillRoutingConfig};
use crate::services::errors::{RoutingError, RoutingResult};

/// Compiled pattern sets for classifying changed paths.
#[derive(Debug, Clone)]
pub struct ChangeAnalyzer {
    security: Vec<Regex>,
    api: Vec<Regex>,
    docs: Vec<Regex>,
    config: Vec<Regex>,
    tests: Vec<Regex>,
    lockfile_names: Vec<String>,
}

impl ChangeAnalyzer {
    /// Compile every configured pattern; the first bad one is an error.
    pub fn new(config: &SkillRoutingConfig) -> RoutingResult<Self> {
        Ok(Self {
            security: compile(&config.security_sensitive_patterns)?,
            api: compile(&config.api_change_patterns)?,
            docs: compile(&config.documentation_patterns)?,
            config: compile(&config.config_patterns)?,
            tests: compile(&config.test_patterns)?,
            lockfile_names: config.lockfile_names.clone(),
        })
    }

    pub fn analyze(&self, change: &ChangeDescription) -> ChangeAttributes {
        let mut attrs = ChangeAttributes {
            lines_changed: change.lines_changed,
            files_changed: change.files_changed() as u64,
            ..Default::default()
        };

        for path in &change.files {
            if matches_any(&self.security, path) {
                attrs.security_files.push(path.clone());
            }
            if matches_any(&self.api, path) {
                attrs.api_files.push(path.clone());
            }
            if matches_any(&self.docs, path) {
                attrs.docs_files.push(path.clone());
            }
            if matches_any(&self.config, path) {
                attrs.config_files.push(path.clone());
            }
            if matches_any(&self.tests, path) {
                attrs.tests_touched = true;
            }
            if self.is_lockfile(path) {
                attrs.lockfiles.push(path.clone());
            }
        }

        attrs.security_touched = !attrs.security_files.is_empty();
        attrs.api_touched = !attrs.api_files.is_empty();
        attrs.docs_touched = !attrs.docs_files.is_empty();
        attrs.config_touched = !attrs.config_files.is_empty();
        attrs.lockfile_touched = !attrs.lockfiles.is_empty();
        attrs
    }

    pub fn is_security_sensitive(&self, path: &str) -> bool {
        matches_any(&self.security, path)
    }

    fn is_lockfile(&self, path: &str) -> bool {
        let file_name = path.rsplit('/').next().unwrap_or(path);
        self.lockfile_names.iter().any(|name| name == file_name)
    }
}

fn compile(patterns: &[String]) -> RoutingResult<Vec<Regex>> {
    patterns
        .iter()
        .map(|pattern| {
            RegexBuilder::new(pattern)
                .case_insensitive(true)
                .build()
                .map_err(|e| RoutingError::InvalidPattern {
                    pattern: pattern.clone(),
                    reason: e.to_string(),
                })
        })
        .collect()
}

fn matches_any(patterns: &[Regex], path: &str) -> bool {
    patterns.iter().any(|re| re.is_match(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analyzer() -> ChangeAnalyzer {
        ChangeAnalyzer::new(&SkillRoutingConfig::default()).unwrap()
    }

    fn change(files: &[&str], loc: u64) -> ChangeDescription {
        ChangeDescription::new(
            "/repo",
            files.iter().map(|f| (*f).to_string()).collect(),
            loc,
        )
    }

    #[test]
    fn test_package_json_is_security_sensitive() {
        let attrs = analyzer().analyze(&change(&["web/package.json", "src/lib.rs"], 40));
        assert!(attrs.security_touched);
        assert_eq!(attrs.security_files, vec!["web/package.json"]);
        assert!(!attrs.lockfile_touched);
        assert_eq!(attrs.files_changed, 2);
        assert_eq!(attrs.lines_changed, 40);
    }

    #[test]
    fn test_lockfile_matches_by_file_name() {
        let attrs = analyzer().analyze(&change(&["Cargo.lock", "web/yarn.lock.bak"], 3));
        assert!(attrs.lockfile_touched);
        assert_eq!(attrs.lockfiles, vec!["Cargo.lock"]);
    }

    #[test]
    fn test_categories() {
        let attrs = analyzer().analyze(&change(
            &[
                "src/api/users.rs",
                "docs/guide.md",
                "deploy/app.yaml",
                "tests/users_test.rs",
                "src/Auth/session.rs",
            ],
            120,
        ));
        assert!(attrs.api_touched);
        assert!(attrs.docs_touched);
        assert!(attrs.config_touched);
        assert!(attrs.tests_touched);
        assert!(attrs.security_touched, "patterns are case-insensitive");
    }

    #[test]
    fn test_plain_source_change_touches_nothing() {
        let attrs = analyzer().analyze(&change(&["src/parser.rs"], 8));
        assert!(!attrs.security_touched);
        assert!(!attrs.api_touched);
        assert!(!attrs.docs_touched);
        assert!(!attrs.config_touched);
    }

    #[test]
    fn test_security_words_match_whole_names_only() {
        let analyzer = analyzer();
        for path in [
            "src/auth/login.rs",
            "src/auth.rs",
            "lib/oauth_client.py",
            "web/authService.ts",
            "src/authentication/mod.rs",
            "api/token-store.go",
            "config/secrets.yaml",
            "src/crypto/aes.rs",
        ] {
            let attrs = analyzer.analyze(&change(&[path], 10));
            assert!(attrs.security_touched, "{path} should be security sensitive");
        }
        for path in [
            "src/author.ts",
            "src/tokenizer.rs",
            "docs/authoring-guide.md",
            "src/secretary.rs",
        ] {
            let attrs = analyzer.analyze(&change(&[path], 10));
            assert!(!attrs.security_touched, "{path} should not be security sensitive");
        }
    }

    #[test]
    fn test_bad_pattern_fails_fast() {
        let config = SkillRoutingConfig {
            api_change_patterns: vec!["(unclosed".to_string()],
            ..Default::default()
        };
        let err = ChangeAnalyzer::new(&config).unwrap_err();
        assert!(matches!(err, RoutingError::InvalidPattern { ref pattern, .. } if pattern == "(unclosed"));
    }
}
