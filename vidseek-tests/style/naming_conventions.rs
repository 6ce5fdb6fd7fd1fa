//! Naming Convention Checker
//!
//! Flags banned function prefixes, vague type suffixes and generic module
//! names in the vidseek crates.

use std::fs;
use std::path::{Path, PathBuf};

/// A naming violation found in the code
#[derive(Debug)]
struct NamingViolation {
    file_path: String,
    line_number: usize,
    violation_type: &'static str,
    message: String,
}

const BANNED_FUNCTION_PREFIXES: [(&str, &str); 3] = [
    ("get_", "Use the noun directly: source.id() not source.get_id()"),
    ("set_", "Use descriptive verbs: view.apply() not view.set_videos()"),
    ("handle_", "Be specific: search_stream() not handle_search()"),
];

const BANNED_TYPE_SUFFIXES: [(&str, &str); 6] = [
    ("Factory", "Use a builder or a plain new() function"),
    ("Service", "Usually adds no semantic value"),
    ("Manager", "Name what it IS, not its role"),
    ("Handler", "Be more specific about what you're handling"),
    ("Processor", "Be more specific about what you're processing"),
    ("Controller", "Be more specific about what you're controlling"),
];

const BANNED_MODULE_NAMES: [&str; 5] = ["utils", "common", "helpers", "misc", "stuff"];

struct NamingChecker {
    violations: Vec<NamingViolation>,
    files_checked: usize,
}

impl NamingChecker {
    fn new() -> Self {
        Self {
            violations: Vec::new(),
            files_checked: 0,
        }
    }

    /// Rust files of every vidseek crate, skipping this checker's own directory.
    fn find_rust_files() -> Result<Vec<PathBuf>, Box<dyn std::error::Error>> {
        let mut files = Vec::new();
        for entry in fs::read_dir("..")? {
            let path = entry?.path();
            let is_crate = path
                .file_name()
                .is_some_and(|name| name.to_string_lossy().starts_with("vidseek"));
            if path.is_dir() && is_crate {
                Self::find_rust_files_recursive(&path, &mut files, 0)?;
            }
        }
        Ok(files)
    }

    fn find_rust_files_recursive(
        dir: &Path,
        files: &mut Vec<PathBuf>,
        depth: usize,
    ) -> Result<(), Box<dyn std::error::Error>> {
        if depth > 8 {
            return Ok(());
        }

        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if let Some(name) = path.file_name() {
                let name = name.to_string_lossy();
                if name == "target" || name == "style" || name.starts_with('.') {
                    continue;
                }
            }

            if path.is_dir() {
                Self::find_rust_files_recursive(&path, files, depth + 1)?;
            } else if path.extension().is_some_and(|extension| extension == "rs") {
                files.push(path);
            }
        }
        Ok(())
    }

    fn check_content(&mut self, file_path: &str, content: &str) {
        for (index, line) in content.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.starts_with("//") {
                continue;
            }

            let signature = trimmed
                .strip_prefix("pub ")
                .or_else(|| trimmed.strip_prefix("pub(crate) "))
                .unwrap_or(trimmed);
            let signature = signature.strip_prefix("async ").unwrap_or(signature);

            if let Some(rest) = signature.strip_prefix("fn ") {
                for (prefix, correction) in BANNED_FUNCTION_PREFIXES {
                    if rest.starts_with(prefix) {
                        self.violations.push(NamingViolation {
                            file_path: file_path.to_string(),
                            line_number: index + 1,
                            violation_type: "BANNED_FUNCTION_PREFIX",
                            message: format!("Function uses banned prefix '{prefix}'. {correction}"),
                        });
                    }
                }
            }

            let type_name = ["struct ", "enum ", "trait "]
                .iter()
                .find_map(|keyword| signature.strip_prefix(keyword))
                .and_then(|rest| rest.split(|c: char| !c.is_alphanumeric() && c != '_').next());
            if let Some(type_name) = type_name {
                for (suffix, correction) in BANNED_TYPE_SUFFIXES {
                    if type_name.ends_with(suffix) {
                        self.violations.push(NamingViolation {
                            file_path: file_path.to_string(),
                            line_number: index + 1,
                            violation_type: "BANNED_TYPE_SUFFIX",
                            message: format!(
                                "Type '{type_name}' uses banned '{suffix}' suffix. {correction}"
                            ),
                        });
                    }
                }
            }
        }
    }

    fn check_module_name(&mut self, file_path: &Path) {
        let Some(stem) = file_path.file_stem() else {
            return;
        };
        let stem = stem.to_string_lossy();
        if BANNED_MODULE_NAMES.contains(&stem.as_ref()) {
            self.violations.push(NamingViolation {
                file_path: file_path.display().to_string(),
                line_number: 1,
                violation_type: "BANNED_MODULE_NAME",
                message: format!("Module name '{stem}' is too generic"),
            });
        }
    }

    fn check_workspace(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        for file in Self::find_rust_files()? {
            let content = fs::read_to_string(&file)?;
            self.check_content(&file.display().to_string(), &content);
            self.check_module_name(&file);
            self.files_checked += 1;
        }
        Ok(())
    }

    fn report_violations(&self) -> bool {
        if self.violations.is_empty() {
            println!(
                "Naming conventions: {} files checked, no violations found",
                self.files_checked
            );
            return true;
        }

        for violation in &self.violations {
            println!(
                "{}:{} [{}] {}",
                violation.file_path,
                violation.line_number,
                violation.violation_type,
                violation.message
            );
        }
        println!(
            "Found {} naming violation(s) in {} file(s) checked",
            self.violations.len(),
            self.files_checked
        );
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detects_banned_names() {
        let mut checker = NamingChecker::new();
        let content = "
pub async fn get_sources() {}
fn handle_event() {}
pub struct SessionManager {
pub(crate) enum EventHandler {
// fn get_commented_out() {}
pub fn fetch_sources() {}
struct SearchSession {
";

        checker.check_content("sample.rs", content);

        let lines: Vec<usize> = checker.violations.iter().map(|v| v.line_number).collect();
        assert_eq!(lines, vec![2, 3, 4, 5]);
    }

    #[test]
    fn test_detects_generic_module_names() {
        let mut checker = NamingChecker::new();

        checker.check_module_name(Path::new("vidseek-core/src/utils.rs"));
        checker.check_module_name(Path::new("vidseek-core/src/retry.rs"));

        assert_eq!(checker.violations.len(), 1);
        assert_eq!(checker.violations[0].violation_type, "BANNED_MODULE_NAME");
    }

    #[test]
    fn naming_conventions() {
        let mut checker = NamingChecker::new();

        checker
            .check_workspace()
            .expect("Failed to check workspace");

        assert!(
            checker.report_violations(),
            "Naming convention violations found - see output above"
        );
    }
}
