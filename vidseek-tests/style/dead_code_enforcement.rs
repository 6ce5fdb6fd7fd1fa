//! Dead Code Enforcement
//!
//! Production code in the vidseek crates must not carry dead code
//! allowances. Test code is exempt.

use std::fs;
use std::path::{Path, PathBuf};

/// A dead code allowance found in production code
#[derive(Debug)]
struct DeadCodeViolation {
    file_path: String,
    line_number: usize,
    context: String,
}

struct DeadCodeChecker {
    violations: Vec<DeadCodeViolation>,
    files_checked: usize,
}

impl DeadCodeChecker {
    fn new() -> Self {
        Self {
            violations: Vec::new(),
            files_checked: 0,
        }
    }

    /// Sources under each crate's `src/`, which is where production code lives.
    fn find_production_files() -> Result<Vec<PathBuf>, Box<dyn std::error::Error>> {
        let mut files = Vec::new();
        for entry in fs::read_dir("..")? {
            let crate_dir = entry?.path();
            let is_crate = crate_dir
                .file_name()
                .is_some_and(|name| name.to_string_lossy().starts_with("vidseek"));
            let src = crate_dir.join("src");
            if is_crate && src.is_dir() {
                Self::collect(&src, &mut files, 0)?;
            }
        }
        Ok(files)
    }

    fn collect(
        dir: &Path,
        files: &mut Vec<PathBuf>,
        depth: usize,
    ) -> Result<(), Box<dyn std::error::Error>> {
        if depth > 10 {
            return Ok(());
        }
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_dir() {
                Self::collect(&path, files, depth + 1)?;
            } else if path.extension().is_some_and(|extension| extension == "rs") {
                files.push(path);
            }
        }
        Ok(())
    }

    /// Scans `content` up to its `#[cfg(test)]` module.
    fn check_content(&mut self, file_path: &str, content: &str) {
        for (index, line) in content.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed == "#[cfg(test)]" {
                break;
            }
            if trimmed.starts_with("#[allow(") && trimmed.contains("dead_code") {
                self.violations.push(DeadCodeViolation {
                    file_path: file_path.to_string(),
                    line_number: index + 1,
                    context: trimmed.to_string(),
                });
            }
        }
    }

    fn check_workspace(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        for file in Self::find_production_files()? {
            let content = fs::read_to_string(&file)?;
            self.check_content(&file.display().to_string(), &content);
            self.files_checked += 1;
        }
        Ok(())
    }

    fn report_violations(&self) -> bool {
        if self.violations.is_empty() {
            println!(
                "Dead code enforcement: {} files checked, no violations found",
                self.files_checked
            );
            return true;
        }

        for violation in &self.violations {
            println!("{}:{}", violation.file_path, violation.line_number);
            println!("  {}", violation.context);
        }
        println!(
            "Found {} violation(s) in {} file(s) checked",
            self.violations.len(),
            self.files_checked
        );
        println!("Remove the unused code or use it; test modules are exempt.");
        false
    }
}
