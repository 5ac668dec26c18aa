// src/recipe/parser.rs

//! Recipe file parsing

use crate::error::{Error, Result};
use crate::recipe::format::Recipe;
use crate::recipe::kitchen::stages::is_known_stage;
use crate::shell::is_valid_var_name;
use regex::Regex;
use std::path::Path;

/// Parse a recipe from a TOML string
pub fn parse_recipe(content: &str) -> Result<Recipe> {
    toml::from_str(content).map_err(|e| Error::ParseError(format!("Invalid recipe: {}", e)))
}

/// Parse a recipe from a file
pub fn parse_recipe_file(path: &Path) -> Result<Recipe> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::IoError(format!("Failed to read recipe file {}: {}", path.display(), e))
    })?;

    parse_recipe(&content).map_err(|e| match e {
        Error::ParseError(msg) => Error::ParseError(format!("{}: {}", path.display(), msg)),
        other => other,
    })
}

/// Validate a recipe for completeness and correctness
///
/// Returns warnings for things that are allowed but probably wrong.
pub fn validate_recipe(recipe: &Recipe) -> Result<Vec<String>> {
    let mut warnings = Vec::new();

    if recipe.name().is_empty() {
        return Err(Error::ParseError("Recipe package name cannot be empty".to_string()));
    }
    if recipe.version().is_empty() {
        return Err(Error::ParseError("Recipe package version cannot be empty".to_string()));
    }

    recipe.source.archive_name()?;

    if let Some(checksum) = recipe.source.checksum() {
        let valid = checksum
            .strip_prefix("sha256:")
            .is_some_and(|hex| hex.len() == 64 && hex.chars().all(|c| c.is_ascii_hexdigit()));
        if !valid {
            return Err(Error::ParseError(format!(
                "Invalid checksum format: {}. Expected sha256:<64 hex digits>",
                checksum
            )));
        }
    } else {
        warnings.push(format!("No checksum for {}", recipe.source.url()));
    }

    if recipe.build.stages.is_empty() {
        return Err(Error::ParseError("Recipe must list at least one build stage".to_string()));
    }
    for stage in &recipe.build.stages {
        if !is_known_stage(stage) {
            warnings.push(format!("Stage {} gets no extra setup.py arguments", stage));
        }
    }

    for name in recipe.build.environment.keys() {
        if !is_valid_var_name(name) {
            return Err(Error::ParseError(format!(
                "Invalid environment variable name: {}",
                name
            )));
        }
    }

    if let Some(pattern) = &recipe.build.artifact_pattern {
        let re = Regex::new(pattern)
            .map_err(|e| Error::ParseError(format!("Invalid artifact_pattern: {}", e)))?;
        if re.captures_len() < 2 {
            return Err(Error::ParseError(
                "artifact_pattern needs a capture group for the file name".to_string(),
            ));
        }
    }

    Ok(warnings)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PANDAS: &str = r#"
[package]
version = "1.5.0"

[source]
type = "github-release"
org = "pandas-dev"
repo = "pandas"
tag = "v1.5.0"
archive = "pandas-1.5.0.tar.gz"
checksum = "sha256:a3b7d9e2f1c07e3a8d6f5b4c2e1a0f9d8c7b6a5e4d3c2b1a0f9e8d7c6b5a4f3e"

[build]
stages = ["build_ext", "bdist_wheel"]
dependencies = ["numpy", "Cython>=0.29.32,<3", "setuptools>=51.0.0"]
"#;

    #[test]
    fn test_parse_valid_recipe() {
        let recipe = parse_recipe(PANDAS).unwrap();
        assert_eq!(recipe.name(), "pandas");
        assert_eq!(recipe.build.stages, vec!["build_ext", "bdist_wheel"]);
        assert_eq!(recipe.build.dependencies.len(), 3);
        assert!(validate_recipe(&recipe).unwrap().is_empty());
    }

    #[test]
    fn test_parse_github_archive_with_defaults() {
        let content = r#"
[package]
version = "3.3.4"

[source]
type = "github-archive"
org = "PrefectHQ"
repo = "prefect"
tag = "3.3.4"
"#;
        let recipe = parse_recipe(content).unwrap();
        assert_eq!(recipe.name(), "prefect");
        assert_eq!(recipe.build.stages, vec!["bdist_wheel"]);
        assert_eq!(recipe.source.subpath(), ".");

        let warnings = validate_recipe(&recipe).unwrap();
        assert!(warnings.iter().any(|w| w.contains("checksum")));
    }

    #[test]
    fn test_parse_invalid_recipe() {
        assert!(parse_recipe("this is not valid toml at all {}").is_err());

        let unknown_type = r#"
[package]
version = "1"

[source]
type = "svn"
url = "svn://example.org"
"#;
        assert!(parse_recipe(unknown_type).is_err());
    }

    #[test]
    fn test_validate_empty_name() {
        let content = r#"
[package]
version = "1.0"

[source]
type = "url"
url = "https://example.com/test.tar.gz"
"#;
        let recipe = parse_recipe(content).unwrap();
        assert!(validate_recipe(&recipe).is_err());
    }

    #[test]
    fn test_validate_bad_checksum() {
        let content = PANDAS.replace(
            "sha256:a3b7d9e2f1c07e3a8d6f5b4c2e1a0f9d8c7b6a5e4d3c2b1a0f9e8d7c6b5a4f3e",
            "md5:abc123",
        );
        let recipe = parse_recipe(&content).unwrap();
        assert!(validate_recipe(&recipe).is_err());
    }

    #[test]
    fn test_validate_stages_and_pattern() {
        let mut recipe = parse_recipe(PANDAS).unwrap();
        recipe.build.stages.push("sdist".to_string());
        let warnings = validate_recipe(&recipe).unwrap();
        assert!(warnings.iter().any(|w| w.contains("sdist")));

        recipe.build.artifact_pattern = Some(r"\.whl".to_string());
        assert!(validate_recipe(&recipe).is_err());

        recipe.build.artifact_pattern = Some(r"([\w.-]+\.whl)".to_string());
        assert!(validate_recipe(&recipe).is_ok());

        recipe.build.stages.clear();
        assert!(validate_recipe(&recipe).is_err());
    }

    #[test]
    fn test_validate_environment_names() {
        let mut recipe = parse_recipe(PANDAS).unwrap();
        recipe
            .build
            .environment
            .insert("NPY-JOBS".to_string(), "4".to_string());
        assert!(validate_recipe(&recipe).is_err());
    }
}
