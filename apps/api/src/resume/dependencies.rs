//! Dependency extraction from package manifests.
//!
//! `ManifestDependencyExtractor` understands the manifests listed in
//! [`MANIFEST_FILE_NAMES`]. Parse failures are logged and yield no packages;
//! a broken manifest never fails collection.

use std::collections::HashSet;
use std::sync::OnceLock;

use quick_xml::events::Event;
use quick_xml::Reader;
use regex::Regex;
use tracing::{debug, warn};

pub const MANIFEST_FILE_NAMES: &[&str] = &[
    "package.json",
    "pom.xml",
    "build.gradle",
    "build.gradle.kts",
    "requirements.txt",
    "pyproject.toml",
    "Pipfile",
    "go.mod",
    "Cargo.toml",
];

/// Substrings marking test, lint and type-stub packages.
const EXCLUDE_PATTERNS: &[&str] = &[
    "test",
    "pytest",
    "junit",
    "mockito",
    "jest",
    "mocha",
    "vitest",
    "eslint",
    "prettier",
    "ruff",
    "black",
    "flake8",
    "mypy",
    "types-",
    "@types/",
    "pre-commit",
    "husky",
    "lint-staged",
];

/// Notable frameworks, most notable first.
const PRIORITY_PATTERNS: &[&str] = &[
    "fastapi",
    "flask",
    "django",
    "uvicorn",
    "pydantic",
    "sqlalchemy",
    "celery",
    "spring",
    "quarkus",
    "jpa",
    "hibernate",
    "lombok",
    "querydsl",
    "mapstruct",
    "react",
    "vue",
    "angular",
    "next",
    "nuxt",
    "express",
    "nestjs",
    "prisma",
    "typeorm",
    "redis",
    "kafka",
    "rabbitmq",
];

/// Turns one manifest into the package names it declares.
pub trait DependencyExtractor: Send + Sync {
    /// True when `file_name` (no directory part) is a manifest this extractor reads.
    fn is_manifest(&self, file_name: &str) -> bool;

    fn extract(&self, file_name: &str, content: &str) -> Vec<String>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ManifestDependencyExtractor;

impl DependencyExtractor for ManifestDependencyExtractor {
    fn is_manifest(&self, file_name: &str) -> bool {
        MANIFEST_FILE_NAMES.contains(&file_name)
    }

    fn extract(&self, file_name: &str, content: &str) -> Vec<String> {
        let deps = match file_name {
            "package.json" => parse_package_json(content),
            "pom.xml" => parse_pom_xml(content),
            "build.gradle" | "build.gradle.kts" => parse_build_gradle(content),
            "requirements.txt" => parse_requirements_txt(content),
            "pyproject.toml" => parse_pyproject_toml(content),
            "Pipfile" => parse_pipfile(content),
            "go.mod" => parse_go_mod(content),
            "Cargo.toml" => parse_cargo_toml(content),
            _ => Vec::new(),
        };
        debug!("Parsed {file_name}: {} dependencies", deps.len());
        deps
    }
}

/// Drops tooling packages, removes duplicates and moves notable frameworks
/// to the front. The sort is stable, so ties keep their input order.
pub fn filter_and_sort_dependencies(deps: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut kept: Vec<String> = deps
        .into_iter()
        .filter(|dep| {
            let lower = dep.to_lowercase();
            !EXCLUDE_PATTERNS.iter().any(|p| lower.contains(p)) && seen.insert(lower)
        })
        .collect();

    kept.sort_by_key(|dep| priority(dep));
    kept
}

fn priority(dep: &str) -> usize {
    let lower = dep.to_lowercase();
    PRIORITY_PATTERNS
        .iter()
        .position(|p| lower.contains(p))
        .unwrap_or(PRIORITY_PATTERNS.len())
}

// ────────────────────────────────────────────────────────────────────────────
// Per-format parsers
// ────────────────────────────────────────────────────────────────────────────

fn parse_package_json(content: &str) -> Vec<String> {
    let value: serde_json::Value = match serde_json::from_str(content) {
        Ok(v) => v,
        Err(e) => {
            warn!("package.json could not be parsed: {e}");
            return Vec::new();
        }
    };

    ["dependencies", "devDependencies"]
        .iter()
        .filter_map(|section| value.get(section).and_then(|s| s.as_object()))
        .flat_map(|section| section.keys().cloned())
        .collect()
}

fn parse_pom_xml(content: &str) -> Vec<String> {
    let mut reader = Reader::from_str(content);
    let mut path: Vec<String> = Vec::new();
    let mut deps = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                path.push(String::from_utf8_lossy(e.local_name().as_ref()).into_owned());
            }
            Ok(Event::End(_)) => {
                path.pop();
            }
            Ok(Event::Text(t)) if is_dependency_artifact(&path) => match t.unescape() {
                Ok(text) => {
                    let artifact = text.trim();
                    if !artifact.is_empty() && !artifact.ends_with("-parent") {
                        deps.push(artifact.to_string());
                    }
                }
                Err(e) => warn!("pom.xml artifactId could not be read: {e}"),
            },
            Ok(Event::Eof) => break,
            Err(e) => {
                warn!("pom.xml could not be parsed: {e}");
                break;
            }
            _ => {}
        }
    }
    deps
}

/// `.../dependencies/dependency/artifactId`, outside any build plugin.
fn is_dependency_artifact(path: &[String]) -> bool {
    let n = path.len();
    n >= 3
        && path[n - 3] == "dependencies"
        && path[n - 2] == "dependency"
        && path[n - 1] == "artifactId"
        && !path.iter().any(|element| element == "plugin")
}

fn parse_build_gradle(content: &str) -> Vec<String> {
    static COORDINATE: OnceLock<Regex> = OnceLock::new();
    let pattern = COORDINATE.get_or_init(|| {
        Regex::new(
            r#"(?:implementation|api|compileOnly|runtimeOnly|annotationProcessor)\s*\(?\s*['"]([^'"]+)['"]"#,
        )
        .expect("valid pattern")
    });

    let mut seen = HashSet::new();
    pattern
        .captures_iter(content)
        .filter_map(|c| {
            let mut parts = c[1].split(':');
            parts.next()?;
            parts.next().map(str::to_string)
        })
        .filter(|name| seen.insert(name.clone()))
        .collect()
}

/// Package name from a PEP 508 requirement such as `fastapi[all]>=0.110`.
fn requirement_name(requirement: &str) -> Option<String> {
    let name = requirement
        .split(|c: char| "=<>!~[;@ ".contains(c))
        .next()?
        .trim();
    (!name.is_empty()).then(|| name.to_string())
}

fn parse_requirements_txt(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#') && !line.starts_with('-'))
        .filter_map(requirement_name)
        .collect()
}

fn parse_toml(file_name: &str, content: &str) -> Option<toml::Table> {
    match content.parse::<toml::Table>() {
        Ok(table) => Some(table),
        Err(e) => {
            warn!("{file_name} could not be parsed: {e}");
            None
        }
    }
}

fn table_keys(value: Option<&toml::Value>) -> Vec<String> {
    value
        .and_then(toml::Value::as_table)
        .map(|t| t.keys().cloned().collect())
        .unwrap_or_default()
}

fn parse_pyproject_toml(content: &str) -> Vec<String> {
    let Some(table) = parse_toml("pyproject.toml", content) else {
        return Vec::new();
    };
    let mut deps = Vec::new();

    if let Some(project) = table.get("project") {
        let listed = project
            .get("dependencies")
            .and_then(toml::Value::as_array)
            .into_iter()
            .flatten();
        let optional = project
            .get("optional-dependencies")
            .and_then(toml::Value::as_table)
            .into_iter()
            .flat_map(|groups| groups.values())
            .filter_map(toml::Value::as_array)
            .flatten();
        deps.extend(
            listed
                .chain(optional)
                .filter_map(toml::Value::as_str)
                .filter_map(requirement_name),
        );
    }

    if let Some(poetry) = table.get("tool").and_then(|t| t.get("poetry")) {
        deps.extend(table_keys(poetry.get("dependencies")));
        if let Some(groups) = poetry.get("group").and_then(toml::Value::as_table) {
            for group in groups.values() {
                deps.extend(table_keys(group.get("dependencies")));
            }
        }
    }

    let mut seen = HashSet::new();
    deps.retain(|d| !d.eq_ignore_ascii_case("python") && seen.insert(d.clone()));
    deps
}

fn parse_pipfile(content: &str) -> Vec<String> {
    let Some(table) = parse_toml("Pipfile", content) else {
        return Vec::new();
    };
    let mut deps = table_keys(table.get("packages"));
    deps.extend(table_keys(table.get("dev-packages")));
    deps
}

/// Last path segment of a Go module, skipping a `/vN` major-version suffix.
fn go_module_name(path: &str) -> String {
    let mut segments = path.rsplit('/');
    let last = segments.next().unwrap_or(path);
    let is_major_suffix = last.len() > 1
        && last.starts_with('v')
        && last[1..].chars().all(|c| c.is_ascii_digit());
    match segments.next() {
        Some(previous) if is_major_suffix => previous.to_string(),
        _ => last.to_string(),
    }
}

fn parse_go_mod(content: &str) -> Vec<String> {
    let mut deps = Vec::new();
    let mut in_block = false;

    for line in content.lines().map(str::trim) {
        if in_block {
            if line == ")" {
                in_block = false;
            } else if let Some(path) = line.split_whitespace().next().filter(|p| !p.starts_with("//")) {
                deps.push(go_module_name(path));
            }
        } else if line.starts_with("require (") || line == "require(" {
            in_block = true;
        } else if let Some(rest) = line.strip_prefix("require ") {
            if let Some(path) = rest.split_whitespace().next() {
                deps.push(go_module_name(path));
            }
        }
    }
    deps
}

fn parse_cargo_toml(content: &str) -> Vec<String> {
    let Some(table) = parse_toml("Cargo.toml", content) else {
        return Vec::new();
    };
    let mut deps = Vec::new();
    for section in ["dependencies", "dev-dependencies", "build-dependencies"] {
        deps.extend(table_keys(table.get(section)));
    }
    if let Some(workspace) = table.get("workspace") {
        deps.extend(table_keys(workspace.get("dependencies")));
    }
    let mut seen = HashSet::new();
    deps.retain(|d| seen.insert(d.clone()));
    deps
}
