//! Artifact lookup under a results directory.
//!
//! Run directories carry a timestamped id (`out_2025-05-29`), so templates
//! may use `*` and `?` inside any path segment. Matching is done segment by
//! segment with [`wildcard_match`], which runs in O(pattern x name) time
//! however many stars the pattern holds.

use std::{
    fs,
    path::{Path, PathBuf},
};

use tracing::trace;

pub fn expand_template(template: &str, test: &str, config: &str) -> String {
    template.replace("{test}", test).replace("{config}", config)
}

/// Glob-style match of a single path segment: `*` matches any run of
/// characters, `?` exactly one.
pub fn wildcard_match(pattern: &str, name: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let name: Vec<char> = name.chars().collect();
    let (mut p, mut n) = (0, 0);
    let mut star: Option<(usize, usize)> = None;
    while n < name.len() {
        if p < pattern.len() && (pattern[p] == '?' || pattern[p] == name[n]) {
            p += 1;
            n += 1;
        } else if p < pattern.len() && pattern[p] == '*' {
            star = Some((p, n));
            p += 1;
        } else if let Some((star_p, star_n)) = star {
            // let the last star absorb one more character
            p = star_p + 1;
            n = star_n + 1;
            star = Some((star_p, star_n + 1));
        } else {
            return false;
        }
    }
    pattern[p..].iter().all(|&c| c == '*')
}

fn has_wildcard(segment: &str) -> bool {
    segment.contains(['*', '?'])
}

/// All regular files under `base` matching the relative `pattern`.
pub fn find_matches(base: &Path, pattern: &str) -> Vec<PathBuf> {
    let mut candidates = vec![base.to_path_buf()];
    for segment in pattern.split('/').filter(|s| !s.is_empty() && *s != ".") {
        let mut next = Vec::new();
        for dir in &candidates {
            if !has_wildcard(segment) {
                next.push(dir.join(segment));
                continue;
            }
            let Ok(entries) = fs::read_dir(dir) else {
                continue;
            };
            for entry in entries.flatten() {
                let file_name = entry.file_name();
                let Some(name) = file_name.to_str() else {
                    continue;
                };
                if name.starts_with('.') && !segment.starts_with('.') {
                    continue;
                }
                if wildcard_match(segment, name) {
                    next.push(entry.path());
                }
            }
        }
        candidates = next;
    }
    candidates.retain(|path| path.is_file());
    candidates.sort();
    candidates
}

/// First template (in order) that resolves to an existing file under
/// `<root>/<config>`. When a template matches several files the
/// lexicographically last one wins, which is the newest run for
/// timestamped run ids.
pub fn resolve_artifact(root: &Path, templates: &[String], test: &str, config: &str) -> Option<PathBuf> {
    let config_dir = root.join(config);
    templates.iter().find_map(|template| {
        let pattern = expand_template(template, test, config);
        let found = find_matches(&config_dir, &pattern).pop();
        trace!("{test} / {config}: {pattern} -> {found:?}");
        found
    })
}
