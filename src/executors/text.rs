use std::path::PathBuf;

use super::{ExecutionContext, ExecutionReport, TextReplace, commit_file};
use crate::error::Error;
use crate::syntax;
use crate::types::TextChange;

/// Literal replace over every cached file. Files outside the cache are
/// never touched.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextReplaceExecutor;

impl TextReplace for TextReplaceExecutor {
    fn execute(&self, ctx: &ExecutionContext<'_>, change: &TextChange) -> Result<ExecutionReport, Error> {
        let mut report = ExecutionReport::default();
        let snapshot = ctx.cache.get();
        report.occurrences_before = snapshot
            .values()
            .map(|f| return count_occurrences(&f.content, &change.search_term))
            .sum();

        let mut pending: Vec<(PathBuf, String, usize)> = Vec::new();
        for file in snapshot.values() {
            let (updated, replaced) = replace_all(&file.content, change);
            if replaced == 0 {
                continue;
            }
            if let Err(e) = syntax::validate_content(&file.path, &updated) {
                report.skip(format!("{}: replacement breaks the file ({e})", file.path.display()));
                continue;
            }
            pending.push((file.path.clone(), updated, replaced));
        }

        if pending.is_empty() && report.skipped.is_empty() {
            report.detail = format!("no occurrences of \"{}\" found", change.search_term);
            return Ok(report);
        }

        for (path, updated, replaced) in pending {
            match commit_file(ctx, &path, &updated) {
                Ok(kind) => {
                    report.record(&path, kind);
                    report.replacement_counts.insert(path, replaced);
                },
                Err(e) if e.is_item_level() => report.skip(format!("{}: {e}", path.display())),
                Err(e) => return Err(e),
            }
        }

        report.occurrences_after = ctx
            .cache
            .get()
            .values()
            .map(|f| return count_occurrences(&f.content, &change.search_term))
            .sum();
        report.success = !report.files_modified.is_empty();
        report.detail = format!(
            "replaced \"{}\" with \"{}\" in {} file(s); occurrences {} -> {}",
            change.search_term,
            change.replacement_term,
            report.files_modified.len(),
            report.occurrences_before,
            report.occurrences_after
        );
        tracing::info!(files = report.files_modified.len(), before = report.occurrences_before, after = report.occurrences_after, "text replace done");
        return Ok(report);
    }
}

/// Non-overlapping occurrences of `needle` in `haystack`.
pub fn count_occurrences(haystack: &str, needle: &str) -> usize {
    if needle.is_empty() {
        return 0;
    }
    return haystack.matches(needle).count();
}

/// Apply the primary term and every variation in a single left-to-right
/// pass over the original text. Matches are collected first, so replacement
/// text is never searched again. On overlap the earlier match wins, and at the
/// same offset the primary term beats the variations. Returns the new text and
/// the number of replacements made.
fn replace_all(content: &str, change: &TextChange) -> (String, usize) {
    let pairs: Vec<(&str, &str)> = std::iter::once((change.search_term.as_str(), change.replacement_term.as_str()))
        .chain(
            change
                .variations
                .iter()
                .map(|v| return (v.search.as_str(), v.replacement.as_str())),
        )
        .filter(|(search, _)| return !search.is_empty())
        .collect();

    let mut hits: Vec<(usize, usize, &str)> = Vec::new();
    for (rank, (search, replacement)) in pairs.iter().enumerate() {
        hits.extend(content.match_indices(search).map(|(start, _)| return (start, rank, *replacement)));
    }
    hits.sort_by_key(|&(start, rank, _)| return (start, rank));

    let mut text = String::with_capacity(content.len());
    let mut cursor = 0_usize;
    let mut replaced = 0_usize;
    for (start, rank, replacement) in hits {
        if start < cursor {
            continue;
        }
        let Some((search, _)) = pairs.get(rank) else {
            continue;
        };
        text.push_str(content.get(cursor..start).unwrap_or(""));
        text.push_str(replacement);
        cursor = start.saturating_add(search.len());
        replaced = replaced.saturating_add(1);
    }
    text.push_str(content.get(cursor..).unwrap_or(""));
    return (text, replaced);
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use pretty_assertions::assert_eq;

    use super::super::testing::{Fixture, Scripted};
    use super::*;
    use crate::classifier::literal_swap;

    #[test]
    fn replaces_every_occurrence_across_files() {
        let fx = Fixture::new(
            &[
                ("src/pages/Home.tsx", "export const Home = () => <div><a>Sign Up</a><b>Sign Up</b></div>;\n"),
                ("src/components/Nav.tsx", "export const Nav = () => <nav>Sign Up</nav>;\n"),
                ("src/lib/util.ts", "export const x = 1;\n"),
            ],
            "",
        );
        let synth = Scripted::default();
        let change = literal_swap("rename 'Sign Up' to 'Join Now'").unwrap();
        let report = TextReplaceExecutor.execute(&fx.ctx(&synth), &change).unwrap();

        assert!(report.success);
        assert_eq!(report.occurrences_before, 3);
        assert_eq!(report.occurrences_after, 0);
        assert_eq!(report.files_modified.len(), 2);
        assert_eq!(report.replacement_counts.get(Path::new("src/pages/Home.tsx")), Some(&2));
        assert_eq!(count_occurrences(&fx.disk("src/components/Nav.tsx"), "Join Now"), 1);
        assert_eq!(fx.cached("src/lib/util.ts"), "export const x = 1;\n");
    }

    #[test]
    fn variations_are_replaced_too() {
        let fx = Fixture::new(&[("src/App.tsx", "export const A = () => <a href=\"/sign-up\">SIGN UP</a>;\n")], "");
        let change = literal_swap("rename \"Sign Up\" to \"Join Now\"").unwrap();
        let report = TextReplaceExecutor.execute(&fx.ctx(&Scripted::default()), &change).unwrap();
        assert!(report.success);
        assert_eq!(fx.cached("src/App.tsx"), "export const A = () => <a href=\"/join-now\">JOIN NOW</a>;\n");
    }

    #[test]
    fn nothing_to_replace_is_not_a_success() {
        let fx = Fixture::new(&[("src/App.tsx", "export const A = 1;\n")], "");
        let change = literal_swap("rename 'Sign Up' to 'Join Now'").unwrap();
        let report = TextReplaceExecutor.execute(&fx.ctx(&Scripted::default()), &change).unwrap();
        assert!(!report.success);
        assert!(report.files_modified.is_empty());
    }

    #[test]
    fn replacement_that_breaks_parsing_is_skipped() {
        let fx = Fixture::new(&[("src/App.tsx", "export const Total = 1;\n")], "");
        let change = literal_swap("replace 'Total' with 'Total ='").unwrap();
        let report = TextReplaceExecutor.execute(&fx.ctx(&Scripted::default()), &change).unwrap();
        assert!(!report.success);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(fx.disk("src/App.tsx"), "export const Total = 1;\n");
    }

    #[test]
    fn replacement_containing_a_variation_is_not_replaced_again() {
        let fx = Fixture::new(&[("src/Nav.tsx", "export const Nav = () => <a>Contact</a>;\n")], "");
        let change = literal_swap("rename 'Contact' to 'contact us'").unwrap();
        let report = TextReplaceExecutor.execute(&fx.ctx(&Scripted::default()), &change).unwrap();
        assert!(report.success);
        assert_eq!(report.occurrences_after, 0);
        assert_eq!(fx.disk("src/Nav.tsx"), "export const Nav = () => <a>contact us</a>;\n");
    }

    #[test]
    fn mixed_spellings_in_one_file_are_each_replaced_once() {
        let (text, replaced) = replace_all(
            "<a href=\"/contact\">Contact</a> CONTACT",
            &literal_swap("rename 'Contact' to 'Reach Out'").unwrap(),
        );
        assert_eq!(replaced, 3);
        assert_eq!(text, "<a href=\"/reach out\">Reach Out</a> REACH OUT");
    }
}
