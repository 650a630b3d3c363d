//! One-line change labels for autosave commits.
//!
//! Pure functions with no git or filesystem dependencies. Input is a unified
//! diff produced with zero context lines (`-U0`), so every hunk consists only
//! of `-` and `+` lines.

/// Diff metadata prefixes that close the current hunk.
const METADATA_PREFIXES: [&str; 5] = ["diff --git", "index ", "--- ", "+++ ", "@@ "];

/// Summarize the first meaningful change in a zero-context diff.
///
/// Returns `Create: …`, `Update: …` or `Delete: …` truncated to `max_len`
/// characters, or `None` when the diff is empty or only changes whitespace.
/// Only the first hunk producing a label is considered.
pub fn extract_change(diff: &str, max_len: usize) -> Option<String> {
    let mut deleted: Vec<&str> = Vec::new();
    let mut added: Vec<&str> = Vec::new();

    for line in diff.lines() {
        if METADATA_PREFIXES.iter().any(|p| line.starts_with(p)) {
            if let Some(label) = flush(&mut deleted, &mut added, max_len) {
                return Some(label);
            }
            continue;
        }

        if let Some(rest) = line.strip_prefix('-') {
            // A deletion after additions starts the next hunk.
            if !added.is_empty() {
                if let Some(label) = flush(&mut deleted, &mut added, max_len) {
                    return Some(label);
                }
            }
            deleted.push(rest);
        } else if let Some(rest) = line.strip_prefix('+') {
            added.push(rest);
        }
    }

    flush(&mut deleted, &mut added, max_len)
}

fn flush(deleted: &mut Vec<&str>, added: &mut Vec<&str>, max_len: usize) -> Option<String> {
    let deleted_text = deleted.join("\n");
    let added_text = added.join("\n");
    deleted.clear();
    added.clear();

    match (deleted_text.is_empty(), added_text.is_empty()) {
        (true, true) => None,
        (true, false) => label("Create", &added_text, max_len),
        (false, true) => label("Delete", &deleted_text, max_len),
        (false, false) => {
            let (added_core, deleted_core) = changed_cores(&deleted_text, &added_text);
            label("Update", &added_core, max_len).or_else(|| label("Delete", &deleted_core, max_len))
        }
    }
}

/// Strip the longest common prefix, then the longest common suffix of the
/// remainders. Returns `(added_core, deleted_core)`.
fn changed_cores(deleted: &str, added: &str) -> (String, String) {
    let deleted: Vec<char> = deleted.chars().collect();
    let added: Vec<char> = added.chars().collect();

    let prefix = deleted
        .iter()
        .zip(added.iter())
        .take_while(|(d, a)| d == a)
        .count();

    let deleted_rest = &deleted[prefix..];
    let added_rest = &added[prefix..];
    let suffix = deleted_rest
        .iter()
        .rev()
        .zip(added_rest.iter().rev())
        .take_while(|(d, a)| d == a)
        .count();

    let added_core = added_rest[..added_rest.len() - suffix].iter().collect();
    let deleted_core = deleted_rest[..deleted_rest.len() - suffix].iter().collect();
    (added_core, deleted_core)
}

fn label(kind: &str, text: &str, max_len: usize) -> Option<String> {
    // Trim before flattening so edge newlines never turn into `↵`.
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    let label = format!("{kind}: {}", trimmed.replace('\n', "↵"));
    Some(label.chars().take(max_len).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hunk(deleted: &[&str], added: &[&str]) -> String {
        let mut diff = String::from(
            "diff --git a/note.md b/note.md\nindex 1111111..2222222 100644\n--- a/note.md\n+++ b/note.md\n@@ -1 +1 @@\n",
        );
        for line in deleted {
            diff.push_str(&format!("-{line}\n"));
        }
        for line in added {
            diff.push_str(&format!("+{line}\n"));
        }
        diff
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(extract_change("", 72), None);
    }

    #[test]
    fn test_update_keeps_only_changed_core() {
        assert_eq!(
            extract_change(&hunk(&["aaa"], &["aab"]), 72),
            Some("Update: b".to_string())
        );
    }

    #[test]
    fn test_shortened_line_is_delete() {
        assert_eq!(
            extract_change(&hunk(&["hello world"], &["hello"]), 72),
            Some("Delete: world".to_string())
        );
    }

    #[test]
    fn test_added_only_is_create() {
        assert_eq!(
            extract_change(&hunk(&[], &["new note"]), 72),
            Some("Create: new note".to_string())
        );
    }

    #[test]
    fn test_whitespace_only_change_is_none() {
        assert_eq!(extract_change(&hunk(&["a  b"], &["a b"]), 72), None);
    }

    #[test]
    fn test_deleted_only() {
        assert_eq!(
            extract_change(&hunk(&["old line", "another"], &[]), 72),
            Some("Delete: old line↵another".to_string())
        );
    }

    #[test]
    fn test_multiline_create_joins_with_return_symbol() {
        assert_eq!(
            extract_change(&hunk(&[], &["# Title", "", "body"]), 72),
            Some("Create: # Title↵↵body".to_string())
        );
    }

    #[test]
    fn test_truncates_to_max_len_in_chars() {
        let label = extract_change(&hunk(&[], &["ééééééééééééééé"]), 12).unwrap();
        assert_eq!(label, "Create: éééé");
        assert_eq!(label.chars().count(), 12);
    }

    #[test]
    fn test_first_meaningful_hunk_wins() {
        let mut diff = hunk(&["same "], &["same"]);
        diff.push_str("@@ -5 +5 @@\n-first\n+second\n");
        diff.push_str("@@ -9 +9 @@\n-third\n+fourth\n");
        assert_eq!(extract_change(&diff, 72), Some("Update: second".to_string()));
    }

    #[test]
    fn test_deletion_after_addition_starts_new_hunk() {
        // No @@ header between the two pairs.
        let diff = "+created\n-removed\n+replacement\n";
        assert_eq!(extract_change(diff, 72), Some("Create: created".to_string()));
    }

    #[test]
    fn test_added_blank_line_is_whitespace_only() {
        let diff = "@@ -1 +1,2 @@\n-a\n+a\n+\n";
        assert_eq!(extract_change(diff, 72), None);
    }

    #[test]
    fn test_core_is_trimmed_before_newlines_are_flattened() {
        assert_eq!(
            extract_change(&hunk(&["hello"], &["hello ", "world"]), 72),
            Some("Update: world".to_string())
        );
    }

    #[test]
    fn test_metadata_only_diff_is_none() {
        let diff = "diff --git a/x b/x\nnew file mode 100644\nindex 0000000..e69de29\n";
        assert_eq!(extract_change(diff, 72), None);
    }
}
