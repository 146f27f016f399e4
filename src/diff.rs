//! Line-based unified diff between an original draft and its revision

use similar::TextDiff;

/// Lines of unchanged context around each hunk
const CONTEXT: usize = 3;

/// Render the difference between two texts in unified format
///
/// Returns `None` when the texts are identical. The line diff runs in
/// linear space, so a near-identical pair of large drafts stays cheap.
pub fn unified_diff(original: &str, revised: &str) -> Option<String> {
    if original == revised {
        return None;
    }

    let diff = TextDiff::from_lines(original, revised);
    Some(
        diff.unified_diff()
            .context_radius(CONTEXT)
            .header("original", "revised")
            .to_string(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_texts() {
        assert_eq!(unified_diff("Hello world", "Hello world"), None);
        assert_eq!(unified_diff("", ""), None);
    }

    #[test]
    fn test_single_line_change() {
        let diff = unified_diff(
            "Hello world\nThis is a test.",
            "Hello universe\nThis is a test.",
        )
        .unwrap();
        assert!(diff.starts_with("--- original\n+++ revised\n"));
        assert!(diff.contains("@@ -1,2 +1,2 @@\n"));
        assert!(diff.contains("-Hello world\n"));
        assert!(diff.contains("+Hello universe\n"));
        assert!(diff.contains(" This is a test."));
    }

    #[test]
    fn test_from_empty() {
        let diff = unified_diff("", "New content").unwrap();
        assert!(diff.contains("@@ -0,0 +1 @@\n"));
        assert!(diff.contains("+New content\n\\ No newline at end of file\n"));
    }

    #[test]
    fn test_whitespace_and_unicode() {
        let diff = unified_diff("A B\nHello 🌍\n", "A  B\nHello 🪐\n").unwrap();
        assert!(diff.contains("-A B\n"));
        assert!(diff.contains("+A  B\n"));
        assert!(diff.contains("-Hello 🌍\n"));
        assert!(diff.contains("+Hello 🪐\n"));
    }

    #[test]
    fn test_distant_changes_make_separate_hunks() {
        let original: String = (1..=20).map(|n| format!("line {}\n", n)).collect();
        let revised = original
            .replace("line 2\n", "line two\n")
            .replace("line 18\n", "line eighteen\n");
        let diff = unified_diff(&original, &revised).unwrap();

        assert_eq!(diff.matches("@@ -").count(), 2);
        assert!(diff.contains("@@ -1,5 +1,5 @@\n"));
        assert!(diff.contains("@@ -15,6 +15,6 @@\n"));
        assert!(!diff.contains(" line 10\n"));
    }

    #[test]
    fn test_close_changes_share_a_hunk() {
        let original = "a\nb\nc\nd\ne\n";
        let revised = "A\nb\nc\nd\nE\n";
        let diff = unified_diff(original, revised).unwrap();
        assert_eq!(diff.matches("@@ -").count(), 1);
        assert!(diff.contains("@@ -1,5 +1,5 @@\n"));
    }

    #[test]
    fn test_pure_deletion_at_end() {
        let diff = unified_diff("keep\ndrop\n", "keep\n").unwrap();
        assert!(diff.contains("@@ -1,2 +1 @@\n"));
        assert!(diff.contains("-drop\n"));
    }

    #[test]
    fn test_large_near_identical_texts() {
        let original: String = (1..=20_000).map(|n| format!("line {}\n", n)).collect();
        let revised = original.replace("line 10000\n", "line ten thousand\n");
        let diff = unified_diff(&original, &revised).unwrap();

        assert_eq!(diff.matches("@@ -").count(), 1);
        assert!(diff.contains("@@ -9997,7 +9997,7 @@\n"));
        assert!(diff.contains("-line 10000\n+line ten thousand\n"));
        assert!(diff.len() < 300);
    }
}
