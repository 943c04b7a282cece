//! Failure reason extraction from the runner's result document.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

// `.` は `>` (空要素なら `/`) を読み飛ばす
static FAIL_STATUS: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r#"status="FAIL"[^>]*.([^<]*)"#).ok());

/// Last non-empty message following a `status="FAIL"` marker.
///
/// Missing, unreadable, empty or marker-less documents all give `""`.
pub fn fail_reason(path: &Path) -> String {
    match std::fs::read(path) {
        Ok(bytes) => fail_reason_in(&String::from_utf8_lossy(&bytes)),
        Err(_) => String::new(),
    }
}

/// Same as [`fail_reason`], on a document already in memory.
///
/// 最後の FAIL を採るのは、suite 全体の status より先に test 単位の
/// message が現れ、空要素の suite status は読み飛ばされるため。
pub fn fail_reason_in(document: &str) -> String {
    let Some(re) = FAIL_STATUS.as_ref() else {
        return String::new();
    };
    re.captures_iter(document)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().trim())
        .filter(|s| !s.is_empty())
        .last()
        .unwrap_or_default()
        .to_string()
}

/// Error code and message from a failure reason: the first line, and the
/// rest (or the whole reason when it is a single line).
///
/// # 使用例
/// ```ignore
/// assert_eq!(split_reason("E42\nbad input"), ("E42".into(), "bad input".into()));
/// assert_eq!(split_reason("bad"), ("bad".into(), "bad".into()));
/// ```
pub fn split_reason(reason: &str) -> (String, String) {
    match reason.split_once('\n') {
        Some((code, message)) => (code.trim().to_string(), message.trim().to_string()),
        None => (reason.trim().to_string(), reason.trim().to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const FAILED_SUITE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<robot generator="Robot 7.1" generated="2024-01-01T10:00:00.000000" rpa="false">
  <suite id="s1" name="Test Suite" source="/tmp/test.robot">
    <test id="s1-t1" name="Test Case">
      <status status="FAIL" start="2024-01-01T10:00:00.000000" elapsed="0.123">
        Test failed: Expected value did not match
      </status>
    </test>
    <status status="FAIL" start="2024-01-01T10:00:00.000000" elapsed="1.234"/>
  </suite>
  <statistics>
    <total>
      <stat pass="0" fail="1" skip="0">All Tests</stat>
    </total>
  </statistics>
</robot>"#;

    #[test]
    fn empty_markers_do_not_hide_an_earlier_reason() {
        assert_eq!(
            fail_reason_in(FAILED_SUITE),
            "Test failed: Expected value did not match"
        );
    }

    #[rstest]
    #[case(
        r#"<test status="FAIL">First</test><test status="FAIL">Second</test>"#,
        "Second"
    )]
    #[case(r#"<status status="FAIL"></status>"#, "")]
    #[case(r#"<status status="PASS">fine</status>"#, "")]
    #[case("not valid xml", "")]
    #[case("", "")]
    fn last_marker_wins(#[case] doc: &str, #[case] expected: &str) {
        assert_eq!(fail_reason_in(doc), expected);
    }

    #[test]
    fn missing_document_gives_empty_reason() {
        assert_eq!(fail_reason(Path::new("/nonexistent/output.xml")), "");
    }

    #[test]
    fn reads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("output.xml");
        std::fs::write(&path, FAILED_SUITE).unwrap();
        assert_eq!(fail_reason(&path), "Test failed: Expected value did not match");
    }

    #[rstest]
    #[case("E42\n  disk full \n", "E42", "disk full")]
    #[case("  single line  ", "single line", "single line")]
    #[case("code\nline one\nline two", "code", "line one\nline two")]
    #[case("", "", "")]
    fn reason_splits_into_code_and_message(
        #[case] reason: &str,
        #[case] code: &str,
        #[case] message: &str,
    ) {
        assert_eq!(split_reason(reason), (code.to_string(), message.to_string()));
    }
}
