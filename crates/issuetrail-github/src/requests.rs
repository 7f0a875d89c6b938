use issuetrail_core::tracker::NewIssue;
use serde_json::json;

/// Body for `POST /repos/{owner}/{repo}/issues`
pub fn create_issue_body(issue: &NewIssue) -> serde_json::Value {
    json!({
        "title": issue.title,
        "body": issue.body,
        "labels": issue.labels
    })
}

/// Body for `POST /repos/{owner}/{repo}/issues/{number}/comments`
pub fn comment_body(text: &str) -> serde_json::Value {
    json!({
        "body": text
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_issue_body_shape() {
        let issue = NewIssue {
            title: "[500] boom".into(),
            body: "details".into(),
            labels: vec!["bug".into()],
        };
        assert_eq!(
            create_issue_body(&issue),
            json!({"title": "[500] boom", "body": "details", "labels": ["bug"]})
        );
    }

    #[test]
    fn test_empty_labels_still_sent() {
        let issue = NewIssue {
            title: "t".into(),
            body: "b".into(),
            labels: vec![],
        };
        assert_eq!(create_issue_body(&issue)["labels"], json!([]));
    }

    #[test]
    fn test_comment_body_has_no_labels() {
        let body = comment_body("seen again");
        assert_eq!(body, json!({"body": "seen again"}));
    }
}
