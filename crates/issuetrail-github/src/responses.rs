use issuetrail_core::error::TrackerError;
use issuetrail_core::types::IssueId;
use serde::Deserialize;
use serde_json::Value;

/// Fields of a created issue. Only `number` is consumed.
#[derive(Debug, Clone, Deserialize)]
pub struct CreatedIssue {
    pub number: u64,
    #[serde(default)]
    pub html_url: Option<String>,
}

/// Extract the issue number from a create-issue response body.
pub fn parse_created_issue(body: &str) -> Result<IssueId, TrackerError> {
    let issue: CreatedIssue = serde_json::from_str(body)
        .map_err(|e| TrackerError::InvalidResponse(format!("create issue response: {}", e)))?;
    Ok(IssueId(issue.number))
}

/// Best-effort human readable reason from a GitHub error body.
///
/// GitHub answers `{"message": "...", "errors": [{"message": ...} | {"field": ..., "code": ...}]}`;
/// anything else is passed through trimmed.
pub fn error_message(body: &str) -> String {
    let Ok(json) = serde_json::from_str::<Value>(body) else {
        let trimmed = body.trim();
        return if trimmed.is_empty() {
            "empty response body".to_string()
        } else {
            trimmed.chars().take(200).collect()
        };
    };

    let mut message = json
        .get("message")
        .and_then(|m| m.as_str())
        .unwrap_or("unknown error")
        .to_string();

    if let Some(errors) = json.get("errors").and_then(|e| e.as_array()) {
        let details: Vec<String> = errors
            .iter()
            .filter_map(|e| {
                if let Some(m) = e.get("message").and_then(|m| m.as_str()) {
                    return Some(m.to_string());
                }
                match (e.get("field").and_then(|f| f.as_str()), e.get("code").and_then(|c| c.as_str())) {
                    (Some(field), Some(code)) => Some(format!("{} {}", field, code)),
                    _ => None,
                }
            })
            .collect();
        if !details.is_empty() {
            message.push_str(" (");
            message.push_str(&details.join(", "));
            message.push(')');
        }
    }

    message
}
