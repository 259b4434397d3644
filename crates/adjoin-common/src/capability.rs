use serde::Serialize;

/// One line of `adjoin status` output, with optional indented detail lines.
#[derive(Debug, Clone, Serialize)]
pub struct CapabilityStatus {
    pub name: String,
    pub summary: String,
    pub healthy: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<String>,
}

impl CapabilityStatus {
    pub fn new(name: &str, summary: impl Into<String>, healthy: bool) -> Self {
        Self {
            name: name.to_string(),
            summary: summary.into(),
            healthy,
            details: Vec::new(),
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.details.push(detail.into());
        self
    }

    /// Render for the terminal: `[+] name:  summary`, then the details.
    pub fn lines(&self) -> Vec<String> {
        let marker = if self.healthy { "+" } else { "-" };
        let mut lines = vec![format!("[{marker}] {}:  {}", self.name, self.summary)];
        lines.extend(self.details.iter().map(|d| format!("      {d}")));
        lines
    }
}

/// Implemented by each component that reports in `adjoin status`.
pub trait Capability: Send + Sync {
    fn name(&self) -> &str;
    fn status(&self) -> CapabilityStatus;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn details_render_under_the_summary() {
        let status = CapabilityStatus::new("lifecycle", "degraded", false)
            .with_detail("membership: NT_STATUS_NO_LOGON_SERVERS");
        assert_eq!(
            status.lines(),
            vec![
                "[-] lifecycle:  degraded".to_string(),
                "      membership: NT_STATUS_NO_LOGON_SERVERS".to_string(),
            ]
        );
    }

    #[test]
    fn empty_details_are_omitted_from_json() {
        let json = serde_json::to_value(CapabilityStatus::new("proxy", "stopped", true)).unwrap();
        assert!(json.get("details").is_none());
        assert_eq!(json["healthy"], true);
    }
}
