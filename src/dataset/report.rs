use std::fmt;

#[cfg(feature = "colorized_output")]
use console::style;

/// Outcome of one rule
#[derive(Debug, Clone, PartialEq)]
pub enum CheckStatus {
    /// Rule satisfied
    Ok,
    /// Rule satisfied with a notice
    Warning(String),
    /// Rule violated
    Failed(String),
}

impl CheckStatus {
    fn is_failed(&self) -> bool {
        matches!(self, CheckStatus::Failed(_))
    }

    fn is_warning(&self) -> bool {
        matches!(self, CheckStatus::Warning(_))
    }

    fn tag(&self) -> &'static str {
        match self {
            CheckStatus::Ok => "ok",
            CheckStatus::Warning(_) => "warn",
            CheckStatus::Failed(_) => "FAIL",
        }
    }
}

/// One rule checked against a dataset
#[derive(Debug, Clone)]
pub struct ValidationCheck {
    /// `<table>.<rule>`, e.g. `obs.barcode` or `X.integer`
    pub name: String,
    /// Outcome
    pub status: CheckStatus,
}

impl ValidationCheck {
    pub(crate) fn ok(name: impl Into<String>) -> Self {
        Self::with_status(name, CheckStatus::Ok)
    }

    pub(crate) fn warning(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_status(name, CheckStatus::Warning(message.into()))
    }

    pub(crate) fn failed(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_status(name, CheckStatus::Failed(message.into()))
    }

    fn with_status(name: impl Into<String>, status: CheckStatus) -> Self {
        Self {
            name: name.into(),
            status,
        }
    }

    /// Table the rule belongs to (`obs`, `var` or `X`).
    pub fn table(&self) -> &str {
        self.name.split('.').next().unwrap_or_default()
    }
}

/// Every rule checked against one dataset, in check order
#[derive(Debug, Clone)]
pub struct ValidationReport {
    /// Rule outcomes
    pub checks: Vec<ValidationCheck>,
    /// Unit label or file path
    pub subject: String,
}

impl ValidationReport {
    /// Empty report for `subject`
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            checks: Vec::new(),
            subject: subject.into(),
        }
    }

    /// Record a rule outcome
    pub fn add_check(&mut self, check: ValidationCheck) {
        self.checks.push(check);
    }

    /// True if any rule failed
    pub fn has_failures(&self) -> bool {
        self.checks.iter().any(|c| c.status.is_failed())
    }

    /// True if any rule produced a notice
    pub fn has_warnings(&self) -> bool {
        self.checks.iter().any(|c| c.status.is_warning())
    }

    /// Satisfied rules
    pub fn success_count(&self) -> usize {
        self.checks.len() - self.warning_count() - self.failure_count()
    }

    /// Notices
    pub fn warning_count(&self) -> usize {
        self.checks.iter().filter(|c| c.status.is_warning()).count()
    }

    /// Violated rules
    pub fn failure_count(&self) -> usize {
        self.checks.iter().filter(|c| c.status.is_failed()).count()
    }

    /// Messages of every violated rule
    pub fn failures(&self) -> impl Iterator<Item = &str> {
        self.checks.iter().filter_map(|c| match &c.status {
            CheckStatus::Failed(msg) => Some(msg.as_str()),
            _ => None,
        })
    }

    /// Checks grouped by table, tables in first-seen order.
    pub fn by_table(&self) -> Vec<(&str, Vec<&ValidationCheck>)> {
        let mut groups: Vec<(&str, Vec<&ValidationCheck>)> = Vec::new();
        for check in &self.checks {
            match groups.iter_mut().find(|(table, _)| *table == check.table()) {
                Some((_, checks)) => checks.push(check),
                None => groups.push((check.table(), vec![check])),
            }
        }
        groups
    }

    fn render(&self, paint: &dyn Fn(&CheckStatus, &str) -> String) -> String {
        let mut out = format!("Validation of {}\n", self.subject);
        for (table, checks) in self.by_table() {
            out.push_str(&format!("\n{table}\n"));
            for check in checks {
                let tag = paint(&check.status, check.status.tag());
                match &check.status {
                    CheckStatus::Ok => out.push_str(&format!("  [{tag}] {}\n", check.name)),
                    CheckStatus::Warning(msg) | CheckStatus::Failed(msg) => {
                        out.push_str(&format!("  [{tag}] {}: {}\n", check.name, msg))
                    }
                }
            }
        }
        let verdict = if self.has_failures() {
            CheckStatus::Failed(String::new())
        } else {
            CheckStatus::Ok
        };
        let verdict_text = if self.has_failures() { "INVALID" } else { "VALID" };
        out.push_str(&format!(
            "\n{} passed, {} warnings, {} failed: {}\n",
            self.success_count(),
            self.warning_count(),
            self.failure_count(),
            paint(&verdict, verdict_text)
        ));
        out
    }

    /// Format the report with colors (requires console feature)
    pub fn format_colored(&self) -> String {
        #[cfg(feature = "colorized_output")]
        {
            self.render(&|status, text| match status {
                CheckStatus::Ok => style(text).green().to_string(),
                CheckStatus::Warning(_) => style(text).yellow().to_string(),
                CheckStatus::Failed(_) => style(text).red().bold().to_string(),
            })
        }

        #[cfg(not(feature = "colorized_output"))]
        {
            self.to_string()
        }
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render(&|_, text| text.to_string()))
    }
}
