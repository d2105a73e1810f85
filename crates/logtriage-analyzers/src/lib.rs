// ABOUTME: Build-tool analyzer framework with a fixed, ordered registry
// ABOUTME: Detects the tool that produced a log and explains its failures

use logtriage_core::{AnalyzerFinding, Result, ToolMetrics, TriageError};
use serde::{Deserialize, Serialize};
use tracing::debug;

mod patterns;

pub mod gradle;
pub mod maven;
pub mod npm;

pub use gradle::GradleAnalyzer;
pub use maven::MavenAnalyzer;
pub use npm::NpmAnalyzer;

/// Upper bound on findings returned for one log.
pub const MAX_FINDINGS: usize = 50;

/// Capability set shared by every analyzer.
pub trait LogAnalyzer: Send + Sync {
    fn name(&self) -> &'static str;

    /// True when the log looks like it was produced by this tool.
    fn can_analyze(&self, text: &str) -> bool;

    fn analyze(&self, text: &str) -> Vec<AnalyzerFinding>;

    fn metrics(&self, text: &str) -> ToolMetrics;
}

/// Registered analyzers, in detection order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Analyzer {
    Maven(MavenAnalyzer),
    Gradle(GradleAnalyzer),
    Npm(NpmAnalyzer),
}

pub const REGISTRY: [Analyzer; 3] = [
    Analyzer::Maven(MavenAnalyzer),
    Analyzer::Gradle(GradleAnalyzer),
    Analyzer::Npm(NpmAnalyzer),
];

impl Analyzer {
    fn inner(&self) -> &dyn LogAnalyzer {
        match self {
            Analyzer::Maven(a) => a,
            Analyzer::Gradle(a) => a,
            Analyzer::Npm(a) => a,
        }
    }

    /// Look up an analyzer by name; `yarn` resolves to the npm analyzer.
    pub fn by_name(name: &str) -> Result<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "maven" | "mvn" => Ok(Analyzer::Maven(MavenAnalyzer)),
            "gradle" => Ok(Analyzer::Gradle(GradleAnalyzer)),
            "npm" | "yarn" => Ok(Analyzer::Npm(NpmAnalyzer)),
            other => Err(TriageError::invalid(format!(
                "unknown analyzer '{}'; available: {}",
                other,
                names().join(", ")
            ))),
        }
    }

    /// First registered analyzer whose detection matches.
    pub fn detect(text: &str) -> Option<Self> {
        REGISTRY.iter().copied().find(|a| a.can_analyze(text))
    }
}

impl LogAnalyzer for Analyzer {
    fn name(&self) -> &'static str {
        self.inner().name()
    }

    fn can_analyze(&self, text: &str) -> bool {
        self.inner().can_analyze(text)
    }

    fn analyze(&self, text: &str) -> Vec<AnalyzerFinding> {
        let mut findings = self.inner().analyze(text);
        findings.truncate(MAX_FINDINGS);
        findings
    }

    fn metrics(&self, text: &str) -> ToolMetrics {
        self.inner().metrics(text)
    }
}

pub fn names() -> Vec<&'static str> {
    REGISTRY.iter().map(|a| a.name()).collect()
}

/// Result of running the framework over one log.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisOutcome {
    /// Analyzer that produced the findings; `None` when no tool was detected.
    pub analyzer: Option<String>,
    pub findings: Vec<AnalyzerFinding>,
    pub metrics: Option<ToolMetrics>,
}

/// Run the named analyzer, or the first detected one when `name` is `None`.
pub fn run(text: &str, name: Option<&str>) -> Result<AnalysisOutcome> {
    let analyzer = match name {
        Some(name) => Analyzer::by_name(name)?,
        None => match Analyzer::detect(text) {
            Some(analyzer) => analyzer,
            None => {
                debug!("No build tool detected in {} bytes of log", text.len());
                return Ok(AnalysisOutcome::default());
            }
        },
    };

    let findings = analyzer.analyze(text);
    debug!(
        "Analyzer {} produced {} finding(s)",
        analyzer.name(),
        findings.len()
    );
    Ok(AnalysisOutcome {
        analyzer: Some(analyzer.name().to_string()),
        findings,
        metrics: Some(analyzer.metrics(text)),
    })
}
