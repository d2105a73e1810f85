//! Jenkins JSON payloads and their conversion into core types.

use logtriage_core::{
    BuildMetadata, ScmChange, StageStatus, StageTiming, TestRecord, TestStatus,
};
use serde::Deserialize;

/// `GET <build>/api/json`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildInfo {
    pub number: u32,
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default)]
    pub building: bool,
    #[serde(default)]
    pub duration: i64,
    /// Pipeline jobs report a list.
    #[serde(default)]
    pub change_sets: Vec<ChangeSet>,
    /// Freestyle jobs report a single set.
    #[serde(default)]
    pub change_set: Option<ChangeSet>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChangeSet {
    #[serde(default)]
    pub items: Vec<ChangeItem>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeItem {
    #[serde(default)]
    pub commit_id: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub author: Option<Author>,
    #[serde(default)]
    pub msg: String,
    #[serde(default)]
    pub affected_paths: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Author {
    #[serde(default)]
    pub full_name: String,
}

/// `GET <build>/wfapi/describe`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PipelineDescription {
    #[serde(default)]
    pub stages: Vec<PipelineStage>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineStage {
    pub name: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub duration_millis: Option<i64>,
}

/// `GET <build>/testReport/api/json`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TestReport {
    #[serde(default)]
    pub suites: Vec<TestSuite>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TestSuite {
    #[serde(default)]
    pub cases: Vec<TestCase>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCase {
    pub name: String,
    #[serde(default)]
    pub class_name: String,
    /// Seconds.
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub error_details: Option<String>,
}

/// `GET <job>/api/json?tree=builds[number]{0,N},lastBuild[number]`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobBuilds {
    #[serde(default)]
    pub builds: Vec<BuildNumber>,
    #[serde(default)]
    pub last_build: Option<BuildNumber>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct BuildNumber {
    pub number: u32,
}

impl BuildInfo {
    /// Builds still running have no result yet.
    pub fn result_label(&self) -> String {
        match (&self.result, self.building) {
            (Some(result), _) => result.clone(),
            (None, true) => "IN_PROGRESS".to_string(),
            (None, false) => "UNKNOWN".to_string(),
        }
    }

    pub fn into_metadata(self, job: &str, stages: Option<PipelineDescription>) -> BuildMetadata {
        BuildMetadata {
            job: job.to_string(),
            number: self.number,
            result: self.result_label(),
            building: self.building,
            duration_ms: self.duration,
            stages: stages.map(stage_timings).unwrap_or_default(),
        }
    }

    pub fn scm_changes(&self) -> Vec<ScmChange> {
        self.change_sets
            .iter()
            .chain(self.change_set.iter())
            .flat_map(|set| set.items.iter())
            .map(|item| ScmChange {
                commit_id: item
                    .commit_id
                    .clone()
                    .or_else(|| item.id.clone())
                    .unwrap_or_default(),
                author: item
                    .author
                    .as_ref()
                    .map(|a| a.full_name.clone())
                    .unwrap_or_default(),
                message: item.msg.clone(),
                changed_files: item.affected_paths.clone(),
            })
            .collect()
    }
}

pub fn stage_timings(description: PipelineDescription) -> Vec<StageTiming> {
    description
        .stages
        .into_iter()
        .map(|stage| StageTiming {
            status: StageStatus::from_jenkins(&stage.status),
            name: stage.name,
            duration_ms: stage.duration_millis,
        })
        .collect()
}

impl TestReport {
    pub fn into_records(self, build_number: u32) -> Vec<TestRecord> {
        self.suites
            .into_iter()
            .flat_map(|suite| suite.cases)
            .map(|case| TestRecord {
                name: qualified_name(&case.class_name, &case.name),
                build_number,
                status: TestStatus::from_jenkins(&case.status),
                duration_ms: case.duration.map(|secs| (secs * 1000.0).round() as i64),
                error_message: case.error_details,
            })
            .collect()
    }
}

fn qualified_name(class_name: &str, name: &str) -> String {
    if class_name.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", class_name, name)
    }
}
