use logtriage_core::{BuildRef, Result, TriageError};
use url::Url;

/// Parse the configured Jenkins root. Anything below it (a `/jenkins`
/// context path, say) is kept.
pub fn parse_base(raw: &str) -> Result<Url> {
    let url = Url::parse(raw.trim())
        .map_err(|e| TriageError::invalid(format!("invalid Jenkins URL '{}': {}", raw, e)))?;
    if url.cannot_be_a_base() {
        return Err(TriageError::invalid(format!(
            "Jenkins URL '{}' cannot carry a path",
            raw
        )));
    }
    Ok(url)
}

/// `<base>/job/<a>/job/<b>/<tail...>` for a folder path `a/b`.
///
/// Segments are percent-encoded individually, so job names with spaces or
/// `#` survive.
pub fn job_url(base: &Url, job: &str, tail: &[&str]) -> Result<Url> {
    let mut url = base.clone();
    {
        let mut segments = url
            .path_segments_mut()
            .map_err(|_| TriageError::invalid(format!("Jenkins URL '{}' cannot carry a path", base)))?;
        segments.pop_if_empty();
        for part in job.split('/').filter(|p| !p.is_empty()) {
            segments.push("job").push(part);
        }
        segments.extend(tail);
    }
    Ok(url)
}

pub fn build_url(base: &Url, build: &BuildRef, tail: &[&str]) -> Result<Url> {
    let number = build.number.to_string();
    let mut segments = Vec::with_capacity(tail.len() + 1);
    segments.push(number.as_str());
    segments.extend_from_slice(tail);
    job_url(base, &build.job, &segments)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_folders_become_job_segments() {
        let base = parse_base("https://ci.example.com").unwrap();
        let url = build_url(
            &base,
            &BuildRef::new("platform/api/main", 42),
            &["logText", "progressiveText"],
        )
        .unwrap();
        assert_eq!(
            url.as_str(),
            "https://ci.example.com/job/platform/job/api/job/main/42/logText/progressiveText"
        );
    }

    #[test]
    fn context_path_is_kept() {
        let base = parse_base("https://ci.example.com/jenkins/").unwrap();
        let url = job_url(&base, "app", &["api", "json"]).unwrap();
        assert_eq!(url.as_str(), "https://ci.example.com/jenkins/job/app/api/json");
    }

    #[test]
    fn job_names_are_encoded() {
        let base = parse_base("http://localhost:8080").unwrap();
        let url = job_url(&base, "my job#1", &[]).unwrap();
        assert_eq!(url.as_str(), "http://localhost:8080/job/my%20job%231");
    }

    #[test]
    fn rejects_unparseable_base() {
        assert!(parse_base("not a url").is_err());
        assert!(parse_base("mailto:ci@example.com").is_err());
    }
}
