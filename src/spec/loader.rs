// src/spec/loader.rs

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};

use super::model::JobFile;
use super::{JobSpec, TestSpec};

/// Load job specifications from a TOML job list.
///
/// The jobs' test directory is the directory containing the file, so
/// relative `output_files` and prerequisite names resolve within it.
pub fn load_specs(path: &Path) -> Result<Vec<Arc<dyn JobSpec>>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading job list {}", path.display()))?;
    let file: JobFile = toml::from_str(&text)
        .with_context(|| format!("parsing job list {}", path.display()))?;

    if file.job.is_empty() {
        return Err(anyhow!(
            "job list {} must contain at least one [job.<name>] table",
            path.display()
        ));
    }

    let test_dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
        .to_path_buf();

    Ok(file
        .job
        .into_iter()
        .map(|(name, cfg)| {
            Arc::new(TestSpec::from_config(name, test_dir.clone(), cfg)) as Arc<dyn JobSpec>
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_jobs_with_defaults_and_prereqs() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("Testdag.toml");
        let mut f = std::fs::File::create(&path)?;
        writeln!(
            f,
            r#"
[job.a]
cmd = "echo a"

[job.b]
cmd = "echo b"
prereqs = ["a"]
processors = 2
threads = 3
"#
        )?;

        let specs = load_specs(&path)?;
        assert_eq!(specs.len(), 2);
        let b = specs.iter().find(|s| s.name() == "b").expect("b exists");
        assert_eq!(b.prereqs(), ["a".to_string()]);
        assert_eq!(b.slots(), 6);
        assert_eq!(b.test_dir(), dir.path());
        Ok(())
    }

    #[test]
    fn empty_job_list_is_rejected() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("Testdag.toml");
        std::fs::write(&path, "")?;
        assert!(load_specs(&path).is_err());
        Ok(())
    }
}
