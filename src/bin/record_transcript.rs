use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use aider_driver::transcript::{Recorder, TestCase};

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let cases_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/cases");

    let names: Vec<String> = if args.len() > 1 {
        args[1..].to_vec()
    } else {
        let mut paths: Vec<_> = std::fs::read_dir(&cases_dir)?
            .filter_map(std::result::Result::ok)
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "toml"))
            .collect();
        paths.sort();
        paths
            .iter()
            .filter_map(|p| p.file_stem().and_then(|s| s.to_str()))
            .map(ToString::to_string)
            .collect()
    };

    for name in &names {
        eprintln!("Recording: {name}");
        record_case(&cases_dir, name).await?;
        eprintln!("  Done: {name}.vcr");
    }

    Ok(())
}

async fn record_case(cases_dir: &Path, name: &str) -> Result<()> {
    let toml_path = cases_dir.join(format!("{name}.toml"));
    let vcr_path = cases_dir.join(format!("{name}.vcr"));

    let toml_content = std::fs::read_to_string(&toml_path)
        .with_context(|| format!("failed to read {}", toml_path.display()))?;
    let case: TestCase = toml::from_str(&toml_content)?;

    let work_dir = std::env::temp_dir().join(format!("aider-driver-vcr-{name}"));
    if work_dir.exists() {
        std::fs::remove_dir_all(&work_dir)?;
    }
    std::fs::create_dir_all(&work_dir)?;

    for (path, content) in &case.files {
        let file_path = work_dir.join(path);
        if let Some(parent) = file_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&file_path, content)?;
    }

    // aider wants a git repo; an uncommitted one keeps its banner stable.
    let git_init = std::process::Command::new("git")
        .args(["init", "--quiet"])
        .current_dir(&work_dir)
        .output()?;
    anyhow::ensure!(
        git_init.status.success(),
        "git init failed: {}",
        String::from_utf8_lossy(&git_init.stderr)
    );

    let recorder = Recorder::default();
    let options = case.start_options(&work_dir);
    let command = options.command_line();
    let aider = recorder
        .start(options)
        .await
        .with_context(|| format!("failed to start {}", command.join(" ")))?;

    for message in &case.messages {
        aider
            .send_and_wait(message.as_str())
            .await
            .with_context(|| format!("no prompt after {message:?}"))?;
    }

    aider.stop()?;
    aider.wait().await?;

    recorder.transcript(command).save(&vcr_path)?;
    Ok(())
}
