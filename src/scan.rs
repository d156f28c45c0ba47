use std::fs;
use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use jdepcheck::ClassInput;
use log::debug;
use serde_json::Value;
use serde_sarif::sarif::{Artifact, ArtifactLocation, ArtifactRoles};
use zip::ZipArchive;

/// Class bytes gathered from the inputs, plus the SARIF artifacts they came from.
pub(crate) struct ScanOutput {
    pub(crate) classes: Vec<ClassInput>,
    pub(crate) artifacts: Vec<Artifact>,
}

pub(crate) fn scan_inputs(inputs: &[impl AsRef<Path>]) -> Result<ScanOutput> {
    let mut output = ScanOutput {
        classes: Vec::new(),
        artifacts: Vec::new(),
    };

    // Keep deterministic ordering by sorting inputs and directory listings.
    let mut entries: Vec<&Path> = inputs.iter().map(AsRef::as_ref).collect();
    entries.sort_by_key(|path| path_key(path));

    for entry in entries {
        scan_path(entry, true, &mut output)?;
    }

    Ok(output)
}

fn scan_path(path: &Path, strict: bool, output: &mut ScanOutput) -> Result<()> {
    if path.is_dir() {
        return scan_dir(path, output);
    }

    let extension = path.extension().and_then(|ext| ext.to_str()).unwrap_or("");
    match extension {
        "class" => scan_class_file(path, output),
        "jar" => scan_jar_file(path, output),
        _ => {
            if strict {
                anyhow::bail!("unsupported input file: {}", path.display())
            } else {
                debug!("ignoring {}", path.display());
                Ok(())
            }
        }
    }
}

fn scan_dir(path: &Path, output: &mut ScanOutput) -> Result<()> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(path)
        .with_context(|| format!("failed to read directory {}", path.display()))?
    {
        let entry =
            entry.with_context(|| format!("failed to read entry under {}", path.display()))?;
        entries.push(entry.path());
    }

    entries.sort_by_key(|entry| path_key(entry));

    for entry in entries {
        scan_path(&entry, false, output)?;
    }

    Ok(())
}

fn scan_class_file(path: &Path, output: &mut ScanOutput) -> Result<()> {
    if is_module_info(&path.to_string_lossy()) {
        return Ok(());
    }
    let data = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let uri = path_key(path);
    push_artifact(&uri, data.len() as u64, None, output);
    output.classes.push(ClassInput::new(uri, data));
    Ok(())
}

fn scan_jar_file(path: &Path, output: &mut ScanOutput) -> Result<()> {
    let file = fs::File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let mut archive =
        ZipArchive::new(file).with_context(|| format!("failed to read {}", path.display()))?;

    let jar_len = fs::metadata(path)
        .with_context(|| format!("failed to read {}", path.display()))?
        .len();
    let jar_index = push_artifact(&path_key(path), jar_len, None, output);

    let mut entry_names = Vec::new();
    for index in 0..archive.len() {
        let entry = archive
            .by_index(index)
            .with_context(|| format!("failed to read {}", path.display()))?;
        if entry.is_dir() {
            continue;
        }
        let name = entry.name().to_string();
        if name.ends_with(".class") && !is_module_info(&name) {
            entry_names.push(name);
        }
    }

    entry_names.sort();

    for name in entry_names {
        let mut entry = archive
            .by_name(&name)
            .with_context(|| format!("failed to read {}:{}", path.display(), name))?;
        let mut data = Vec::new();
        entry
            .read_to_end(&mut data)
            .with_context(|| format!("failed to read {}:{}", path.display(), name))?;

        let entry_uri = jar_entry_uri(path, &name);
        push_artifact(&entry_uri, data.len() as u64, Some(jar_index), output);
        output.classes.push(ClassInput::new(entry_uri, data));
    }

    Ok(())
}

/// Push an analysis-target artifact and return its index for parent linkage.
fn push_artifact(uri: &str, len: u64, parent_index: Option<i64>, output: &mut ScanOutput) -> i64 {
    let location = ArtifactLocation::builder().uri(uri).build();
    let roles: Vec<Value> = serde_json::to_value(ArtifactRoles::AnalysisTarget)
        .map(|role| vec![role])
        .unwrap_or_default();
    let artifact = match parent_index {
        Some(parent_index) => Artifact::builder()
            .location(location)
            .length(len as i64)
            .parent_index(parent_index)
            .roles(roles)
            .build(),
        None => Artifact::builder()
            .location(location)
            .length(len as i64)
            .roles(roles)
            .build(),
    };
    let index = output.artifacts.len() as i64;
    output.artifacts.push(artifact);
    index
}

fn is_module_info(name: &str) -> bool {
    name.ends_with("module-info.class")
}

fn jar_entry_uri(jar_path: &Path, entry_name: &str) -> String {
    format!("jar:{}!/{}", jar_path.to_string_lossy(), entry_name)
}

fn path_key(path: &Path) -> String {
    path.to_string_lossy().to_string()
}
