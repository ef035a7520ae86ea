//! Materializes the registry into a browsable tree of discovery units,
//! one per tool, so a caller can explore capabilities incrementally
//! instead of loading every schema at once.
//!
//! Layout under the output directory:
//!
//! ```text
//! servers/
//! ├── _index.md
//! ├── filesystem/
//! │   ├── _index.md
//! │   ├── read_file.md
//! │   └── ...
//! └── ...
//! ```
//!
//! Regeneration is idempotent: unchanged descriptors produce byte-identical
//! files (existing units are only rewritten when content differs), changed
//! descriptors overwrite only their own unit, and removed descriptors are
//! pruned.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::descriptor::{ToolCategory, ToolDescriptor};
use crate::error::ToolError;
use crate::registry::ToolRegistry;

#[derive(Debug, Default, PartialEq)]
pub struct GenerateReport {
    pub written: usize,
    pub unchanged: usize,
    pub pruned: usize,
}

/// Map a server or tool name to a valid identifier: lowercase,
/// `[a-z0-9_]` only. Collisions after mapping are rejected by `generate`.
pub fn normalize_identifier(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for ch in name.chars() {
        let lower = ch.to_ascii_lowercase();
        if lower.is_ascii_alphanumeric() || lower == '_' {
            out.push(lower);
        } else {
            out.push('_');
        }
    }
    if out.is_empty() {
        out.push('_');
    }
    if out.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    out
}

pub fn generate(registry: &ToolRegistry, out_dir: &Path) -> Result<GenerateReport, ToolError> {
    let expected = expected_files(registry)?;

    let servers_dir = out_dir.join("servers");
    fs::create_dir_all(&servers_dir)?;

    let mut report = GenerateReport::default();

    for (relative, content) in &expected {
        let path = out_dir.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        match fs::read_to_string(&path) {
            Ok(existing) if existing == *content => {
                report.unchanged += 1;
            }
            _ => {
                fs::write(&path, content)?;
                debug!("Wrote discovery unit: {}", relative.display());
                report.written += 1;
            }
        }
    }

    report.pruned = prune(&servers_dir, out_dir, &expected)?;

    info!(
        "Disclosure generation: {} written, {} unchanged, {} pruned",
        report.written, report.unchanged, report.pruned
    );
    Ok(report)
}

/// Build the full expected file set. Fails on post-normalization
/// collisions instead of silently merging units.
fn expected_files(registry: &ToolRegistry) -> Result<BTreeMap<PathBuf, String>, ToolError> {
    let mut files = BTreeMap::new();
    let mut seen_servers: HashMap<String, String> = HashMap::new();
    let mut seen_tools: HashMap<(String, String), String> = HashMap::new();

    let server_names = registry.servers();
    let mut server_listing = Vec::new();

    for server in &server_names {
        let normalized_server = normalize_identifier(server);
        if let Some(previous) = seen_servers.insert(normalized_server.clone(), server.clone()) {
            return Err(ToolError::IdentifierCollision(format!(
                "servers {:?} and {:?} both normalize to {:?}",
                previous, server, normalized_server
            )));
        }

        let manifest = registry.server_manifest(server)?;
        let descriptors = registry.list(Some(server));
        let mut tool_listing = Vec::new();

        for descriptor in &descriptors {
            let normalized_tool = normalize_identifier(&descriptor.name);
            let key = (normalized_server.clone(), normalized_tool.clone());
            if let Some(previous) = seen_tools.insert(key, descriptor.name.clone()) {
                return Err(ToolError::IdentifierCollision(format!(
                    "tools {:?} and {:?} on server {:?} both normalize to {:?}",
                    previous, descriptor.name, server, normalized_tool
                )));
            }

            files.insert(
                PathBuf::from("servers")
                    .join(&normalized_server)
                    .join(format!("{}.md", normalized_tool)),
                unit_content(descriptor),
            );
            tool_listing.push(format!(
                "- [{}]({}.md): {}",
                descriptor.name, normalized_tool, descriptor.description
            ));
        }

        files.insert(
            PathBuf::from("servers").join(&normalized_server).join("_index.md"),
            server_index_content(&manifest.name, &manifest.description, &tool_listing),
        );
        server_listing.push(format!(
            "- [{}]({}/_index.md): {} tools",
            server,
            normalized_server,
            descriptors.len()
        ));
    }

    files.insert(
        PathBuf::from("servers").join("_index.md"),
        top_index_content(&server_listing),
    );

    Ok(files)
}

fn category_name(category: ToolCategory) -> &'static str {
    match category {
        ToolCategory::InProcess => "in_process",
        ToolCategory::Subprocess => "subprocess",
        ToolCategory::Network => "network",
    }
}

fn unit_content(descriptor: &ToolDescriptor) -> String {
    let mut out = String::new();
    out.push_str("---\n");
    out.push_str(&format!("server: {}\n", descriptor.server));
    out.push_str(&format!("tool: {}\n", descriptor.name));
    out.push_str(&format!("category: {}\n", category_name(descriptor.category)));
    if let Some(timeout) = descriptor.timeout_secs {
        out.push_str(&format!("timeout_secs: {}\n", timeout));
    }
    out.push_str("---\n\n");

    out.push_str(&format!("# {}/{}\n\n", descriptor.server, descriptor.name));
    out.push_str(&format!("{}\n\n", descriptor.description));

    out.push_str("## Parameters\n\n");
    if descriptor.parameters.is_empty() {
        out.push_str("None.\n\n");
    } else {
        out.push_str("| name | type | required | default | description |\n");
        out.push_str("|------|------|----------|---------|-------------|\n");
        for param in &descriptor.parameters {
            let default = param
                .default
                .as_ref()
                .map(|d| d.to_string())
                .unwrap_or_else(|| "-".into());
            out.push_str(&format!(
                "| {} | {} | {} | {} | {} |\n",
                param.name,
                param.type_name,
                if param.required { "yes" } else { "no" },
                default,
                param.description
            ));
        }
        out.push('\n');
    }

    out.push_str("## Invoke\n\n");
    out.push_str("Send this envelope to the orchestrator:\n\n");
    out.push_str("```json\n");
    out.push_str(&invoke_envelope(descriptor));
    out.push_str("```\n");
    out
}

/// Hand-formatted so parameter order follows the declaration order of the
/// descriptor, independent of any JSON map ordering.
fn invoke_envelope(descriptor: &ToolDescriptor) -> String {
    let mut out = String::new();
    out.push_str("{\n");
    out.push_str(&format!("  \"server\": \"{}\",\n", descriptor.server));
    out.push_str(&format!("  \"tool\": \"{}\",\n", descriptor.name));
    out.push_str("  \"args\": {");
    let required: Vec<_> = descriptor.parameters.iter().filter(|p| p.required).collect();
    if required.is_empty() {
        out.push_str("}\n");
    } else {
        out.push('\n');
        for (idx, param) in required.iter().enumerate() {
            let comma = if idx + 1 == required.len() { "" } else { "," };
            out.push_str(&format!(
                "    \"{}\": \"<{}>\"{}\n",
                param.name, param.type_name, comma
            ));
        }
        out.push_str("  }\n");
    }
    out.push_str("}\n");
    out
}

fn server_index_content(name: &str, description: &str, tools: &[String]) -> String {
    let mut out = format!("# {}\n\n", name);
    if !description.is_empty() {
        out.push_str(&format!("{}\n\n", description));
    }
    out.push_str("## Tools\n\n");
    for line in tools {
        out.push_str(line);
        out.push('\n');
    }
    out
}

fn top_index_content(servers: &[String]) -> String {
    let mut out = String::from("# Servers\n\n");
    out.push_str("Explore a server's index, then load a single tool unit on demand.\n\n");
    for line in servers {
        out.push_str(line);
        out.push('\n');
    }
    out
}

/// Remove files that no longer correspond to a registered tool, then drop
/// emptied server directories.
fn prune(
    servers_dir: &Path,
    out_dir: &Path,
    expected: &BTreeMap<PathBuf, String>,
) -> Result<usize, ToolError> {
    let mut pruned = 0;
    let mut dirs = Vec::new();

    for entry in fs::read_dir(servers_dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            dirs.push(path);
        } else if !is_expected(&path, out_dir, expected) {
            fs::remove_file(&path)?;
            pruned += 1;
        }
    }

    for dir in dirs {
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.is_file() && !is_expected(&path, out_dir, expected) {
                fs::remove_file(&path)?;
                pruned += 1;
            }
        }
        if fs::read_dir(&dir)?.next().is_none() {
            fs::remove_dir(&dir)?;
        }
    }

    Ok(pruned)
}

fn is_expected(path: &Path, out_dir: &Path, expected: &BTreeMap<PathBuf, String>) -> bool {
    path.strip_prefix(out_dir)
        .map(|relative| expected.contains_key(relative))
        .unwrap_or(false)
}
