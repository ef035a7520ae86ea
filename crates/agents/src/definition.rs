use serde::{Deserialize, Serialize};

use crate::error::AgentError;

/// A parsed agent document: front-matter metadata plus a verbatim prompt
/// body. The loader enforces presence and shape of the metadata only; the
/// prompt is opaque prose.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentDefinition {
    pub id: String,
    pub version: String,
    pub description: String,
    pub tags: Vec<String>,
    pub capabilities: Vec<String>,
    pub prompt: String,
}

#[derive(Deserialize)]
struct FrontMatter {
    name: Option<String>,
    version: Option<String>,
    description: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    capabilities: Vec<String>,
}

const DELIMITER: &str = "---";

/// Split a document into YAML front matter and prompt body, then validate
/// the required fields (name, version, description).
pub fn parse_document(document: &str) -> Result<AgentDefinition, AgentError> {
    let (front, body) = split_front_matter(document)?;

    let matter: FrontMatter = serde_yaml::from_str(front)
        .map_err(|e| AgentError::MalformedAgent(format!("invalid front matter: {}", e)))?;

    let id = require_field(matter.name, "name")?;
    validate_id(&id)?;
    let version = require_field(matter.version, "version")?;
    validate_semver(&version)?;
    let description = require_field(matter.description, "description")?;

    Ok(AgentDefinition {
        id,
        version,
        description,
        tags: matter.tags,
        capabilities: matter.capabilities,
        prompt: body.to_string(),
    })
}

fn split_front_matter(document: &str) -> Result<(&str, &str), AgentError> {
    let rest = document
        .strip_prefix(DELIMITER)
        .and_then(|r| r.strip_prefix('\n'))
        .ok_or_else(|| {
            AgentError::MalformedAgent("document must start with a --- front matter block".into())
        })?;

    let close = rest.find("\n---").ok_or_else(|| {
        AgentError::MalformedAgent("unterminated front matter block".into())
    })?;

    let front = &rest[..close];
    let after = &rest[close + "\n---".len()..];
    // The closing delimiter must end its line.
    let body = match after.strip_prefix('\n') {
        Some(body) => body,
        None if after.is_empty() => "",
        None => {
            return Err(AgentError::MalformedAgent(
                "content after closing front matter delimiter".into(),
            ))
        }
    };

    Ok((front, body))
}

fn require_field(value: Option<String>, field: &str) -> Result<String, AgentError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(AgentError::MalformedAgent(format!(
            "missing required field: {}",
            field
        ))),
    }
}

fn validate_id(id: &str) -> Result<(), AgentError> {
    if id.len() > 64 {
        return Err(AgentError::MalformedAgent(
            "agent name exceeds 64 characters".into(),
        ));
    }
    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(AgentError::MalformedAgent(format!(
            "agent name must be alphanumeric with - or _: {}",
            id
        )));
    }
    Ok(())
}

fn validate_semver(version: &str) -> Result<(), AgentError> {
    let parts: Vec<&str> = version.split('.').collect();
    let ok = parts.len() == 3 && parts.iter().all(|p| !p.is_empty() && p.parse::<u64>().is_ok());
    if !ok {
        return Err(AgentError::MalformedAgent(format!(
            "version must be semver (X.Y.Z), got: {}",
            version
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = "---\n\
name: code-reviewer\n\
version: 1.2.0\n\
description: Reviews code changes\n\
tags:\n  - review\n  - quality\n\
capabilities:\n  - filesystem/read_file\n  - git/diff\n\
---\n\
You are a meticulous code reviewer.\n\
Focus on correctness first.\n";

    #[test]
    fn parses_complete_document() {
        let def = parse_document(VALID).unwrap();
        assert_eq!(def.id, "code-reviewer");
        assert_eq!(def.version, "1.2.0");
        assert_eq!(def.tags, vec!["review", "quality"]);
        assert_eq!(def.capabilities, vec!["filesystem/read_file", "git/diff"]);
        assert_eq!(
            def.prompt,
            "You are a meticulous code reviewer.\nFocus on correctness first.\n"
        );
    }

    #[test]
    fn missing_version_is_malformed() {
        let doc = "---\nname: x\ndescription: y\n---\nbody";
        let err = parse_document(doc).unwrap_err();
        assert!(matches!(err, AgentError::MalformedAgent(_)));
        assert!(err.to_string().contains("version"));
    }

    #[test]
    fn missing_front_matter_is_malformed() {
        assert!(parse_document("just a prompt, no metadata").is_err());
    }

    #[test]
    fn unterminated_front_matter_is_malformed() {
        assert!(parse_document("---\nname: x\nversion: 1.0.0\n").is_err());
    }

    #[test]
    fn non_semver_version_rejected() {
        let doc = "---\nname: x\nversion: latest\ndescription: y\n---\nbody";
        assert!(parse_document(doc).is_err());
    }

    #[test]
    fn prompt_body_is_verbatim() {
        let doc = "---\nname: x\nversion: 1.0.0\ndescription: y\n---\n  indented\n\nspaced\n";
        let def = parse_document(doc).unwrap();
        assert_eq!(def.prompt, "  indented\n\nspaced\n");
    }

    #[test]
    fn empty_body_is_allowed() {
        let doc = "---\nname: x\nversion: 1.0.0\ndescription: y\n---";
        let def = parse_document(doc).unwrap();
        assert_eq!(def.prompt, "");
    }

    #[test]
    fn shell_characters_in_id_rejected() {
        let doc = "---\nname: \"x;rm\"\nversion: 1.0.0\ndescription: y\n---\nbody";
        assert!(parse_document(doc).is_err());
    }
}
