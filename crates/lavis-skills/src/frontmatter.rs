// Copyright (c) 2025-2026 Lavis Contributors
//
// SPDX-License-Identifier: MIT
//! `---`-fenced frontmatter parsing for SKILL.md files.
//!
//! The parser accepts only the documented `key: value` subset — flat string
//! fields, one per line, comments with `#`.  Anything richer (nested maps,
//! lists, multi-line scalars, unknown keys) is rejected with a parse error
//! rather than silently accepted.

use crate::error::SkillError;

/// Keys a SKILL.md frontmatter may carry.  `name` and `command` are
/// required; the rest are optional.
pub const ALLOWED_KEYS: &[&str] = &[
    "name",
    "description",
    "category",
    "version",
    "author",
    "command",
];

/// Parsed frontmatter fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Frontmatter {
    pub name: String,
    pub description: String,
    pub category: String,
    pub version: String,
    pub author: String,
    pub command: String,
}

/// Split a SKILL.md document into `(frontmatter, body)`.
///
/// The document must begin with a `---` line; the frontmatter runs to the
/// next `---` line; everything after is the knowledge body.
pub fn parse(text: &str) -> Result<(Frontmatter, String), SkillError> {
    let mut lines = text.lines();
    match lines.next() {
        Some(first) if first.trim() == "---" => {}
        _ => {
            return Err(SkillError::Parse(
                "document must start with a '---' frontmatter fence".into(),
            ))
        }
    }

    let mut fm = Frontmatter::default();
    let mut closed = false;
    let mut consumed = 1usize;

    for line in lines.by_ref() {
        consumed += 1;
        let trimmed = line.trim();
        if trimmed == "---" {
            closed = true;
            break;
        }
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let (key, value) = trimmed
            .split_once(':')
            .ok_or_else(|| SkillError::Parse(format!("malformed frontmatter line: '{trimmed}'")))?;
        let key = key.trim();
        let value = unquote(value.trim());
        if !ALLOWED_KEYS.contains(&key) {
            return Err(SkillError::Parse(format!(
                "unsupported frontmatter key '{key}' (allowed: {})",
                ALLOWED_KEYS.join(", ")
            )));
        }
        match key {
            "name" => fm.name = value,
            "description" => fm.description = value,
            "category" => fm.category = value,
            "version" => fm.version = value,
            "author" => fm.author = value,
            "command" => fm.command = value,
            _ => unreachable!(),
        }
    }

    if !closed {
        return Err(SkillError::Parse("unterminated frontmatter fence".into()));
    }
    if fm.name.is_empty() {
        return Err(SkillError::Parse("missing required key 'name'".into()));
    }
    if fm.command.is_empty() {
        return Err(SkillError::Parse("missing required key 'command'".into()));
    }

    // Body = everything after the closing fence, original formatting kept.
    let body = text
        .lines()
        .skip(consumed)
        .collect::<Vec<_>>()
        .join("\n")
        .trim_start_matches('\n')
        .to_string();

    Ok((fm, body))
}

/// Serialize frontmatter + body back to SKILL.md form.  Optional fields are
/// omitted when empty, so parse → serialize round-trips semantically.
pub fn serialize(fm: &Frontmatter, body: &str) -> String {
    let mut out = String::from("---\n");
    out.push_str(&format!("name: {}\n", fm.name));
    if !fm.description.is_empty() {
        out.push_str(&format!("description: {}\n", fm.description));
    }
    if !fm.category.is_empty() {
        out.push_str(&format!("category: {}\n", fm.category));
    }
    if !fm.version.is_empty() {
        out.push_str(&format!("version: {}\n", fm.version));
    }
    if !fm.author.is_empty() {
        out.push_str(&format!("author: {}\n", fm.author));
    }
    out.push_str(&format!("command: {}\n", fm.command));
    out.push_str("---\n\n");
    out.push_str(body.trim_end());
    out.push('\n');
    out
}

fn unquote(s: &str) -> String {
    let s = s.trim();
    if s.len() >= 2
        && ((s.starts_with('"') && s.ends_with('"')) || (s.starts_with('\'') && s.ends_with('\'')))
    {
        s[1..s.len() - 1].to_string()
    } else {
        s.to_string()
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "---\n\
        name: sign-in\n\
        description: Log into the portal\n\
        category: web\n\
        version: 1.2.0\n\
        author: ops\n\
        command: agent:log in\n\
        ---\n\
        \n\
        ## Steps\n\
        \n\
        Use the SSO button, never the password form.\n";

    #[test]
    fn parses_all_documented_keys() {
        let (fm, body) = parse(SAMPLE).unwrap();
        assert_eq!(fm.name, "sign-in");
        assert_eq!(fm.description, "Log into the portal");
        assert_eq!(fm.category, "web");
        assert_eq!(fm.version, "1.2.0");
        assert_eq!(fm.author, "ops");
        assert_eq!(fm.command, "agent:log in");
        assert!(body.starts_with("## Steps"));
        assert!(body.contains("SSO button"));
    }

    #[test]
    fn name_and_command_are_required() {
        let missing_command = "---\nname: x\n---\nbody\n";
        assert!(parse(missing_command).is_err());
        let missing_name = "---\ncommand: shell:ls\n---\nbody\n";
        assert!(parse(missing_name).is_err());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let text = "---\nname: x\ncommand: shell:ls\ntags: [a, b]\n---\nbody\n";
        let err = parse(text).unwrap_err();
        assert!(err.to_string().contains("unsupported frontmatter key"));
    }

    #[test]
    fn missing_opening_fence_is_rejected() {
        assert!(parse("name: x\ncommand: y\n").is_err());
    }

    #[test]
    fn unterminated_fence_is_rejected() {
        assert!(parse("---\nname: x\ncommand: y\n").is_err());
    }

    #[test]
    fn quoted_values_are_unquoted() {
        let text = "---\nname: \"quoted name\"\ncommand: 'shell:ls'\n---\nb\n";
        let (fm, _) = parse(text).unwrap();
        assert_eq!(fm.name, "quoted name");
        assert_eq!(fm.command, "shell:ls");
    }

    #[test]
    fn comments_and_blank_lines_are_ignored() {
        let text = "---\n# a comment\n\nname: x\ncommand: shell:true\n---\nbody\n";
        let (fm, _) = parse(text).unwrap();
        assert_eq!(fm.name, "x");
    }

    #[test]
    fn values_may_contain_colons() {
        let text = "---\nname: x\ncommand: agent:open https://example.com\n---\nb\n";
        let (fm, _) = parse(text).unwrap();
        assert_eq!(fm.command, "agent:open https://example.com");
    }

    #[test]
    fn round_trip_preserves_fields_and_body() {
        let (fm, body) = parse(SAMPLE).unwrap();
        let rendered = serialize(&fm, &body);
        let (fm2, body2) = parse(&rendered).unwrap();
        assert_eq!(fm, fm2);
        assert_eq!(body.trim_end(), body2.trim_end());
    }

    #[test]
    fn serialize_omits_empty_optional_fields() {
        let fm = Frontmatter {
            name: "n".into(),
            command: "shell:true".into(),
            ..Default::default()
        };
        let rendered = serialize(&fm, "body");
        assert!(!rendered.contains("description:"));
        assert!(!rendered.contains("author:"));
        assert!(parse(&rendered).is_ok());
    }
}
