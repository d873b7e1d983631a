//! Options-file parsing (`-c <file>`, spec.md §6 "Configuration files").
//!
//! The format is a small `key = value` / repeated-block language, not
//! full TOML/YAML — mirrors the subset bloaty's own protobuf-textformat
//! config actually exercises, hand-rolled the way the teacher crate
//! hand-rolls its own small parsers rather than pulling in a generic
//! config crate for a handful of fields.

use crate::error::{Error, Result};
use crate::sink::DataSource;

/// One `custom_data_source { ... }` block: a named source built by
/// rewriting another source's labels through a regex (spec.md §6
/// "Custom data sources").
#[derive(Clone, Debug)]
pub struct CustomDataSource {
    pub name: String,
    pub base_data_source: DataSource,
    pub rewrite: Vec<(String, String)>,
}

/// The parsed contents of an options file: default data sources, filters,
/// and any custom source definitions.
#[derive(Clone, Debug, Default)]
pub struct Config {
    pub data_sources: Vec<DataSource>,
    pub source_filter: Option<String>,
    pub custom_sources: Vec<CustomDataSource>,
}

impl Config {
    pub fn parse(text: &str) -> Result<Config> {
        let mut cfg = Config::default();
        let mut lines = text.lines().peekable();
        while let Some(raw) = lines.next() {
            let line = strip_comment(raw).trim();
            if line.is_empty() {
                continue;
            }
            if let Some(rest) = line.strip_prefix("data_source") {
                let value = split_kv(rest)?;
                let source = DataSource::parse(&value).ok_or_else(|| {
                    Error::configuration("Config::parse", format!("unknown data source '{value}'"))
                })?;
                cfg.data_sources.push(source);
            } else if let Some(rest) = line.strip_prefix("source_filter") {
                cfg.source_filter = Some(split_kv(rest)?);
            } else if line.starts_with("custom_data_source") {
                cfg.custom_sources.push(parse_custom_source(&mut lines)?);
            } else {
                return Err(Error::configuration(
                    "Config::parse",
                    format!("unrecognized directive: {line}"),
                ));
            }
        }
        Ok(cfg)
    }
}

fn strip_comment(line: &str) -> &str {
    match line.find('#') {
        Some(idx) => &line[..idx],
        None => line,
    }
}

fn split_kv(rest: &str) -> Result<String> {
    let rest = rest.trim();
    let rest = rest
        .strip_prefix(':')
        .or_else(|| rest.strip_prefix('='))
        .ok_or_else(|| Error::configuration("Config::parse", "expected ':' or '=' after key"))?;
    Ok(rest.trim().trim_matches('"').to_string())
}

fn parse_custom_source<'a>(
    lines: &mut std::iter::Peekable<std::str::Lines<'a>>,
) -> Result<CustomDataSource> {
    let mut name = None;
    let mut base = None;
    let mut rewrite = Vec::new();

    // consume up to and through the opening '{'
    for line in lines.by_ref() {
        if strip_comment(line).contains('{') {
            break;
        }
    }

    for line in lines.by_ref() {
        let line = strip_comment(line).trim();
        if line.starts_with('}') {
            break;
        }
        if line.is_empty() {
            continue;
        }
        if let Some(rest) = line.strip_prefix("name") {
            name = Some(split_kv(rest)?);
        } else if let Some(rest) = line.strip_prefix("base_data_source") {
            let value = split_kv(rest)?;
            base = Some(DataSource::parse(&value).ok_or_else(|| {
                Error::configuration(
                    "Config::parse",
                    format!("unknown base data source '{value}'"),
                )
            })?);
        } else if line.starts_with("rewrite") {
            let (pattern, replacement) = parse_rewrite(line)?;
            rewrite.push((pattern, replacement));
        }
    }

    Ok(CustomDataSource {
        name: name
            .ok_or_else(|| Error::configuration("Config::parse", "custom_data_source needs a name"))?,
        base_data_source: base.ok_or_else(|| {
            Error::configuration("Config::parse", "custom_data_source needs a base_data_source")
        })?,
        rewrite,
    })
}

fn parse_rewrite(line: &str) -> Result<(String, String)> {
    let rest = line
        .strip_prefix("rewrite")
        .and_then(|r| r.trim().strip_prefix('{'))
        .ok_or_else(|| Error::configuration("Config::parse", "malformed rewrite block"))?;
    let rest = rest.trim_end_matches('}');
    let mut pattern = None;
    let mut replacement = None;
    for field in rest.split(',') {
        let field = field.trim();
        if let Some(v) = field.strip_prefix("pattern") {
            pattern = Some(split_kv(v)?);
        } else if let Some(v) = field.strip_prefix("replacement") {
            replacement = Some(split_kv(v)?);
        }
    }
    Ok((
        pattern.ok_or_else(|| Error::configuration("Config::parse", "rewrite needs a pattern"))?,
        replacement
            .ok_or_else(|| Error::configuration("Config::parse", "rewrite needs a replacement"))?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_data_sources_and_filter() {
        let text = "data_source: symbols\nsource_filter: \"^\\.text\"\n";
        let cfg = Config::parse(text).unwrap();
        assert_eq!(cfg.data_sources, vec![DataSource::Symbols]);
        assert_eq!(cfg.source_filter.as_deref(), Some("^\\.text"));
    }

    #[test]
    fn parses_custom_data_source_block() {
        let text = r#"
custom_data_source {
  name: "stripped_symbols"
  base_data_source: symbols
  rewrite { pattern: "^_Z.*" replacement: "c++ symbol" }
}
"#;
        let cfg = Config::parse(text).unwrap();
        assert_eq!(cfg.custom_sources.len(), 1);
        let src = &cfg.custom_sources[0];
        assert_eq!(src.name, "stripped_symbols");
        assert_eq!(src.base_data_source, DataSource::Symbols);
        assert_eq!(src.rewrite, vec![("^_Z.*".to_string(), "c++ symbol".to_string())]);
    }

    #[test]
    fn rejects_unknown_directive() {
        assert!(Config::parse("bogus: true\n").is_err());
    }
}
